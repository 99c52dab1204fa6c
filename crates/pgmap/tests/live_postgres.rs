//! Round trip against a real server; skipped unless `DATABASE_URL` is set.

#![cfg(feature = "pool")]

mod common;

use common::{Comment, Story, Tag, User};
use pgmap::{CreateTableOptions, Db, DbConfig, OrmResult, StatsMonitor, args};
use std::sync::Arc;
use std::time::Duration;

async fn connect() -> OrmResult<Option<Db<deadpool_postgres::Client>>> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping live test");
            return Ok(None);
        }
    };
    let pool = pgmap::create_pool_with_config(&database_url, 1)?;
    Ok(Some(pgmap::pool::checkout(&pool).await?))
}

#[tokio::test]
async fn stories_with_authors_comments_and_tags() -> OrmResult<()> {
    let Some(db) = connect().await? else {
        return Ok(());
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pgmap=debug")
        .with_test_writer()
        .try_init();

    let stats = Arc::new(StatsMonitor::new());
    let db = db
        .with_monitor_arc(stats.clone())
        .with_config(DbConfig::new().with_query_timeout(Duration::from_secs(10)));

    // Temp tables live on this one connection.
    let temp = CreateTableOptions {
        temp: true,
        if_not_exists: true,
    };
    db.create_table::<User>(temp).await?;
    db.create_table::<Story>(temp).await?;
    db.create_table::<Comment>(temp).await?;
    db.create_table::<Tag>(temp).await?;
    db.execute_raw(
        "CREATE TEMP TABLE IF NOT EXISTS story_tags (story_id bigint NOT NULL, tag_id bigint NOT NULL)",
        args![],
    )
    .await?;

    let mut ann = User {
        name: "ann".into(),
        emails: vec!["ann@example.com".into()],
        ..User::default()
    };
    db.insert(&mut ann).await?;
    assert!(ann.id > 0);

    let mut story = Story {
        title: "hello".into(),
        author_id: ann.id,
        ..Story::default()
    };
    db.insert(&mut story).await?;

    let mut comments = vec![
        Comment {
            story_id: story.id,
            author_id: Some(ann.id),
            body: "first".into(),
            ..Comment::default()
        },
        Comment {
            story_id: story.id,
            body: "anonymous".into(),
            ..Comment::default()
        },
    ];
    db.insert_many(&mut comments).await?;

    let mut tag = Tag {
        name: "rust".into(),
        ..Tag::default()
    };
    db.insert(&mut tag).await?;
    db.execute_raw(
        "INSERT INTO story_tags (story_id, tag_id) VALUES (?, ?)",
        args![story.id, tag.id],
    )
    .await?;

    stats.reset();
    let loaded: Story = db
        .model()
        .relation("Author")
        .relation("Comments.Author")
        .relation("Tags")
        .filter("\"story\".\"id\" = ?", args![story.id])
        .select_one()
        .await?;

    assert_eq!(loaded.author.as_ref().map(|u| u.name.as_str()), Some("ann"));
    assert_eq!(loaded.comments.len(), 2);
    assert_eq!(loaded.comments[0].author.as_ref().map(|u| u.id), Some(ann.id));
    assert_eq!(loaded.comments[1].author, None);
    assert_eq!(loaded.tags, vec![tag.clone()]);
    assert_eq!(stats.stats().total_queries, 3);

    let found: User = db.find(ann.id).await?;
    assert_eq!(found, ann);
    Ok(())
}

//! Shared models and a scripted executor for integration tests.

#![allow(dead_code)]

use pgmap::{Executor, Model, OrmResult, Record, Value};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "users")]
pub struct User {
    #[orm(pk)]
    pub id: i64,
    pub name: String,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub author: Option<User>,
    pub comments: Vec<Comment>,
    #[orm(many_to_many = "story_tags")]
    pub tags: Vec<Tag>,
    #[orm(skip)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Comment {
    pub id: i64,
    pub story_id: i64,
    pub author_id: Option<i64>,
    #[orm(column = "content")]
    pub body: String,
    pub author: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

pgmap::join_table!(Story, Tag, "story_tags", "story_id", "tag_id");

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "people")]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Profile {
    pub id: i64,
    pub person_id: i64,
    pub bio: Option<String>,
}

pub fn user(id: i64, name: &str) -> Record {
    Record::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("emails", Value::from(vec![format!("{name}@example.com")])),
    ])
}

pub fn story(id: i64, author_id: i64) -> Record {
    Record::from_pairs([
        ("id", Value::Int(id)),
        ("title", Value::from(format!("story {id}"))),
        ("author_id", Value::Int(author_id)),
    ])
}

/// A story row with its author joined in.
pub fn story_with_author(id: i64, author_id: i64, author: &str) -> Record {
    let root = story(id, author_id);
    let joined = user(author_id, author);
    let mut pairs: Vec<(String, Value)> = root
        .columns()
        .iter()
        .cloned()
        .zip(root.values().iter().cloned())
        .collect();
    for (column, value) in joined.columns().iter().zip(joined.values()) {
        pairs.push((format!("author__{column}"), value.clone()));
    }
    Record::from_pairs(pairs)
}

pub fn comment(id: i64, story_id: i64) -> Record {
    Record::from_pairs([
        ("id", Value::Int(id)),
        ("story_id", Value::Int(story_id)),
        ("author_id", Value::Null),
        ("content", Value::from(format!("comment {id}"))),
    ])
}

/// A person row with its profile columns joined in; `None` leaves them NULL.
pub fn person_with_profile(id: i64, name: &str, profile: Option<(i64, &str)>) -> Record {
    let mut pairs: Vec<(String, Value)> = vec![
        ("id".into(), Value::Int(id)),
        ("name".into(), Value::from(name)),
    ];
    let (profile_id, person_id, bio) = match profile {
        Some((profile_id, bio)) => (Value::Int(profile_id), Value::Int(id), Value::from(bio)),
        None => (Value::Null, Value::Null, Value::Null),
    };
    pairs.push(("profile__id".into(), profile_id));
    pairs.push(("profile__person_id".into(), person_id));
    pairs.push(("profile__bio".into(), bio));
    Record::from_pairs(pairs)
}

/// Answers each statement with the records of the first route whose needle occurs
/// in the SQL, and records what was sent. `execute` reports the routed record count
/// as the number of affected rows.
#[derive(Default)]
pub struct Scripted {
    routes: Vec<(String, Vec<Record>)>,
    sent: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, needle: impl Into<String>, records: Vec<Record>) -> Self {
        self.routes.push((needle.into(), records));
        self
    }

    pub fn sent(&self) -> Vec<(String, Vec<Value>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.sent().into_iter().map(|(sql, _)| sql).collect()
    }

    fn answer(&self, sql: &str, params: &[Value]) -> Vec<Record> {
        self.sent
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.routes
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, records)| records.clone())
            .unwrap_or_default()
    }
}

impl Executor for Scripted {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        Ok(self.answer(sql, params))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        Ok(self.answer(sql, params).len() as u64)
    }
}

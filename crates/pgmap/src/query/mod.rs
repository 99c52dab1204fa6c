//! Model queries.
//!
//! [`Query`] collects clauses for one model and runs them through its [`Db`]:
//!
//! ```ignore
//! let stories: Vec<Story> = db
//!     .model::<Story>()
//!     .relation("Author")
//!     .relation("Comments.Author")
//!     .filter("\"story\".\"title\" ILIKE ?", args!["%rust%"])
//!     .order("\"story\".\"id\" DESC", args![])
//!     .limit(20)
//!     .select()
//!     .await?;
//! ```
//!
//! Fragments are written against the table alias (`story` for `Story`); joined relations
//! are aliased by their path (`author`, `author__profile`).

pub mod builder;
mod spec;

pub use builder::{CreateTableOptions, DropTableOptions};
pub use spec::{Filter, Operation, QuerySpec, Target};

use crate::client::Executor;
use crate::condition::Condition;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::scan::{Node, decode_all};
use crate::schema::describe;
use crate::sql::Fragment;
use crate::value::Value;
use std::marker::PhantomData;

/// A query against model `T`.
///
/// Builder methods never fail; a model that cannot be described or a malformed clause
/// is reported by the terminal method, before any statement is sent.
#[must_use = "a query does nothing until a terminal method such as `select` is awaited"]
pub struct Query<'a, C, T> {
    db: &'a Db<C>,
    spec: OrmResult<QuerySpec>,
    _model: PhantomData<fn() -> T>,
}

impl<'a, C: Executor, T: Model> Query<'a, C, T> {
    pub(crate) fn new(db: &'a Db<C>) -> Self {
        Self {
            db,
            spec: describe::<T>().map(QuerySpec::new),
            _model: PhantomData,
        }
    }

    fn map(mut self, f: impl FnOnce(&mut QuerySpec)) -> Self {
        if let Ok(spec) = &mut self.spec {
            f(spec);
        }
        self
    }

    /// Eager-load a relation; dotted paths load nested relations.
    pub fn relation(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.map(|s| {
            s.relation(name);
        })
    }

    /// Add a `WHERE` fragment with `?` placeholders; fragments are joined with `AND`.
    pub fn filter(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = Fragment::new(sql, args);
        self.map(|s| {
            s.filter(fragment);
        })
    }

    pub fn condition(self, condition: Condition) -> Self {
        self.map(|s| {
            s.condition(condition);
        })
    }

    /// Add an `ORDER BY` term; it may bind values through `?` like a filter.
    pub fn order(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = Fragment::new(sql, args);
        self.map(|s| {
            s.order(fragment);
        })
    }

    pub fn group(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = Fragment::new(sql, args);
        self.map(|s| {
            s.group(fragment);
        })
    }

    pub fn having(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = Fragment::new(sql, args);
        self.map(|s| {
            s.having(fragment);
        })
    }

    pub fn limit(self, limit: i64) -> Self {
        self.map(|s| {
            s.limit(limit);
        })
    }

    pub fn offset(self, offset: i64) -> Self {
        self.map(|s| {
            s.offset(offset);
        })
    }

    /// Name the query in monitor callbacks.
    pub fn tag(self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.map(|s| {
            s.tag(tag);
        })
    }

    /// Run the query and return scanned nodes with their relations attached.
    pub async fn select_nodes(self) -> OrmResult<Vec<Node>> {
        let spec = self.spec?;
        self.db.select_nodes(&spec).await
    }

    /// Fetch every matching row.
    pub async fn select(self) -> OrmResult<Vec<T>> {
        let nodes = self.select_nodes().await?;
        decode_all(&nodes)
    }

    /// Fetch exactly one row: [`OrmError::NotFound`] on none,
    /// [`OrmError::TooManyRows`] when an explicit limit lets more through.
    pub async fn select_one(self) -> OrmResult<T> {
        let table = self.table();
        match self.select_single().await? {
            Some(value) => Ok(value),
            None => Err(OrmError::not_found(format!("no row in `{table}`"))),
        }
    }

    /// Fetch at most one row.
    pub async fn select_opt(self) -> OrmResult<Option<T>> {
        self.select_single().await
    }

    async fn select_single(self) -> OrmResult<Option<T>> {
        let mut spec = self.spec?;
        spec.target(Target::One);
        let mut nodes = self.db.select_nodes(&spec).await?;
        if nodes.len() > 1 {
            return Err(OrmError::too_many_rows(1, nodes.len()));
        }
        nodes.pop().map(|node| T::decode(&node)).transpose()
    }

    /// Number of matching rows.
    pub async fn count(self) -> OrmResult<i64> {
        let spec = self.spec?;
        let plans = crate::relation::plan(&spec.schema, &spec.relations)?;
        let stmt = builder::count(&spec, &plans)?;
        let records = self.db.fetch(&stmt).await?;
        match records.first().and_then(|r| r.get("count")) {
            Some(Value::Int(n)) => Ok(*n),
            other => Err(OrmError::scan(
                spec.schema.table(),
                "count",
                format!("unexpected count result {other:?}"),
            )),
        }
    }

    /// Whether any row matches.
    pub async fn exists(self) -> OrmResult<bool> {
        let spec = self.spec?;
        let plans = crate::relation::plan(&spec.schema, &spec.relations)?;
        let stmt = builder::exists(&spec, &plans)?;
        let records = self.db.fetch(&stmt).await?;
        match records.first().and_then(|r| r.get("exists")) {
            Some(Value::Bool(b)) => Ok(*b),
            other => Err(OrmError::scan(
                spec.schema.table(),
                "exists",
                format!("unexpected exists result {other:?}"),
            )),
        }
    }

    /// Delete every matching row; a filter is required.
    pub async fn delete(self) -> OrmResult<u64> {
        let spec = self.spec?;
        let stmt = builder::delete(&spec)?;
        self.db.exec(&stmt).await
    }

    /// Insert `value`, writing generated columns back into it.
    pub async fn insert(self, value: &mut T) -> OrmResult<()> {
        let spec = self.spec?;
        self.db
            .insert_with(&spec, std::slice::from_mut(value))
            .await
    }

    /// Update `value` by primary key; extra filters must also match.
    pub async fn update(self, value: &T) -> OrmResult<()> {
        let spec = self.spec?;
        self.db.update_with(&spec, value).await
    }

    fn table(&self) -> String {
        match &self.spec {
            Ok(spec) => spec.schema.table().to_string(),
            Err(_) => std::any::type_name::<T>().to_string(),
        }
    }
}

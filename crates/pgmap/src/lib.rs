//! # pgmap
//!
//! A PostgreSQL object mapper with eager relation loading.
//!
//! ## Features
//!
//! - **Type-driven schemas**: `#[derive(Model)]` describes the table, columns and
//!   relations; descriptors are built once per type and cached.
//! - **Relations**: belongs-to, has-one, has-many and many-to-many, loaded by name with
//!   dotted paths for nesting.
//! - **Bounded statement count**: single relations are joined into the root statement,
//!   collections cost one extra statement per level, never one per parent row.
//! - **Safe defaults**: every value is a bound parameter, every identifier is quoted,
//!   DELETE requires WHERE.
//! - **Query monitoring**: timing, slow-query callbacks, statistics and tracing output.
//!
//! ## Example
//!
//! ```ignore
//! use pgmap::{Db, Model};
//!
//! #[derive(Debug, Default, Model)]
//! #[orm(table = "stories")]
//! struct Story {
//!     #[orm(pk)]
//!     id: i64,
//!     title: String,
//!     author_id: i64,
//!     author: Option<User>,
//!     #[orm(has_many, fk = "story_id")]
//!     comments: Vec<Comment>,
//! }
//!
//! let db = Db::new(client);
//! let stories: Vec<Story> = db
//!     .model::<Story>()
//!     .relation("Author")
//!     .relation("Comments.Author")
//!     .select()
//!     .await?;
//! ```

pub mod client;
pub mod condition;
pub mod db;
pub mod error;
pub mod field;
pub mod ident;
pub mod model;
pub mod monitor;
pub mod query;
pub mod relation;
pub mod row;
pub mod scan;
pub mod schema;
pub mod sql;
pub mod transaction;
pub mod value;

pub mod prelude;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
mod fixtures;

pub use client::Executor;
pub use condition::{Condition, Op};
pub use db::Db;
pub use error::{OrmError, OrmResult};
pub use field::{ColumnType, Field, FieldKind};
pub use ident::{Ident, IntoIdent};
pub use model::{FieldShape, JoinTableRegistration, Model, ModelRef, ModelShape, RelationHint};
pub use monitor::{
    CompositeMonitor, DbConfig, LoggingMonitor, NoopMonitor, QueryContext, QueryMonitor,
    QueryResult, QueryStats, QueryType, StatsMonitor,
};
pub use query::{CreateTableOptions, DropTableOptions, Query, QuerySpec};
pub use relation::{RelationPlan, Strategy};
pub use row::Record;
pub use scan::{Node, Related};
pub use schema::{
    ColumnDescriptor, JoinTableDescriptor, RelationDescriptor, RelationKind, SchemaDescriptor,
    describe,
};
pub use sql::{Fragment, Sql, Statement};
pub use value::Value;

pub use tokio_postgres::types::Json;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};

#[cfg(feature = "derive")]
pub use pgmap_derive::Model;

// Used by `join_table!`.
pub use inventory;

/// Items referenced by derive-generated code.
#[doc(hidden)]
pub mod __private {
    pub use crate::field::single_from_related;
    pub use crate::model::push_value;
}

//! Common imports.
//!
//! ```ignore
//! use pgmap::prelude::*;
//! ```

pub use crate::{
    Condition, Db, DbConfig, Executor, Field, Ident, IntoIdent, Json, Model, Op, OrmError,
    OrmResult, Query, Record, Value, args, join_table, savepoint, transaction,
};

#[cfg(feature = "pool")]
pub use crate::{create_pool, create_pool_with_config};

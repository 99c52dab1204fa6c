//! Statement monitoring.
//!
//! Every statement issued through [`Db`](crate::Db) is reported to its [`QueryMonitor`]
//! once it completes. Relation follow-up statements are reported like any other.
//!
//! ```rust,ignore
//! use pgmap::monitor::{CompositeMonitor, LoggingMonitor, StatsMonitor};
//! use std::sync::Arc;
//!
//! let stats = Arc::new(StatsMonitor::new());
//! let db = pgmap::Db::new(client)
//!     .with_monitor(CompositeMonitor::new().add(LoggingMonitor::new()).add_arc(stats.clone()));
//! // ...
//! println!("{} statements", stats.stats().total_queries);
//! ```

mod config;
mod monitors;
mod types;

pub use config::DbConfig;
pub use monitors::{CompositeMonitor, LoggingMonitor, NoopMonitor, QueryStats, StatsMonitor};
pub use types::{QueryContext, QueryMonitor, QueryResult, QueryType};

/// Truncate to at most `max_bytes`, respecting UTF-8 boundaries.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

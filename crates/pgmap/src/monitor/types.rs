use crate::value::Value;
use std::fmt;
use std::time::Duration;

/// The type of SQL operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// SELECT query
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// DDL and anything else
    Other,
}

impl QueryType {
    /// Detect the query type from the leading keyword of a SQL string.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("");
        if keyword.eq_ignore_ascii_case("SELECT") {
            QueryType::Select
        } else if keyword.eq_ignore_ascii_case("INSERT") {
            QueryType::Insert
        } else if keyword.eq_ignore_ascii_case("UPDATE") {
            QueryType::Update
        } else if keyword.eq_ignore_ascii_case("DELETE") {
            QueryType::Delete
        } else {
            QueryType::Other
        }
    }
}

/// Context information about a statement being executed.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// The SQL statement sent to Postgres.
    pub sql: String,
    /// Positional parameters bound to `$1..$n`.
    pub params: Vec<Value>,
    pub query_type: QueryType,
    /// Optional name for identification, e.g. `"Story.comments"` for a relation follow-up.
    pub tag: Option<String>,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let sql = sql.into();
        Self {
            query_type: QueryType::from_sql(&sql),
            sql,
            params,
            tag: None,
        }
    }

    /// Add a tag to identify this statement.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }
}

/// Maximum length for error messages in `QueryResult::Error`.
const MAX_ERROR_LEN: usize = 512;

/// Outcome of a statement, as reported to monitors.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Statement returned rows.
    Rows(usize),
    /// Statement affected rows.
    Affected(u64),
    /// Statement failed (message truncated to 512 bytes).
    Error(String),
}

impl QueryResult {
    /// Create an error result, truncating the message to avoid monitoring data explosion.
    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.len() > MAX_ERROR_LEN {
            Self::Error(format!("{}...", super::truncate_sql_bytes(&msg, MAX_ERROR_LEN)))
        } else {
            Self::Error(msg)
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Observer of statement execution.
///
/// [`Db`](crate::Db) calls `on_query_complete` exactly once for every statement it
/// issues, including relation follow-up statements, whether or not it succeeded.
pub trait QueryMonitor: Send + Sync {
    /// Called before a statement is executed.
    ///
    /// Default implementation does nothing.
    fn on_query_start(&self, _ctx: &QueryContext) {}

    /// Called after a statement completes (success, failure or timeout).
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult);

    /// Called when a statement exceeds the configured slow threshold.
    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_query_type() {
        assert_eq!(QueryType::from_sql("  select 1"), QueryType::Select);
        assert_eq!(
            QueryType::from_sql("INSERT INTO \"users\" DEFAULT VALUES"),
            QueryType::Insert
        );
        assert_eq!(QueryType::from_sql("DELETE FROM t"), QueryType::Delete);
        assert_eq!(QueryType::from_sql("CREATE TABLE t ()"), QueryType::Other);
    }

    #[test]
    fn error_result_is_truncated() {
        let QueryResult::Error(msg) = QueryResult::error("x".repeat(2000)) else {
            panic!("expected error");
        };
        assert_eq!(msg.len(), MAX_ERROR_LEN + 3);
    }
}

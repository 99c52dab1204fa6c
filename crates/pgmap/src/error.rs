//! Error types for pgmap

use thiserror::Error;

/// Result type alias for pgmap operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for mapping and database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// The model shape cannot be mapped to a table (detected when the model is described).
    #[error("Schema error on {model}: {message}")]
    Schema { model: String, message: String },

    /// The query fragments cannot be combined into a valid statement.
    #[error("Query build error on {table}: {message}")]
    QueryBuild { table: String, message: String },

    /// A requested relation is unknown or cannot be satisfied.
    #[error("Relation error on {model}.{relation}: {message}")]
    Relation {
        model: String,
        relation: String,
        message: String,
    },

    /// Returned rows do not match the expected columns or types.
    #[error("Scan error on {table}.{column}: {message}")]
    Scan {
        table: String,
        column: String,
        message: String,
    },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// More rows than expected
    #[error("Too many rows: expected {expected}, got {got}")]
    TooManyRows { expected: usize, got: usize },

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Wire-level decode error for a returned column
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a schema error for a model.
    pub fn schema(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a query build error for a table.
    pub fn query_build(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryBuild {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a relation error.
    pub fn relation(
        model: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Relation {
            model: model.into(),
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Create a scan error for a specific table column.
    pub fn scan(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Scan {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a too-many-rows error
    pub fn too_many_rows(expected: usize, got: usize) -> Self {
        Self::TooManyRows { expected, got }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn is_query_build(&self) -> bool {
        matches!(self, Self::QueryBuild { .. })
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation { .. })
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, Self::Scan { .. } | Self::Decode { .. })
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = OrmError::relation("Story", "Editor", "unknown relation");
        assert_eq!(
            err.to_string(),
            "Relation error on Story.Editor: unknown relation"
        );

        let err = OrmError::scan("users", "emails", "expected array");
        assert_eq!(err.to_string(), "Scan error on users.emails: expected array");
    }

    #[test]
    fn classification_helpers() {
        assert!(OrmError::schema("User", "no primary key").is_schema());
        assert!(OrmError::query_build("users", "ORDER BY on INSERT").is_query_build());
        assert!(OrmError::decode("id", "bad").is_scan());
        assert!(!OrmError::not_found("x").is_scan());
    }
}

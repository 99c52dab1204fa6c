//! Structured WHERE conditions.
//!
//! [`Condition`] pairs a validated column identifier with an operator and bound values.
//! It is the typed counterpart to raw `filter` fragments.
//!
//! ```ignore
//! use pgmap::Condition;
//!
//! let q = db
//!     .model::<Story>()
//!     .condition(Condition::eq("story.author_id", 7_i64)?)
//!     .condition(Condition::ilike("title", "%rust%")?);
//! ```

use crate::error::OrmResult;
use crate::ident::{Ident, IntoIdent};
use crate::sql::Sql;
use crate::value::Value;

/// Query operator for building conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Like(Value),
    Ilike(Value),
    IsNull,
    IsNotNull,
    In(Vec<Value>),
    Between(Value, Value),
}

impl Op {
    fn operator(&self) -> &'static str {
        match self {
            Op::Eq(_) => "=",
            Op::Ne(_) => "!=",
            Op::Gt(_) => ">",
            Op::Gte(_) => ">=",
            Op::Lt(_) => "<",
            Op::Lte(_) => "<=",
            Op::Like(_) => "LIKE",
            Op::Ilike(_) => "ILIKE",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
            Op::In(_) => "IN",
            Op::Between(..) => "BETWEEN",
        }
    }
}

/// A single predicate over one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: Ident,
    op: Op,
}

impl Condition {
    /// Create a condition from a column identifier and operator.
    pub fn new<I: IntoIdent>(column: I, op: Op) -> OrmResult<Self> {
        Ok(Self {
            column: column.into_ident()?,
            op,
        })
    }

    /// column = value
    pub fn eq<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Eq(value.into()))
    }

    /// column != value
    pub fn ne<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Ne(value.into()))
    }

    pub fn gt<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Gt(value.into()))
    }

    pub fn gte<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Gte(value.into()))
    }

    pub fn lt<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Lt(value.into()))
    }

    pub fn lte<I: IntoIdent>(column: I, value: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Lte(value.into()))
    }

    pub fn like<I: IntoIdent>(column: I, pattern: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Like(pattern.into()))
    }

    /// Case-insensitive pattern match (PostgreSQL ILIKE).
    pub fn ilike<I: IntoIdent>(column: I, pattern: impl Into<Value>) -> OrmResult<Self> {
        Self::new(column, Op::Ilike(pattern.into()))
    }

    pub fn is_null<I: IntoIdent>(column: I) -> OrmResult<Self> {
        Self::new(column, Op::IsNull)
    }

    pub fn is_not_null<I: IntoIdent>(column: I) -> OrmResult<Self> {
        Self::new(column, Op::IsNotNull)
    }

    /// column IN (values...); an empty list matches nothing.
    pub fn in_list<I, V>(column: I, values: impl IntoIterator<Item = V>) -> OrmResult<Self>
    where
        I: IntoIdent,
        V: Into<Value>,
    {
        Self::new(column, Op::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn between<I: IntoIdent>(
        column: I,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> OrmResult<Self> {
        Self::new(column, Op::Between(from.into(), to.into()))
    }

    /// Append this condition into a [`Sql`] builder.
    pub fn append_to_sql(&self, sql: &mut Sql) {
        let operator = self.op.operator();
        match &self.op {
            Op::In(vals) if vals.is_empty() => {
                sql.push("1=0");
            }
            Op::In(vals) => {
                sql.push_ident_ref(&self.column);
                sql.push(" IN (");
                sql.push_bind_list(vals.iter().cloned());
                sql.push(")");
            }
            Op::Between(a, b) => {
                sql.push_ident_ref(&self.column);
                sql.push(" BETWEEN ");
                sql.push_bind(a.clone());
                sql.push(" AND ");
                sql.push_bind(b.clone());
            }
            Op::IsNull | Op::IsNotNull => {
                sql.push_ident_ref(&self.column);
                sql.push(" ");
                sql.push(operator);
            }
            Op::Eq(v)
            | Op::Ne(v)
            | Op::Gt(v)
            | Op::Gte(v)
            | Op::Lt(v)
            | Op::Lte(v)
            | Op::Like(v)
            | Op::Ilike(v) => {
                sql.push_ident_ref(&self.column);
                sql.push(" ");
                sql.push(operator);
                sql.push(" ");
                sql.push_bind(v.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(c: &Condition) -> (String, Vec<Value>) {
        let mut sql = Sql::empty();
        sql.push_condition(c);
        (sql.to_sql(), sql.params().to_vec())
    }

    #[test]
    fn comparison_binds_value() {
        let (sql, params) = render(&Condition::eq("story.author_id", 7_i64).unwrap());
        assert_eq!(sql, r#""story"."author_id" = $1"#);
        assert_eq!(params, vec![Value::Int(7)]);
    }

    #[test]
    fn in_list_and_empty_in_list() {
        let (sql, params) = render(&Condition::in_list("id", [1_i64, 2]).unwrap());
        assert_eq!(sql, r#""id" IN ($1, $2)"#);
        assert_eq!(params.len(), 2);

        let (sql, params) = render(&Condition::in_list("id", Vec::<i64>::new()).unwrap());
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn between_and_null_checks() {
        let (sql, _) = render(&Condition::between("age", 18_i64, 65_i64).unwrap());
        assert_eq!(sql, r#""age" BETWEEN $1 AND $2"#);
        let (sql, params) = render(&Condition::is_null("deleted_at").unwrap());
        assert_eq!(sql, r#""deleted_at" IS NULL"#);
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_bad_column() {
        assert!(Condition::eq("id = 1 OR 1", 1_i64).is_err());
    }
}

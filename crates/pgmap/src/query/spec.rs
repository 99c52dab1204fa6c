use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::schema::SchemaDescriptor;
use crate::sql::Fragment;
use std::sync::Arc;

/// Whether the caller expects one value or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    One,
    #[default]
    Many,
}

/// The statement a [`QuerySpec`] is about to be built into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Count,
    Exists,
    Insert,
    Update,
    Delete,
}

impl Operation {
    fn keyword(self) -> &'static str {
        match self {
            Operation::Select | Operation::Count | Operation::Exists => "SELECT",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

/// One `WHERE` term; terms are joined with `AND`.
#[derive(Debug, Clone)]
pub enum Filter {
    Fragment(Fragment),
    Condition(Condition),
}

/// Builder state of one logical query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub(crate) schema: Arc<SchemaDescriptor>,
    pub(crate) relations: Vec<String>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) group: Vec<Fragment>,
    pub(crate) having: Vec<Fragment>,
    pub(crate) order: Vec<Fragment>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
    pub(crate) target: Target,
    pub(crate) tag: Option<String>,
}

impl QuerySpec {
    pub fn new(schema: Arc<SchemaDescriptor>) -> Self {
        Self {
            schema,
            relations: Vec::new(),
            filters: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            target: Target::Many,
            tag: None,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    /// Request a relation; repeated names are kept once, in first-request order.
    pub fn relation(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.relations.contains(&name) {
            self.relations.push(name);
        }
        self
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn filter(&mut self, fragment: Fragment) -> &mut Self {
        self.filters.push(Filter::Fragment(fragment));
        self
    }

    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        self.filters.push(Filter::Condition(condition));
        self
    }

    pub fn order(&mut self, fragment: Fragment) -> &mut Self {
        self.order.push(fragment);
        self
    }

    pub fn group(&mut self, fragment: Fragment) -> &mut Self {
        self.group.push(fragment);
        self
    }

    pub fn having(&mut self, fragment: Fragment) -> &mut Self {
        self.having.push(fragment);
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn target(&mut self, target: Target) -> &mut Self {
        self.target = target;
        self
    }

    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Reject clause combinations that have no meaning for `op`.
    pub fn check(&self, op: Operation) -> OrmResult<()> {
        let table = self.schema.table();
        let fail = |clause: &str| {
            Err(OrmError::query_build(
                table,
                format!("{clause} is not valid on {}", op.keyword()),
            ))
        };

        if matches!(op, Operation::Insert | Operation::Update | Operation::Delete) {
            if !self.order.is_empty() {
                return fail("ORDER BY");
            }
            if self.limit.is_some() {
                return fail("LIMIT");
            }
            if self.offset.is_some() {
                return fail("OFFSET");
            }
            if !self.group.is_empty() {
                return fail("GROUP BY");
            }
            if !self.having.is_empty() {
                return fail("HAVING");
            }
            if !self.relations.is_empty() {
                return fail("relation loading");
            }
        }
        match op {
            Operation::Insert if self.has_filters() => return fail("WHERE"),
            Operation::Delete if !self.has_filters() => {
                return Err(OrmError::query_build(
                    table,
                    "DELETE requires a WHERE clause; use a filter such as `TRUE` to delete every row",
                ));
            }
            _ => {}
        }

        if !self.having.is_empty() && self.group.is_empty() {
            return Err(OrmError::query_build(table, "HAVING requires GROUP BY"));
        }
        if self.limit.is_some_and(|n| n < 0) {
            return Err(OrmError::query_build(table, "LIMIT must not be negative"));
        }
        if self.offset.is_some_and(|n| n < 0) {
            return Err(OrmError::query_build(table, "OFFSET must not be negative"));
        }
        if !self.group.is_empty() && !self.relations.is_empty() && op == Operation::Select {
            return Err(OrmError::query_build(
                table,
                "relations cannot be loaded for grouped rows",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Story;
    use crate::schema::describe;

    fn spec() -> QuerySpec {
        QuerySpec::new(describe::<Story>().unwrap())
    }

    #[test]
    fn relations_are_deduplicated_in_order() {
        let mut q = spec();
        q.relation("author").relation("comments").relation("author");
        assert_eq!(q.relations(), ["author", "comments"]);
    }

    #[test]
    fn ordering_on_insert_is_rejected() {
        let mut q = spec();
        q.order("id DESC".into());
        let err = q.check(Operation::Insert).unwrap_err();
        assert!(err.is_query_build());
        assert!(err.to_string().contains("ORDER BY is not valid on INSERT"), "{err}");
        assert!(q.check(Operation::Select).is_ok());
    }

    #[test]
    fn delete_needs_where_and_no_limit() {
        let mut q = spec();
        assert!(q.check(Operation::Delete).unwrap_err().is_query_build());
        q.filter(Fragment::new("id = ?", vec![1.into()]));
        assert!(q.check(Operation::Delete).is_ok());
        q.limit(1);
        assert!(q.check(Operation::Delete).unwrap_err().is_query_build());
    }

    #[test]
    fn having_without_group_and_negative_limit() {
        let mut q = spec();
        q.having("count(*) > 1".into());
        assert!(q.check(Operation::Select).is_err());
        let mut q = spec();
        q.limit(-1);
        assert!(q.check(Operation::Select).is_err());
    }
}

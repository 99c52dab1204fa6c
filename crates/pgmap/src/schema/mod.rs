//! Schema descriptors.
//!
//! A [`SchemaDescriptor`] is the immutable description of how one model maps to a table.
//! Descriptors are built once per model by the registry ([`describe`]) and shared
//! through `Arc`.

pub mod naming;
mod registry;

pub use registry::{describe, describe_ref};

use crate::error::OrmResult;
use crate::field::ColumnType;
use crate::model::ModelRef;
use heck::ToSnakeCase;
use std::fmt;
use std::sync::Arc;

/// How a model field maps to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Rust field name.
    pub field: &'static str,
    /// SQL column name.
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Assigned by the database (`bigserial`/`serial`); left out of INSERT while zero.
    pub generated: bool,
}

/// Foreign-key direction and cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    /// Whether the relation yields at most one row per parent.
    pub fn is_single(self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::BelongsTo => "belongs-to",
            RelationKind::HasOne => "has-one",
            RelationKind::HasMany => "has-many",
            RelationKind::ManyToMany => "many-to-many",
        })
    }
}

/// Intermediary table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableDescriptor {
    pub table: String,
    /// Columns referencing the owning model's primary key.
    pub parent_columns: Vec<String>,
    /// Columns referencing the target model's primary key.
    pub target_columns: Vec<String>,
}

/// A relation field of a model.
///
/// `local_columns` live on the owning table and `foreign_columns` on the target table;
/// a parent row matches a related row when the values of both lists are equal:
///
/// | kind | local | foreign |
/// |---|---|---|
/// | belongs-to | this fk (`author_id`) | target pk |
/// | has-one / has-many | this pk | target fk (`story_id`) |
/// | many-to-many | this pk | target pk (matched through the join table) |
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Rust field name, also the relation name.
    pub field: &'static str,
    pub kind: RelationKind,
    pub local_columns: Vec<String>,
    pub foreign_columns: Vec<String>,
    pub join_table: Option<JoinTableDescriptor>,
    target: ModelRef,
}

impl RelationDescriptor {
    pub fn target_ref(&self) -> ModelRef {
        self.target
    }

    /// Descriptor of the related model, described on first use.
    pub fn target(&self) -> OrmResult<Arc<SchemaDescriptor>> {
        describe_ref(self.target)
    }
}

/// Immutable mapping of a model onto a table.
#[derive(Debug)]
pub struct SchemaDescriptor {
    model: &'static str,
    model_ref: ModelRef,
    table: String,
    alias: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: Vec<usize>,
    relations: Vec<RelationDescriptor>,
}

impl SchemaDescriptor {
    /// Rust type name of the model.
    pub fn model(&self) -> &'static str {
        self.model
    }

    pub fn model_ref(&self) -> ModelRef {
        self.model_ref
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Alias used for this table when it is the root of a statement.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn column(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn column_index_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Positions of the primary-key columns within [`columns`](Self::columns).
    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.primary_key.iter().map(|&i| &self.columns[i])
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().map(|c| c.name.clone()).collect()
    }

    /// The single database-generated primary key, if the model has one.
    pub fn generated_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.generated)
    }

    /// Relations in declaration order.
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    /// Look up a relation by field name, accepting the type-style spelling
    /// (`"Author"` finds the `author` field).
    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|r| r.field == name)
            .or_else(|| {
                let snake = name.to_snake_case();
                self.relations.iter().find(|r| r.field == snake)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_kind_display() {
        assert_eq!(RelationKind::ManyToMany.to_string(), "many-to-many");
        assert!(RelationKind::BelongsTo.is_single());
        assert!(!RelationKind::HasMany.is_single());
    }
}

//! Model declaration.
//!
//! A model is a struct deriving [`Model`](derive@crate::Model). The derive reports a
//! static [`ModelShape`] that the registry turns into a
//! [`SchemaDescriptor`](crate::SchemaDescriptor), and generates the glue that moves field
//! values in and out of [`Node`]s.
//!
//! ```ignore
//! use pgmap::Model;
//!
//! #[derive(Model)]
//! struct Story {
//!     id: i64,
//!     title: String,
//!     author_id: i64,
//!     author: Option<User>,
//! }
//! ```

use crate::error::{OrmError, OrmResult};
use crate::field::{Field, FieldKind};
use crate::scan::Node;
use crate::value::Value;
use std::any::TypeId;
use std::fmt;

/// A struct mapped to a table.
pub trait Model: Sized + Send + Sync + 'static {
    /// Static description of the struct; computed by the derive.
    fn shape() -> ModelShape;

    /// Build a value from a scanned node, including loaded relations.
    fn decode(node: &Node) -> OrmResult<Self>;

    /// Column field values keyed by field name, in declaration order.
    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>>;

    /// Overwrite column fields from a node (used to apply `RETURNING` rows).
    fn apply_node(&mut self, node: &Node) -> OrmResult<()>;
}

/// Type-erased handle to a model, used to reference relation targets lazily.
#[derive(Clone, Copy)]
pub struct ModelRef {
    name: &'static str,
    type_id: fn() -> TypeId,
    shape: fn() -> ModelShape,
}

impl ModelRef {
    pub fn of<M: Model>() -> Self {
        Self {
            name: std::any::type_name::<M>(),
            type_id: TypeId::of::<M>,
            shape: M::shape,
        }
    }

    /// Fully qualified Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn shape(&self) -> ModelShape {
        (self.shape)()
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for ModelRef {}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&self.name).finish()
    }
}

/// Declared relation kind on a field (`#[orm(belongs_to)]` and friends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationHint {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany { join_table: &'static str },
}

/// Static description of one mapped field.
#[derive(Debug, Clone)]
pub struct FieldShape {
    pub name: &'static str,
    pub kind: FieldKind,
    pub column: Option<&'static str>,
    pub pk: bool,
    pub relation: Option<RelationHint>,
    /// Relation key override; comma-separated for composite keys.
    pub fk: Option<&'static str>,
    pub join_fk: Option<&'static str>,
    pub join_target_fk: Option<&'static str>,
}

impl FieldShape {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            column: None,
            pk: false,
            relation: None,
            fk: None,
            join_fk: None,
            join_target_fk: None,
        }
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn pk(mut self) -> Self {
        self.pk = true;
        self
    }

    pub fn relation(mut self, hint: RelationHint) -> Self {
        self.relation = Some(hint);
        self
    }

    pub fn fk(mut self, fk: &'static str) -> Self {
        self.fk = Some(fk);
        self
    }

    pub fn join_fk(mut self, column: &'static str) -> Self {
        self.join_fk = Some(column);
        self
    }

    pub fn join_target_fk(mut self, column: &'static str) -> Self {
        self.join_target_fk = Some(column);
        self
    }
}

/// Static description of a model struct.
#[derive(Debug, Clone)]
pub struct ModelShape {
    /// Rust type name as written in the struct declaration.
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub alias: Option<&'static str>,
    pub fields: Vec<FieldShape>,
}

impl ModelShape {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            table: None,
            alias: None,
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }
}

/// A many-to-many join table registered with [`join_table!`](crate::join_table).
///
/// `left_column` references the primary key of `left`, `right_column` that of `right`.
pub struct JoinTableRegistration {
    pub left: fn() -> TypeId,
    pub right: fn() -> TypeId,
    pub table: &'static str,
    pub left_column: &'static str,
    pub right_column: &'static str,
}

inventory::collect!(JoinTableRegistration);

/// Register a join table linking two models.
///
/// ```ignore
/// pgmap::join_table!(Story, Tag, "story_tags", "story_id", "tag_id");
/// ```
#[macro_export]
macro_rules! join_table {
    ($left:ty, $right:ty, $table:literal, $left_col:literal, $right_col:literal) => {
        $crate::inventory::submit! {
            $crate::JoinTableRegistration {
                left: ::std::any::TypeId::of::<$left>,
                right: ::std::any::TypeId::of::<$right>,
                table: $table,
                left_column: $left_col,
                right_column: $right_col,
            }
        }
    };
}

/// Push a column field's value; relation fields are skipped.
#[doc(hidden)]
pub fn push_value<T: Field>(
    values: &mut Vec<(&'static str, Value)>,
    field: &'static str,
    value: &T,
) -> OrmResult<()> {
    if T::kind().is_column() {
        let value = value
            .to_value()
            .map_err(|m| OrmError::validation(format!("field `{field}`: {m}")))?;
        values.push((field, value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_builder_keeps_declaration_order() {
        let shape = ModelShape::new("Story")
            .table("tales")
            .field(FieldShape::new("id", i64::kind()).pk())
            .field(FieldShape::new("title", String::kind()).column("headline"));
        assert_eq!(shape.table, Some("tales"));
        let names: Vec<_> = shape.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["id", "title"]);
        assert!(shape.fields[0].pk);
        assert_eq!(shape.fields[1].column, Some("headline"));
    }

    #[test]
    fn push_value_skips_non_columns() {
        let mut values = Vec::new();
        push_value(&mut values, "name", &"admin".to_string()).unwrap();
        push_value(&mut values, "nickname", &None::<String>).unwrap();
        assert_eq!(
            values,
            vec![("name", Value::Text("admin".into())), ("nickname", Value::Null)]
        );
    }
}

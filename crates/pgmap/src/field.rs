//! Per-field mapping.
//!
//! Every field type of a model implements [`Field`]. The trait reports what the field
//! is (a column of some SQL type, a single related model, or a collection of related
//! models) and converts between the Rust value and [`Value`].
//!
//! `#[derive(Model)]` calls `<FieldType as Field>::kind()` for every field when it builds
//! the model shape, so the mapping is decided by the type system rather than by
//! inspecting values at runtime.

use crate::error::{OrmError, OrmResult};
use crate::model::{Model, ModelRef};
use crate::scan::{Node, Related};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use tokio_postgres::types::Json;
use uuid::Uuid;

/// Semantic SQL type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Text,
    Bytea,
    Uuid,
    Timestamptz,
    Timestamp,
    Date,
    /// Embedded struct or free-form JSON, stored as `jsonb`.
    Json,
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Type name used in DDL.
    pub fn sql_name(&self) -> String {
        match self {
            ColumnType::Bool => "boolean".into(),
            ColumnType::SmallInt => "smallint".into(),
            ColumnType::Integer => "integer".into(),
            ColumnType::BigInt => "bigint".into(),
            ColumnType::Real => "real".into(),
            ColumnType::Double => "double precision".into(),
            ColumnType::Text => "text".into(),
            ColumnType::Bytea => "bytea".into(),
            ColumnType::Uuid => "uuid".into(),
            ColumnType::Timestamptz => "timestamptz".into(),
            ColumnType::Timestamp => "timestamp".into(),
            ColumnType::Date => "date".into(),
            ColumnType::Json => "jsonb".into(),
            ColumnType::Array(inner) => format!("{}[]", inner.sql_name()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ColumnType::Array(_))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name())
    }
}

/// What a field maps to.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A table column.
    Column { ty: ColumnType, nullable: bool },
    /// A single related model (`Option<M>`, `Option<Box<M>>`).
    One { target: ModelRef, optional: bool },
    /// A collection of related models (`Vec<M>`).
    Many { target: ModelRef, optional: bool },
    /// A type the mapper cannot express; rejected when the model is described.
    Unsupported(&'static str),
}

impl FieldKind {
    pub fn is_column(&self) -> bool {
        matches!(self, FieldKind::Column { .. })
    }
}

/// Mapping behaviour of a single field type.
///
/// Scalar impls override the column methods, model impls (emitted by the derive)
/// override the relation methods. The `vec_*` hooks let an element type change how
/// `Vec<Self>` is mapped; `u8` uses them so that `Vec<u8>` is `bytea`.
pub trait Field: Sized {
    fn kind() -> FieldKind;

    /// Lower a column field into a bindable value.
    fn to_value(&self) -> Result<Value, String> {
        Err("field is not a column".to_string())
    }

    /// Lift a decoded column value into the field type.
    fn from_value(value: &Value) -> Result<Self, String> {
        let _ = value;
        Err("field is not a column".to_string())
    }

    /// Decode one related node into the field type.
    fn from_node(node: &Node) -> OrmResult<Self> {
        Err(OrmError::scan(
            node.schema().table(),
            "<relation>",
            "field type is not a model",
        ))
    }

    /// Build a relation field from what was loaded for it; `None` when not requested.
    fn from_related(related: Option<&Related>) -> OrmResult<Self> {
        let _ = related;
        Err(OrmError::Other(
            "field type cannot hold a relation".to_string(),
        ))
    }

    #[doc(hidden)]
    fn vec_kind() -> FieldKind {
        match Self::kind() {
            FieldKind::Column { ty, .. } if ty.is_array() => {
                FieldKind::Unsupported("nested arrays are not supported")
            }
            FieldKind::Column { ty, .. } => FieldKind::Column {
                ty: ColumnType::Array(Box::new(ty)),
                nullable: false,
            },
            FieldKind::One { target, .. } => FieldKind::Many {
                target,
                optional: false,
            },
            FieldKind::Many { .. } => {
                FieldKind::Unsupported("collections of collections are not supported")
            }
            unsupported @ FieldKind::Unsupported(_) => unsupported,
        }
    }

    #[doc(hidden)]
    fn vec_to_value(items: &[Self]) -> Result<Value, String> {
        items
            .iter()
            .map(Field::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    #[doc(hidden)]
    fn vec_from_value(value: &Value) -> Result<Vec<Self>, String> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            other => Err(mismatch("array", other)),
        }
    }
}

pub(crate) fn mismatch(expected: &str, got: &Value) -> String {
    if got.is_null() {
        format!("NULL in non-nullable {expected} field; use Option<_>")
    } else {
        format!("expected {expected}, got {}", got.kind_name())
    }
}

/// `from_related` for a model used as a single relation.
#[doc(hidden)]
pub fn single_from_related<M: Model>(related: Option<&Related>) -> OrmResult<M> {
    match related {
        Some(Related::One(Some(node))) => M::decode(node),
        Some(Related::One(None)) | None => Err(OrmError::not_found(format!(
            "related {} is absent; declare the field as Option<_>",
            std::any::type_name::<M>()
        ))),
        Some(Related::Many(_)) => Err(OrmError::Other(format!(
            "expected a single {}, got a collection",
            std::any::type_name::<M>()
        ))),
    }
}

macro_rules! scalar_field {
    ($ty:ty, $column:ident, $name:literal, |$v:ident| $decode:expr) => {
        impl Field for $ty {
            fn kind() -> FieldKind {
                FieldKind::Column {
                    ty: ColumnType::$column,
                    nullable: false,
                }
            }

            fn to_value(&self) -> Result<Value, String> {
                Ok(Value::from(self.clone()))
            }

            fn from_value(value: &Value) -> Result<Self, String> {
                let $v = value;
                $decode.ok_or_else(|| mismatch($name, value))
            }
        }
    };
}

scalar_field!(bool, Bool, "bool", |v| match v {
    Value::Bool(b) => Some(*b),
    _ => None,
});
scalar_field!(i16, SmallInt, "smallint", |v| match v {
    Value::Int(i) => i16::try_from(*i).ok(),
    _ => None,
});
scalar_field!(i32, Integer, "integer", |v| match v {
    Value::Int(i) => i32::try_from(*i).ok(),
    _ => None,
});
scalar_field!(i64, BigInt, "bigint", |v| match v {
    Value::Int(i) => Some(*i),
    _ => None,
});
scalar_field!(f32, Real, "real", |v| match v {
    Value::Float(f) => Some(*f as f32),
    Value::Int(i) => Some(*i as f32),
    _ => None,
});
scalar_field!(f64, Double, "double precision", |v| match v {
    Value::Float(f) => Some(*f),
    Value::Int(i) => Some(*i as f64),
    _ => None,
});
scalar_field!(String, Text, "text", |v| match v {
    Value::Text(s) => Some(s.clone()),
    _ => None,
});
scalar_field!(Uuid, Uuid, "uuid", |v| match v {
    Value::Uuid(u) => Some(*u),
    _ => None,
});
scalar_field!(serde_json::Value, Json, "jsonb", |v| match v {
    Value::Json(j) => Some(j.clone()),
    _ => None,
});
scalar_field!(DateTime<Utc>, Timestamptz, "timestamptz", |v| match v {
    Value::Timestamp(t) => Some(*t),
    Value::LocalTimestamp(t) => Some(t.and_utc()),
    _ => None,
});
scalar_field!(NaiveDateTime, Timestamp, "timestamp", |v| match v {
    Value::LocalTimestamp(t) => Some(*t),
    Value::Timestamp(t) => Some(t.naive_utc()),
    _ => None,
});
scalar_field!(NaiveDate, Date, "date", |v| match v {
    Value::Date(d) => Some(*d),
    _ => None,
});

impl Field for u8 {
    fn kind() -> FieldKind {
        FieldKind::Column {
            ty: ColumnType::SmallInt,
            nullable: false,
        }
    }

    fn to_value(&self) -> Result<Value, String> {
        Ok(Value::from(*self))
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => u8::try_from(*i).map_err(|e| e.to_string()),
            other => Err(mismatch("smallint", other)),
        }
    }

    fn vec_kind() -> FieldKind {
        FieldKind::Column {
            ty: ColumnType::Bytea,
            nullable: false,
        }
    }

    fn vec_to_value(items: &[Self]) -> Result<Value, String> {
        Ok(Value::Bytes(items.to_vec()))
    }

    fn vec_from_value(value: &Value) -> Result<Vec<Self>, String> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(mismatch("bytea", other)),
        }
    }
}

impl<T: Field> Field for Option<T> {
    fn kind() -> FieldKind {
        match T::kind() {
            FieldKind::Column { nullable: true, .. } => {
                FieldKind::Unsupported("nested Option is not supported")
            }
            FieldKind::Column { ty, .. } => FieldKind::Column { ty, nullable: true },
            FieldKind::One { target, .. } => FieldKind::One {
                target,
                optional: true,
            },
            FieldKind::Many { target, .. } => FieldKind::Many {
                target,
                optional: true,
            },
            unsupported @ FieldKind::Unsupported(_) => unsupported,
        }
    }

    fn to_value(&self) -> Result<Value, String> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_node(node: &Node) -> OrmResult<Self> {
        T::from_node(node).map(Some)
    }

    fn from_related(related: Option<&Related>) -> OrmResult<Self> {
        match related {
            None | Some(Related::One(None)) => Ok(None),
            other => T::from_related(other).map(Some),
        }
    }
}

impl<T: Field> Field for Box<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn to_value(&self) -> Result<Value, String> {
        (**self).to_value()
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        T::from_value(value).map(Box::new)
    }

    fn from_node(node: &Node) -> OrmResult<Self> {
        T::from_node(node).map(Box::new)
    }

    fn from_related(related: Option<&Related>) -> OrmResult<Self> {
        T::from_related(related).map(Box::new)
    }
}

impl<T: Field> Field for Vec<T> {
    fn kind() -> FieldKind {
        T::vec_kind()
    }

    fn to_value(&self) -> Result<Value, String> {
        T::vec_to_value(self)
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        T::vec_from_value(value)
    }

    fn from_related(related: Option<&Related>) -> OrmResult<Self> {
        match related {
            None => Ok(Vec::new()),
            Some(Related::Many(nodes)) => nodes.iter().map(T::from_node).collect(),
            Some(Related::One(_)) => Err(OrmError::Other(
                "expected a collection, got a single relation".to_string(),
            )),
        }
    }
}

/// Embedded struct stored as `jsonb`.
impl<T> Field for Json<T>
where
    T: Serialize + DeserializeOwned,
{
    fn kind() -> FieldKind {
        FieldKind::Column {
            ty: ColumnType::Json,
            nullable: false,
        }
    }

    fn to_value(&self) -> Result<Value, String> {
        serde_json::to_value(&self.0)
            .map(Value::Json)
            .map_err(|e| e.to_string())
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Json(j) => serde_json::from_value(j.clone())
                .map(Json)
                .map_err(|e| e.to_string()),
            other => Err(mismatch("jsonb", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: FieldKind) -> (ColumnType, bool) {
        match kind {
            FieldKind::Column { ty, nullable } => (ty, nullable),
            other => panic!("expected column, got {other:?}"),
        }
    }

    #[test]
    fn scalar_and_nullable_kinds() {
        assert_eq!(column(i64::kind()), (ColumnType::BigInt, false));
        assert_eq!(column(Option::<String>::kind()), (ColumnType::Text, true));
        assert_eq!(column(Vec::<u8>::kind()), (ColumnType::Bytea, false));
        assert_eq!(
            column(Vec::<String>::kind()),
            (ColumnType::Array(Box::new(ColumnType::Text)), false)
        );
        assert_eq!(
            column(Json::<Vec<String>>::kind()),
            (ColumnType::Json, false)
        );
    }

    #[test]
    fn unsupported_shapes() {
        assert!(matches!(
            Vec::<Vec<String>>::kind(),
            FieldKind::Unsupported(_)
        ));
        assert!(matches!(
            Option::<Option<i32>>::kind(),
            FieldKind::Unsupported(_)
        ));
    }

    #[test]
    fn null_is_distinct_from_zero() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(0)), Ok(Some(0)));
        assert!(i64::from_value(&Value::Null).is_err());
        assert_eq!(Option::<i64>::None.to_value(), Ok(Value::Null));
    }

    #[test]
    fn arrays_round_through_values() {
        let emails = vec!["a@x".to_string(), "b@x".to_string()];
        let value = emails.to_value().unwrap();
        assert_eq!(Vec::<String>::from_value(&value).unwrap(), emails);
        assert!(Vec::<String>::from_value(&Value::Text("a".into())).is_err());
    }

    #[test]
    fn narrow_integers_reject_overflow() {
        assert!(i16::from_value(&Value::Int(1 << 20)).is_err());
        assert_eq!(i32::from_value(&Value::Int(7)), Ok(7));
    }

    #[test]
    fn floats_accept_integer_cells() {
        assert_eq!(f32::from_value(&Value::Int(3)), Ok(3.0));
        assert_eq!(f64::from_value(&Value::Int(3)), Ok(3.0));
        assert_eq!(f32::from_value(&Value::Float(0.5)), Ok(0.5));
        assert!(f32::from_value(&Value::Text("3".into())).is_err());
    }

    #[test]
    fn json_embeds_structs() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Settings {
            theme: String,
        }
        let value = Json(Settings {
            theme: "dark".into(),
        })
        .to_value()
        .unwrap();
        let back = Json::<Settings>::from_value(&value).unwrap();
        assert_eq!(back.0.theme, "dark");
    }

    #[test]
    fn unloaded_relations_stay_empty() {
        assert!(Vec::<i64>::from_related(None).unwrap().is_empty());
    }
}

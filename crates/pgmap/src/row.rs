//! Row decoding into dynamic records

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio_postgres::{Column, Row};
use tokio_postgres::types::{FromSql, Type};
use uuid::Uuid;

/// One result row: ordered column names plus decoded values.
///
/// Column names are shared between all rows of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record from column names and values of equal length.
    pub fn new(columns: impl Into<Arc<[String]>>, values: Vec<Value>) -> OrmResult<Self> {
        let columns = columns.into();
        if columns.len() != values.len() {
            return Err(OrmError::scan(
                "<record>",
                "<row>",
                format!(
                    "{} column names for {} values",
                    columns.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self { columns, values })
    }

    /// Convenience constructor for hand-built rows.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Decode a `tokio-postgres` row using each column's wire type.
    pub fn from_row(row: &Row) -> OrmResult<Self> {
        let columns: Arc<[String]> = row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Self::from_row_with(columns, row)
    }

    /// Decode a row reusing an already collected column list.
    pub(crate) fn from_row_with(columns: Arc<[String]>, row: &Row) -> OrmResult<Self> {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            values.push(decode_column(row, idx, column)?);
        }
        Ok(Self { columns, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value by column name (first match).
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// Decode all rows of one statement.
pub(crate) fn decode_rows(rows: &[Row]) -> OrmResult<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    rows.iter()
        .map(|row| Record::from_row_with(columns.clone(), row))
        .collect()
}

/// Column name for decode errors, with the join alias and source table when known.
fn column_label(name: &str, table_oid: Option<u32>) -> String {
    let alias = name
        .rsplit_once("__")
        .map(|(alias, _)| alias)
        .filter(|alias| !alias.is_empty());
    match (alias, table_oid) {
        (Some(alias), Some(oid)) => format!("{name} (alias {alias}, table oid {oid})"),
        (Some(alias), None) => format!("{name} (alias {alias})"),
        (None, Some(oid)) => format!("{name} (table oid {oid})"),
        (None, None) => name.to_string(),
    }
}

fn decode_error(column: &Column, message: impl Into<String>) -> OrmError {
    OrmError::decode(column_label(column.name(), column.table_oid()), message)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, column: &Column) -> OrmResult<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| decode_error(column, e.to_string()))
}

fn scalar<'a, T>(row: &'a Row, idx: usize, column: &Column) -> OrmResult<Value>
where
    T: FromSql<'a> + Into<Value>,
{
    Ok(get::<T>(row, idx, column)?.map_or(Value::Null, Into::into))
}

fn array<'a, T>(row: &'a Row, idx: usize, column: &Column) -> OrmResult<Value>
where
    T: FromSql<'a> + Into<Value>,
{
    Ok(match get::<Vec<Option<T>>>(row, idx, column)? {
        Some(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        None => Value::Null,
    })
}

fn decode_column(row: &Row, idx: usize, column: &Column) -> OrmResult<Value> {
    let ty = column.type_();
    match *ty {
        Type::BOOL => scalar::<bool>(row, idx, column),
        Type::INT2 => scalar::<i16>(row, idx, column),
        Type::INT4 => scalar::<i32>(row, idx, column),
        Type::INT8 => scalar::<i64>(row, idx, column),
        Type::OID => scalar::<u32>(row, idx, column),
        Type::FLOAT4 => scalar::<f32>(row, idx, column),
        Type::FLOAT8 => scalar::<f64>(row, idx, column),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            scalar::<String>(row, idx, column)
        }
        Type::BYTEA => Ok(get::<Vec<u8>>(row, idx, column)?.map_or(Value::Null, Value::Bytes)),
        Type::UUID => scalar::<Uuid>(row, idx, column),
        Type::JSON | Type::JSONB => scalar::<serde_json::Value>(row, idx, column),
        Type::TIMESTAMPTZ => scalar::<DateTime<Utc>>(row, idx, column),
        Type::TIMESTAMP => scalar::<NaiveDateTime>(row, idx, column),
        Type::DATE => scalar::<NaiveDate>(row, idx, column),
        Type::BOOL_ARRAY => array::<bool>(row, idx, column),
        Type::INT2_ARRAY => array::<i16>(row, idx, column),
        Type::INT4_ARRAY => array::<i32>(row, idx, column),
        Type::INT8_ARRAY => array::<i64>(row, idx, column),
        Type::FLOAT4_ARRAY => array::<f32>(row, idx, column),
        Type::FLOAT8_ARRAY => array::<f64>(row, idx, column),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY => {
            array::<String>(row, idx, column)
        }
        Type::BYTEA_ARRAY => Ok(match get::<Vec<Option<Vec<u8>>>>(row, idx, column)? {
            Some(items) => Value::Array(
                items
                    .into_iter()
                    .map(|b| b.map_or(Value::Null, Value::Bytes))
                    .collect(),
            ),
            None => Value::Null,
        }),
        Type::UUID_ARRAY => array::<Uuid>(row, idx, column),
        Type::JSON_ARRAY | Type::JSONB_ARRAY => array::<serde_json::Value>(row, idx, column),
        Type::TIMESTAMPTZ_ARRAY => array::<DateTime<Utc>>(row, idx, column),
        Type::TIMESTAMP_ARRAY => array::<NaiveDateTime>(row, idx, column),
        Type::DATE_ARRAY => array::<NaiveDate>(row, idx, column),
        _ => Err(decode_error(
            column,
            format!("unsupported column type {}", ty.name()),
        )),
    }
}

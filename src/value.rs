//! Scalar values exchanged between the application and the store

use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A row as a mapping from column name to scalar value.
///
/// `BTreeMap` keeps iteration order deterministic, which fixes the column
/// order of generated INSERT/UPDATE statements and their bound parameters.
pub type Row = BTreeMap<String, Value>;

/// A typed scalar as seen by the application.
///
/// Booleans are logical here; the store-side representation is an integer
/// (`true` -> 1, `false` -> 0 on write, any nonzero integer -> `true` on
/// read). That mapping lives in [`Value::to_sql`] and
/// [`Value::from_column`], never at call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read one column from a result row, coercing to the declared
    /// semantic type. Boolean columns come back from SQLite as integers;
    /// any nonzero integer reads as logical `true`.
    pub fn from_column(
        row: &rusqlite::Row<'_>,
        idx: usize,
        ty: crate::entity::ColumnType,
    ) -> rusqlite::Result<Value> {
        use crate::entity::ColumnType;
        use rusqlite::types::ValueRef;

        let raw = row.get_ref(idx)?;
        if let ValueRef::Null = raw {
            return Ok(Value::Null);
        }
        let value = match ty {
            ColumnType::Boolean => Value::Bool(row.get::<_, i64>(idx)? != 0),
            ColumnType::Integer => Value::Integer(row.get(idx)?),
            ColumnType::Float => Value::Float(row.get(idx)?),
            ColumnType::Text => Value::Text(row.get(idx)?),
        };
        Ok(value)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            // Logical booleans are stored as 1/0
            Value::Bool(b) => Ok(ToSqlOutput::from(if *b { 1i64 } else { 0i64 })),
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_writes_as_integer() {
        let out = Value::Bool(true).to_sql().unwrap();
        assert_eq!(out, ToSqlOutput::from(1i64));
        let out = Value::Bool(false).to_sql().unwrap();
        assert_eq!(out, ToSqlOutput::from(0i64));
    }

    #[test]
    fn test_json_round_trip() {
        let row: Row = [
            ("enabled".to_string(), Value::Bool(true)),
            ("name".to_string(), Value::Text("a".into())),
            ("amount".to_string(), Value::Float(1.5)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_null_from_json() {
        let v: Value = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
    }
}

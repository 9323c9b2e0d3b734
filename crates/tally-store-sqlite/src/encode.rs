//! Conversion between [`Value`] and rusqlite's value types.

use rusqlite::types::{Value as SqlValue, ValueRef};
use tally_core::Value;

pub fn to_sql(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Integer(i) => SqlValue::Integer(*i),
    Value::Real(f) => SqlValue::Real(*f),
    Value::Text(s) => SqlValue::Text(s.clone()),
    Value::Blob(b) => SqlValue::Blob(b.clone()),
  }
}

/// Text that is not valid UTF-8 is surfaced as a blob so the column decoder
/// reports a type mismatch instead of the row being dropped.
pub fn from_sql(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::Integer(i),
    ValueRef::Real(f) => Value::Real(f),
    ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
      Ok(s) => Value::Text(s.to_owned()),
      Err(_) => Value::Blob(bytes.to_vec()),
    },
    ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
  }
}

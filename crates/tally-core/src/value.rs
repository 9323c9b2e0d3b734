//! Storage values — the five SQLite storage classes.
//!
//! Every column value crosses the storage boundary as a [`Value`]. Typed Rust
//! values are converted through [`ColumnValue`](crate::column::ColumnValue).

use std::fmt;

/// A single storage value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

/// The storage class a column is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
  Integer,
  Real,
  Text,
  Blob,
}

impl StorageClass {
  /// The SQLite type name used in DDL.
  pub fn sql_type(self) -> &'static str {
    match self {
      StorageClass::Integer => "INTEGER",
      StorageClass::Real => "REAL",
      StorageClass::Text => "TEXT",
      StorageClass::Blob => "BLOB",
    }
  }
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

  /// Storage class of a non-null value.
  pub fn storage_class(&self) -> Option<StorageClass> {
    match self {
      Value::Null => None,
      Value::Integer(_) => Some(StorageClass::Integer),
      Value::Real(_) => Some(StorageClass::Real),
      Value::Text(_) => Some(StorageClass::Text),
      Value::Blob(_) => Some(StorageClass::Blob),
    }
  }

  /// Short lowercase name of the variant, used in decode errors.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Integer(_) => "integer",
      Value::Real(_) => "real",
      Value::Text(_) => "text",
      Value::Blob(_) => "blob",
    }
  }

  /// Render the value as an SQL literal. Only used for DDL defaults; every
  /// statement binds its values as parameters.
  pub fn to_sql_literal(&self) -> String {
    match self {
      Value::Null => "NULL".to_owned(),
      Value::Integer(i) => i.to_string(),
      Value::Real(r) => format!("{r:?}"),
      Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
      Value::Blob(b) => {
        let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
        format!("X'{hex}'")
      }
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Blob(b) => write!(f, "<{} byte blob>", b.len()),
      other => f.write_str(&other.to_sql_literal()),
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Value::Integer(v) }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self { Value::Real(v) }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self { Value::Integer(i64::from(v)) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Value::Text(v.to_owned()) }
}

impl From<String> for Value {
  fn from(v: String) -> Self { Value::Text(v) }
}

impl From<Vec<u8>> for Value {
  fn from(v: Vec<u8>) -> Self { Value::Blob(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Value::Null, Into::into) }
}

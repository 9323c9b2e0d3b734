//! The representation contract between Rust types and storage values.
//!
//! Every type usable as a column implements [`ColumnValue`]: it declares its
//! logical [`ColumnType`] and converts to and from a [`Value`]. The mapping
//! must round-trip, i.e. `T::decode(&t.encode()) == Ok(t)`.
//!
//! Timestamps are stored as RFC 3339 strings with fixed nanosecond precision
//! so that text order equals time order. Calendar dates are `YYYY-MM-DD`.
//! UUIDs are hyphenated lowercase strings. JSON documents are UTF-8 blobs.

use std::ops::Deref;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
  error::DecodeError,
  value::{StorageClass, Value},
};

// ─── Logical types ───────────────────────────────────────────────────────────

/// The logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Integer,
  Text,
  Real,
  Blob,
  /// Calendar date, `YYYY-MM-DD` text.
  Date,
  /// UTC timestamp, RFC 3339 text.
  DateTime,
  /// `0` or `1`.
  Boolean,
  /// Integer raw value restricted to the declared cases.
  Enum(&'static [i64]),
  /// Hyphenated lowercase text.
  Uuid,
  /// JSON document stored as a blob.
  Json,
}

impl ColumnType {
  pub fn storage_class(self) -> StorageClass {
    match self {
      ColumnType::Integer | ColumnType::Boolean | ColumnType::Enum(_) => {
        StorageClass::Integer
      }
      ColumnType::Real => StorageClass::Real,
      ColumnType::Text | ColumnType::Date | ColumnType::DateTime | ColumnType::Uuid => {
        StorageClass::Text
      }
      ColumnType::Blob | ColumnType::Json => StorageClass::Blob,
    }
  }

  /// Whether a non-null storage value is a legal representation for this
  /// type. NULL is governed by nullability, not by the type.
  pub fn accepts(self, value: &Value) -> bool {
    match (self, value) {
      (_, Value::Null) => true,
      (ColumnType::Boolean, Value::Integer(i)) => *i == 0 || *i == 1,
      (ColumnType::Enum(cases), Value::Integer(i)) => cases.contains(i),
      (ColumnType::Real, Value::Integer(_)) => true,
      (ty, v) => v.storage_class() == Some(ty.storage_class()),
    }
  }
}

// ─── Representation trait ────────────────────────────────────────────────────

/// A Rust type with a defined storage representation.
pub trait ColumnValue: Sized {
  const TYPE: ColumnType;
  const NULLABLE: bool = false;

  fn encode(&self) -> Value;

  fn decode(value: &Value) -> Result<Self, DecodeError>;
}

fn mismatch(expected: &'static str, found: &Value) -> DecodeError {
  match found {
    Value::Null => DecodeError::UnexpectedNull,
    other => DecodeError::Mismatch { expected, found: other.kind() },
  }
}

impl ColumnValue for i64 {
  const TYPE: ColumnType = ColumnType::Integer;

  fn encode(&self) -> Value { Value::Integer(*self) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Integer(i) => Ok(*i),
      other => Err(mismatch("integer", other)),
    }
  }
}

impl ColumnValue for i32 {
  const TYPE: ColumnType = ColumnType::Integer;

  fn encode(&self) -> Value { Value::Integer(i64::from(*self)) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    let wide = i64::decode(value)?;
    i32::try_from(wide).map_err(|_| DecodeError::OutOfRange(wide))
  }
}

impl ColumnValue for f64 {
  const TYPE: ColumnType = ColumnType::Real;

  fn encode(&self) -> Value { Value::Real(*self) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Real(r) => Ok(*r),
      // REAL affinity may hand back integral values as integers.
      Value::Integer(i) => Ok(*i as f64),
      other => Err(mismatch("real", other)),
    }
  }
}

impl ColumnValue for bool {
  const TYPE: ColumnType = ColumnType::Boolean;

  fn encode(&self) -> Value { Value::Integer(i64::from(*self)) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Integer(0) => Ok(false),
      Value::Integer(1) => Ok(true),
      Value::Integer(other) => {
        Err(DecodeError::Malformed(format!("{other} is not a boolean")))
      }
      other => Err(mismatch("integer", other)),
    }
  }
}

impl ColumnValue for String {
  const TYPE: ColumnType = ColumnType::Text;

  fn encode(&self) -> Value { Value::Text(self.clone()) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Text(s) => Ok(s.clone()),
      other => Err(mismatch("text", other)),
    }
  }
}

impl ColumnValue for Vec<u8> {
  const TYPE: ColumnType = ColumnType::Blob;

  fn encode(&self) -> Value { Value::Blob(self.clone()) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Blob(b) => Ok(b.clone()),
      other => Err(mismatch("blob", other)),
    }
  }
}

impl ColumnValue for Uuid {
  const TYPE: ColumnType = ColumnType::Uuid;

  fn encode(&self) -> Value { Value::Text(self.hyphenated().to_string()) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Text(s) => {
        Uuid::parse_str(s).map_err(|e| DecodeError::Malformed(e.to_string()))
      }
      other => Err(mismatch("text", other)),
    }
  }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl ColumnValue for NaiveDate {
  const TYPE: ColumnType = ColumnType::Date;

  fn encode(&self) -> Value { Value::Text(self.format(DATE_FORMAT).to_string()) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Text(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| DecodeError::Malformed(format!("{s:?}: {e}"))),
      other => Err(mismatch("text", other)),
    }
  }
}

impl ColumnValue for DateTime<Utc> {
  const TYPE: ColumnType = ColumnType::DateTime;

  fn encode(&self) -> Value {
    Value::Text(self.to_rfc3339_opts(SecondsFormat::Nanos, true))
  }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Text(s) => DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DecodeError::Malformed(format!("{s:?}: {e}"))),
      other => Err(mismatch("text", other)),
    }
  }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
  const TYPE: ColumnType = T::TYPE;
  const NULLABLE: bool = true;

  fn encode(&self) -> Value {
    match self {
      Some(v) => v.encode(),
      None => Value::Null,
    }
  }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    match value {
      Value::Null => Ok(None),
      other => T::decode(other).map(Some),
    }
  }
}

// ─── JSON ────────────────────────────────────────────────────────────────────

/// A serde-serialisable value stored as a JSON blob.
///
/// The document is serialised when the wrapper is built, so a value that has
/// no JSON form is rejected by [`Json::new`] and never reaches a statement.
#[derive(Debug, Clone)]
pub struct Json<T> {
  value: T,
  bytes: Vec<u8>,
}

impl<T: Serialize> Json<T> {
  pub fn new(value: T) -> Result<Self, serde_json::Error> {
    let bytes = serde_json::to_vec(&value)?;
    Ok(Self { value, bytes })
  }
}

impl<T> Json<T> {
  pub fn get(&self) -> &T { &self.value }

  pub fn into_inner(self) -> T { self.value }

  /// The serialised document.
  pub fn as_bytes(&self) -> &[u8] { &self.bytes }
}

impl<T> Deref for Json<T> {
  type Target = T;

  fn deref(&self) -> &T { &self.value }
}

impl<T: PartialEq> PartialEq for Json<T> {
  fn eq(&self, other: &Self) -> bool { self.value == other.value }
}

impl<T: Eq> Eq for Json<T> {}

impl<T: Serialize + DeserializeOwned> ColumnValue for Json<T> {
  const TYPE: ColumnType = ColumnType::Json;

  fn encode(&self) -> Value { Value::Blob(self.bytes.clone()) }

  fn decode(value: &Value) -> Result<Self, DecodeError> {
    let bytes = match value {
      Value::Blob(b) => b.as_slice(),
      Value::Text(s) => s.as_bytes(),
      other => return Err(mismatch("blob", other)),
    };
    let value =
      serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(Self { value, bytes: bytes.to_vec() })
  }
}

// ─── Integer-backed enums ────────────────────────────────────────────────────

/// An enum stored as its integer raw value.
///
/// Implementors pair this with a [`ColumnValue`] impl that uses
/// [`encode_enum`] / [`decode_enum`] and declares
/// `ColumnType::Enum(Self::CASES)`.
pub trait IntEnum: Copy + Sized + 'static {
  /// Raw values of every case.
  const CASES: &'static [i64];

  fn raw(self) -> i64;

  fn from_raw(raw: i64) -> Option<Self>;
}

pub fn encode_enum<E: IntEnum>(value: E) -> Value { Value::Integer(value.raw()) }

pub fn decode_enum<E: IntEnum>(value: &Value) -> Result<E, DecodeError> {
  let raw = i64::decode(value)?;
  E::from_raw(raw).ok_or(DecodeError::UnknownCase(raw))
}

//! Error types for `tally-core`.

use thiserror::Error;

use crate::{column::ColumnType, value::Value};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid definition for table {table}: {reason}")]
  InvalidTable { table: &'static str, reason: String },

  #[error("invalid schema: {0}")]
  InvalidSchema(String),

  #[error("column {table}.{column} does not exist")]
  UnknownColumn {
    table:  &'static str,
    column: &'static str,
  },

  /// A column of a table that is neither the statement's target nor joined.
  #[error("column {table}.{column} is not in scope for this statement")]
  ColumnNotInScope {
    table:  &'static str,
    column: &'static str,
  },

  #[error("{value} is not a declared case of enum column {table}.{column}")]
  EnumOutOfRange {
    table:  &'static str,
    column: &'static str,
    value:  i64,
  },

  #[error("value {value} does not fit column {table}.{column} ({ty:?})")]
  InvalidValue {
    table:  &'static str,
    column: &'static str,
    value:  Value,
    ty:     ColumnType,
  },

  #[error("column {table}.{column} has no value and no default")]
  MissingValue {
    table:  &'static str,
    column: &'static str,
  },

  #[error("column {table}.{column} is assigned by the store")]
  StoreAssigned {
    table:  &'static str,
    column: &'static str,
  },

  #[error("column {table}.{column} is assigned more than once")]
  DuplicateAssignment {
    table:  &'static str,
    column: &'static str,
  },

  #[error("invalid statement: {0}")]
  InvalidStatement(String),

  /// A document handed to [`Json::new`](crate::Json::new) has no JSON form.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("cannot decode column {column:?}: {source}")]
  Decode {
    column: String,
    #[source]
    source: DecodeError,
  },
}

/// Why a storage value could not be turned back into a Rust value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("expected {expected}, found {found}")]
  Mismatch {
    expected: &'static str,
    found:    &'static str,
  },

  #[error("unexpected NULL")]
  UnexpectedNull,

  #[error("{0} is not a known enum case")]
  UnknownCase(i64),

  #[error("integer {0} is out of range")]
  OutOfRange(i64),

  #[error("malformed value: {0}")]
  Malformed(String),

  #[error("no such column in result row")]
  MissingColumn,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

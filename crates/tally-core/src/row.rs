//! Result rows and typed decoding.

use std::sync::Arc;

use crate::{
  Error, Result,
  column::ColumnValue,
  error::DecodeError,
  record::{Col, Record},
  value::Value,
};

/// One row of a result set: column names shared across the set, plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
  columns: Arc<[String]>,
  values:  Vec<Value>,
}

impl Row {
  pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
    Self { columns, values }
  }

  pub fn columns(&self) -> &[String] { &self.columns }

  pub fn values(&self) -> &[Value] { &self.values }

  pub fn len(&self) -> usize { self.values.len() }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  /// The raw value of the column named `name`.
  pub fn value(&self, name: &str) -> Result<&Value> {
    self
      .columns
      .iter()
      .position(|c| c == name)
      .and_then(|i| self.values.get(i))
      .ok_or_else(|| Error::Decode {
        column: name.to_owned(),
        source: DecodeError::MissingColumn,
      })
  }

  /// Decode the column selected under `col`'s name.
  pub fn get<R: Record, T: ColumnValue>(&self, col: Col<R, T>) -> Result<T> {
    self.get_named(col.name())
  }

  /// Decode the column named (or aliased) `name`.
  pub fn get_named<T: ColumnValue>(&self, name: &str) -> Result<T> {
    T::decode(self.value(name)?).map_err(|source| Error::Decode {
      column: name.to_owned(),
      source,
    })
  }

  /// Decode the column at `index`.
  pub fn get_index<T: ColumnValue>(&self, index: usize) -> Result<T> {
    let column = self
      .columns
      .get(index)
      .cloned()
      .unwrap_or_else(|| format!("#{index}"));
    let value = self.values.get(index).ok_or_else(|| Error::Decode {
      column: column.clone(),
      source: DecodeError::MissingColumn,
    })?;
    T::decode(value).map_err(|source| Error::Decode { column, source })
  }
}

/// Types that can be decoded from a result row.
pub trait FromRow: Sized {
  fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
  fn from_row(row: &Row) -> Result<Self> { Ok(row.clone()) }
}

/// The first column of a row, e.g. for `COUNT(*)` selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar<T>(pub T);

impl<T: ColumnValue> FromRow for Scalar<T> {
  fn from_row(row: &Row) -> Result<Self> { row.get_index(0).map(Scalar) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row() -> Row {
    Row::new(
      Arc::from(vec!["title".to_owned(), "count".to_owned()]),
      vec![Value::Text("Personal".into()), Value::Integer(3)],
    )
  }

  #[test]
  fn named_and_indexed_access() {
    let row = row();
    assert_eq!(row.get_named::<String>("title").unwrap(), "Personal");
    assert_eq!(row.get_index::<i64>(1).unwrap(), 3);
    assert_eq!(Scalar::<String>::from_row(&row).unwrap(), Scalar("Personal".into()));
  }

  #[test]
  fn decode_errors_name_the_column() {
    let row = row();
    let err = row.get_named::<i64>("title").unwrap_err();
    assert!(matches!(err, Error::Decode { ref column, .. } if column == "title"));

    let err = row.get_named::<i64>("missing").unwrap_err();
    assert!(matches!(
      err,
      Error::Decode { source: DecodeError::MissingColumn, .. }
    ));
  }
}

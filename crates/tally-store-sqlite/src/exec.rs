//! Statement execution on a raw connection.
//!
//! These functions run on the connection thread, inside `call` closures.

use std::sync::Arc;

use rusqlite::{Connection, params_from_iter};
use tally_core::{FromRow, Row, Statement};
use tracing::debug;

use crate::{
  Result,
  encode::{from_sql, to_sql},
};

/// Run a row-producing statement and collect its raw rows.
pub fn query(conn: &Connection, stmt: &Statement) -> Result<Vec<Row>> {
  debug!(sql = stmt.sql(), params = stmt.params().len(), "query");
  let mut prepared = conn.prepare_cached(stmt.sql())?;
  let columns: Arc<[String]> = prepared
    .column_names()
    .into_iter()
    .map(str::to_owned)
    .collect();

  let mut rows = prepared.query(params_from_iter(stmt.params().iter().map(to_sql)))?;
  let mut out = Vec::new();
  while let Some(row) = rows.next()? {
    let mut values = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
      values.push(from_sql(row.get_ref(i)?));
    }
    out.push(Row::new(Arc::clone(&columns), values));
  }
  Ok(out)
}

/// Run a statement for its effect and return the number of rows changed.
pub fn execute(conn: &Connection, stmt: &Statement) -> Result<usize> {
  debug!(sql = stmt.sql(), params = stmt.params().len(), "execute");
  let mut prepared = conn.prepare_cached(stmt.sql())?;
  Ok(prepared.execute(params_from_iter(stmt.params().iter().map(to_sql)))?)
}

pub fn decode_rows<T: FromRow>(rows: &[Row]) -> Result<Vec<T>> {
  Ok(rows.iter().map(T::from_row).collect::<tally_core::Result<_>>()?)
}

//! The mutation gateway.
//!
//! Every change to a store goes through [`Store::write`](crate::Store::write),
//! which runs a closure against a [`WriteTx`] inside one `IMMEDIATE`
//! transaction on the writer connection.

use std::collections::BTreeSet;

use rusqlite::{Connection, TransactionBehavior};
use tally_core::{Draft, FromRow, Insert, Schema, Statement};

use crate::{
  Error, Result, exec,
  live::{Hub, TableSet},
};

/// Run `body` in an immediate transaction. Commits on `Ok` and publishes the
/// touched tables; rolls back on `Err`.
pub(crate) fn run<T>(
  conn: &mut Connection,
  schema: &Schema,
  hub: &Hub,
  body: impl FnOnce(&mut WriteTx<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut wtx = WriteTx { conn: &tx, schema, touched: BTreeSet::new() };
  // Dropping `tx` on the error path rolls back.
  let value = body(&mut wtx)?;
  let touched = wtx.touched;
  tx.commit()?;

  // Still on the writer thread, so notifications go out in commit order.
  if !touched.is_empty() {
    hub.publish(TableSet::Only(touched));
  }
  Ok(value)
}

/// An open write transaction.
pub struct WriteTx<'c> {
  conn:    &'c Connection,
  schema:  &'c Schema,
  touched: BTreeSet<&'static str>,
}

impl WriteTx<'_> {
  /// Execute a write statement, returning the number of rows it changed.
  pub fn execute(&mut self, stmt: &Statement) -> Result<usize> {
    ensure_write(stmt)?;
    let changed = if stmt.returns_rows() {
      exec::query(self.conn, stmt)?.len()
    } else {
      exec::execute(self.conn, stmt)?
    };
    self.touch(stmt.writes());
    Ok(changed)
  }

  /// Execute a `RETURNING` write statement and decode the written rows.
  pub fn execute_returning<T: FromRow>(&mut self, stmt: &Statement) -> Result<Vec<T>> {
    ensure_write(stmt)?;
    if !stmt.returns_rows() {
      return Err(Error::InvalidOperation(format!(
        "statement does not return rows: {}",
        stmt.sql()
      )));
    }
    let rows = exec::query(self.conn, stmt)?;
    self.touch(stmt.writes());
    exec::decode_rows(&rows)
  }

  /// Insert a draft and return the stored record, including the values the
  /// store assigned.
  pub fn insert<D: Draft>(&mut self, draft: &D) -> Result<D::Record> {
    let stmt = Insert::draft(draft).returning().build()?;
    self
      .execute_returning::<D::Record>(&stmt)?
      .into_iter()
      .next()
      .ok_or_else(|| Error::InvalidOperation(format!("insert returned no row: {}", stmt.sql())))
  }

  /// Read inside the transaction; sees this transaction's own writes.
  pub fn query<T: FromRow>(&mut self, stmt: &Statement) -> Result<Vec<T>> {
    if !stmt.is_read() {
      return Err(Error::InvalidOperation(format!("not a read: {}", stmt.sql())));
    }
    exec::decode_rows(&exec::query(self.conn, stmt)?)
  }

  pub fn query_one<T: FromRow>(&mut self, stmt: &Statement) -> Result<Option<T>> {
    Ok(self.query(stmt)?.into_iter().next())
  }

  /// Execute raw SQL. `touches` names the tables it modifies.
  pub fn execute_raw(&mut self, sql: &str, touches: &[&'static str]) -> Result<()> {
    self.conn.execute_batch(sql)?;
    self.touch(touches);
    Ok(())
  }

  /// Run `body` inside this transaction.
  pub fn write<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    body(self)
  }

  /// Tables written so far, including those reached through cascading
  /// foreign keys.
  pub fn touched(&self) -> &BTreeSet<&'static str> { &self.touched }

  fn touch<'a>(&mut self, tables: impl IntoIterator<Item = &'a &'static str>) {
    let affected = self.schema.affected_by(tables);
    self.touched.extend(affected);
  }
}

fn ensure_write(stmt: &Statement) -> Result<()> {
  if stmt.is_read() {
    return Err(Error::InvalidOperation(format!("not a write: {}", stmt.sql())));
  }
  Ok(())
}

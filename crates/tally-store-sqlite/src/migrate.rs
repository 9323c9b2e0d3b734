//! The schema migrator.
//!
//! A [`Migrator`] is an ordered plan of named steps. Applied steps are
//! recorded in the `tally_migrations` ledger; a run applies every step past
//! the end of the ledger, each in its own transaction together with its
//! ledger row, so a failing step leaves no trace.

use std::{collections::BTreeSet, fmt, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, TransactionBehavior, params};
use tally_core::{Statement, TableDef, table::quote_ident};
use tracing::{debug, info};

use crate::{
  Error, Result, Store,
  error::ConstraintKind,
  exec,
  live::{Hub, TableSet},
};

const LEDGER_DDL: &str = "
CREATE TABLE IF NOT EXISTS tally_migrations (
    position   INTEGER NOT NULL UNIQUE,
    name       TEXT    PRIMARY KEY NOT NULL,
    applied_at TEXT    NOT NULL
);";

type StepFn = dyn Fn(&MigrationContext<'_>) -> Result<()> + Send + Sync;

#[derive(Clone)]
struct Step {
  name: String,
  body: Arc<StepFn>,
}

/// An ordered migration plan.
#[derive(Clone, Default)]
pub struct Migrator {
  steps: Vec<Step>,
}

impl fmt::Debug for Migrator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.steps.iter().map(|s| &s.name)).finish()
  }
}

/// A row of the migration ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
  pub position:   i64,
  pub name:       String,
  pub applied_at: DateTime<Utc>,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
  /// Steps applied by this run, in order.
  pub applied: Vec<String>,
  /// Steps that were already in the ledger.
  pub skipped: usize,
}

impl MigrationReport {
  pub fn is_noop(&self) -> bool { self.applied.is_empty() }
}

impl Migrator {
  pub fn new() -> Self { Self::default() }

  /// Append a step. Names must be unique within the plan.
  pub fn register<F>(mut self, name: impl Into<String>, body: F) -> Result<Self>
  where
    F: Fn(&MigrationContext<'_>) -> Result<()> + Send + Sync + 'static,
  {
    let name = name.into();
    if self.steps.iter().any(|s| s.name == name) {
      return Err(Error::DuplicateMigration(name));
    }
    self.steps.push(Step { name, body: Arc::new(body) });
    Ok(self)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.steps.iter().map(|s| s.name.as_str()) }

  pub fn len(&self) -> usize { self.steps.len() }

  pub fn is_empty(&self) -> bool { self.steps.is_empty() }

  /// Apply every step not yet in the ledger.
  pub async fn migrate(&self, store: &Store) -> Result<MigrationReport> {
    let steps = self.steps.clone();
    let hub = Arc::clone(store.hub());
    store
      .writer()
      .call(move |conn| Ok(apply(conn, &steps, &hub)))
      .await?
  }

  /// The ledger, in application order.
  pub async fn applied(store: &Store) -> Result<Vec<AppliedMigration>> {
    store.writer().call(|conn| Ok(read_ledger(conn))).await?
  }
}

fn apply(conn: &mut Connection, steps: &[Step], hub: &Hub) -> Result<MigrationReport> {
  conn.execute_batch(LEDGER_DDL)?;
  let ledger = read_ledger(conn)?;
  verify_ledger(&ledger, steps)?;

  let mut report = MigrationReport { applied: Vec::new(), skipped: ledger.len() };
  for (position, step) in steps.iter().enumerate().skip(ledger.len()) {
    apply_step(conn, position, step).map_err(|source| Error::MigrationFailed {
      name:   step.name.clone(),
      source: Box::new(source),
    })?;
    info!(migration = %step.name, position, "applied migration");
    report.applied.push(step.name.clone());
  }

  if report.is_noop() {
    debug!(steps = steps.len(), "schema up to date");
  } else {
    hub.publish(TableSet::All);
  }
  Ok(report)
}

fn apply_step(conn: &mut Connection, position: usize, step: &Step) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  (step.body)(&MigrationContext { conn: &tx })?;
  check_foreign_keys(&tx)?;
  tx.execute(
    "INSERT INTO tally_migrations (position, name, applied_at) VALUES (?1, ?2, ?3)",
    params![
      position as i64,
      step.name,
      Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    ],
  )?;
  tx.commit()?;
  Ok(())
}

fn read_ledger(conn: &Connection) -> Result<Vec<AppliedMigration>> {
  let exists: bool = conn.query_row(
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tally_migrations')",
    [],
    |row| row.get(0),
  )?;
  if !exists {
    return Ok(Vec::new());
  }

  let mut stmt =
    conn.prepare("SELECT position, name, applied_at FROM tally_migrations ORDER BY position")?;
  let raw = stmt
    .query_map([], |row| {
      Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raw
    .into_iter()
    .map(|(position, name, applied_at)| {
      let applied_at = DateTime::parse_from_rfc3339(&applied_at)
        .map_err(|e| {
          Error::SchemaIntegrity(format!("migration {name:?} has a bad timestamp: {e}"))
        })?
        .with_timezone(&Utc);
      Ok(AppliedMigration { position, name, applied_at })
    })
    .collect()
}

/// The ledger must be an exact prefix of the plan.
fn verify_ledger(ledger: &[AppliedMigration], steps: &[Step]) -> Result<()> {
  for (index, entry) in ledger.iter().enumerate() {
    if entry.position != index as i64 {
      return Err(Error::SchemaIntegrity(format!(
        "ledger entry {:?} is at position {} but expected {index}",
        entry.name, entry.position
      )));
    }
    match steps.get(index) {
      None => {
        return Err(Error::SchemaIntegrity(format!(
          "applied migration {:?} is not part of the plan",
          entry.name
        )));
      }
      Some(step) if step.name != entry.name => {
        return Err(Error::SchemaIntegrity(format!(
          "position {index} was applied as {:?} but the plan has {:?}",
          entry.name, step.name
        )));
      }
      Some(_) => {}
    }
  }
  Ok(())
}

fn check_foreign_keys(conn: &Connection) -> Result<()> {
  let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
  let mut rows = stmt.query([])?;
  let mut tables = BTreeSet::new();
  while let Some(row) = rows.next()? {
    tables.insert(row.get::<_, String>(0)?);
  }
  if tables.is_empty() {
    return Ok(());
  }
  Err(Error::Constraint {
    kind:    ConstraintKind::ForeignKey,
    message: format!(
      "foreign key violations in {}",
      tables.into_iter().collect::<Vec<_>>().join(", ")
    ),
  })
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// What a migration step can do. Everything runs inside the step's
/// transaction.
pub struct MigrationContext<'c> {
  conn: &'c Connection,
}

impl MigrationContext<'_> {
  /// Create the table described by `table`, if it does not exist.
  pub fn create_table(&self, table: &TableDef) -> Result<()> {
    self.conn.execute_batch(&table.create_sql())?;
    Ok(())
  }

  /// Create an index over `columns` of `table`, if it does not exist.
  pub fn create_index(&self, name: &str, table: &TableDef, columns: &[&str]) -> Result<()> {
    for column in columns {
      if table.column(column).is_none() {
        return Err(Error::InvalidOperation(format!(
          "index {name:?} names unknown column {}.{column}",
          table.name()
        )));
      }
    }
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    self.conn.execute_batch(&format!(
      "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
      quote_ident(name),
      quote_ident(table.name()),
      cols.join(", ")
    ))?;
    Ok(())
  }

  pub fn execute_batch(&self, sql: &str) -> Result<()> {
    self.conn.execute_batch(sql)?;
    Ok(())
  }

  pub fn execute(&self, stmt: &Statement) -> Result<usize> {
    if stmt.returns_rows() {
      Ok(exec::query(self.conn, stmt)?.len())
    } else {
      exec::execute(self.conn, stmt)
    }
  }

  pub fn connection(&self) -> &Connection { self.conn }
}

//! [`Store`]: the SQLite-backed handle applications hold.

use std::{path::Path, sync::Arc, time::Duration};

use tally_core::{FromRow, Schema, Statement};
use tokio::sync::broadcast;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::{
  Error, Result,
  config::StoreConfig,
  exec,
  live::{self, Hub, StoreEvent, Subscription},
  migrate::{MigrationReport, Migrator},
  tx::{self, WriteTx},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A store over one SQLite database.
///
/// Cloning is cheap; clones share the connections, the schema and the commit
/// notification channel. All writes go through one writer connection. File
/// databases get a second, read-only connection in WAL mode, so reads never
/// wait for a write and see either the state before or after a commit.
#[derive(Clone)]
pub struct Store {
  writer:        Connection,
  reader:        Connection,
  shared_reader: bool,
  schema:        Arc<Schema>,
  hub:           Arc<Hub>,
}

impl Store {
  /// Open (or create) a store at `path`.
  pub async fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
    Self::open_with(&StoreConfig::file(path.as_ref()), schema).await
  }

  /// Open a private in-memory store, useful for testing.
  pub async fn open_in_memory(schema: Schema) -> Result<Self> {
    Self::open_with(&StoreConfig::in_memory(), schema).await
  }

  pub async fn open_with(config: &StoreConfig, schema: Schema) -> Result<Self> {
    let timeout = config.busy_timeout();
    let (writer, reader, shared_reader) = match &config.path {
      Some(path) => {
        let writer = Connection::open(path).await?;
        configure(&writer, timeout, Role::Writer).await?;
        let reader = Connection::open(path).await?;
        configure(&reader, timeout, Role::Reader).await?;
        (writer, reader, false)
      }
      None => {
        let writer = Connection::open_in_memory().await?;
        configure(&writer, timeout, Role::Memory).await?;
        (writer.clone(), writer, true)
      }
    };
    info!(path = ?config.path, tables = schema.tables().count(), "store opened");

    Ok(Self {
      writer,
      reader,
      shared_reader,
      schema: Arc::new(schema),
      hub: Arc::new(Hub::new(config.notify_capacity)),
    })
  }

  pub fn schema(&self) -> &Schema { &self.schema }

  pub(crate) fn hub(&self) -> &Arc<Hub> { &self.hub }

  pub(crate) fn writer(&self) -> &Connection { &self.writer }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Run a read statement and decode every row.
  pub async fn read<T>(&self, stmt: &Statement) -> Result<Vec<T>>
  where
    T: FromRow + Send + 'static,
  {
    if !stmt.is_read() {
      return Err(Error::InvalidOperation(format!(
        "writes must go through Store::write: {}",
        stmt.sql()
      )));
    }
    let stmt = stmt.clone();
    let rows = self
      .reader
      .call(move |conn| Ok(exec::query(conn, &stmt)))
      .await??;
    exec::decode_rows(&rows)
  }

  /// Run a read statement and decode its first row, if any.
  pub async fn read_one<T>(&self, stmt: &Statement) -> Result<Option<T>>
  where
    T: FromRow + Send + 'static,
  {
    Ok(self.read(stmt).await?.into_iter().next())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Run `body` in a single write transaction.
  ///
  /// The transaction commits when `body` returns `Ok` and rolls back when it
  /// returns `Err`. After a commit, live queries reading any touched table
  /// are re-run.
  pub async fn write<T, F>(&self, body: F) -> Result<T>
  where
    F: FnOnce(&mut WriteTx<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let schema = Arc::clone(&self.schema);
    let hub = Arc::clone(&self.hub);
    self
      .writer
      .call(move |conn| Ok(tx::run(conn, &schema, &hub, body)))
      .await?
  }

  // ── Live queries ──────────────────────────────────────────────────────────

  /// Start a live query. The returned subscription receives the initial
  /// result and every subsequent change.
  ///
  /// The query runs as a task on the current Tokio runtime; called outside
  /// one, this fails with [`Error::InvalidOperation`].
  pub fn subscribe<T>(&self, stmt: Statement) -> Result<Subscription<T>>
  where
    T: FromRow + PartialEq + Send + Sync + 'static,
  {
    if !stmt.is_read() {
      return Err(Error::InvalidOperation(format!(
        "only reads can be observed: {}",
        stmt.sql()
      )));
    }
    if tokio::runtime::Handle::try_current().is_err() {
      return Err(Error::InvalidOperation(
        "live queries need a running Tokio runtime".into(),
      ));
    }
    Ok(live::spawn(self.clone(), stmt))
  }

  /// Raw commit notifications.
  pub fn events(&self) -> broadcast::Receiver<StoreEvent> { self.hub.subscribe() }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  pub async fn migrate(&self, migrator: &Migrator) -> Result<MigrationReport> {
    migrator.migrate(self).await
  }

  /// Close the connections. Live queries end in a failed state and every
  /// other clone of this store reports [`Error::ConnectionClosed`].
  pub async fn close(self) -> Result<()> {
    self.hub.close();
    if !self.shared_reader {
      self.reader.close().await?;
    }
    self.writer.close().await?;
    info!("store closed");
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
  Writer,
  Reader,
  Memory,
}

async fn configure(conn: &Connection, busy_timeout: Duration, role: Role) -> Result<()> {
  conn
    .call(move |conn| {
      conn.busy_timeout(busy_timeout)?;
      conn.pragma_update(None, "foreign_keys", true)?;
      match role {
        Role::Writer => {
          let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
          debug!(mode = %mode, "journal mode");
          conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        Role::Reader => conn.pragma_update(None, "query_only", true)?,
        Role::Memory => {}
      }
      Ok(())
    })
    .await?;
  Ok(())
}

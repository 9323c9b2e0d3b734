//! Error type for `tally-store-sqlite`.
//!
//! SQLite failures are classified when they cross into this crate: constraint
//! violations become [`Error::Constraint`], a closed connection becomes
//! [`Error::ConnectionClosed`], and everything else is [`Error::Database`].

use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
  Unique,
  PrimaryKey,
  ForeignKey,
  NotNull,
  Check,
  Other,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("{kind:?} constraint violated: {message}")]
  Constraint { kind: ConstraintKind, message: String },

  #[error("database error: {0}")]
  Database(rusqlite::Error),

  /// The connection thread has shut down; the store is unusable.
  #[error("connection closed")]
  ConnectionClosed,

  /// A read was handed a write statement, or similar misuse of the store.
  #[error("invalid operation: {0}")]
  InvalidOperation(String),

  /// The applied-migration ledger does not match the registered plan.
  #[error("schema integrity violated: {0}")]
  SchemaIntegrity(String),

  #[error("migration {0:?} registered twice")]
  DuplicateMigration(String),

  #[error("migration {name:?} failed: {source}")]
  MigrationFailed {
    name:   String,
    #[source]
    source: Box<Error>,
  },
}

impl Error {
  pub fn is_constraint(&self) -> bool { self.constraint_kind().is_some() }

  pub fn constraint_kind(&self) -> Option<ConstraintKind> {
    match self {
      Error::Constraint { kind, .. } => Some(*kind),
      Error::MigrationFailed { source, .. } => source.constraint_kind(),
      _ => None,
    }
  }

  /// Whether the store can no longer serve requests after this error.
  pub fn is_fatal(&self) -> bool {
    match self {
      Error::ConnectionClosed | Error::SchemaIntegrity(_) => true,
      Error::MigrationFailed { source, .. } => source.is_fatal(),
      _ => false,
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    match &err {
      rusqlite::Error::SqliteFailure(e, message)
        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        let kind = match e.extended_code {
          ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
          ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
          ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
          ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
          ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
          _ => ConstraintKind::Other,
        };
        Error::Constraint {
          kind,
          message: message.clone().unwrap_or_else(|| e.to_string()),
        }
      }
      _ => Error::Database(err),
    }
  }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::ConnectionClosed => Error::ConnectionClosed,
      tokio_rusqlite::Error::Close((_, e)) => e.into(),
      tokio_rusqlite::Error::Rusqlite(e) => e.into(),
      other => Error::InvalidOperation(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! SQLite backend for the Tally data layer.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated
//! connection threads without blocking the async runtime. A [`Store`] offers
//! typed reads, transactional writes through [`WriteTx`], live queries that
//! re-run when a commit touches the tables they read, and a ledger-backed
//! schema [`Migrator`].

mod encode;
mod exec;
mod live;
mod store;
mod tx;

pub mod config;
pub mod error;
pub mod migrate;

pub use config::StoreConfig;
pub use error::{ConstraintKind, Error, Result};
pub use live::{Commit, LiveState, StoreEvent, Subscription, TableSet};
pub use migrate::{AppliedMigration, MigrationContext, MigrationReport, Migrator};
pub use store::Store;
pub use tx::WriteTx;

#[cfg(test)]
mod tests;

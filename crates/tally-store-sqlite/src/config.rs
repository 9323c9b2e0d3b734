//! Store configuration.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// How a [`Store`](crate::Store) is opened.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Database file; `None` opens a private in-memory database.
  pub path:            Option<PathBuf>,
  /// How long a connection waits on a locked database before failing.
  pub busy_timeout_ms: u64,
  /// Commit notifications buffered per live query before it lags and
  /// re-runs unconditionally.
  pub notify_capacity: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { path: None, busy_timeout_ms: 5_000, notify_capacity: 256 }
  }
}

impl StoreConfig {
  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self { path: Some(path.into()), ..Self::default() }
  }

  pub fn in_memory() -> Self { Self::default() }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}

//! Commit notifications and live queries.
//!
//! Every successful write publishes a [`Commit`] naming the tables it touched.
//! A live query is a spawned task that holds a read statement, re-runs it
//! whenever a commit touches one of the tables the statement reads, and
//! publishes the result through a `watch` channel when it differs from the
//! last delivery.

use std::{
  collections::BTreeSet,
  fmt,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
};

use futures::Stream;
use tally_core::{FromRow, Statement};
use tokio::sync::{
  Notify,
  broadcast::{self, error::RecvError, error::TryRecvError},
  watch,
};
use tracing::{debug, warn};

use crate::{Error, Store};

// ─── Notifications ───────────────────────────────────────────────────────────

/// The tables a commit may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSet {
  /// Schema changes and other writes whose footprint is unknown.
  All,
  Only(BTreeSet<&'static str>),
}

impl TableSet {
  pub fn intersects(&self, tables: &BTreeSet<&'static str>) -> bool {
    match self {
      TableSet::All => true,
      TableSet::Only(set) => !set.is_disjoint(tables),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
  /// Position in commit order, starting at 1.
  pub seq:    u64,
  pub tables: TableSet,
}

#[derive(Debug, Clone)]
pub enum StoreEvent {
  Commit(Arc<Commit>),
  /// The store was closed; no further commits will follow.
  Closed,
}

/// Publishes commit notifications in commit order.
pub(crate) struct Hub {
  tx:  broadcast::Sender<StoreEvent>,
  seq: AtomicU64,
}

impl Hub {
  pub(crate) fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx, seq: AtomicU64::new(0) }
  }

  /// Called on the writer thread right after a commit.
  pub(crate) fn publish(&self, tables: TableSet) -> u64 {
    let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(seq, ?tables, "commit");
    // No receivers just means no live queries.
    let _ = self.tx.send(StoreEvent::Commit(Arc::new(Commit { seq, tables })));
    seq
  }

  pub(crate) fn close(&self) { let _ = self.tx.send(StoreEvent::Closed); }

  pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> { self.tx.subscribe() }

  /// Sequence number of the latest published commit.
  pub(crate) fn seq(&self) -> u64 { self.seq.load(Ordering::SeqCst) }

  /// Live queries and event listeners currently attached.
  #[cfg(test)]
  pub(crate) fn receiver_count(&self) -> usize { self.tx.receiver_count() }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// What a live query currently holds.
pub enum LiveState<T> {
  Idle,
  Loading,
  Loaded {
    rows:    Arc<Vec<T>>,
    /// Commit sequence observed before the rows were read.
    version: u64,
  },
  /// Terminal: the store is closed or the connection failed.
  Failed(Arc<Error>),
}

impl<T> Clone for LiveState<T> {
  fn clone(&self) -> Self {
    match self {
      LiveState::Idle => LiveState::Idle,
      LiveState::Loading => LiveState::Loading,
      LiveState::Loaded { rows, version } => {
        LiveState::Loaded { rows: Arc::clone(rows), version: *version }
      }
      LiveState::Failed(e) => LiveState::Failed(Arc::clone(e)),
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for LiveState<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LiveState::Idle => f.write_str("Idle"),
      LiveState::Loading => f.write_str("Loading"),
      LiveState::Loaded { rows, version } => f
        .debug_struct("Loaded")
        .field("rows", rows)
        .field("version", version)
        .finish(),
      LiveState::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
    }
  }
}

impl<T> LiveState<T> {
  pub fn rows(&self) -> Option<&Arc<Vec<T>>> {
    match self {
      LiveState::Loaded { rows, .. } => Some(rows),
      _ => None,
    }
  }

  pub fn version(&self) -> Option<u64> {
    match self {
      LiveState::Loaded { version, .. } => Some(*version),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool { matches!(self, LiveState::Failed(_)) }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Cancellation {
  cancelled: AtomicBool,
  notify:    Notify,
}

impl Cancellation {
  fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
    // Leaves a permit if the task is not currently waiting.
    self.notify.notify_one();
  }

  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}

/// Shared by every observer of one live query; the last drop cancels it.
struct ObserverGuard(Arc<Cancellation>);

impl Drop for ObserverGuard {
  fn drop(&mut self) { self.0.cancel(); }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// An observer of a live query. Clones observe the same query; the query is
/// cancelled once every observer is dropped.
pub struct Subscription<T> {
  rx:     watch::Receiver<LiveState<T>>,
  _guard: Arc<ObserverGuard>,
}

impl<T> fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("Subscription").finish_non_exhaustive() }
}

impl<T> Clone for Subscription<T> {
  fn clone(&self) -> Self { Self { rx: self.rx.clone(), _guard: Arc::clone(&self._guard) } }
}

impl<T> Subscription<T> {
  pub fn state(&self) -> LiveState<T> { self.rx.borrow().clone() }

  /// The last delivered rows, if any.
  pub fn rows(&self) -> Option<Arc<Vec<T>>> { self.rx.borrow().rows().cloned() }

  /// Wait for the next state change. Returns `None` once the query has
  /// ended and its final state was already observed.
  pub async fn next(&mut self) -> Option<LiveState<T>> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// Wait until the delivered rows satisfy `pred`. Returns `None` if the
  /// query fails or ends first.
  pub async fn wait_for(&mut self, mut pred: impl FnMut(&[T]) -> bool) -> Option<Arc<Vec<T>>> {
    let state = self
      .rx
      .wait_for(|s| match s {
        LiveState::Loaded { rows, .. } => pred(rows.as_slice()),
        LiveState::Failed(_) => true,
        _ => false,
      })
      .await
      .ok()?;
    state.rows().cloned()
  }
}

impl<T: Send + Sync + 'static> Subscription<T> {
  /// Every subsequent state change as a stream.
  pub fn into_stream(self) -> impl Stream<Item = LiveState<T>> + Send {
    futures::stream::unfold(self, |mut sub| async move {
      let state = sub.next().await?;
      Some((state, sub))
    })
  }
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// Start a live query for `stmt`. Must be called within a Tokio runtime.
pub(crate) fn spawn<T>(store: Store, stmt: Statement) -> Subscription<T>
where
  T: FromRow + PartialEq + Send + Sync + 'static,
{
  let (tx, rx) = watch::channel(LiveState::Idle);
  let cancel = Arc::new(Cancellation::default());
  // Listen before the initial load so no commit in between is missed.
  let events = store.hub().subscribe();
  tokio::spawn(run(store, stmt, events, tx, Arc::clone(&cancel)));
  Subscription { rx, _guard: Arc::new(ObserverGuard(cancel)) }
}

enum Wake {
  Cancelled,
  Event(Result<StoreEvent, RecvError>),
}

async fn run<T>(
  store: Store,
  stmt: Statement,
  mut events: broadcast::Receiver<StoreEvent>,
  tx: watch::Sender<LiveState<T>>,
  cancel: Arc<Cancellation>,
) where
  T: FromRow + PartialEq + Send + Sync + 'static,
{
  tx.send_replace(LiveState::Loading);
  let mut last: Option<Arc<Vec<T>>> = None;
  let mut dirty = true;
  // After a failed run, any commit triggers a retry.
  let mut retry = false;

  loop {
    if cancel.is_cancelled() {
      break;
    }

    if dirty {
      dirty = false;
      let version = store.hub().seq();
      let result = store.read::<T>(&stmt).await;
      if cancel.is_cancelled() {
        break;
      }
      match result {
        Ok(rows) => {
          retry = false;
          if last.as_deref() != Some(&rows) {
            let rows = Arc::new(rows);
            last = Some(Arc::clone(&rows));
            tx.send_replace(LiveState::Loaded { rows, version });
          }
        }
        Err(e) if e.is_fatal() => {
          tx.send_replace(LiveState::Failed(Arc::new(e)));
          break;
        }
        Err(e) => {
          warn!(error = %e, sql = stmt.sql(), "live query failed; keeping last result");
          retry = true;
        }
      }
    }

    let wake = tokio::select! {
      biased;
      _ = cancel.notify.notified() => Wake::Cancelled,
      event = events.recv() => Wake::Event(event),
    };
    let mut event = match wake {
      Wake::Cancelled => break,
      Wake::Event(event) => Some(event),
    };

    // Coalesce everything already queued into a single re-run.
    let mut closed = false;
    while let Some(next) = event.take() {
      match next {
        Ok(StoreEvent::Commit(commit)) => {
          dirty |= retry || commit.tables.intersects(stmt.reads());
        }
        Ok(StoreEvent::Closed) | Err(RecvError::Closed) => {
          closed = true;
          break;
        }
        Err(RecvError::Lagged(skipped)) => {
          debug!(skipped, "live query lagged behind commits");
          dirty = true;
        }
      }
      event = match events.try_recv() {
        Ok(ev) => Some(Ok(ev)),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Lagged(n)) => Some(Err(RecvError::Lagged(n))),
        Err(TryRecvError::Closed) => Some(Err(RecvError::Closed)),
      };
    }

    if closed {
      if !cancel.is_cancelled() {
        tx.send_replace(LiveState::Failed(Arc::new(Error::ConnectionClosed)));
      }
      break;
    }
  }
  debug!(sql = stmt.sql(), "live query ended");
}

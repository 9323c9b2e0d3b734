//! Integration tests for `Store` against in-memory and file databases.

use std::{collections::BTreeMap, sync::OnceLock, time::Duration};

use tally_core::{
  Assignment, Col, Delete, Draft, Expr, FromRow, Json, OnDelete, Record, Row, Scalar, Schema,
  Select, Statement, TableDef, Update,
};

use crate::{
  ConstraintKind, Error, LiveState, Migrator, Store, StoreConfig, StoreEvent, TableSet,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Folder {
  id:    i64,
  title: String,
}

impl Folder {
  const ID: Col<Self, i64> = Col::new("id");
  const TITLE: Col<Self, String> = Col::new("title");
}

impl FromRow for Folder {
  fn from_row(row: &Row) -> tally_core::Result<Self> {
    Ok(Self { id: row.get(Self::ID)?, title: row.get(Self::TITLE)? })
  }
}

impl Record for Folder {
  const TABLE: &'static str = "folders";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::TITLE, |c| c.unique())
        .build()
        .expect("folders table")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::ID.bind(&self.id), Self::TITLE.bind(&self.title)]
  }
}

struct NewFolder(&'static str);

impl Draft for NewFolder {
  type Record = Folder;

  fn values(&self) -> Vec<Assignment> { vec![Folder::TITLE.bind(&self.0.to_owned())] }
}

#[derive(Debug, Clone, PartialEq)]
struct Note {
  id:        i64,
  folder_id: i64,
  body:      String,
  pinned:    bool,
}

impl Note {
  const ID: Col<Self, i64> = Col::new("id");
  const FOLDER_ID: Col<Self, i64> = Col::new("folder_id");
  const BODY: Col<Self, String> = Col::new("body");
  const PINNED: Col<Self, bool> = Col::new("pinned");
}

impl FromRow for Note {
  fn from_row(row: &Row) -> tally_core::Result<Self> {
    Ok(Self {
      id:        row.get(Self::ID)?,
      folder_id: row.get(Self::FOLDER_ID)?,
      body:      row.get(Self::BODY)?,
      pinned:    row.get(Self::PINNED)?,
    })
  }
}

impl Record for Note {
  const TABLE: &'static str = "notes";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::FOLDER_ID, |c| c.references(Folder::ID, OnDelete::Cascade))
        .column(Self::BODY)
        .column_with(Self::PINNED, |c| c.default(false))
        .build()
        .expect("notes table")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::FOLDER_ID.bind(&self.folder_id),
      Self::BODY.bind(&self.body),
      Self::PINNED.bind(&self.pinned),
    ]
  }
}

struct NewNote {
  folder_id: i64,
  body:      &'static str,
}

impl Draft for NewNote {
  type Record = Note;

  fn values(&self) -> Vec<Assignment> {
    vec![Note::FOLDER_ID.bind(&self.folder_id), Note::BODY.bind(&self.body.to_owned())]
  }
}

fn schema() -> Schema {
  Schema::builder()
    .register::<Folder>()
    .register::<Note>()
    .build()
    .expect("schema")
}

fn migrator() -> Migrator {
  Migrator::new()
    .register("create folders", |m| m.create_table(Folder::table()))
    .and_then(|m| {
      m.register("create notes", |m| {
        m.create_table(Note::table())?;
        m.create_index("notes_by_folder", Note::table(), &["folder_id"])
      })
    })
    .expect("migrator")
}

async fn store() -> Store {
  let store = Store::open_in_memory(schema()).await.expect("in-memory store");
  store.migrate(&migrator()).await.expect("migrate");
  store
}

fn all_notes() -> Statement {
  Select::from::<Note>().order_by(Note::ID.asc()).build().unwrap()
}

async fn folder(store: &Store, title: &'static str) -> Folder {
  store.write(move |tx| tx.insert(&NewFolder(title))).await.unwrap()
}

// ─── Migrations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn migration_is_idempotent() {
  let store = Store::open_in_memory(schema()).await.unwrap();

  let first = store.migrate(&migrator()).await.unwrap();
  assert_eq!(first.applied, ["create folders", "create notes"]);
  assert_eq!(first.skipped, 0);

  let second = store.migrate(&migrator()).await.unwrap();
  assert!(second.is_noop());
  assert_eq!(second.skipped, 2);

  let ledger = Migrator::applied(&store).await.unwrap();
  let names: Vec<_> = ledger.iter().map(|m| (m.position, m.name.as_str())).collect();
  assert_eq!(names, [(0, "create folders"), (1, "create notes")]);
}

#[tokio::test]
async fn duplicate_migration_name_is_rejected() {
  let err = Migrator::new()
    .register("a", |_| Ok(()))
    .and_then(|m| m.register("a", |_| Ok(())))
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateMigration(name) if name == "a"));
}

#[tokio::test]
async fn ledger_must_be_a_prefix_of_the_plan() {
  let store = store().await;

  let renamed = Migrator::new()
    .register("create folders", |_| Ok(()))
    .and_then(|m| m.register("create everything else", |_| Ok(())))
    .unwrap();
  let err = store.migrate(&renamed).await.unwrap_err();
  assert!(matches!(err, Error::SchemaIntegrity(_)));
  assert!(err.is_fatal());

  let shorter = Migrator::new().register("create folders", |_| Ok(())).unwrap();
  let err = store.migrate(&shorter).await.unwrap_err();
  assert!(matches!(err, Error::SchemaIntegrity(_)));
}

#[tokio::test]
async fn failed_migration_rolls_back_its_step() {
  let store = store().await;

  let plan = migrator()
    .register("half done", |m| {
      m.execute_batch("CREATE TABLE scratch (id INTEGER PRIMARY KEY)")?;
      m.execute_batch("INSERT INTO no_such_table VALUES (1)")
    })
    .unwrap();
  let err = store.migrate(&plan).await.unwrap_err();
  assert!(matches!(&err, Error::MigrationFailed { name, .. } if name == "half done"));

  let exists = Statement::raw_read(
    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
    vec![],
    &[],
  );
  let count: Option<Scalar<i64>> = store.read_one(&exists).await.unwrap();
  assert_eq!(count, Some(Scalar(0)));
  assert_eq!(Migrator::applied(&store).await.unwrap().len(), 2);
}

#[tokio::test]
async fn migration_leaving_dangling_references_fails() {
  let store = store().await;
  let plan = migrator()
    .register("orphan", |m| {
      m.execute_batch(
        "PRAGMA defer_foreign_keys = ON;
         INSERT INTO notes (folder_id, body) VALUES (42, 'x');",
      )
    })
    .unwrap();
  let err = store.migrate(&plan).await.unwrap_err();
  assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
  let notes: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert!(notes.is_empty());
}

#[tokio::test]
async fn migration_notifies_every_table() {
  let store = Store::open_in_memory(schema()).await.unwrap();
  let mut events = store.events();
  store.migrate(&migrator()).await.unwrap();
  let StoreEvent::Commit(commit) = events.recv().await.unwrap() else {
    panic!("expected a commit");
  };
  assert_eq!(commit.tables, TableSet::All);
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inserted_records_are_visible_to_reads() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;

  let note = store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body: "milk" }))
    .await
    .unwrap();
  assert!(!note.pinned, "default applies");

  let notes: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert_eq!(notes, [note]);
}

#[tokio::test]
async fn error_in_body_rolls_back() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;

  let err = store
    .write(move |tx| {
      tx.insert(&NewNote { folder_id: inbox, body: "lost" })?;
      Err::<(), _>(Error::InvalidOperation("changed my mind".into()))
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidOperation(_)));

  let notes: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert!(notes.is_empty());
}

#[tokio::test]
async fn constraint_violations_are_classified() {
  let store = store().await;
  folder(&store, "Inbox").await;

  let err = store.write(|tx| tx.insert(&NewFolder("Inbox"))).await.unwrap_err();
  assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
  assert!(!err.is_fatal());

  let err = store
    .write(|tx| tx.insert(&NewNote { folder_id: 999, body: "orphan" }))
    .await
    .unwrap_err();
  assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
}

#[tokio::test]
async fn nested_writes_share_the_transaction() {
  let store = store().await;

  let count = store
    .write(|tx| {
      let work = tx.insert(&NewFolder("Work"))?;
      tx.write(|tx| tx.insert(&NewNote { folder_id: work.id, body: "report" }))?;
      let stmt = Select::from::<Note>().select(Expr::count_all(), "n").build()?;
      let n: Option<Scalar<i64>> = tx.query_one(&stmt)?;
      Ok(n.map(|s| s.0))
    })
    .await
    .unwrap();
  assert_eq!(count, Some(1));
}

#[tokio::test]
async fn reads_reject_write_statements() {
  let store = store().await;
  let stmt = Delete::<Note>::new().build().unwrap();
  let err = store.read::<Row>(&stmt).await.unwrap_err();
  assert!(matches!(err, Error::InvalidOperation(_)));
  assert!(store.subscribe::<Row>(stmt).is_err());
}

#[tokio::test]
async fn decode_failures_name_the_column() {
  let store = store().await;
  let stmt = Statement::raw_read("SELECT 'x' AS id, 'y' AS title", vec![], &["folders"]);
  let err = store.read::<Folder>(&stmt).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(tally_core::Error::Decode { ref column, .. }) if column == "id"
  ));
}

#[tokio::test]
async fn unserialisable_documents_fail_the_write() {
  let store = store().await;
  let err = store
    .write(|tx| {
      tx.insert(&NewFolder("Drafts"))?;
      // JSON object keys must be strings.
      let mut grid = BTreeMap::new();
      grid.insert((0_u8, 1_u8), 7_u8);
      let doc = Json::new(grid).map_err(tally_core::Error::from)?;
      Ok(doc.as_bytes().len())
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(tally_core::Error::Json(_))));

  let folders: Vec<Folder> = store.read(&Select::from::<Folder>().build().unwrap()).await.unwrap();
  assert!(folders.is_empty());
}

#[tokio::test]
async fn cascading_delete_notifies_dependent_tables() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await;
  let inbox_id = inbox.id;
  store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox_id, body: "milk" }))
    .await
    .unwrap();

  let mut events = store.events();
  store
    .write(move |tx| tx.execute(&Delete::record(&inbox).build()?))
    .await
    .unwrap();

  let StoreEvent::Commit(commit) = events.recv().await.unwrap() else {
    panic!("expected a commit");
  };
  assert_eq!(commit.tables, TableSet::Only(["folders", "notes"].into()));
  let notes: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert!(notes.is_empty());
}

#[tokio::test]
async fn reads_see_the_snapshot_before_an_open_write() {
  let dir = tempfile::tempdir().unwrap();
  let store = Store::open_with(&StoreConfig::file(dir.path().join("tally.db")), schema())
    .await
    .unwrap();
  store.migrate(&migrator()).await.unwrap();
  let inbox = folder(&store, "Inbox").await.id;

  let (started_tx, started_rx) = tokio::sync::oneshot::channel();
  let (finish_tx, finish_rx) = std::sync::mpsc::channel::<()>();
  let writer = store.clone();
  let pending = tokio::spawn(async move {
    writer
      .write(move |tx| {
        tx.insert(&NewNote { folder_id: inbox, body: "draft" })?;
        let _ = started_tx.send(());
        let _ = finish_rx.recv();
        Ok(())
      })
      .await
  });

  started_rx.await.unwrap();
  let during: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert!(during.is_empty());

  finish_tx.send(()).unwrap();
  pending.await.unwrap().unwrap();
  let after: Vec<Note> = store.read(&all_notes()).await.unwrap();
  assert_eq!(after.len(), 1);
}

// ─── Live queries ────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_query_delivers_initial_and_updated_rows() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;
  let mut sub = store.subscribe::<Note>(all_notes()).unwrap();

  let initial = sub.wait_for(|rows| rows.is_empty()).await.unwrap();
  assert!(initial.is_empty());
  let first_version = sub.state().version().unwrap();

  store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body: "milk" }))
    .await
    .unwrap();
  let rows = sub.wait_for(|rows| rows.len() == 1).await.unwrap();
  assert_eq!(rows[0].body, "milk");
  assert!(sub.state().version().unwrap() > first_version);
}

#[tokio::test]
async fn unchanged_results_are_not_redelivered() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;
  store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body: "milk" }))
    .await
    .unwrap();

  let mut sub = store.subscribe::<Note>(all_notes()).unwrap();
  sub.wait_for(|rows| rows.len() == 1).await.unwrap();

  // Touches `notes` without changing any row.
  store
    .write(|tx| {
      let stmt = Update::<Note>::new()
        .set(Note::PINNED, true)
        .filter(Note::BODY.eq("nothing matches".into()))
        .build()?;
      tx.execute(&stmt)
    })
    .await
    .unwrap();
  // Reaches `notes` only through the foreign key; the rows stay the same.
  folder(&store, "Work").await;

  let next = tokio::time::timeout(Duration::from_millis(200), sub.next()).await;
  assert!(next.is_err(), "unexpected delivery: {next:?}");
}

#[tokio::test]
async fn clones_keep_the_query_alive() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;
  let sub = store.subscribe::<Note>(all_notes()).unwrap();
  let mut other = sub.clone();
  drop(sub);

  store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body: "milk" }))
    .await
    .unwrap();
  let rows = other.wait_for(|rows| rows.len() == 1).await.unwrap();
  assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn versions_never_go_backwards() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;
  let sub = store.subscribe::<Note>(all_notes()).unwrap();
  let mut stream = Box::pin(sub.clone().into_stream());

  for body in ["a", "b", "c"] {
    store
      .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body }))
      .await
      .unwrap();
  }

  let mut versions = Vec::new();
  while let Some(state) = futures::StreamExt::next(&mut stream).await {
    if let LiveState::Loaded { rows, version } = state {
      versions.push(version);
      if rows.len() == 3 {
        break;
      }
    }
  }
  assert!(versions.windows(2).all(|w| w[0] <= w[1]), "{versions:?}");
  drop(sub);
}

#[tokio::test]
async fn closing_the_store_fails_live_queries() {
  let store = store().await;
  let mut sub = store.subscribe::<Note>(all_notes()).unwrap();
  sub.wait_for(|_| true).await.unwrap();

  let handle = store.clone();
  store.close().await.unwrap();

  assert!(sub.wait_for(|_| false).await.is_none());
  assert!(sub.state().is_terminal());
  let err = handle.read::<Note>(&all_notes()).await.unwrap_err();
  assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn transient_failures_keep_the_last_rows_and_retry() {
  let store = store().await;
  let inbox = folder(&store, "Inbox").await.id;
  store
    .write(move |tx| tx.insert(&NewNote { folder_id: inbox, body: "milk" }))
    .await
    .unwrap();

  let stmt =
    Statement::raw_read("SELECT abs(\"id\") FROM \"notes\" ORDER BY \"id\"", vec![], &["notes"]);
  let mut sub = store.subscribe::<Scalar<i64>>(stmt).unwrap();
  let rows = sub.wait_for(|rows| rows.len() == 1).await.unwrap();
  assert_eq!(*rows, [Scalar(1)]);
  let version = sub.state().version();

  // `abs` overflows on the smallest integer, so re-runs fail while this row exists.
  store
    .write(move |tx| {
      tx.execute_raw(
        &format!(
          "INSERT INTO notes (id, folder_id, body) VALUES (-9223372036854775807 - 1, {inbox}, 'x')"
        ),
        &["notes"],
      )
    })
    .await
    .unwrap();

  let next = tokio::time::timeout(Duration::from_millis(200), sub.next()).await;
  assert!(next.is_err(), "unexpected delivery: {next:?}");
  assert!(!sub.state().is_terminal());
  assert_eq!(sub.state().version(), version);
  assert_eq!(sub.rows().unwrap().as_slice(), [Scalar(1)]);

  store
    .write(move |tx| {
      tx.execute_raw("DELETE FROM notes WHERE body = 'x'", &["notes"])?;
      tx.insert(&NewNote { folder_id: inbox, body: "eggs" })
    })
    .await
    .unwrap();
  let rows = sub.wait_for(|rows| rows.len() == 2).await.unwrap();
  assert_eq!(*rows, [Scalar(1), Scalar(2)]);
}

#[tokio::test]
async fn dropping_every_observer_ends_the_query() {
  let store = store().await;
  assert_eq!(store.hub().receiver_count(), 0);

  let mut sub = store.subscribe::<Note>(all_notes()).unwrap();
  let other = sub.clone();
  sub.wait_for(|_| true).await.unwrap();
  assert_eq!(store.hub().receiver_count(), 1);

  drop(sub);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(store.hub().receiver_count(), 1);

  drop(other);
  tokio::time::timeout(Duration::from_secs(2), async {
    while store.hub().receiver_count() > 0 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("live query task still running");
}

#[test]
fn live_queries_need_a_runtime() {
  let runtime = tokio::runtime::Runtime::new().unwrap();
  let store = runtime.block_on(store());
  let err = store.subscribe::<Note>(all_notes()).unwrap_err();
  assert!(matches!(err, Error::InvalidOperation(_)));
  runtime.block_on(store.close()).unwrap();
}

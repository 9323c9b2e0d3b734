//! End-to-end scenarios over the full model schema.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tally_core::{Delete, Insert, Select, Statement};
use tally_store_sqlite::Store;

use crate::{
  chat::{self, LatestMessage, Message, NewMessage, NewSpace, NewUser},
  fitness::{self, KindTotals, Workout, WorkoutDetails, WorkoutKind},
  migrator,
  reminders::{
    self, DEFAULT_COLOR, ListCount, NewReminder, NewRemindersList, NewTag, Priority, Reminder,
    ReminderTag,
  },
  schema,
};

async fn store() -> Store {
  let store = Store::open_in_memory(schema().expect("schema")).await.expect("store");
  store.migrate(&migrator().expect("migrator")).await.expect("migrate");
  store
}

async fn list(store: &Store, title: &'static str) -> i64 {
  store
    .write(move |tx| tx.insert(&NewRemindersList::titled(title)))
    .await
    .unwrap()
    .id
}

fn at(hour: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap() }

// ─── Migrations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrator_creates_every_table() {
  let store = Store::open_in_memory(schema().unwrap()).await.unwrap();
  let report = store.migrate(&migrator().unwrap()).await.unwrap();
  assert_eq!(
    report.applied,
    [
      "create reminders",
      "create tags",
      "create chat",
      "create workouts",
      "index reminders by list"
    ]
  );

  let again = store.migrate(&migrator().unwrap()).await.unwrap();
  assert!(again.is_noop());

  let index = Statement::raw_read(
    "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'reminders_by_list'",
    Vec::new(),
    &[],
  );
  let found: Vec<tally_core::Scalar<String>> = store.read(&index).await.unwrap();
  assert_eq!(found.len(), 1);
}

// ─── Reminders ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_list_takes_column_defaults() {
  let store = store().await;
  let inserted =
    store.write(|tx| tx.insert(&NewRemindersList::titled("Groceries"))).await.unwrap();
  assert_eq!(inserted.color, DEFAULT_COLOR);
  assert_eq!(inserted.position, 0);

  let lists: Vec<reminders::RemindersList> =
    store.read(&reminders::lists().unwrap()).await.unwrap();
  assert_eq!(lists, [inserted]);
}

#[tokio::test]
async fn completing_a_reminder_updates_list_counts() {
  let store = store().await;
  let personal = list(&store, "Personal").await;
  let _work = list(&store, "Work").await;
  let reminder = store
    .write(move |tx| tx.insert(&NewReminder::new(personal, "Call the dentist")))
    .await
    .unwrap();

  let mut counts = store.subscribe::<ListCount>(reminders::list_counts().unwrap()).unwrap();
  let rows = counts
    .wait_for(|rows| rows.iter().any(|c| c.title == "Personal" && c.incomplete == 1))
    .await
    .unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[1].title, "Work");
  assert_eq!(rows[1].incomplete, 0);

  let id = reminder.id;
  store
    .write(move |tx| tx.execute(&reminders::toggle_completed(id)?))
    .await
    .unwrap();

  let rows = counts
    .wait_for(|rows| rows.iter().all(|c| c.incomplete == 0))
    .await
    .unwrap();
  assert_eq!(rows.len(), 2);

  let stored: Vec<Reminder> =
    store.read(&reminders::reminders_in_list(personal).unwrap()).await.unwrap();
  assert!(stored[0].is_completed);
}

#[tokio::test]
async fn deleting_a_list_empties_its_live_reminders() {
  let store = store().await;
  let errands = list(&store, "Errands").await;
  store
    .write(move |tx| {
      tx.insert(&NewReminder::new(errands, "Post office"))?;
      tx.insert(&NewReminder {
        priority: Some(Priority::High),
        due_date: NaiveDate::from_ymd_opt(2026, 3, 20),
        ..NewReminder::new(errands, "Pharmacy")
      })
    })
    .await
    .unwrap();

  let mut live = store.subscribe::<Reminder>(reminders::incomplete_reminders().unwrap()).unwrap();
  let rows = live.wait_for(|rows| rows.len() == 2).await.unwrap();
  assert_eq!(rows[1].priority, Some(Priority::High));

  store
    .write(move |tx| tx.execute(&reminders::delete_list(errands)?))
    .await
    .unwrap();

  let rows = live.wait_for(|rows| rows.is_empty()).await.unwrap();
  assert!(rows.is_empty());
}

#[tokio::test]
async fn reminders_are_found_by_tag() {
  let store = store().await;
  let home = list(&store, "Home").await;
  store
    .write(move |tx| {
      let fix = tx.insert(&NewReminder::new(home, "Fix the tap"))?;
      let paint = tx.insert(&NewReminder::new(home, "Paint the fence"))?;
      tx.insert(&NewReminder::new(home, "Water plants"))?;
      let diy = tx.insert(&NewTag { name: "diy".into() })?;
      let weekend = tx.insert(&NewTag { name: "weekend".into() })?;
      for (reminder_id, tag_id) in [(fix.id, diy.id), (paint.id, diy.id), (paint.id, weekend.id)]
      {
        tx.execute(&Insert::record(&ReminderTag { reminder_id, tag_id }).build()?)?;
      }
      Ok(())
    })
    .await
    .unwrap();

  let diy: Vec<Reminder> = store.read(&reminders::reminders_tagged("diy").unwrap()).await.unwrap();
  let titles: Vec<_> = diy.iter().map(|r| r.title.as_str()).collect();
  assert_eq!(titles, ["Fix the tap", "Paint the fence"]);

  let none: Vec<Reminder> =
    store.read(&reminders::reminders_tagged("garden").unwrap()).await.unwrap();
  assert!(none.is_empty());
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_message_never_goes_backwards() {
  let store = store().await;
  let (alice, lobby, other) = store
    .write(|tx| {
      let alice = tx.insert(&NewUser { name: "Alice".into(), handle: "alice".into() })?;
      let lobby = tx.insert(&NewSpace { name: "Lobby".into() })?;
      let other = tx.insert(&NewSpace { name: "Other".into() })?;
      Ok((alice.id, lobby.id, other.id))
    })
    .await
    .unwrap();

  let send = move |space_id: i64, seq: i64, body: &'static str| NewMessage {
    space_id,
    author_id: Some(alice),
    seq,
    body: body.into(),
    sent_at: at(9) + Duration::minutes(seq),
  };

  let mut latest =
    store.subscribe::<LatestMessage>(chat::latest_message_per_space().unwrap()).unwrap();
  latest.wait_for(|rows| rows.is_empty()).await.unwrap();

  let m5 = send(lobby, 5, "five");
  store.write(move |tx| tx.insert(&m5)).await.unwrap();
  latest.wait_for(|rows| rows.len() == 1 && rows[0].seq == 5).await.unwrap();

  let m6 = send(lobby, 6, "six");
  store.write(move |tx| tx.insert(&m6)).await.unwrap();
  let rows = latest.wait_for(|rows| rows[0].seq == 6).await.unwrap();
  assert_eq!(rows[0].body, "six");

  let m1 = send(other, 1, "elsewhere");
  store.write(move |tx| tx.insert(&m1)).await.unwrap();
  let rows = latest
    .wait_for(|rows| {
      assert!(rows.iter().all(|m| m.space_id != lobby || m.seq == 6));
      rows.len() == 2
    })
    .await
    .unwrap();
  assert_eq!(rows[1], LatestMessage { space_id: other, seq: 1, body: "elsewhere".into() });
}

#[tokio::test]
async fn latest_message_survives_concurrent_sends() {
  let store = store().await;
  let (alice, lobby) = store
    .write(|tx| {
      let alice = tx.insert(&NewUser { name: "Alice".into(), handle: "alice".into() })?;
      let lobby = tx.insert(&NewSpace { name: "Lobby".into() })?;
      Ok((alice.id, lobby.id))
    })
    .await
    .unwrap();

  let send = move |seq: i64, body: &'static str| NewMessage {
    space_id: lobby,
    author_id: Some(alice),
    seq,
    body: body.into(),
    sent_at: at(9) + Duration::minutes(seq),
  };

  let mut latest =
    store.subscribe::<LatestMessage>(chat::latest_message_per_space().unwrap()).unwrap();
  latest.wait_for(|rows| rows.is_empty()).await.unwrap();

  let (m5, m6) = (send(5, "five"), send(6, "six"));
  let (a, b) = tokio::join!(
    store.write(move |tx| tx.insert(&m5)),
    store.write(move |tx| tx.insert(&m6)),
  );
  a.unwrap();
  b.unwrap();

  // Every delivery is recorded, not only the one a predicate settles on.
  let mut seen = Vec::new();
  let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
  while seen.last().map(|&(seq, _)| seq) != Some(6) {
    let state = tokio::time::timeout_at(deadline, latest.next())
      .await
      .expect("no delivery with seq 6")
      .expect("live query ended");
    assert!(!state.is_terminal(), "{state:?}");
    if let (Some(rows), Some(version)) = (state.rows(), state.version())
      && let Some(lobby_row) = rows.iter().find(|m| m.space_id == lobby)
    {
      seen.push((lobby_row.seq, version));
    }
  }

  assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0), "seq went backwards: {seen:?}");
  assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1), "version went backwards: {seen:?}");
  let rows = latest.rows().unwrap();
  assert_eq!(rows.as_slice(), [LatestMessage { space_id: lobby, seq: 6, body: "six".into() }]);
}

#[tokio::test]
async fn deleting_an_author_keeps_their_messages() {
  let store = store().await;
  let (user, space) = store
    .write(|tx| {
      let user = tx.insert(&NewUser { name: "Bob".into(), handle: "bob".into() })?;
      let space = tx.insert(&NewSpace { name: "Team".into() })?;
      tx.insert(&NewMessage {
        space_id:  space.id,
        author_id: Some(user.id),
        seq:       1,
        body:      "hello".into(),
        sent_at:   at(10),
      })?;
      Ok((user.id, space.id))
    })
    .await
    .unwrap();

  let remove = Delete::<chat::User>::new().filter(chat::User::ID.eq(user)).build().unwrap();
  store.write(move |tx| tx.execute(&remove)).await.unwrap();

  let messages: Vec<Message> =
    store.read(&chat::messages_in_space(space).unwrap()).await.unwrap();
  assert_eq!(messages.len(), 1);
  assert_eq!(messages[0].author_id, None);
  assert_eq!(messages[0].sent_at, at(10));
}

#[tokio::test]
async fn message_sequence_is_unique_per_space() {
  let store = store().await;
  let space = store
    .write(|tx| Ok(tx.insert(&NewSpace { name: "Dup".into() })?.id))
    .await
    .unwrap();
  let message = move |body: &str| NewMessage {
    space_id: space,
    author_id: None,
    seq: 1,
    body: body.into(),
    sent_at: at(11),
  };

  let first = message("first");
  store.write(move |tx| tx.insert(&first)).await.unwrap();
  let second = message("second");
  let err = store.write(move |tx| tx.insert(&second)).await.unwrap_err();
  assert_eq!(err.constraint_kind(), Some(tally_store_sqlite::ConstraintKind::Unique));
}

// ─── Fitness ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn workouts_round_trip_and_upsert() {
  let store = store().await;
  let details = WorkoutDetails {
    avg_heart_rate: Some(152),
    splits_secs:    vec![355, 360, 362, 361, 362],
    notes:          None,
  };
  let mut run = Workout::new(WorkoutKind::Run, at(7), 1800, details).unwrap();
  run.distance_m = Some(5000.0);
  let swim = Workout::new(WorkoutKind::Swim, at(18), 2400, WorkoutDetails::default()).unwrap();

  let (a, b) = (run.clone(), swim.clone());
  store
    .write(move |tx| {
      tx.execute(&Insert::record(&a).build()?)?;
      tx.execute(&Insert::record(&b).build()?)
    })
    .await
    .unwrap();

  let morning: Vec<Workout> =
    store.read(&fitness::workouts_between(at(6), at(12)).unwrap()).await.unwrap();
  assert_eq!(morning, [run.clone()]);

  let mut longer = run.clone();
  longer.duration_secs = 2000;
  let edit = longer.clone();
  store
    .write(move |tx| tx.execute(&Insert::upsert(&edit).build()?))
    .await
    .unwrap();

  let day: Vec<Workout> =
    store.read(&fitness::workouts_between(at(0), at(23)).unwrap()).await.unwrap();
  assert_eq!(day, [longer, swim]);

  let totals: Vec<KindTotals> = store.read(&fitness::totals_by_kind().unwrap()).await.unwrap();
  assert_eq!(
    totals,
    [
      KindTotals {
        kind:          WorkoutKind::Run,
        sessions:      1,
        duration_secs: 2000,
        distance_m:    Some(5000.0),
      },
      KindTotals {
        kind:          WorkoutKind::Swim,
        sessions:      1,
        duration_secs: 2400,
        distance_m:    None,
      },
    ]
  );
}

#[tokio::test]
async fn storage_rejects_unknown_workout_kind() {
  let store = store().await;
  let err = store
    .write(|tx| {
      tx.execute_raw(
        "INSERT INTO workouts (id, kind, started_at, duration_secs, details) \
         VALUES ('00000000-0000-0000-0000-000000000001', 9, '2026-03-14T07:00:00Z', 60, '{}')",
        &["workouts"],
      )
    })
    .await
    .unwrap_err();
  assert_eq!(err.constraint_kind(), Some(tally_store_sqlite::ConstraintKind::Check));

  let all: Vec<Workout> = store.read(&Select::from::<Workout>().build().unwrap()).await.unwrap();
  assert!(all.is_empty());
}

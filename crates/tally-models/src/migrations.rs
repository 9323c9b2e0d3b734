//! The migration plan for every model in this crate. Steps are append-only:
//! a released step is never edited or reordered.

use tally_core::Record;
use tally_store_sqlite::{Migrator, Result};

use crate::{
  chat::{Message, Space, SpaceParticipant, User},
  fitness::Workout,
  reminders::{Reminder, ReminderTag, RemindersList, Tag},
};

pub fn migrator() -> Result<Migrator> {
  Migrator::new()
    .register("create reminders", |m| {
      m.create_table(RemindersList::table())?;
      m.create_table(Reminder::table())
    })?
    .register("create tags", |m| {
      m.create_table(Tag::table())?;
      m.create_table(ReminderTag::table())
    })?
    .register("create chat", |m| {
      m.create_table(User::table())?;
      m.create_table(Space::table())?;
      m.create_table(SpaceParticipant::table())?;
      m.create_table(Message::table())
    })?
    .register("create workouts", |m| m.create_table(Workout::table()))?
    .register("index reminders by list", |m| {
      m.create_index("reminders_by_list", Reminder::table(), &["list_id", "is_completed"])
    })
}

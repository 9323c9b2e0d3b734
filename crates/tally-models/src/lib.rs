//! Record types, statements and migrations for the apps built on tally.
//!
//! Each module owns a set of tables. [`schema`] registers all of them and
//! [`migrator`] creates them.

pub mod chat;
pub mod fitness;
mod migrations;
pub mod reminders;

pub use self::migrations::migrator;

use tally_core::Schema;

/// The schema covering every record in this crate.
pub fn schema() -> tally_core::Result<Schema> {
  Schema::builder()
    .register::<reminders::RemindersList>()
    .register::<reminders::Reminder>()
    .register::<reminders::Tag>()
    .register::<reminders::ReminderTag>()
    .register::<chat::User>()
    .register::<chat::Space>()
    .register::<chat::SpaceParticipant>()
    .register::<chat::Message>()
    .register::<fitness::Workout>()
    .build()
}

#[cfg(test)]
mod tests;

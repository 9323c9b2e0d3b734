//! Reminders: lists, reminders, and tags attached through `reminder_tags`.

use std::sync::OnceLock;

use chrono::NaiveDate;
use tally_core::{
  Assignment, Col, ColumnType, ColumnValue, DecodeError, Delete, Draft, FromRow, IntEnum,
  OnDelete, Record, Result, Row, Select, Statement, TableDef, Update, Value,
  column::{decode_enum, encode_enum},
};

/// Default list color, `#4A99EF`.
pub const DEFAULT_COLOR: i64 = 0x4A99EF;

// ─── Priority ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
  Low,
  Medium,
  High,
}

impl IntEnum for Priority {
  const CASES: &'static [i64] = &[1, 2, 3];

  fn raw(self) -> i64 {
    match self {
      Priority::Low => 1,
      Priority::Medium => 2,
      Priority::High => 3,
    }
  }

  fn from_raw(raw: i64) -> Option<Self> {
    match raw {
      1 => Some(Priority::Low),
      2 => Some(Priority::Medium),
      3 => Some(Priority::High),
      _ => None,
    }
  }
}

impl ColumnValue for Priority {
  const TYPE: ColumnType = ColumnType::Enum(Self::CASES);

  fn encode(&self) -> Value { encode_enum(*self) }

  fn decode(value: &Value) -> Result<Self, DecodeError> { decode_enum(value) }
}

// ─── RemindersList ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RemindersList {
  pub id:       i64,
  pub title:    String,
  /// 24-bit RGB.
  pub color:    i64,
  pub position: i64,
}

impl RemindersList {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const TITLE: Col<Self, String> = Col::new("title");
  pub const COLOR: Col<Self, i64> = Col::new("color");
  pub const POSITION: Col<Self, i64> = Col::new("position");
}

impl FromRow for RemindersList {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:       row.get(Self::ID)?,
      title:    row.get(Self::TITLE)?,
      color:    row.get(Self::COLOR)?,
      position: row.get(Self::POSITION)?,
    })
  }
}

impl Record for RemindersList {
  const TABLE: &'static str = "reminders_lists";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column(Self::TITLE)
        .column_with(Self::COLOR, |c| c.default(DEFAULT_COLOR))
        .column_with(Self::POSITION, |c| c.default(0))
        .build()
        .expect("reminders_lists table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::TITLE.bind(&self.title),
      Self::COLOR.bind(&self.color),
      Self::POSITION.bind(&self.position),
    ]
  }
}

/// A list to insert. Unset fields take the column defaults.
#[derive(Debug, Clone, Default)]
pub struct NewRemindersList {
  pub title:    String,
  pub color:    Option<i64>,
  pub position: Option<i64>,
}

impl NewRemindersList {
  pub fn titled(title: impl Into<String>) -> Self {
    Self { title: title.into(), ..Self::default() }
  }
}

impl Draft for NewRemindersList {
  type Record = RemindersList;

  fn values(&self) -> Vec<Assignment> {
    let mut values = vec![RemindersList::TITLE.bind(&self.title)];
    if let Some(color) = &self.color {
      values.push(RemindersList::COLOR.bind(color));
    }
    if let Some(position) = &self.position {
      values.push(RemindersList::POSITION.bind(position));
    }
    values
  }
}

// ─── Reminder ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
  pub id:           i64,
  pub list_id:      i64,
  pub title:        String,
  pub notes:        Option<String>,
  pub is_completed: bool,
  pub is_flagged:   bool,
  pub priority:     Option<Priority>,
  pub due_date:     Option<NaiveDate>,
}

impl Reminder {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const LIST_ID: Col<Self, i64> = Col::new("list_id");
  pub const TITLE: Col<Self, String> = Col::new("title");
  pub const NOTES: Col<Self, Option<String>> = Col::new("notes");
  pub const IS_COMPLETED: Col<Self, bool> = Col::new("is_completed");
  pub const IS_FLAGGED: Col<Self, bool> = Col::new("is_flagged");
  pub const PRIORITY: Col<Self, Option<Priority>> = Col::new("priority");
  pub const DUE_DATE: Col<Self, Option<NaiveDate>> = Col::new("due_date");
}

impl FromRow for Reminder {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:           row.get(Self::ID)?,
      list_id:      row.get(Self::LIST_ID)?,
      title:        row.get(Self::TITLE)?,
      notes:        row.get(Self::NOTES)?,
      is_completed: row.get(Self::IS_COMPLETED)?,
      is_flagged:   row.get(Self::IS_FLAGGED)?,
      priority:     row.get(Self::PRIORITY)?,
      due_date:     row.get(Self::DUE_DATE)?,
    })
  }
}

impl Record for Reminder {
  const TABLE: &'static str = "reminders";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::LIST_ID, |c| {
          c.references(RemindersList::ID, OnDelete::Cascade)
        })
        .column(Self::TITLE)
        .column(Self::NOTES)
        .column_with(Self::IS_COMPLETED, |c| c.default(false))
        .column_with(Self::IS_FLAGGED, |c| c.default(false))
        .column(Self::PRIORITY)
        .column(Self::DUE_DATE)
        .build()
        .expect("reminders table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::LIST_ID.bind(&self.list_id),
      Self::TITLE.bind(&self.title),
      Self::NOTES.bind(&self.notes),
      Self::IS_COMPLETED.bind(&self.is_completed),
      Self::IS_FLAGGED.bind(&self.is_flagged),
      Self::PRIORITY.bind(&self.priority),
      Self::DUE_DATE.bind(&self.due_date),
    ]
  }
}

#[derive(Debug, Clone, Default)]
pub struct NewReminder {
  pub list_id:      i64,
  pub title:        String,
  pub notes:        Option<String>,
  pub is_completed: bool,
  pub is_flagged:   bool,
  pub priority:     Option<Priority>,
  pub due_date:     Option<NaiveDate>,
}

impl NewReminder {
  pub fn new(list_id: i64, title: impl Into<String>) -> Self {
    Self { list_id, title: title.into(), ..Self::default() }
  }
}

impl Draft for NewReminder {
  type Record = Reminder;

  fn values(&self) -> Vec<Assignment> {
    vec![
      Reminder::LIST_ID.bind(&self.list_id),
      Reminder::TITLE.bind(&self.title),
      Reminder::NOTES.bind(&self.notes),
      Reminder::IS_COMPLETED.bind(&self.is_completed),
      Reminder::IS_FLAGGED.bind(&self.is_flagged),
      Reminder::PRIORITY.bind(&self.priority),
      Reminder::DUE_DATE.bind(&self.due_date),
    ]
  }
}

// ─── Tags ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
  pub id:   i64,
  pub name: String,
}

impl Tag {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const NAME: Col<Self, String> = Col::new("name");
}

impl FromRow for Tag {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self { id: row.get(Self::ID)?, name: row.get(Self::NAME)? })
  }
}

impl Record for Tag {
  const TABLE: &'static str = "tags";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::NAME, |c| c.unique())
        .build()
        .expect("tags table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::ID.bind(&self.id), Self::NAME.bind(&self.name)]
  }
}

#[derive(Debug, Clone)]
pub struct NewTag {
  pub name: String,
}

impl Draft for NewTag {
  type Record = Tag;

  fn values(&self) -> Vec<Assignment> { vec![Tag::NAME.bind(&self.name)] }
}

/// Join row between [`Reminder`] and [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTag {
  pub reminder_id: i64,
  pub tag_id:      i64,
}

impl ReminderTag {
  pub const REMINDER_ID: Col<Self, i64> = Col::new("reminder_id");
  pub const TAG_ID: Col<Self, i64> = Col::new("tag_id");
}

impl FromRow for ReminderTag {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self { reminder_id: row.get(Self::REMINDER_ID)?, tag_id: row.get(Self::TAG_ID)? })
  }
}

impl Record for ReminderTag {
  const TABLE: &'static str = "reminder_tags";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::REMINDER_ID, |c| c.references(Reminder::ID, OnDelete::Cascade))
        .column_with(Self::TAG_ID, |c| c.references(Tag::ID, OnDelete::Cascade))
        .primary_key(&["reminder_id", "tag_id"])
        .build()
        .expect("reminder_tags table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::REMINDER_ID.bind(&self.reminder_id), Self::TAG_ID.bind(&self.tag_id)]
  }
}

// ─── Statements ──────────────────────────────────────────────────────────────

/// A list with the number of reminders still open in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListCount {
  pub id:         i64,
  pub title:      String,
  pub color:      i64,
  pub incomplete: i64,
}

impl FromRow for ListCount {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:         row.get_named("id")?,
      title:      row.get_named("title")?,
      color:      row.get_named("color")?,
      incomplete: row.get_named("incomplete")?,
    })
  }
}

/// Every list with its count of incomplete reminders, in display order.
/// Lists without open reminders are included with a count of zero.
pub fn list_counts() -> Result<Statement> {
  Select::from::<RemindersList>()
    .left_join::<Reminder>(
      Reminder::LIST_ID
        .eq_col(RemindersList::ID)
        .and(Reminder::IS_COMPLETED.is_false()),
    )
    .select(RemindersList::ID, "id")
    .select(RemindersList::TITLE, "title")
    .select(RemindersList::COLOR, "color")
    .select(Reminder::ID.count(), "incomplete")
    .group_by(RemindersList::ID)
    .order_by(RemindersList::POSITION.asc())
    .order_by(RemindersList::ID.asc())
    .build()
}

pub fn lists() -> Result<Statement> {
  Select::from::<RemindersList>()
    .order_by(RemindersList::POSITION.asc())
    .order_by(RemindersList::ID.asc())
    .build()
}

/// Reminders of one list: open ones first, then by due date (undated last).
pub fn reminders_in_list(list_id: i64) -> Result<Statement> {
  Select::from::<Reminder>()
    .filter(Reminder::LIST_ID.eq(list_id))
    .order_by(Reminder::IS_COMPLETED.asc())
    .order_by(Reminder::DUE_DATE.asc())
    .order_by(Reminder::ID.asc())
    .build()
}

pub fn incomplete_reminders() -> Result<Statement> {
  Select::from::<Reminder>()
    .filter(Reminder::IS_COMPLETED.is_false())
    .order_by(Reminder::ID.asc())
    .build()
}

/// Reminders carrying the tag named `tag`.
pub fn reminders_tagged(tag: &str) -> Result<Statement> {
  Select::from::<Reminder>()
    .join::<ReminderTag>(ReminderTag::REMINDER_ID.eq_col(Reminder::ID))
    .join::<Tag>(Tag::ID.eq_col(ReminderTag::TAG_ID))
    .filter(Tag::NAME.eq(tag.to_owned()))
    .order_by(Reminder::ID.asc())
    .build()
}

pub fn toggle_completed(reminder_id: i64) -> Result<Statement> {
  Update::<Reminder>::new()
    .set_expr(Reminder::IS_COMPLETED, !Reminder::IS_COMPLETED.expr())
    .filter(Reminder::ID.eq(reminder_id))
    .build()
}

pub fn set_completed(reminder_id: i64, completed: bool) -> Result<Statement> {
  Update::<Reminder>::new()
    .set(Reminder::IS_COMPLETED, completed)
    .filter(Reminder::ID.eq(reminder_id))
    .build()
}

/// Delete a list; its reminders go with it.
pub fn delete_list(list_id: i64) -> Result<Statement> {
  Delete::<RemindersList>::new()
    .filter(RemindersList::ID.eq(list_id))
    .build()
}

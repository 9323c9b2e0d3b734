//! Chat: users, spaces, participants and messages.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tally_core::{
  Assignment, Col, Draft, FromRow, OnDelete, Record, Result, Row, Select, Statement, TableDef,
};

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct User {
  pub id:     i64,
  pub name:   String,
  pub handle: String,
}

impl User {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const NAME: Col<Self, String> = Col::new("name");
  pub const HANDLE: Col<Self, String> = Col::new("handle");
}

impl FromRow for User {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:     row.get(Self::ID)?,
      name:   row.get(Self::NAME)?,
      handle: row.get(Self::HANDLE)?,
    })
  }
}

impl Record for User {
  const TABLE: &'static str = "users";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column(Self::NAME)
        .column_with(Self::HANDLE, |c| c.unique())
        .build()
        .expect("users table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::ID.bind(&self.id), Self::NAME.bind(&self.name), Self::HANDLE.bind(&self.handle)]
  }
}

#[derive(Debug, Clone)]
pub struct NewUser {
  pub name:   String,
  pub handle: String,
}

impl Draft for NewUser {
  type Record = User;

  fn values(&self) -> Vec<Assignment> {
    vec![User::NAME.bind(&self.name), User::HANDLE.bind(&self.handle)]
  }
}

// ─── Space ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Space {
  pub id:   i64,
  pub name: String,
}

impl Space {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const NAME: Col<Self, String> = Col::new("name");
}

impl FromRow for Space {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self { id: row.get(Self::ID)?, name: row.get(Self::NAME)? })
  }
}

impl Record for Space {
  const TABLE: &'static str = "spaces";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column(Self::NAME)
        .build()
        .expect("spaces table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::ID.bind(&self.id), Self::NAME.bind(&self.name)]
  }
}

#[derive(Debug, Clone)]
pub struct NewSpace {
  pub name: String,
}

impl Draft for NewSpace {
  type Record = Space;

  fn values(&self) -> Vec<Assignment> { vec![Space::NAME.bind(&self.name)] }
}

// ─── SpaceParticipant ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SpaceParticipant {
  pub space_id:  i64,
  pub user_id:   i64,
  pub joined_at: DateTime<Utc>,
}

impl SpaceParticipant {
  pub const SPACE_ID: Col<Self, i64> = Col::new("space_id");
  pub const USER_ID: Col<Self, i64> = Col::new("user_id");
  pub const JOINED_AT: Col<Self, DateTime<Utc>> = Col::new("joined_at");
}

impl FromRow for SpaceParticipant {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      space_id:  row.get(Self::SPACE_ID)?,
      user_id:   row.get(Self::USER_ID)?,
      joined_at: row.get(Self::JOINED_AT)?,
    })
  }
}

impl Record for SpaceParticipant {
  const TABLE: &'static str = "space_participants";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::SPACE_ID, |c| c.references(Space::ID, OnDelete::Cascade))
        .column_with(Self::USER_ID, |c| c.references(User::ID, OnDelete::Cascade))
        .column(Self::JOINED_AT)
        .primary_key(&["space_id", "user_id"])
        .build()
        .expect("space_participants table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::SPACE_ID.bind(&self.space_id),
      Self::USER_ID.bind(&self.user_id),
      Self::JOINED_AT.bind(&self.joined_at),
    ]
  }
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub id:        i64,
  pub space_id:  i64,
  /// `None` once the author's account is deleted.
  pub author_id: Option<i64>,
  /// Position within the space.
  pub seq:       i64,
  pub body:      String,
  pub sent_at:   DateTime<Utc>,
}

impl Message {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const SPACE_ID: Col<Self, i64> = Col::new("space_id");
  pub const AUTHOR_ID: Col<Self, Option<i64>> = Col::new("author_id");
  pub const SEQ: Col<Self, i64> = Col::new("seq");
  pub const BODY: Col<Self, String> = Col::new("body");
  pub const SENT_AT: Col<Self, DateTime<Utc>> = Col::new("sent_at");
}

impl FromRow for Message {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:        row.get(Self::ID)?,
      space_id:  row.get(Self::SPACE_ID)?,
      author_id: row.get(Self::AUTHOR_ID)?,
      seq:       row.get(Self::SEQ)?,
      body:      row.get(Self::BODY)?,
      sent_at:   row.get(Self::SENT_AT)?,
    })
  }
}

impl Record for Message {
  const TABLE: &'static str = "messages";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::SPACE_ID, |c| c.references(Space::ID, OnDelete::Cascade))
        .column_with(Self::AUTHOR_ID, |c| c.references(User::ID, OnDelete::SetNull))
        .column(Self::SEQ)
        .column(Self::BODY)
        .column(Self::SENT_AT)
        .unique(&["space_id", "seq"])
        .build()
        .expect("messages table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::SPACE_ID.bind(&self.space_id),
      Self::AUTHOR_ID.bind(&self.author_id),
      Self::SEQ.bind(&self.seq),
      Self::BODY.bind(&self.body),
      Self::SENT_AT.bind(&self.sent_at),
    ]
  }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
  pub space_id:  i64,
  pub author_id: Option<i64>,
  pub seq:       i64,
  pub body:      String,
  pub sent_at:   DateTime<Utc>,
}

impl Draft for NewMessage {
  type Record = Message;

  fn values(&self) -> Vec<Assignment> {
    vec![
      Message::SPACE_ID.bind(&self.space_id),
      Message::AUTHOR_ID.bind(&self.author_id),
      Message::SEQ.bind(&self.seq),
      Message::BODY.bind(&self.body),
      Message::SENT_AT.bind(&self.sent_at),
    ]
  }
}

// ─── Statements ──────────────────────────────────────────────────────────────

/// The newest message of a space.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestMessage {
  pub space_id: i64,
  pub seq:      i64,
  pub body:     String,
}

impl FromRow for LatestMessage {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      space_id: row.get_named("space_id")?,
      seq:      row.get_named("seq")?,
      body:     row.get_named("body")?,
    })
  }
}

/// The highest-`seq` message of every space that has messages. SQLite takes
/// the bare `body` column from the row holding the maximum.
pub fn latest_message_per_space() -> Result<Statement> {
  Select::from::<Message>()
    .select(Message::SPACE_ID, "space_id")
    .select(Message::SEQ.max(), "seq")
    .select(Message::BODY, "body")
    .group_by(Message::SPACE_ID)
    .order_by(Message::SPACE_ID.asc())
    .build()
}

pub fn messages_in_space(space_id: i64) -> Result<Statement> {
  Select::from::<Message>()
    .filter(Message::SPACE_ID.eq(space_id))
    .order_by(Message::SEQ.asc())
    .build()
}

/// Users taking part in a space, by name.
pub fn participants(space_id: i64) -> Result<Statement> {
  Select::from::<User>()
    .join::<SpaceParticipant>(SpaceParticipant::USER_ID.eq_col(User::ID))
    .filter(SpaceParticipant::SPACE_ID.eq(space_id))
    .order_by(User::NAME.asc())
    .build()
}

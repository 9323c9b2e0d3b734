//! Record fixtures shared by the unit tests.

use std::sync::OnceLock;

use crate::{
  Result,
  column::{ColumnType, ColumnValue, IntEnum, decode_enum, encode_enum},
  error::DecodeError,
  record::{Assignment, Col, Draft, Record},
  row::{FromRow, Row},
  schema::Schema,
  table::{OnDelete, TableDef},
  value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
  Draft,
  Published,
  Archived,
}

impl IntEnum for Status {
  const CASES: &'static [i64] = &[1, 2, 3];

  fn raw(self) -> i64 {
    match self {
      Status::Draft => 1,
      Status::Published => 2,
      Status::Archived => 3,
    }
  }

  fn from_raw(raw: i64) -> Option<Self> {
    match raw {
      1 => Some(Status::Draft),
      2 => Some(Status::Published),
      3 => Some(Status::Archived),
      _ => None,
    }
  }
}

impl ColumnValue for Status {
  const TYPE: ColumnType = ColumnType::Enum(Self::CASES);

  fn encode(&self) -> Value { encode_enum(*self) }

  fn decode(value: &Value) -> Result<Self, DecodeError> { decode_enum(value) }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Author {
  pub id:   i64,
  pub name: String,
}

impl Author {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const NAME: Col<Self, String> = Col::new("name");
}

impl FromRow for Author {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self { id: row.get(Self::ID)?, name: row.get(Self::NAME)? })
  }
}

impl Record for Author {
  const TABLE: &'static str = "authors";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column(Self::NAME)
        .build()
        .expect("authors table")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![Self::ID.bind(&self.id), Self::NAME.bind(&self.name)]
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Post {
  pub id:        i64,
  pub author_id: i64,
  pub title:     String,
  pub published: bool,
  pub status:    Status,
  pub rating:    Option<f64>,
}

impl Post {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const AUTHOR_ID: Col<Self, i64> = Col::new("author_id");
  pub const TITLE: Col<Self, String> = Col::new("title");
  pub const PUBLISHED: Col<Self, bool> = Col::new("published");
  pub const STATUS: Col<Self, Status> = Col::new("status");
  pub const RATING: Col<Self, Option<f64>> = Col::new("rating");
}

impl FromRow for Post {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:        row.get(Self::ID)?,
      author_id: row.get(Self::AUTHOR_ID)?,
      title:     row.get(Self::TITLE)?,
      published: row.get(Self::PUBLISHED)?,
      status:    row.get(Self::STATUS)?,
      rating:    row.get(Self::RATING)?,
    })
  }
}

impl Record for Post {
  const TABLE: &'static str = "posts";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::AUTHOR_ID, |c| c.references(Author::ID, OnDelete::Cascade))
        .column(Self::TITLE)
        .column_with(Self::PUBLISHED, |c| c.default(false))
        .column_with(Self::STATUS, |c| c.default(Status::Draft))
        .column(Self::RATING)
        .build()
        .expect("posts table")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::AUTHOR_ID.bind(&self.author_id),
      Self::TITLE.bind(&self.title),
      Self::PUBLISHED.bind(&self.published),
      Self::STATUS.bind(&self.status),
      Self::RATING.bind(&self.rating),
    ]
  }
}

pub(crate) struct PostDraft {
  pub author_id: i64,
  pub title:     String,
  pub status:    Option<Status>,
}

impl Draft for PostDraft {
  type Record = Post;

  fn values(&self) -> Vec<Assignment> {
    let mut values =
      vec![Post::AUTHOR_ID.bind(&self.author_id), Post::TITLE.bind(&self.title)];
    if let Some(status) = &self.status {
      values.push(Post::STATUS.bind(status));
    }
    values
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Comment {
  pub id:      i64,
  pub post_id: Option<i64>,
  pub body:    String,
}

impl Comment {
  pub const ID: Col<Self, i64> = Col::new("id");
  pub const POST_ID: Col<Self, Option<i64>> = Col::new("post_id");
  pub const BODY: Col<Self, String> = Col::new("body");
}

impl FromRow for Comment {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:      row.get(Self::ID)?,
      post_id: row.get(Self::POST_ID)?,
      body:    row.get(Self::BODY)?,
    })
  }
}

impl Record for Comment {
  const TABLE: &'static str = "comments";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key().store_assigned())
        .column_with(Self::POST_ID, |c| c.references(Post::ID, OnDelete::SetNull))
        .column(Self::BODY)
        .build()
        .expect("comments table")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::POST_ID.bind(&self.post_id),
      Self::BODY.bind(&self.body),
    ]
  }
}

pub(crate) fn schema() -> Schema {
  Schema::builder()
    .register::<Comment>()
    .register::<Post>()
    .register::<Author>()
    .build()
    .expect("fixture schema")
}

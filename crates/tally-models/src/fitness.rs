//! Workouts. Rows are keyed by a client-generated UUID so they can be created
//! offline and upserted later.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  Assignment, Col, ColumnType, ColumnValue, DecodeError, Expr, FromRow, IntEnum, Json, Record,
  Result, Row, Select, Statement, TableDef, Value,
  column::{decode_enum, encode_enum},
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutKind {
  Run,
  Walk,
  Cycle,
  Swim,
  Strength,
}

impl IntEnum for WorkoutKind {
  const CASES: &'static [i64] = &[1, 2, 3, 4, 5];

  fn raw(self) -> i64 {
    match self {
      WorkoutKind::Run => 1,
      WorkoutKind::Walk => 2,
      WorkoutKind::Cycle => 3,
      WorkoutKind::Swim => 4,
      WorkoutKind::Strength => 5,
    }
  }

  fn from_raw(raw: i64) -> Option<Self> {
    match raw {
      1 => Some(WorkoutKind::Run),
      2 => Some(WorkoutKind::Walk),
      3 => Some(WorkoutKind::Cycle),
      4 => Some(WorkoutKind::Swim),
      5 => Some(WorkoutKind::Strength),
      _ => None,
    }
  }
}

impl ColumnValue for WorkoutKind {
  const TYPE: ColumnType = ColumnType::Enum(Self::CASES);

  fn encode(&self) -> Value { encode_enum(*self) }

  fn decode(value: &Value) -> Result<Self, DecodeError> { decode_enum(value) }
}

/// Free-form measurements kept alongside a workout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDetails {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avg_heart_rate: Option<u32>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub splits_secs:    Vec<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes:          Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
  pub id:            Uuid,
  pub kind:          WorkoutKind,
  pub started_at:    DateTime<Utc>,
  pub duration_secs: i64,
  pub distance_m:    Option<f64>,
  pub details:       Json<WorkoutDetails>,
}

impl Workout {
  pub const ID: Col<Self, Uuid> = Col::new("id");
  pub const KIND: Col<Self, WorkoutKind> = Col::new("kind");
  pub const STARTED_AT: Col<Self, DateTime<Utc>> = Col::new("started_at");
  pub const DURATION_SECS: Col<Self, i64> = Col::new("duration_secs");
  pub const DISTANCE_M: Col<Self, Option<f64>> = Col::new("distance_m");
  pub const DETAILS: Col<Self, Json<WorkoutDetails>> = Col::new("details");

  /// A workout with a fresh id and no distance.
  pub fn new(
    kind: WorkoutKind,
    started_at: DateTime<Utc>,
    duration_secs: i64,
    details: WorkoutDetails,
  ) -> Result<Self> {
    Ok(Self {
      id: Uuid::new_v4(),
      kind,
      started_at,
      duration_secs,
      distance_m: None,
      details: Json::new(details)?,
    })
  }
}

impl FromRow for Workout {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:            row.get(Self::ID)?,
      kind:          row.get(Self::KIND)?,
      started_at:    row.get(Self::STARTED_AT)?,
      duration_secs: row.get(Self::DURATION_SECS)?,
      distance_m:    row.get(Self::DISTANCE_M)?,
      details:       row.get(Self::DETAILS)?,
    })
  }
}

impl Record for Workout {
  const TABLE: &'static str = "workouts";

  fn table() -> &'static TableDef {
    static TABLE: OnceLock<TableDef> = OnceLock::new();
    TABLE.get_or_init(|| {
      TableDef::builder::<Self>()
        .column_with(Self::ID, |c| c.primary_key())
        .column(Self::KIND)
        .column(Self::STARTED_AT)
        .column(Self::DURATION_SECS)
        .column(Self::DISTANCE_M)
        .column(Self::DETAILS)
        .build()
        .expect("workouts table definition")
    })
  }

  fn values(&self) -> Vec<Assignment> {
    vec![
      Self::ID.bind(&self.id),
      Self::KIND.bind(&self.kind),
      Self::STARTED_AT.bind(&self.started_at),
      Self::DURATION_SECS.bind(&self.duration_secs),
      Self::DISTANCE_M.bind(&self.distance_m),
      Self::DETAILS.bind(&self.details),
    ]
  }
}

// ─── Statements ──────────────────────────────────────────────────────────────

/// Workouts started in `[from, until)`, oldest first.
pub fn workouts_between(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Statement> {
  Select::from::<Workout>()
    .filter(Workout::STARTED_AT.ge(from))
    .filter(Workout::STARTED_AT.lt(until))
    .order_by(Workout::STARTED_AT.asc())
    .build()
}

/// Total distance and time per kind of workout.
#[derive(Debug, Clone, PartialEq)]
pub struct KindTotals {
  pub kind:          WorkoutKind,
  pub sessions:      i64,
  pub duration_secs: i64,
  /// `None` when no session of this kind recorded a distance.
  pub distance_m:    Option<f64>,
}

impl FromRow for KindTotals {
  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      kind:          row.get_named("kind")?,
      sessions:      row.get_named("sessions")?,
      duration_secs: row.get_named("duration_secs")?,
      distance_m:    row.get_named("distance_m")?,
    })
  }
}

pub fn totals_by_kind() -> Result<Statement> {
  Select::from::<Workout>()
    .select(Workout::KIND, "kind")
    .select(Expr::count_all(), "sessions")
    .select(Workout::DURATION_SECS.sum(), "duration_secs")
    .select(Workout::DISTANCE_M.sum(), "distance_m")
    .group_by(Workout::KIND)
    .order_by(Workout::KIND.asc())
    .build()
}

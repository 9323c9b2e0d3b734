//! Core types for the Tally data layer.
//!
//! Records describe their tables once, the [`Schema`] validates them as a
//! whole, and the statement builders in [`query`] turn typed column
//! expressions into validated SQL. This crate performs no I/O; execution,
//! transactions and live queries live in `tally-store-sqlite`.

pub mod column;
pub mod error;
pub mod expr;
pub mod query;
pub mod record;
pub mod row;
pub mod schema;
pub mod table;
pub mod value;

#[cfg(test)]
mod testing;

pub use column::{ColumnType, ColumnValue, IntEnum, Json};
pub use error::{DecodeError, Error, Result};
pub use expr::{ColumnRef, Expr, Nulls, OrderTerm};
pub use query::{Delete, Insert, Select, Statement, StatementKind, Update};
pub use record::{Assignment, Col, Draft, Record};
pub use row::{FromRow, Row, Scalar};
pub use schema::Schema;
pub use table::{OnDelete, TableDef};
pub use value::Value;

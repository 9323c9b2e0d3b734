//! Records, drafts and typed column handles.
//!
//! A record type names its table, declares one [`Col`] constant per column and
//! registers them once through [`TableDef::builder`]. The handles carry the
//! record type and the column's Rust type, so comparisons and assignments are
//! checked by the compiler.

use std::marker::PhantomData;

use crate::{
  column::ColumnValue,
  expr::{Aggregate, BinaryOp, ColumnRef, Expr, OrderTerm},
  row::FromRow,
  table::TableDef,
  value::Value,
};

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A fully-populated row of a registered table.
///
/// Records are immutable values. To change persisted state, build and execute
/// an [`Update`](crate::query::Update) statement.
pub trait Record: FromRow + Send + Sync + 'static {
  /// Name of the backing table.
  const TABLE: &'static str;

  /// The table descriptor, built once and cached for the process lifetime.
  fn table() -> &'static TableDef;

  /// Every column value of this record.
  fn values(&self) -> Vec<Assignment>;

  /// Values of the primary-key columns, in key order.
  fn primary_key(&self) -> Vec<Value> {
    let values = self.values();
    Self::table()
      .primary_key()
      .iter()
      .map(|pk| {
        values
          .iter()
          .find(|a| a.column == *pk)
          .map_or(Value::Null, |a| a.value.clone())
      })
      .collect()
  }
}

/// A record value lacking the columns the store assigns.
///
/// Drafts are consumed by an [`Insert`](crate::query::Insert) and never
/// persisted themselves. Columns omitted from [`Draft::values`] take their
/// declared default.
pub trait Draft: Send + 'static {
  type Record: Record;

  fn values(&self) -> Vec<Assignment>;
}

/// One `column = value` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
  pub column: &'static str,
  pub value:  Value,
}

// ─── Column handles ──────────────────────────────────────────────────────────

/// A typed reference to column `name` of record `R`, holding values of `T`.
pub struct Col<R, T> {
  name:    &'static str,
  _marker: PhantomData<fn() -> (R, T)>,
}

impl<R, T> Clone for Col<R, T> {
  fn clone(&self) -> Self { *self }
}

impl<R, T> Copy for Col<R, T> {}

impl<R, T> std::fmt::Debug for Col<R, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Col").field(&self.name).finish()
  }
}

impl<R, T> Col<R, T> {
  pub const fn new(name: &'static str) -> Self {
    Self { name, _marker: PhantomData }
  }

  pub const fn name(self) -> &'static str { self.name }
}

impl<R, T> Col<R, Option<T>> {
  /// View a nullable column as its inner type, for join predicates and
  /// comparisons where NULL never matches anyway.
  pub const fn inner(self) -> Col<R, T> { Col::new(self.name) }
}

impl<R: Record, T: ColumnValue> Col<R, T> {
  pub fn column_ref(self) -> ColumnRef { ColumnRef::new(R::TABLE, self.name) }

  pub fn expr(self) -> Expr { Expr::Column(self.column_ref()) }

  /// Pair this column with a value, for drafts and record encoding.
  pub fn bind(self, value: &T) -> Assignment {
    Assignment { column: self.name, value: value.encode() }
  }

  /// `column = value`; a NULL value renders `column IS NULL`.
  pub fn eq(self, value: T) -> Expr {
    match value.encode() {
      Value::Null => Expr::IsNull(Box::new(self.expr())),
      v => self.compare(BinaryOp::Eq, v),
    }
  }

  /// `column <> value`; a NULL value renders `column IS NOT NULL`.
  pub fn ne(self, value: T) -> Expr {
    match value.encode() {
      Value::Null => Expr::IsNotNull(Box::new(self.expr())),
      v => self.compare(BinaryOp::Ne, v),
    }
  }

  pub fn lt(self, value: T) -> Expr { self.compare(BinaryOp::Lt, value.encode()) }

  pub fn le(self, value: T) -> Expr { self.compare(BinaryOp::Le, value.encode()) }

  pub fn gt(self, value: T) -> Expr { self.compare(BinaryOp::Gt, value.encode()) }

  pub fn ge(self, value: T) -> Expr { self.compare(BinaryOp::Ge, value.encode()) }

  pub fn is_in(self, values: impl IntoIterator<Item = T>) -> Expr {
    Expr::InList(
      Box::new(self.expr()),
      values.into_iter().map(|v| v.encode()).collect(),
    )
  }

  pub fn is_null(self) -> Expr { Expr::IsNull(Box::new(self.expr())) }

  pub fn is_not_null(self) -> Expr { Expr::IsNotNull(Box::new(self.expr())) }

  /// Equi-join predicate between two columns holding the same type.
  pub fn eq_col<R2: Record>(self, other: Col<R2, T>) -> Expr {
    Expr::Binary(BinaryOp::Eq, Box::new(self.expr()), Box::new(other.expr()))
  }

  pub fn asc(self) -> OrderTerm { OrderTerm::asc(self.expr()) }

  pub fn desc(self) -> OrderTerm { OrderTerm::desc(self.expr()) }

  pub fn count(self) -> Expr { Expr::Aggregate(Aggregate::Count, Box::new(self.expr())) }

  pub fn max(self) -> Expr { Expr::Aggregate(Aggregate::Max, Box::new(self.expr())) }

  pub fn min(self) -> Expr { Expr::Aggregate(Aggregate::Min, Box::new(self.expr())) }

  pub fn sum(self) -> Expr { Expr::Aggregate(Aggregate::Sum, Box::new(self.expr())) }

  fn compare(self, op: BinaryOp, value: Value) -> Expr {
    Expr::Binary(op, Box::new(self.expr()), Box::new(Expr::Value(value)))
  }
}

impl<R: Record> Col<R, bool> {
  pub fn is_true(self) -> Expr { self.eq(true) }

  pub fn is_false(self) -> Expr { self.eq(false) }
}

impl<R: Record> Col<R, String> {
  pub fn like(self, pattern: &str) -> Expr {
    self.compare(BinaryOp::Like, Value::Text(pattern.to_owned()))
  }
}

impl<R: Record, T: ColumnValue> From<Col<R, T>> for Expr {
  fn from(col: Col<R, T>) -> Self { col.expr() }
}

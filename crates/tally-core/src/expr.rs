//! Boolean and scalar expression trees over column references.
//!
//! Expressions are plain data. They are validated against the tables in scope
//! and rendered to SQL when a statement is built.

use std::ops;

use crate::{table::quote_ident, value::Value};

/// A column of a named table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
  pub table:  &'static str,
  pub column: &'static str,
}

impl ColumnRef {
  pub const fn new(table: &'static str, column: &'static str) -> Self {
    Self { table, column }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Like,
  And,
  Or,
}

impl BinaryOp {
  fn sql(self) -> &'static str {
    match self {
      BinaryOp::Eq => "=",
      BinaryOp::Ne => "<>",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::Like => "LIKE",
      BinaryOp::And => "AND",
      BinaryOp::Or => "OR",
    }
  }

  pub fn is_comparison(self) -> bool { !matches!(self, BinaryOp::And | BinaryOp::Or) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
  Count,
  Sum,
  Min,
  Max,
  Avg,
}

impl Aggregate {
  fn sql(self) -> &'static str {
    match self {
      Aggregate::Count => "COUNT",
      Aggregate::Sum => "SUM",
      Aggregate::Min => "MIN",
      Aggregate::Max => "MAX",
      Aggregate::Avg => "AVG",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Column(ColumnRef),
  Value(Value),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Not(Box<Expr>),
  IsNull(Box<Expr>),
  IsNotNull(Box<Expr>),
  InList(Box<Expr>, Vec<Value>),
  CountAll,
  Aggregate(Aggregate, Box<Expr>),
}

impl Expr {
  /// An untyped column reference.
  pub fn col(table: &'static str, column: &'static str) -> Self {
    Expr::Column(ColumnRef::new(table, column))
  }

  pub fn value(value: impl Into<Value>) -> Self { Expr::Value(value.into()) }

  pub fn count_all() -> Self { Expr::CountAll }

  pub fn and(self, other: Expr) -> Self {
    Expr::Binary(BinaryOp::And, Box::new(self), Box::new(other))
  }

  pub fn or(self, other: Expr) -> Self {
    Expr::Binary(BinaryOp::Or, Box::new(self), Box::new(other))
  }

  pub fn binary(self, op: BinaryOp, other: Expr) -> Self {
    Expr::Binary(op, Box::new(self), Box::new(other))
  }

  pub fn avg(self) -> Self { Expr::Aggregate(Aggregate::Avg, Box::new(self)) }

  /// Visit every column reference in the tree.
  pub fn walk_columns(&self, f: &mut impl FnMut(ColumnRef)) {
    match self {
      Expr::Column(c) => f(*c),
      Expr::Value(_) | Expr::CountAll => {}
      Expr::Binary(_, l, r) => {
        l.walk_columns(f);
        r.walk_columns(f);
      }
      Expr::Not(e)
      | Expr::IsNull(e)
      | Expr::IsNotNull(e)
      | Expr::InList(e, _)
      | Expr::Aggregate(_, e) => e.walk_columns(f),
    }
  }

  /// Visit every literal that is compared against a column directly, as
  /// `(column, literal)` pairs.
  pub fn walk_column_literals(&self, f: &mut impl FnMut(ColumnRef, &Value)) {
    match self {
      Expr::Binary(op, l, r) if op.is_comparison() => match (l.as_ref(), r.as_ref()) {
        (Expr::Column(c), Expr::Value(v)) | (Expr::Value(v), Expr::Column(c)) => f(*c, v),
        _ => {
          l.walk_column_literals(f);
          r.walk_column_literals(f);
        }
      },
      Expr::Binary(_, l, r) => {
        l.walk_column_literals(f);
        r.walk_column_literals(f);
      }
      Expr::InList(e, values) => {
        if let Expr::Column(c) = e.as_ref() {
          for v in values {
            f(*c, v);
          }
        }
        e.walk_column_literals(f);
      }
      Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) | Expr::Aggregate(_, e) => {
        e.walk_column_literals(f)
      }
      Expr::Column(_) | Expr::Value(_) | Expr::CountAll => {}
    }
  }

  /// Render into `sql`, pushing bound values onto `params`.
  pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<Value>, qualify: bool) {
    match self {
      Expr::Column(c) => {
        if qualify {
          sql.push_str(&quote_ident(c.table));
          sql.push('.');
        }
        sql.push_str(&quote_ident(c.column));
      }
      Expr::Value(v) => push_param(sql, params, v.clone()),
      Expr::Binary(op, l, r) => {
        sql.push('(');
        l.render(sql, params, qualify);
        sql.push(' ');
        sql.push_str(op.sql());
        sql.push(' ');
        r.render(sql, params, qualify);
        sql.push(')');
      }
      Expr::Not(e) => {
        sql.push_str("(NOT ");
        e.render(sql, params, qualify);
        sql.push(')');
      }
      Expr::IsNull(e) => {
        sql.push('(');
        e.render(sql, params, qualify);
        sql.push_str(" IS NULL)");
      }
      Expr::IsNotNull(e) => {
        sql.push('(');
        e.render(sql, params, qualify);
        sql.push_str(" IS NOT NULL)");
      }
      // An empty list matches nothing.
      Expr::InList(_, values) if values.is_empty() => sql.push_str("(0 = 1)"),
      Expr::InList(e, values) => {
        sql.push('(');
        e.render(sql, params, qualify);
        sql.push_str(" IN (");
        for (i, v) in values.iter().enumerate() {
          if i > 0 {
            sql.push_str(", ");
          }
          push_param(sql, params, v.clone());
        }
        sql.push_str("))");
      }
      Expr::CountAll => sql.push_str("COUNT(*)"),
      Expr::Aggregate(agg, e) => {
        sql.push_str(agg.sql());
        sql.push('(');
        e.render(sql, params, qualify);
        sql.push(')');
      }
    }
  }
}

pub(crate) fn push_param(sql: &mut String, params: &mut Vec<Value>, value: Value) {
  params.push(value);
  sql.push('?');
  sql.push_str(&params.len().to_string());
}

impl ops::Not for Expr {
  type Output = Expr;

  fn not(self) -> Expr { Expr::Not(Box::new(self)) }
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

/// Where NULLs sort. Every query path defaults to [`Nulls::Last`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nulls {
  First,
  #[default]
  Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
  pub expr:      Expr,
  pub direction: Direction,
  pub nulls:     Nulls,
}

impl OrderTerm {
  pub fn asc(expr: Expr) -> Self {
    Self { expr, direction: Direction::Asc, nulls: Nulls::default() }
  }

  pub fn desc(expr: Expr) -> Self {
    Self { expr, direction: Direction::Desc, nulls: Nulls::default() }
  }

  pub fn nulls_first(mut self) -> Self {
    self.nulls = Nulls::First;
    self
  }

  pub fn nulls_last(mut self) -> Self {
    self.nulls = Nulls::Last;
    self
  }

  pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
    self.expr.render(sql, params, true);
    sql.push_str(match self.direction {
      Direction::Asc => " ASC",
      Direction::Desc => " DESC",
    });
    sql.push_str(match self.nulls {
      Nulls::First => " NULLS FIRST",
      Nulls::Last => " NULLS LAST",
    });
  }
}

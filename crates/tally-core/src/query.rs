//! The statement builder.
//!
//! [`Select`], [`Insert`], [`Update`] and [`Delete`] are immutable, clonable
//! values composed method by method. Nothing is checked until
//! [`build`](Select::build) is called, which validates every column reference
//! and literal against the tables in scope and renders a [`Statement`]:
//! SQLite-dialect SQL with numbered parameters, plus the sets of tables the
//! statement reads and writes.
//!
//! Ordering always renders an explicit null placement; NULLs sort last unless
//! [`OrderTerm::nulls_first`] is requested. `limit` without `order_by` yields
//! rows in unspecified order.

use std::{collections::BTreeSet, fmt, marker::PhantomData};

use crate::{
  Error, Result,
  column::{ColumnType, ColumnValue},
  expr::{BinaryOp, ColumnRef, Expr, OrderTerm, push_param},
  record::{Assignment, Col, Draft, Record},
  table::{ColumnDef, TableDef, quote_ident},
  value::Value,
};

// ─── Statement ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
  Read,
  Write,
}

/// A built, validated statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  sql:          String,
  params:       Vec<Value>,
  kind:         StatementKind,
  returns_rows: bool,
  reads:        BTreeSet<&'static str>,
  writes:       BTreeSet<&'static str>,
}

impl Statement {
  /// A hand-written read. `reads` must name every table the SQL touches, or
  /// live queries built on it will miss updates.
  pub fn raw_read(
    sql: impl Into<String>,
    params: Vec<Value>,
    reads: &[&'static str],
  ) -> Self {
    Self {
      sql: sql.into(),
      params,
      kind: StatementKind::Read,
      returns_rows: true,
      reads: reads.iter().copied().collect(),
      writes: BTreeSet::new(),
    }
  }

  /// A hand-written write that modifies the tables in `writes`.
  pub fn raw_write(
    sql: impl Into<String>,
    params: Vec<Value>,
    writes: &[&'static str],
  ) -> Self {
    Self {
      sql: sql.into(),
      params,
      kind: StatementKind::Write,
      returns_rows: false,
      reads: BTreeSet::new(),
      writes: writes.iter().copied().collect(),
    }
  }

  pub fn sql(&self) -> &str { &self.sql }

  pub fn params(&self) -> &[Value] { &self.params }

  pub fn kind(&self) -> StatementKind { self.kind }

  pub fn is_read(&self) -> bool { self.kind == StatementKind::Read }

  /// Whether executing the statement yields rows (reads and `RETURNING`).
  pub fn returns_rows(&self) -> bool { self.returns_rows }

  pub fn reads(&self) -> &BTreeSet<&'static str> { &self.reads }

  pub fn writes(&self) -> &BTreeSet<&'static str> { &self.writes }
}

impl fmt::Display for Statement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.sql) }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// The tables a statement may reference.
struct Scope {
  tables: Vec<&'static TableDef>,
}

impl Scope {
  fn new(table: &'static TableDef) -> Self { Self { tables: vec![table] } }

  fn add(&mut self, table: &'static TableDef) -> Result<()> {
    if self.tables.iter().any(|t| t.name() == table.name()) {
      return Err(Error::InvalidStatement(format!(
        "table {} appears more than once",
        table.name()
      )));
    }
    self.tables.push(table);
    Ok(())
  }

  fn resolve(&self, c: ColumnRef) -> Result<&'static ColumnDef> {
    let table = self
      .tables
      .iter()
      .copied()
      .find(|t| t.name() == c.table)
      .ok_or(Error::ColumnNotInScope { table: c.table, column: c.column })?;
    table
      .column(c.column)
      .ok_or(Error::UnknownColumn { table: c.table, column: c.column })
  }

  fn check(&self, expr: &Expr) -> Result<()> {
    let mut columns = Vec::new();
    expr.walk_columns(&mut |c| columns.push(c));
    for c in columns {
      self.resolve(c)?;
    }

    let mut literals = Vec::new();
    expr.walk_column_literals(&mut |c, v| literals.push((c, v.clone())));
    for (c, v) in literals {
      check_value(c.table, self.resolve(c)?, &v)?;
    }
    Ok(())
  }

  fn names(&self) -> BTreeSet<&'static str> { self.tables.iter().map(|t| t.name()).collect() }
}

fn check_value(table: &'static str, def: &ColumnDef, value: &Value) -> Result<()> {
  if let (ColumnType::Enum(cases), Value::Integer(raw)) = (def.ty, value)
    && !cases.contains(raw)
  {
    return Err(Error::EnumOutOfRange { table, column: def.name, value: *raw });
  }
  if !def.ty.accepts(value) {
    return Err(Error::InvalidValue {
      table,
      column: def.name,
      value: value.clone(),
      ty: def.ty,
    });
  }
  Ok(())
}

fn column_of(table: &'static TableDef, column: &'static str) -> Result<&'static ColumnDef> {
  table
    .column(column)
    .ok_or(Error::UnknownColumn { table: table.name(), column })
}

fn pk_filter(table: &'static TableDef, key: Vec<Value>) -> Option<Expr> {
  table
    .primary_key()
    .iter()
    .copied()
    .zip(key)
    .map(|(column, value)| {
      Expr::col(table.name(), column).binary(BinaryOp::Eq, Expr::Value(value))
    })
    .reduce(Expr::and)
}

fn render_returning(sql: &mut String, table: &TableDef) {
  let cols: Vec<String> = table.columns().iter().map(|c| quote_ident(c.name)).collect();
  sql.push_str(" RETURNING ");
  sql.push_str(&cols.join(", "));
}

// ─── Select ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
  Inner,
  Left,
}

#[derive(Debug, Clone)]
struct Join {
  kind:  JoinKind,
  table: &'static TableDef,
  on:    Expr,
}

#[derive(Debug, Clone)]
struct SelectItem {
  expr:  Expr,
  alias: &'static str,
}

/// A read statement over one table plus any joined tables.
#[derive(Debug, Clone)]
pub struct Select {
  from:     &'static TableDef,
  joins:    Vec<Join>,
  items:    Vec<SelectItem>,
  filter:   Option<Expr>,
  group_by: Vec<Expr>,
  having:   Option<Expr>,
  order_by: Vec<OrderTerm>,
  limit:    Option<u64>,
  offset:   Option<u64>,
  distinct: bool,
}

impl Select {
  /// Select from the table backing `R`. Without explicit
  /// [`select`](Self::select) items, every column of `R` is returned under
  /// its own name, so rows decode straight into `R`.
  pub fn from<R: Record>() -> Self {
    Self {
      from:     R::table(),
      joins:    Vec::new(),
      items:    Vec::new(),
      filter:   None,
      group_by: Vec::new(),
      having:   None,
      order_by: Vec::new(),
      limit:    None,
      offset:   None,
      distinct: false,
    }
  }

  /// Add a result column named `alias`.
  pub fn select(mut self, expr: impl Into<Expr>, alias: &'static str) -> Self {
    self.items.push(SelectItem { expr: expr.into(), alias });
    self
  }

  /// Restrict rows; repeated calls are combined with `AND`.
  pub fn filter(mut self, expr: Expr) -> Self {
    self.filter = Some(match self.filter {
      Some(existing) => existing.and(expr),
      None => expr,
    });
    self
  }

  pub fn join<R: Record>(mut self, on: Expr) -> Self {
    self.joins.push(Join { kind: JoinKind::Inner, table: R::table(), on });
    self
  }

  pub fn left_join<R: Record>(mut self, on: Expr) -> Self {
    self.joins.push(Join { kind: JoinKind::Left, table: R::table(), on });
    self
  }

  pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
    self.group_by.push(expr.into());
    self
  }

  pub fn having(mut self, expr: Expr) -> Self {
    self.having = Some(match self.having {
      Some(existing) => existing.and(expr),
      None => expr,
    });
    self
  }

  pub fn order_by(mut self, term: OrderTerm) -> Self {
    self.order_by.push(term);
    self
  }

  pub fn limit(mut self, n: u64) -> Self {
    self.limit = Some(n);
    self
  }

  pub fn offset(mut self, n: u64) -> Self {
    self.offset = Some(n);
    self
  }

  pub fn distinct(mut self) -> Self {
    self.distinct = true;
    self
  }

  pub fn build(self) -> Result<Statement> {
    let mut scope = Scope::new(self.from);
    for join in &self.joins {
      scope.add(join.table)?;
    }

    let mut aliases = BTreeSet::new();
    for item in &self.items {
      if !aliases.insert(item.alias) {
        return Err(Error::InvalidStatement(format!(
          "result column {:?} selected twice",
          item.alias
        )));
      }
      scope.check(&item.expr)?;
    }
    for join in &self.joins {
      scope.check(&join.on)?;
    }
    for expr in self.filter.iter().chain(&self.group_by).chain(&self.having) {
      scope.check(expr)?;
    }
    for term in &self.order_by {
      scope.check(&term.expr)?;
    }
    if self.having.is_some() && self.group_by.is_empty() {
      return Err(Error::InvalidStatement("HAVING without GROUP BY".into()));
    }

    let mut sql = String::from("SELECT ");
    let mut params = Vec::new();
    if self.distinct {
      sql.push_str("DISTINCT ");
    }

    if self.items.is_empty() {
      let table = self.from.name();
      let cols: Vec<String> = self
        .from
        .columns()
        .iter()
        .map(|c| {
          format!("{}.{} AS {}", quote_ident(table), quote_ident(c.name), quote_ident(c.name))
        })
        .collect();
      sql.push_str(&cols.join(", "));
    } else {
      for (i, item) in self.items.iter().enumerate() {
        if i > 0 {
          sql.push_str(", ");
        }
        item.expr.render(&mut sql, &mut params, true);
        sql.push_str(" AS ");
        sql.push_str(&quote_ident(item.alias));
      }
    }

    sql.push_str(" FROM ");
    sql.push_str(&quote_ident(self.from.name()));

    for join in &self.joins {
      sql.push_str(match join.kind {
        JoinKind::Inner => " JOIN ",
        JoinKind::Left => " LEFT JOIN ",
      });
      sql.push_str(&quote_ident(join.table.name()));
      sql.push_str(" ON ");
      join.on.render(&mut sql, &mut params, true);
    }

    if let Some(filter) = &self.filter {
      sql.push_str(" WHERE ");
      filter.render(&mut sql, &mut params, true);
    }

    if !self.group_by.is_empty() {
      sql.push_str(" GROUP BY ");
      for (i, expr) in self.group_by.iter().enumerate() {
        if i > 0 {
          sql.push_str(", ");
        }
        expr.render(&mut sql, &mut params, true);
      }
    }

    if let Some(having) = &self.having {
      sql.push_str(" HAVING ");
      having.render(&mut sql, &mut params, true);
    }

    if !self.order_by.is_empty() {
      sql.push_str(" ORDER BY ");
      for (i, term) in self.order_by.iter().enumerate() {
        if i > 0 {
          sql.push_str(", ");
        }
        term.render(&mut sql, &mut params);
      }
    }

    let clamp = |n: u64| Value::Integer(i64::try_from(n).unwrap_or(i64::MAX));
    match (self.limit, self.offset) {
      (Some(limit), offset) => {
        sql.push_str(" LIMIT ");
        push_param(&mut sql, &mut params, clamp(limit));
        if let Some(offset) = offset {
          sql.push_str(" OFFSET ");
          push_param(&mut sql, &mut params, clamp(offset));
        }
      }
      // SQLite requires a LIMIT before OFFSET; -1 means unbounded.
      (None, Some(offset)) => {
        sql.push_str(" LIMIT -1 OFFSET ");
        push_param(&mut sql, &mut params, clamp(offset));
      }
      (None, None) => {}
    }

    Ok(Statement {
      sql,
      params,
      kind: StatementKind::Read,
      returns_rows: true,
      reads: scope.names(),
      writes: BTreeSet::new(),
    })
  }
}

// ─── Insert ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Conflict {
  Fail,
  Ignore,
  Update(Vec<&'static str>),
}

/// An insert (or upsert) of one row into the table backing `R`.
#[derive(Debug, Clone)]
pub struct Insert<R> {
  values:     Vec<Assignment>,
  from_draft: bool,
  conflict:   Conflict,
  returning:  bool,
  _marker:    PhantomData<fn() -> R>,
}

impl<R: Record> Insert<R> {
  /// Insert a draft; store-assigned columns are left to the store and omitted
  /// columns take their declared defaults.
  pub fn draft<D: Draft<Record = R>>(draft: &D) -> Self {
    Self {
      values:     draft.values(),
      from_draft: true,
      conflict:   Conflict::Fail,
      returning:  false,
      _marker:    PhantomData,
    }
  }

  /// Insert a complete record, including its key.
  pub fn record(record: &R) -> Self {
    Self {
      values:     record.values(),
      from_draft: false,
      conflict:   Conflict::Fail,
      returning:  false,
      _marker:    PhantomData,
    }
  }

  /// Insert `record`, or overwrite the row with the same primary key.
  pub fn upsert(record: &R) -> Self {
    Self::record(record).on_conflict_update(R::table().primary_key())
  }

  /// On a conflict over `target` (the primary key or a unique set), update
  /// the existing row with the inserted values.
  pub fn on_conflict_update(mut self, target: &[&'static str]) -> Self {
    self.conflict = Conflict::Update(target.to_vec());
    self
  }

  /// On any conflict, keep the existing row and insert nothing.
  pub fn on_conflict_ignore(mut self) -> Self {
    self.conflict = Conflict::Ignore;
    self
  }

  /// Yield the written row.
  pub fn returning(mut self) -> Self {
    self.returning = true;
    self
  }

  pub fn build(self) -> Result<Statement> {
    let table = R::table();
    let name = table.name();

    let mut seen = BTreeSet::new();
    for a in &self.values {
      let def = column_of(table, a.column)?;
      if !seen.insert(a.column) {
        return Err(Error::DuplicateAssignment { table: name, column: a.column });
      }
      if self.from_draft && def.store_assigned {
        return Err(Error::StoreAssigned { table: name, column: a.column });
      }
      check_value(name, def, &a.value)?;
    }

    // Table column order, with defaults filled in for omitted draft columns.
    let mut columns: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for def in table.columns() {
      if let Some(a) = self.values.iter().find(|a| a.column == def.name) {
        columns.push(def.name);
        values.push(a.value.clone());
      } else if def.store_assigned || def.nullable {
        continue;
      } else if let Some(default) = table.default_value(def.name) {
        columns.push(def.name);
        values.push(default.clone());
      } else {
        return Err(Error::MissingValue { table: name, column: def.name });
      }
    }

    let mut sql = format!("INSERT INTO {}", quote_ident(name));
    let mut params = Vec::new();
    if columns.is_empty() {
      if self.conflict != Conflict::Fail {
        return Err(Error::InvalidStatement(
          "conflict handling needs at least one inserted column".into(),
        ));
      }
      sql.push_str(" DEFAULT VALUES");
    } else {
      let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
      sql.push_str(&format!(" ({}) VALUES (", names.join(", ")));
      for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
          sql.push_str(", ");
        }
        push_param(&mut sql, &mut params, value);
      }
      sql.push(')');
    }

    match &self.conflict {
      Conflict::Fail => {}
      Conflict::Ignore => sql.push_str(" ON CONFLICT DO NOTHING"),
      Conflict::Update(target) => {
        for column in target {
          column_of(table, *column)?;
        }
        if !table.is_unique_key(target) {
          return Err(Error::InvalidStatement(format!(
            "conflict target ({}) is not a unique key of {name}",
            target.join(", ")
          )));
        }
        let target_sql: Vec<String> = target.iter().map(|c| quote_ident(c)).collect();
        let updates: Vec<String> = columns
          .iter()
          .filter(|c| !target.contains(*c))
          .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
          .collect();
        sql.push_str(&format!(" ON CONFLICT ({}) ", target_sql.join(", ")));
        if updates.is_empty() {
          sql.push_str("DO NOTHING");
        } else {
          sql.push_str("DO UPDATE SET ");
          sql.push_str(&updates.join(", "));
        }
      }
    }

    if self.returning {
      render_returning(&mut sql, table);
    }

    Ok(Statement {
      sql,
      params,
      kind: StatementKind::Write,
      returns_rows: self.returning,
      reads: BTreeSet::new(),
      writes: BTreeSet::from([name]),
    })
  }
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// An update of rows in the table backing `R`.
#[derive(Debug, Clone)]
pub struct Update<R> {
  set:       Vec<(&'static str, Expr)>,
  filter:    Option<Expr>,
  returning: bool,
  _marker:   PhantomData<fn() -> R>,
}

impl<R: Record> Default for Update<R> {
  fn default() -> Self {
    Self { set: Vec::new(), filter: None, returning: false, _marker: PhantomData }
  }
}

impl<R: Record> Update<R> {
  pub fn new() -> Self { Self::default() }

  /// Rewrite every non-key column of the row identified by `record`'s key.
  pub fn record(record: &R) -> Self {
    let table = R::table();
    let mut update = Self::new();
    for a in record.values() {
      if !table.primary_key().contains(&a.column) {
        update.set.push((a.column, Expr::Value(a.value)));
      }
    }
    update.filter = pk_filter(table, record.primary_key());
    update
  }

  pub fn set<T: ColumnValue>(mut self, col: Col<R, T>, value: T) -> Self {
    self.set.push((col.name(), Expr::Value(value.encode())));
    self
  }

  /// Assign the result of an expression, e.g. `NOT is_completed`.
  pub fn set_expr<T: ColumnValue>(mut self, col: Col<R, T>, expr: Expr) -> Self {
    self.set.push((col.name(), expr));
    self
  }

  /// Restrict the updated rows; repeated calls are combined with `AND`.
  pub fn filter(mut self, expr: Expr) -> Self {
    self.filter = Some(match self.filter {
      Some(existing) => existing.and(expr),
      None => expr,
    });
    self
  }

  pub fn returning(mut self) -> Self {
    self.returning = true;
    self
  }

  pub fn build(self) -> Result<Statement> {
    let table = R::table();
    let name = table.name();
    let scope = Scope::new(table);

    if self.set.is_empty() {
      return Err(Error::InvalidStatement(format!("update of {name} sets no columns")));
    }

    let mut seen = BTreeSet::new();
    for (column, expr) in &self.set {
      let column = *column;
      let def = column_of(table, column)?;
      if !seen.insert(column) {
        return Err(Error::DuplicateAssignment { table: name, column });
      }
      match expr {
        Expr::Value(v) => check_value(name, def, v)?,
        other => scope.check(other)?,
      }
    }
    if let Some(filter) = &self.filter {
      scope.check(filter)?;
    }

    let mut sql = format!("UPDATE {} SET ", quote_ident(name));
    let mut params = Vec::new();
    for (i, (column, expr)) in self.set.iter().enumerate() {
      if i > 0 {
        sql.push_str(", ");
      }
      sql.push_str(&quote_ident(column));
      sql.push_str(" = ");
      expr.render(&mut sql, &mut params, true);
    }
    if let Some(filter) = &self.filter {
      sql.push_str(" WHERE ");
      filter.render(&mut sql, &mut params, true);
    }
    if self.returning {
      render_returning(&mut sql, table);
    }

    Ok(Statement {
      sql,
      params,
      kind: StatementKind::Write,
      returns_rows: self.returning,
      reads: BTreeSet::from([name]),
      writes: BTreeSet::from([name]),
    })
  }
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// A delete from the table backing `R`. Foreign-key policies declared on
/// referencing tables are applied by the storage engine.
#[derive(Debug, Clone)]
pub struct Delete<R> {
  filter:  Option<Expr>,
  _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Default for Delete<R> {
  fn default() -> Self { Self { filter: None, _marker: PhantomData } }
}

impl<R: Record> Delete<R> {
  /// Delete every row unless restricted with [`filter`](Self::filter).
  pub fn new() -> Self { Self::default() }

  /// Delete the row identified by `record`'s key.
  pub fn record(record: &R) -> Self {
    Self { filter: pk_filter(R::table(), record.primary_key()), _marker: PhantomData }
  }

  pub fn filter(mut self, expr: Expr) -> Self {
    self.filter = Some(match self.filter {
      Some(existing) => existing.and(expr),
      None => expr,
    });
    self
  }

  pub fn build(self) -> Result<Statement> {
    let table = R::table();
    let name = table.name();
    let scope = Scope::new(table);

    let mut sql = format!("DELETE FROM {}", quote_ident(name));
    let mut params = Vec::new();
    if let Some(filter) = &self.filter {
      scope.check(filter)?;
      sql.push_str(" WHERE ");
      filter.render(&mut sql, &mut params, true);
    }

    Ok(Statement {
      sql,
      params,
      kind: StatementKind::Write,
      returns_rows: false,
      reads: BTreeSet::from([name]),
      writes: BTreeSet::from([name]),
    })
  }
}

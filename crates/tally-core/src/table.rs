//! Table and column descriptors, and the registration builder that produces
//! them.
//!
//! Descriptors are immutable once built. Each record type builds its
//! descriptor exactly once (see [`Record::table`](crate::record::Record::table))
//! and every statement referencing the type reuses it.

use std::{collections::BTreeSet, marker::PhantomData};

use crate::{
  Error, Result,
  column::{ColumnType, ColumnValue},
  record::{Col, Record},
  value::{StorageClass, Value},
};

// ─── Foreign keys ────────────────────────────────────────────────────────────

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
  Cascade,
  SetNull,
  Restrict,
}

impl OnDelete {
  pub fn sql(self) -> &'static str {
    match self {
      OnDelete::Cascade => "CASCADE",
      OnDelete::SetNull => "SET NULL",
      OnDelete::Restrict => "RESTRICT",
    }
  }

  /// Whether deleting a referenced row rewrites or removes referencing rows.
  pub fn propagates(self) -> bool { !matches!(self, OnDelete::Restrict) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
  pub table:     &'static str,
  pub column:    &'static str,
  pub on_delete: OnDelete,
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
  pub name:           &'static str,
  pub ty:             ColumnType,
  pub nullable:       bool,
  pub primary_key:    bool,
  /// Filled in by the store (rowid alias or a declared default).
  pub store_assigned: bool,
  pub unique:         bool,
  pub default:        Option<Value>,
  pub references:     Option<ForeignKey>,
}

impl ColumnDef {
  pub fn storage_class(&self) -> StorageClass { self.ty.storage_class() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
  name:        &'static str,
  columns:     Vec<ColumnDef>,
  primary_key: Vec<&'static str>,
  unique_sets: Vec<Vec<&'static str>>,
}

impl TableDef {
  /// Start describing the table backing record `R`.
  pub fn builder<R: Record>() -> TableBuilder<R> {
    TableBuilder {
      columns:     Vec::new(),
      primary_key: Vec::new(),
      unique_sets: Vec::new(),
      errors:      Vec::new(),
      _marker:     PhantomData,
    }
  }

  pub fn name(&self) -> &'static str { self.name }

  pub fn columns(&self) -> &[ColumnDef] { &self.columns }

  pub fn column(&self, name: &str) -> Option<&ColumnDef> {
    self.columns.iter().find(|c| c.name == name)
  }

  /// Primary-key column names in key order.
  pub fn primary_key(&self) -> &[&'static str] { &self.primary_key }

  pub fn unique_sets(&self) -> &[Vec<&'static str>] { &self.unique_sets }

  /// The columns a draft supplies: everything the store does not assign.
  pub fn draft_columns(&self) -> impl Iterator<Item = &ColumnDef> {
    self.columns.iter().filter(|c| !c.store_assigned)
  }

  /// Declared default for `column`, if any.
  pub fn default_value(&self, column: &str) -> Option<&Value> {
    self.column(column).and_then(|c| c.default.as_ref())
  }

  pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnDef, &ForeignKey)> {
    self
      .columns
      .iter()
      .filter_map(|c| c.references.as_ref().map(|fk| (c, fk)))
  }

  /// Whether `columns` (in any order) form the primary key or a unique set.
  pub fn is_unique_key(&self, columns: &[&str]) -> bool {
    let wanted: BTreeSet<&str> = columns.iter().copied().collect();
    let matches = |set: &[&'static str]| {
      set.len() == wanted.len() && set.iter().all(|c| wanted.contains(c))
    };
    matches(&self.primary_key)
      || self.unique_sets.iter().any(|s| matches(s))
      || (columns.len() == 1
        && self.column(columns[0]).is_some_and(|c| c.unique))
  }

  /// `CREATE TABLE IF NOT EXISTS` DDL for this table.
  pub fn create_sql(&self) -> String {
    let single_pk = (self.primary_key.len() == 1).then(|| self.primary_key[0]);
    let mut lines: Vec<String> = Vec::new();

    for c in &self.columns {
      let mut line = format!("{} {}", quote_ident(c.name), c.storage_class().sql_type());
      if single_pk == Some(c.name) {
        // SQLite lets non-integer primary keys hold NULL unless told otherwise.
        line.push_str(match c.storage_class() {
          StorageClass::Integer => " PRIMARY KEY",
          _ => " PRIMARY KEY NOT NULL",
        });
      } else if !c.nullable {
        line.push_str(" NOT NULL");
      }
      if c.unique {
        line.push_str(" UNIQUE");
      }
      if let Some(default) = &c.default {
        line.push_str(&format!(" DEFAULT {}", default.to_sql_literal()));
      }
      if let Some(check) = check_constraint(c) {
        line.push_str(&format!(" CHECK ({check})"));
      }
      if let Some(fk) = &c.references {
        line.push_str(&format!(
          " REFERENCES {}({}) ON DELETE {}",
          quote_ident(fk.table),
          quote_ident(fk.column),
          fk.on_delete.sql()
        ));
      }
      lines.push(line);
    }

    if single_pk.is_none() {
      lines.push(format!("PRIMARY KEY ({})", ident_list(&self.primary_key)));
    }
    for set in &self.unique_sets {
      lines.push(format!("UNIQUE ({})", ident_list(set)));
    }

    format!(
      "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
      quote_ident(self.name),
      lines.join(",\n    ")
    )
  }
}

fn check_constraint(c: &ColumnDef) -> Option<String> {
  let name = quote_ident(c.name);
  match c.ty {
    ColumnType::Boolean => Some(format!("{name} IN (0, 1)")),
    ColumnType::Enum(cases) => {
      let list: Vec<String> = cases.iter().map(i64::to_string).collect();
      Some(format!("{name} IN ({})", list.join(", ")))
    }
    _ => None,
  }
}

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

fn ident_list(names: &[&str]) -> String {
  names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", ")
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Registration builder for the table backing `R`.
///
/// Problems are collected while building and reported together by
/// [`TableBuilder::build`].
pub struct TableBuilder<R> {
  columns:     Vec<ColumnDef>,
  primary_key: Vec<&'static str>,
  unique_sets: Vec<Vec<&'static str>>,
  errors:      Vec<String>,
  _marker:     PhantomData<fn() -> R>,
}

/// Options for a single column, typed by the column's Rust type.
pub struct ColumnSpec<T> {
  def:     ColumnDef,
  _marker: PhantomData<fn() -> T>,
}

impl<T: ColumnValue> ColumnSpec<T> {
  pub fn primary_key(mut self) -> Self {
    self.def.primary_key = true;
    self
  }

  /// The store fills this column in; drafts never carry it.
  pub fn store_assigned(mut self) -> Self {
    self.def.store_assigned = true;
    self
  }

  pub fn unique(mut self) -> Self {
    self.def.unique = true;
    self
  }

  pub fn default(mut self, value: T) -> Self {
    self.def.default = Some(value.encode());
    self
  }

  /// Reference `target`. The target's table and column are validated when
  /// the [`Schema`](crate::schema::Schema) is assembled.
  pub fn references<P: Record, U: ColumnValue>(
    mut self,
    target: Col<P, U>,
    on_delete: OnDelete,
  ) -> Self {
    self.def.references = Some(ForeignKey {
      table: P::TABLE,
      column: target.name(),
      on_delete,
    });
    self
  }
}

impl<R: Record> TableBuilder<R> {
  /// Register a column with no extra options.
  pub fn column<T: ColumnValue>(self, col: Col<R, T>) -> Self {
    self.column_with(col, |c| c)
  }

  /// Register a column, adjusting its options through `f`.
  pub fn column_with<T: ColumnValue>(
    mut self,
    col: Col<R, T>,
    f: impl FnOnce(ColumnSpec<T>) -> ColumnSpec<T>,
  ) -> Self {
    let spec = f(ColumnSpec {
      def:     ColumnDef {
        name:           col.name(),
        ty:             T::TYPE,
        nullable:       T::NULLABLE,
        primary_key:    false,
        store_assigned: false,
        unique:         false,
        default:        None,
        references:     None,
      },
      _marker: PhantomData,
    });
    if spec.def.primary_key {
      self.primary_key.push(spec.def.name);
    }
    self.columns.push(spec.def);
    self
  }

  /// Declare a composite primary key.
  pub fn primary_key(mut self, columns: &[&'static str]) -> Self {
    if !self.primary_key.is_empty() {
      self.errors.push("primary key declared more than once".into());
    }
    self.primary_key = columns.to_vec();
    self
  }

  /// Declare a multi-column uniqueness constraint.
  pub fn unique(mut self, columns: &[&'static str]) -> Self {
    self.unique_sets.push(columns.to_vec());
    self
  }

  pub fn build(self) -> Result<TableDef> {
    let table = R::TABLE;
    let mut errors = self.errors;

    if table.is_empty() {
      errors.push("table name is empty".into());
    }
    if self.columns.is_empty() {
      errors.push("no columns".into());
    }

    let mut seen = BTreeSet::new();
    for c in &self.columns {
      if c.name.is_empty() {
        errors.push("column name is empty".into());
      }
      if !seen.insert(c.name) {
        errors.push(format!("column {:?} declared twice", c.name));
      }
    }

    if self.primary_key.is_empty() {
      errors.push("no primary key".into());
    }
    for pk in &self.primary_key {
      match self.columns.iter().find(|c| c.name == *pk) {
        None => errors.push(format!("primary key names unknown column {pk:?}")),
        Some(c) if c.nullable => {
          errors.push(format!("primary key column {pk:?} is nullable"))
        }
        Some(_) => {}
      }
    }
    for set in &self.unique_sets {
      for name in set {
        if !seen.contains(name) {
          errors.push(format!("unique set names unknown column {name:?}"));
        }
      }
    }

    let rowid_alias = |c: &ColumnDef| {
      self.primary_key.len() == 1
        && self.primary_key[0] == c.name
        && c.storage_class() == StorageClass::Integer
    };

    for c in &self.columns {
      if c.store_assigned && !rowid_alias(c) && c.default.is_none() {
        errors.push(format!(
          "store-assigned column {:?} is neither the integer primary key nor defaulted",
          c.name
        ));
      }
      if let Some(default) = &c.default
        && (default.is_null()
          || !c.ty.accepts(default)
          || matches!(default, Value::Real(r) if !r.is_finite()))
      {
        errors.push(format!("default {default} does not fit column {:?}", c.name));
      }
      if let Some(fk) = &c.references
        && fk.on_delete == OnDelete::SetNull
        && !c.nullable
      {
        errors.push(format!(
          "column {:?} uses ON DELETE SET NULL but is not nullable",
          c.name
        ));
      }
    }

    if !errors.is_empty() {
      return Err(Error::InvalidTable { table, reason: errors.join("; ") });
    }

    Ok(TableDef {
      name:        table,
      columns:     self.columns,
      primary_key: self.primary_key,
      unique_sets: self.unique_sets,
    })
  }
}

//! The schema registry.
//!
//! A [`Schema`] is assembled once at startup from the record types an
//! application uses, validated as a whole, and then shared read-only (behind
//! an `Arc`) by the store. Tests build their own schema and inject it.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  Error, Result,
  record::Record,
  table::{OnDelete, TableDef},
};

#[derive(Debug, Clone, Default)]
pub struct Schema {
  tables:     Vec<&'static TableDef>,
  /// referenced table → (referencing table, policy)
  dependents: BTreeMap<&'static str, Vec<(&'static str, OnDelete)>>,
}

#[derive(Default)]
pub struct SchemaBuilder {
  tables: Vec<&'static TableDef>,
}

impl SchemaBuilder {
  /// Add the table backing `R`, forcing its descriptor to be built.
  pub fn register<R: Record>(mut self) -> Self {
    self.tables.push(R::table());
    self
  }

  pub fn build(self) -> Result<Schema> {
    let mut errors: Vec<String> = Vec::new();
    let mut names = BTreeSet::new();
    for t in &self.tables {
      if !names.insert(t.name()) {
        errors.push(format!("table {:?} registered twice", t.name()));
      }
    }

    let mut dependents: BTreeMap<&'static str, Vec<(&'static str, OnDelete)>> =
      BTreeMap::new();

    for t in &self.tables {
      for (column, fk) in t.foreign_keys() {
        let here = format!("{}.{}", t.name(), column.name);
        let Some(target) = self.tables.iter().find(|x| x.name() == fk.table) else {
          errors.push(format!("{here} references unregistered table {:?}", fk.table));
          continue;
        };
        let Some(target_col) = target.column(fk.column) else {
          errors.push(format!("{here} references unknown column {}.{}", fk.table, fk.column));
          continue;
        };
        if !target.is_unique_key(&[fk.column]) {
          errors.push(format!(
            "{here} references {}.{}, which is neither primary key nor unique",
            fk.table, fk.column
          ));
        }
        if target_col.storage_class() != column.storage_class() {
          errors.push(format!(
            "{here} is {:?} but {}.{} is {:?}",
            column.storage_class(),
            fk.table,
            fk.column,
            target_col.storage_class()
          ));
        }
        dependents.entry(fk.table).or_default().push((t.name(), fk.on_delete));
      }
    }

    if !errors.is_empty() {
      return Err(Error::InvalidSchema(errors.join("; ")));
    }

    Ok(Schema { tables: self.tables, dependents })
  }
}

impl Schema {
  pub fn builder() -> SchemaBuilder { SchemaBuilder::default() }

  pub fn table(&self, name: &str) -> Option<&'static TableDef> {
    self.tables.iter().copied().find(|t| t.name() == name)
  }

  /// Registered tables in registration order.
  pub fn tables(&self) -> impl Iterator<Item = &'static TableDef> + '_ {
    self.tables.iter().copied()
  }

  /// Every table whose rows can change when rows of `written` change: the
  /// tables themselves plus everything reachable through cascading or
  /// set-null foreign keys.
  pub fn affected_by<'a>(
    &self,
    written: impl IntoIterator<Item = &'a &'static str>,
  ) -> BTreeSet<&'static str> {
    let mut out: BTreeSet<&'static str> = BTreeSet::new();
    let mut pending: Vec<&'static str> = written.into_iter().copied().collect();
    while let Some(table) = pending.pop() {
      if !out.insert(table) {
        continue;
      }
      for (dependent, policy) in self.dependents.get(table).into_iter().flatten() {
        if policy.propagates() {
          pending.push(*dependent);
        }
      }
    }
    out
  }

  /// Registered tables ordered so that every table follows the tables it
  /// references. Self-references and cycles fall back to registration order.
  pub fn creation_order(&self) -> Vec<&'static TableDef> {
    let mut placed: Vec<&'static TableDef> = Vec::new();
    let mut remaining: Vec<&'static TableDef> = self.tables.clone();
    while !remaining.is_empty() {
      let before = remaining.len();
      remaining.retain(|t| {
        let ready = t.foreign_keys().all(|(_, fk)| {
          fk.table == t.name() || placed.iter().any(|p| p.name() == fk.table)
        });
        if ready {
          placed.push(*t);
        }
        !ready
      });
      if remaining.len() == before {
        placed.append(&mut remaining);
      }
    }
    placed
  }
}

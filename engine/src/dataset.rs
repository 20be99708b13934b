//! Data sets: named tables plus the relations between them.

use crate::{
    error::Result, relation, Error, MergeConfiguration, MergeMode, Merger, Relation,
    RelationValidationOptions, RelationViolation, Table, TableName,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A set of tables, keyed by name in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    tables: IndexMap<TableName, Table>,
    relations: Vec<Relation>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Names are unique and case-sensitive.
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(Error::DuplicateTable(table.name().to_string()));
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Like [`DataSet::table`], failing with `TableNotFound`.
    pub fn require_table(&self, name: &str) -> Result<&Table> {
        self.table(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Remove a table together with every relation touching it.
    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        let table = self.tables.shift_remove(name)?;
        self.relations
            .retain(|r| r.parent_table != name && r.child_table != name);
        Some(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Add a relation. Its tables and columns are not checked here; see
    /// [`DataSet::validate_relations`].
    pub fn add_relation(&mut self, relation: Relation) -> Result<()> {
        if self.relation(&relation.name).is_some() {
            return Err(Error::DuplicateRelation(relation.name));
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Whether any table has pending changes.
    pub fn has_changes(&self) -> bool {
        self.tables.values().any(Table::has_changes)
    }

    /// Commit pending changes in every table.
    pub fn accept_changes(&mut self) {
        for table in self.tables.values_mut() {
            table.accept_changes();
        }
    }

    /// Revert pending changes in every table.
    pub fn reject_changes(&mut self) {
        for table in self.tables.values_mut() {
            table.reject_changes();
        }
    }

    /// A copy holding only the rows with pending changes.
    ///
    /// Every table and relation is kept, so the result has the same shape
    /// as this set. This is what gets sent to a backend, and what the backend
    /// hands back as the changeset for a [`MergeMode::PostSave`] merge.
    pub fn changes(&self) -> DataSet {
        DataSet {
            tables: self
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.changes()))
                .collect(),
            relations: self.relations.clone(),
        }
    }

    /// Merge `refreshed` into this set.
    ///
    /// Shorthand for [`Merger::merge_set`].
    pub fn merge(
        &mut self,
        refreshed: &DataSet,
        mode: MergeMode,
        config: &mut MergeConfiguration,
    ) -> Result<()> {
        Merger::new(mode).merge_set(self, refreshed, config)
    }

    /// Check referential integrity of every relation.
    pub fn validate_relations(&self, options: &RelationValidationOptions) -> Vec<RelationViolation> {
        relation::validate_relations(self, options)
    }

    /// Table names, parents before children.
    pub fn ordered_table_names(&self) -> Vec<TableName> {
        let names: Vec<&str> = self.table_names().collect();
        relation::ordered_table_names(&self.relations, &names)
    }
}

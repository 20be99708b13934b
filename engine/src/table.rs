//! Tables: ordered columns, ordered rows, an optional primary key.

use crate::{
    error::Result,
    row::{Values, CLIENT_KEY_COLUMN},
    Column, ColumnName, Error, Row, RowState, TableName, Value,
};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A named table of change-tracked rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    name: TableName,
    columns: Vec<Column>,
    rows: Vec<Row>,
    primary_key: Vec<ColumnName>,
}

impl Table {
    /// Create an empty table with no columns.
    pub fn new(name: impl Into<TableName>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Create a table from column metadata.
    ///
    /// The primary key is made of the columns flagged `primary_key`, in
    /// column order.
    pub fn with_columns(name: impl Into<TableName>, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new(name);
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Create an empty table with the same name, columns and key as this one.
    pub fn clone_schema(&self) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
            primary_key: self.primary_key.clone(),
        }
    }

    /// Append a column.
    pub fn add_column(&mut self, column: Column) -> Result<&mut Self> {
        if self.column(&column.name).is_some() {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: column.name,
            });
        }
        if column.primary_key {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Replace the primary key with an explicit list of column names.
    ///
    /// An empty list makes the table keyless.
    pub fn set_primary_key<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<()> {
        for name in columns {
            self.require_column(name.as_ref())?;
        }
        self.primary_key = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name (case-sensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key column names, empty for keyless tables.
    pub fn primary_key(&self) -> &[ColumnName] {
        &self.primary_key
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Mutable access to a row, restricted to this table's columns.
    pub fn row_mut(&mut self, index: usize) -> Option<RowMut<'_>> {
        let columns = &self.columns;
        let table = &self.name;
        self.rows.get_mut(index).map(|row| RowMut {
            table,
            columns,
            row,
        })
    }

    /// Number of rows, including rows marked deleted.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A detached blank row in state `Added`: every column null.
    pub fn new_row(&self) -> Row {
        let values = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect();
        self.stamp_client_key(Row::with_state(values, RowState::Added))
    }

    /// A detached row in state `Added` with every column set to its default
    /// value (see [`Column::default_value`]).
    pub fn new_row_with_defaults(&self) -> Row {
        let values = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.default_value()))
            .collect();
        self.stamp_client_key(Row::with_state(values, RowState::Added))
    }

    fn stamp_client_key(&self, mut row: Row) -> Row {
        if self.has_column(CLIENT_KEY_COLUMN) {
            let key = row.client_key();
            row.set_client_key(key);
        }
        row
    }

    /// Append a row, returning its index.
    ///
    /// Every value must belong to a column of this table.
    pub fn add_row(&mut self, row: Row) -> Result<usize> {
        for column in row.values().keys() {
            self.require_column(column)?;
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Insert a locally created row built from `values` on top of a blank row.
    pub fn insert<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> Result<usize>
    where
        K: Into<ColumnName>,
        V: Into<Value>,
    {
        let mut row = self.new_row();
        for (column, value) in values {
            let column = column.into();
            self.require_column(&column)?;
            row.set(&column, value.into())?;
        }
        self.add_row(row)
    }

    /// Append a row loaded from an external source, in state `Unchanged`.
    pub fn load<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> Result<usize>
    where
        K: Into<ColumnName>,
        V: Into<Value>,
    {
        self.add_row(Row::loaded(values))
    }

    /// Assign a value to a column of the row at `index`.
    pub fn set_value(&mut self, index: usize, column: &str, value: impl Into<Value>) -> Result<()> {
        let table = self.name.clone();
        self.row_mut(index)
            .ok_or(Error::RowIndexOutOfBounds { table, index })?
            .set(column, value)
    }

    /// Mark the row at `index` deleted.
    pub fn delete_row(&mut self, index: usize) -> Result<()> {
        let table = self.name.clone();
        self.rows
            .get_mut(index)
            .ok_or(Error::RowIndexOutOfBounds { table, index })?
            .delete()
    }

    /// Consume the table, keeping only its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub(crate) fn push_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub(crate) fn clear_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    /// Whether any row has pending changes.
    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(Row::has_changes)
    }

    /// Number of rows with pending changes.
    pub fn pending_count(&self) -> usize {
        self.rows.iter().filter(|r| r.has_changes()).count()
    }

    /// Commit every pending change.
    ///
    /// Deleted rows are removed, added and modified rows become `Unchanged`.
    /// This is the only way rows marked deleted leave the table.
    pub fn accept_changes(&mut self) {
        self.rows.retain(|row| !row.is_deleted());
        for row in &mut self.rows {
            row.force_state(RowState::Unchanged);
        }
    }

    /// Revert every pending change.
    ///
    /// Added rows (and rows deleted before they were ever committed) are
    /// removed; modified and deleted rows get their original values back.
    pub fn reject_changes(&mut self) {
        self.rows
            .retain(|row| row.state() != RowState::Added && !row.is_uncommitted_delete());
        for row in &mut self.rows {
            row.restore_original();
        }
    }

    /// A copy of this table holding only rows with pending changes.
    pub fn changes(&self) -> Table {
        let mut table = self.clone_schema();
        table.rows = self
            .rows
            .iter()
            .filter(|r| r.has_changes())
            .cloned()
            .collect();
        table
    }

    /// Check every column of a row against its definition.
    ///
    /// Advisory only; nothing in the engine calls this implicitly.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        for column in &self.columns {
            column.validate(row.get(&column.name))?;
        }
        Ok(())
    }

    fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(Error::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
        }
    }
}

/// Mutable handle to a row that keeps edits within the table's columns.
#[derive(Debug)]
pub struct RowMut<'a> {
    table: &'a TableName,
    columns: &'a [Column],
    row: &'a mut Row,
}

impl RowMut<'_> {
    /// Assign a field value, following the row state machine.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        if !self.columns.iter().any(|c| c.name == column) {
            return Err(Error::ColumnNotFound {
                table: self.table.clone(),
                column: column.to_string(),
            });
        }
        self.row.set(column, value.into())
    }

    /// Assign several values at once.
    pub fn set_all<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (column, value) in values {
            self.set(column.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn delete(&mut self) -> Result<()> {
        self.row.delete()
    }

    pub fn accept_changes(&mut self) -> Result<()> {
        self.row.accept_changes()
    }

    pub fn reject_changes(&mut self) -> Result<()> {
        self.row.reject_changes()
    }
}

impl Deref for RowMut<'_> {
    type Target = Row;

    fn deref(&self) -> &Row {
        self.row
    }
}

/// Values of `row` laid out over the columns of `table`, in column order.
///
/// Columns the row has no value for get their default.
pub(crate) fn project(table: &Table, row: &Row) -> Values {
    table
        .columns
        .iter()
        .map(|c| {
            let value = row.get(&c.name).cloned().unwrap_or_else(|| c.default_value());
            (c.name.clone(), value)
        })
        .collect()
}

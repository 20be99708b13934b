//! Merge configuration.
//!
//! [`MergeOptions`] holds the plain, serializable switches; the
//! [`MergeConfiguration`] adds per-table handler overrides and owns the
//! [`MergeResult`] that a whole merge call accumulates into.

use crate::{
    error::Result, handler::DefaultMergeHandler, ColumnName, Error, MergeHandler, MergeResult,
    TableName,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Plain merge switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Tables left out of the merge entirely
    pub excluded_tables: HashSet<TableName>,
    /// Tables whose rows are never deleted because the refreshed data
    /// lacks them
    pub no_delete_tables: HashSet<TableName>,
    /// Primary key columns to use instead of the table's own key
    pub primary_key_overrides: HashMap<TableName, Vec<ColumnName>>,
    /// Reload keyless tables wholesale instead of failing in modes that need
    /// a primary key
    pub replace_all_rows_when_no_primary_key: bool,
    /// Tables removed from the current set when their refreshed counterpart
    /// is missing or empty
    pub prune_tables: HashSet<TableName>,
}

impl MergeOptions {
    /// Reject options that can never be applied.
    pub fn validate(&self) -> Result<()> {
        for (table, columns) in &self.primary_key_overrides {
            if columns.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "primary key override for '{table}' lists no columns"
                )));
            }
        }
        Ok(())
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.excluded_tables.contains(table)
    }

    pub fn keeps_missing_rows(&self, table: &str) -> bool {
        self.no_delete_tables.contains(table)
    }

    pub fn is_prunable(&self, table: &str) -> bool {
        self.prune_tables.contains(table)
    }
}

/// Everything a merge call needs besides the two snapshots.
#[derive(Default)]
pub struct MergeConfiguration {
    pub options: MergeOptions,
    handlers: HashMap<TableName, Box<dyn MergeHandler>>,
    /// Accumulates every change made by merges using this configuration
    pub result: MergeResult,
}

impl MergeConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from plain options.
    pub fn with_options(options: MergeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Builder: leave `table` out of merges.
    pub fn exclude_table(mut self, table: impl Into<TableName>) -> Self {
        self.options.excluded_tables.insert(table.into());
        self
    }

    /// Builder: never delete rows of `table` that the refreshed data lacks.
    pub fn keep_missing_rows(mut self, table: impl Into<TableName>) -> Self {
        self.options.no_delete_tables.insert(table.into());
        self
    }

    /// Builder: correlate rows of `table` by `columns`.
    pub fn primary_key_override<S: Into<ColumnName>>(
        mut self,
        table: impl Into<TableName>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.options
            .primary_key_overrides
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Builder: reload keyless tables instead of failing.
    pub fn replace_keyless_tables(mut self, replace: bool) -> Self {
        self.options.replace_all_rows_when_no_primary_key = replace;
        self
    }

    /// Builder: drop `table` when its refreshed counterpart is missing or
    /// empty.
    pub fn prune_table(mut self, table: impl Into<TableName>) -> Self {
        self.options.prune_tables.insert(table.into());
        self
    }

    /// Builder: merge `table` with a custom handler.
    pub fn with_handler(
        mut self,
        table: impl Into<TableName>,
        handler: impl MergeHandler + 'static,
    ) -> Self {
        self.handlers.insert(table.into(), Box::new(handler));
        self
    }

    /// The handler used for `table`.
    pub fn handler_for(&self, table: &str) -> &dyn MergeHandler {
        handler_for(&self.handlers, table)
    }

    /// Split into the parts a merge borrows independently.
    pub(crate) fn parts(&mut self) -> (&MergeOptions, &HandlerMap, &mut MergeResult) {
        (&self.options, &self.handlers, &mut self.result)
    }
}

impl std::fmt::Debug for MergeConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<_> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("MergeConfiguration")
            .field("options", &self.options)
            .field("handlers", &handlers)
            .field("result", &self.result)
            .finish()
    }
}

pub(crate) type HandlerMap = HashMap<TableName, Box<dyn MergeHandler>>;

pub(crate) fn handler_for<'a>(handlers: &'a HandlerMap, table: &str) -> &'a dyn MergeHandler {
    match handlers.get(table) {
        Some(handler) => handler.as_ref(),
        None => &DefaultMergeHandler,
    }
}

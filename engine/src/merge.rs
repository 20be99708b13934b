//! The merge engine.
//!
//! Reconciles a current snapshot with a refreshed one, table by table.
//!
//! # Algorithm
//!
//! For each table not excluded by the configuration, in relation order
//! (parents before children):
//!
//! 1. Check the mode's preconditions (clean table, usable primary key)
//! 2. Index refreshed rows by primary key and, if the mode asks for it,
//!    by client key
//! 3. Pair every current row with its refreshed counterpart and let the
//!    policy decide: overwrite, keep, or delete
//! 4. Append refreshed rows nobody claimed
//! 5. Record every added, updated and deleted row in the [`MergeResult`]
//!
//! `Replace` skips steps 2–4 and reloads the table wholesale.

use crate::{
    config::{handler_for, MergeConfiguration},
    error::Result,
    identity::{composite_key, effective_primary_key, CompositeKey, IdentityIndex},
    ordered_table_names,
    table::project,
    Column, ColumnName, DataSet, Error, MergeHandler, MergeMode, MergeOptions, MergePolicy, Row,
    RowState, Table, TableName,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// A row touched by a merge, as it looked when the change was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowChange {
    /// Table the row belongs (or belonged) to
    pub table: TableName,
    /// Snapshot of the row
    pub row: Row,
}

/// Rows added, updated and deleted by one or more merges.
///
/// Entries are in the order the engine made the changes, so an observer can
/// replay them as notifications without diffing the snapshots itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Rows appended to a current table, as they were after the merge
    pub added: Vec<RowChange>,
    /// Current rows whose values were overwritten or which were accepted
    pub updated: Vec<RowChange>,
    /// Rows physically removed from a current table, as they were before
    pub deleted: Vec<RowChange>,
}

impl MergeResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row added to `table`.
    pub fn record_added(&mut self, table: &str, row: Row) {
        self.added.push(RowChange {
            table: table.to_string(),
            row,
        });
    }

    /// Record a row of `table` updated in place.
    pub fn record_updated(&mut self, table: &str, row: Row) {
        self.updated.push(RowChange {
            table: table.to_string(),
            row,
        });
    }

    /// Record a row removed from `table`.
    pub fn record_deleted(&mut self, table: &str, row: Row) {
        self.deleted.push(RowChange {
            table: table.to_string(),
            row,
        });
    }

    /// Total number of recorded changes.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes recorded for one table, as `(added, updated, deleted)`.
    pub fn for_table<'a>(
        &'a self,
        table: &'a str,
    ) -> (
        impl Iterator<Item = &'a Row> + 'a,
        impl Iterator<Item = &'a Row> + 'a,
        impl Iterator<Item = &'a Row> + 'a,
    ) {
        let pick = move |changes: &'a [RowChange]| {
            changes
                .iter()
                .filter(move |c| c.table == table)
                .map(|c| &c.row)
        };
        (
            pick(self.added.as_slice()),
            pick(self.updated.as_slice()),
            pick(self.deleted.as_slice()),
        )
    }

    /// Forget every recorded change.
    pub fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.deleted.clear();
    }
}

/// What merging one row did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowMergeOutcome {
    /// At least one value differed and was overwritten
    pub changed: bool,
    /// The row was accepted afterwards
    pub accepted: bool,
}

impl RowMergeOutcome {
    /// Whether the merge is worth reporting as an update.
    pub fn is_update(&self) -> bool {
        self.changed || self.accepted
    }
}

/// State shared by a table merge with its handler.
#[derive(Debug)]
pub struct MergeContext<'a> {
    pub policy: MergePolicy,
    pub options: &'a MergeOptions,
    pub result: &'a mut MergeResult,
}

/// Runs merges in one [`MergeMode`].
#[derive(Debug, Clone, Copy)]
pub struct Merger {
    policy: MergePolicy,
}

impl Merger {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            policy: mode.policy(),
        }
    }

    pub fn mode(&self) -> MergeMode {
        self.policy.mode
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Merge a single table.
    pub fn merge_table(
        &self,
        current: &mut Table,
        refreshed: &Table,
        config: &mut MergeConfiguration,
    ) -> Result<()> {
        let (options, handlers, result) = config.parts();
        options.validate()?;
        let handler = handler_for(handlers, current.name());
        let mut ctx = MergeContext {
            policy: self.policy,
            options,
            result,
        };
        self.run_table(handler, current, refreshed, &mut ctx)
    }

    /// Merge a whole data set.
    ///
    /// Tables are processed parents first. A failure stops the merge
    /// immediately; tables merged before the failing one keep their changes.
    pub fn merge_set(
        &self,
        current: &mut DataSet,
        refreshed: &DataSet,
        config: &mut MergeConfiguration,
    ) -> Result<()> {
        let (options, handlers, result) = config.parts();
        options.validate()?;

        let names: Vec<TableName> = current.table_names().map(str::to_string).collect();
        let order = ordered_table_names(current.relations(), &names);
        debug!(mode = %self.mode(), tables = order.len(), "merging data set");

        for name in &order {
            if options.is_excluded(name) {
                trace!(table = %name, "excluded from merge");
                continue;
            }
            let source = refreshed.table(name);
            if options.is_prunable(name) && source.map_or(true, Table::is_empty) {
                if let Some(table) = current.remove_table(name) {
                    debug!(table = %name, rows = table.len(), "pruning table");
                    for row in table.into_rows() {
                        result.record_deleted(name, row);
                    }
                }
                continue;
            }
            let Some(source) = source else {
                trace!(table = %name, "no refreshed counterpart, left untouched");
                continue;
            };
            let Some(table) = current.table_mut(name) else {
                continue;
            };
            let handler = handler_for(handlers, name);
            let mut ctx = MergeContext {
                policy: self.policy,
                options,
                result: &mut *result,
            };
            self.run_table(handler, table, source, &mut ctx)?;
        }

        for source in refreshed.tables() {
            let name = source.name();
            if current.table(name).is_some() || options.is_excluded(name) {
                continue;
            }
            if options.is_prunable(name) && source.is_empty() {
                continue;
            }
            let mut table = source.clone_schema();
            for row in source.rows().iter().filter(|r| !r.is_deleted()) {
                let mut row = row.clone();
                row.force_state(RowState::Unchanged);
                result.record_added(name, row.clone());
                table.push_row(row);
            }
            debug!(table = %name, rows = table.len(), "adding table from refreshed data");
            current.add_table(table)?;
        }

        for relation in refreshed.relations() {
            let known = current.relation(&relation.name).is_some();
            let endpoints = current.table(&relation.parent_table).is_some()
                && current.table(&relation.child_table).is_some();
            if !known && endpoints {
                current.add_relation(relation.clone())?;
            }
        }

        debug!(
            mode = %self.mode(),
            added = result.added.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            "data set merged"
        );
        Ok(())
    }

    fn run_table(
        &self,
        handler: &dyn MergeHandler,
        current: &mut Table,
        refreshed: &Table,
        ctx: &mut MergeContext<'_>,
    ) -> Result<()> {
        let before = (
            ctx.result.added.len(),
            ctx.result.updated.len(),
            ctx.result.deleted.len(),
        );
        handler.merge_table(current, refreshed, ctx)?;
        debug!(
            table = %current.name(),
            mode = %self.mode(),
            added = ctx.result.added.len() - before.0,
            updated = ctx.result.updated.len() - before.1,
            deleted = ctx.result.deleted.len() - before.2,
            "table merged"
        );
        Ok(())
    }
}

/// The generic table merge, driven entirely by `ctx.policy`.
pub fn merge_table_default<H: MergeHandler + ?Sized>(
    handler: &H,
    current: &mut Table,
    refreshed: &Table,
    ctx: &mut MergeContext<'_>,
) -> Result<()> {
    let policy = ctx.policy;
    let table = current.name().to_string();

    if policy.full_reload {
        let keep = if ctx.options.keeps_missing_rows(&table) {
            Some(resolve_primary_key(current, ctx.options)?)
        } else {
            None
        };
        reload_rows(current, refreshed, keep.as_deref(), ctx.result);
        return Ok(());
    }

    if policy.requires_clean_table {
        let pending = current.pending_count();
        if pending > 0 {
            warn!(table = %table, pending, mode = %policy.mode, "table has pending changes");
            return Err(Error::DirtyTable { table, pending });
        }
    }

    let keep_missing = ctx.options.keeps_missing_rows(&table);
    let primary_key = resolve_primary_key(current, ctx.options)?;
    if primary_key.is_empty() && policy.requires_primary_key {
        if policy.keyless_fallback || ctx.options.replace_all_rows_when_no_primary_key {
            debug!(table = %table, mode = %policy.mode, keep_missing, "no primary key, reloading all rows");
            let keep = keep_missing.then_some(primary_key.as_slice());
            reload_rows(current, refreshed, keep, ctx.result);
            return Ok(());
        }
        warn!(table = %table, mode = %policy.mode, "no primary key to correlate rows");
        return Err(Error::MissingPrimaryKey(table));
    }
    if policy.requires_primary_key {
        check_refreshed_keys(&table, refreshed, &primary_key)?;
    }

    let columns = current.columns().to_vec();
    let index = IdentityIndex::build(refreshed.rows(), &primary_key, policy.uses_client_key);
    let mut consumed = vec![false; refreshed.len()];
    let mut remove = vec![false; current.len()];

    for (i, target) in current.rows_mut().iter_mut().enumerate() {
        let Some(j) = index.find_unclaimed(target, &primary_key, &consumed) else {
            if !keep_missing && !policy.preserve_when_missing(target.state()) {
                remove[i] = true;
            }
            continue;
        };
        consumed[j] = true;

        let source = &refreshed.rows()[j];
        if policy.applies_deleted_sources && source.is_deleted() {
            remove[i] = true;
            continue;
        }
        if target.is_deleted() || !policy.can_overwrite(target.state()) {
            trace!(table = %table, state = %target.state(), "keeping local row");
            continue;
        }
        let outcome = handler.merge_row(&columns, target, source, &policy)?;
        if outcome.is_update() {
            ctx.result.record_updated(&table, target.clone());
        }
    }

    if remove.contains(&true) {
        for (row, remove) in current.clear_rows().into_iter().zip(remove) {
            if remove {
                ctx.result.record_deleted(&table, row);
            } else {
                current.push_row(row);
            }
        }
    }

    for (j, source) in refreshed.rows().iter().enumerate() {
        if consumed[j] || source.is_deleted() {
            continue;
        }
        if !index.is_first_writer(j, source, &primary_key) {
            trace!(table = %table, "skipping refreshed row with a duplicate identity");
            continue;
        }
        let mut row = current.new_row_with_defaults();
        row.force_state(RowState::Unchanged);
        row.set_client_key(source.client_key());
        handler.merge_row(&columns, &mut row, source, &policy)?;
        ctx.result.record_added(&table, row.clone());
        current.push_row(row);
    }

    Ok(())
}

/// The generic row merge.
///
/// Walks `columns` in order and overwrites every value of `target` that
/// differs from `source`. Columns `source` has no value for are skipped.
/// The row is accepted afterwards when the policy says so; merging
/// identical values into an unchanged row leaves it untouched.
pub fn merge_row_default(
    columns: &[Column],
    target: &mut Row,
    source: &Row,
    policy: &MergePolicy,
) -> Result<RowMergeOutcome> {
    let mut changed = false;
    for column in columns {
        let Some(new) = source.get(&column.name) else {
            continue;
        };
        let same = match target.get(&column.name) {
            Some(old) => old.structurally_eq(new),
            None => new.is_null(),
        };
        if !same {
            target.set(&column.name, new.clone())?;
            changed = true;
        }
    }

    let accepted = policy.should_accept(changed, target.state());
    if accepted {
        target.accept_changes()?;
    }
    Ok(RowMergeOutcome { changed, accepted })
}

/// Reload every live refreshed row into `current` as `Unchanged`.
///
/// Existing rows are cleared first. With `keep_missing` set to the table's
/// primary key, only rows the refreshed data has a counterpart for are
/// cleared; the rest stay in front of the reloaded rows. A keyless table
/// keeps all of its rows that way.
fn reload_rows(
    current: &mut Table,
    refreshed: &Table,
    keep_missing: Option<&[ColumnName]>,
    result: &mut MergeResult,
) {
    let table = current.name().to_string();
    let reloaded: HashSet<CompositeKey> = match keep_missing {
        Some(primary_key) => refreshed
            .rows()
            .iter()
            .filter(|r| !r.is_deleted())
            .filter_map(|r| composite_key(r, primary_key))
            .collect(),
        None => HashSet::new(),
    };
    for row in current.clear_rows() {
        let kept = match keep_missing {
            Some(primary_key) => {
                composite_key(&row, primary_key).map_or(true, |key| !reloaded.contains(&key))
            }
            None => false,
        };
        if kept {
            current.push_row(row);
        } else {
            result.record_deleted(&table, row);
        }
    }
    for source in refreshed.rows().iter().filter(|r| !r.is_deleted()) {
        let mut row = Row::with_state(project(current, source), RowState::Unchanged);
        row.set_client_key(source.client_key());
        result.record_added(&table, row.clone());
        current.push_row(row);
    }
}

fn resolve_primary_key(table: &Table, options: &MergeOptions) -> Result<Vec<ColumnName>> {
    let primary_key = effective_primary_key(table, options);
    if let Some(missing) = primary_key.iter().find(|c| !table.has_column(c)) {
        return Err(Error::InvalidConfiguration(format!(
            "primary key for '{}' names unknown column '{missing}'",
            table.name()
        )));
    }
    Ok(primary_key.to_vec())
}

fn check_refreshed_keys(table: &str, refreshed: &Table, primary_key: &[ColumnName]) -> Result<()> {
    for row in refreshed.rows() {
        for column in primary_key {
            if row.get(column).map_or(true, |v| v.is_null()) {
                warn!(table = %table, column = %column, "refreshed row has a null primary key");
                return Err(Error::NullPrimaryKey {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
    }
    Ok(())
}

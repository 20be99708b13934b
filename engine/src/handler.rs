//! Pluggable per-table merge behavior.

use crate::{
    error::Result,
    merge::{merge_row_default, merge_table_default, MergeContext, RowMergeOutcome},
    Column, MergePolicy, Row, Table,
};

/// Merges one table, and one row at a time within it.
///
/// Both methods have default implementations running the generic
/// algorithms, so an override only needs to replace the part it cares
/// about. A custom `merge_row` is picked up by the default `merge_table`.
pub trait MergeHandler {
    /// Reconcile `current` with `refreshed` under `ctx.policy`, recording
    /// every change in `ctx.result`.
    fn merge_table(
        &self,
        current: &mut Table,
        refreshed: &Table,
        ctx: &mut MergeContext<'_>,
    ) -> Result<()> {
        merge_table_default(self, current, refreshed, ctx)
    }

    /// Copy values from `source` into `target` over `columns`.
    fn merge_row(
        &self,
        columns: &[Column],
        target: &mut Row,
        source: &Row,
        policy: &MergePolicy,
    ) -> Result<RowMergeOutcome> {
        merge_row_default(columns, target, source, policy)
    }
}

/// The handler used for every table without an override.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMergeHandler;

impl MergeHandler for DefaultMergeHandler {}

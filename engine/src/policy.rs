//! Merge modes and the policies that define them.
//!
//! Every mode is a [`MergePolicy`]: a handful of flags plus per-state rules.
//! The table and row merge algorithms are generic and only consult the
//! policy, so adding a mode never touches the algorithms.

use crate::RowState;
use serde::{Deserialize, Serialize};

/// How a refreshed snapshot is reconciled with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeMode {
    /// Throw current rows away and reload everything from the refreshed data
    Replace,
    /// Overwrite unchanged rows, keep every row with local edits
    Refresh,
    /// Like `Refresh`, but refuse to run while any row has pending changes
    RefreshIfNoChangesExist,
    /// Apply a sparse changeset returned by a save
    PostSave,
}

impl MergeMode {
    /// The policy implementing this mode.
    pub fn policy(self) -> MergePolicy {
        match self {
            MergeMode::Replace => MergePolicy {
                mode: self,
                full_reload: true,
                requires_primary_key: false,
                keyless_fallback: false,
                requires_clean_table: false,
                uses_client_key: false,
                applies_deleted_sources: false,
                overwrite: StateRule::Any,
                preserve_missing: StateRule::Never,
                accept: AcceptRule::Always,
            },
            MergeMode::Refresh => MergePolicy {
                mode: self,
                full_reload: false,
                requires_primary_key: true,
                keyless_fallback: false,
                requires_clean_table: false,
                uses_client_key: false,
                applies_deleted_sources: false,
                overwrite: StateRule::OnlyUnchanged,
                preserve_missing: StateRule::UnlessUnchanged,
                accept: AcceptRule::WhenChanged,
            },
            MergeMode::RefreshIfNoChangesExist => MergePolicy {
                mode: self,
                full_reload: false,
                requires_primary_key: true,
                keyless_fallback: true,
                requires_clean_table: true,
                uses_client_key: false,
                applies_deleted_sources: false,
                overwrite: StateRule::Any,
                preserve_missing: StateRule::Never,
                accept: AcceptRule::WhenChanged,
            },
            MergeMode::PostSave => MergePolicy {
                mode: self,
                full_reload: false,
                requires_primary_key: false,
                keyless_fallback: false,
                requires_clean_table: false,
                uses_client_key: true,
                applies_deleted_sources: true,
                overwrite: StateRule::Any,
                preserve_missing: StateRule::Any,
                accept: AcceptRule::WhenChangedOrPending,
            },
        }
    }
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeMode::Replace => write!(f, "Replace"),
            MergeMode::Refresh => write!(f, "Refresh"),
            MergeMode::RefreshIfNoChangesExist => write!(f, "RefreshIfNoChangesExist"),
            MergeMode::PostSave => write!(f, "PostSave"),
        }
    }
}

/// A predicate over row states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRule {
    Any,
    Never,
    OnlyUnchanged,
    UnlessUnchanged,
}

impl StateRule {
    pub fn allows(self, state: RowState) -> bool {
        match self {
            StateRule::Any => true,
            StateRule::Never => false,
            StateRule::OnlyUnchanged => state == RowState::Unchanged,
            StateRule::UnlessUnchanged => state != RowState::Unchanged,
        }
    }
}

/// When a merged row is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRule {
    Always,
    WhenChanged,
    WhenChangedOrPending,
}

impl AcceptRule {
    /// Whether a row in `state` should be accepted after a merge that did or
    /// did not change its values.
    ///
    /// `Always` accepts every merged row, including one that was already
    /// `Unchanged`. The other rules never re-accept an unchanged row with
    /// identical values, so identical merges report nothing.
    pub fn applies(self, changed: bool, state: RowState) -> bool {
        match self {
            AcceptRule::Always => true,
            AcceptRule::WhenChanged => changed,
            AcceptRule::WhenChangedOrPending => changed || state != RowState::Unchanged,
        }
    }
}

/// The decision table of a merge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    pub mode: MergeMode,
    /// Clear the table and reload every refreshed row
    pub full_reload: bool,
    /// Rows must be correlated by primary key
    pub requires_primary_key: bool,
    /// A keyless table is reloaded instead of failing
    pub keyless_fallback: bool,
    /// Refuse to merge into a table with pending changes
    pub requires_clean_table: bool,
    /// Fall back to client keys when no primary key matches
    pub uses_client_key: bool,
    /// A refreshed row in state `Deleted` removes its current counterpart
    pub applies_deleted_sources: bool,
    /// Which current rows may have their values overwritten
    pub overwrite: StateRule,
    /// Which current rows survive when the refreshed data lacks them
    pub preserve_missing: StateRule,
    /// When merged rows are accepted
    pub accept: AcceptRule,
}

impl MergePolicy {
    pub fn can_overwrite(&self, state: RowState) -> bool {
        self.overwrite.allows(state)
    }

    pub fn preserve_when_missing(&self, state: RowState) -> bool {
        self.preserve_missing.allows(state)
    }

    pub fn should_accept(&self, changed: bool, state: RowState) -> bool {
        self.accept.applies(changed, state)
    }
}

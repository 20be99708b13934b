//! Rows and the change-tracking state machine.
//!
//! Every row carries a [`RowState`]. Local edits move a row away from
//! `Unchanged` and capture a snapshot of its values so the edit can be
//! rejected later; accepting the edit discards the snapshot again.
//!
//! ```text
//!             set / delete                accept_changes
//!  Unchanged ───────────────▶ Modified ─────────────────▶ Unchanged
//!      │                        │
//!      │ delete                 │ delete
//!      ▼                        ▼
//!   Deleted ◀───────────────────┘    (removed by Table::accept_changes)
//! ```
//!
//! A row never removes itself. Physical removal is a structural operation
//! owned by the table.

use crate::{error::Result, ColumnName, Error, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conventional column name through which a row's client key is surfaced.
///
/// Adapters that round-trip rows through a backend carry the client key in
/// this column so a saved row can be re-identified before it has a
/// server-assigned primary key.
pub const CLIENT_KEY_COLUMN: &str = "__ClientKey";

/// Ordered column name to value mapping.
pub type Values = IndexMap<ColumnName, Value>;

/// Change-tracking state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    /// Created locally, never accepted
    Added,
    /// Edited since it was last accepted
    Modified,
    /// In sync with its last accepted values
    Unchanged,
    /// Marked for removal, still present in its table
    Deleted,
}

impl std::fmt::Display for RowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowState::Added => write!(f, "Added"),
            RowState::Modified => write!(f, "Modified"),
            RowState::Unchanged => write!(f, "Unchanged"),
            RowState::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A row of values with change tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    values: Values,
    state: RowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_values: Option<Values>,
    client_key: Uuid,
}

impl Row {
    /// Create a locally added row.
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<ColumnName>,
        V: Into<Value>,
    {
        Self::with_state(collect_values(values), RowState::Added)
    }

    /// Create a row loaded from an external source, in state `Unchanged`.
    pub fn loaded<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<ColumnName>,
        V: Into<Value>,
    {
        Self::with_state(collect_values(values), RowState::Unchanged)
    }

    pub(crate) fn with_state(values: Values, state: RowState) -> Self {
        Self {
            values,
            state,
            original_values: None,
            client_key: Uuid::new_v4(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RowState {
        self.state
    }

    /// Whether the row is marked deleted.
    pub fn is_deleted(&self) -> bool {
        self.state == RowState::Deleted
    }

    /// Whether the row has pending changes.
    pub fn has_changes(&self) -> bool {
        self.state != RowState::Unchanged
    }

    /// Get the current value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// All current values in column order.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Values captured when the row first left `Unchanged`.
    pub fn original_values(&self) -> Option<&Values> {
        self.original_values.as_ref()
    }

    /// Original value of a column, if a snapshot exists.
    pub fn original(&self, column: &str) -> Option<&Value> {
        self.original_values.as_ref().and_then(|o| o.get(column))
    }

    /// Identifier used to correlate this row across snapshots.
    ///
    /// A `Guid` stored in [`CLIENT_KEY_COLUMN`] takes precedence over the key
    /// generated when the row was created.
    pub fn client_key(&self) -> Uuid {
        self.values
            .get(CLIENT_KEY_COLUMN)
            .and_then(Value::as_guid)
            .unwrap_or(self.client_key)
    }

    /// Replace the client key, e.g. when an adapter restores a row that was
    /// saved earlier. Does not count as an edit.
    pub fn set_client_key(&mut self, key: Uuid) {
        self.client_key = key;
        if let Some(slot) = self.values.get_mut(CLIENT_KEY_COLUMN) {
            *slot = Value::Guid(key);
        }
    }

    /// Assign a field value.
    ///
    /// Column membership is checked by the owning table before this is
    /// called.
    pub(crate) fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match self.state {
            RowState::Deleted => {
                return Err(Error::InvalidTransition {
                    action: "modify",
                    state: self.state,
                })
            }
            RowState::Unchanged => {
                self.original_values = Some(self.values.clone());
                self.state = RowState::Modified;
            }
            RowState::Added | RowState::Modified => {}
        }
        match self.values.get_mut(column) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(column.to_string(), value);
            }
        }
        Ok(())
    }

    /// Mark the row deleted.
    ///
    /// The row stays in its table until the table accepts its changes. A row
    /// deleted straight from `Added` has no snapshot, so it cannot be
    /// un-deleted with [`Row::reject_changes`].
    pub fn delete(&mut self) -> Result<()> {
        match self.state {
            RowState::Deleted => Err(Error::InvalidTransition {
                action: "delete",
                state: self.state,
            }),
            RowState::Unchanged => {
                self.original_values = Some(self.values.clone());
                self.state = RowState::Deleted;
                Ok(())
            }
            RowState::Added | RowState::Modified => {
                self.state = RowState::Deleted;
                Ok(())
            }
        }
    }

    /// Commit pending edits.
    ///
    /// Fails for deleted rows: removing a row is up to its table.
    pub fn accept_changes(&mut self) -> Result<()> {
        match self.state {
            RowState::Deleted => Err(Error::InvalidTransition {
                action: "accept changes on",
                state: self.state,
            }),
            RowState::Unchanged => Ok(()),
            RowState::Added | RowState::Modified => {
                self.state = RowState::Unchanged;
                self.original_values = None;
                Ok(())
            }
        }
    }

    /// Revert pending edits.
    ///
    /// Fails for added rows, which have nothing to revert to and cannot
    /// remove themselves.
    pub fn reject_changes(&mut self) -> Result<()> {
        match self.state {
            RowState::Unchanged => Ok(()),
            RowState::Added => Err(Error::InvalidTransition {
                action: "reject changes on",
                state: self.state,
            }),
            RowState::Modified | RowState::Deleted => {
                let original = self.original_values.take().ok_or(Error::InvalidTransition {
                    action: "reject changes on",
                    state: self.state,
                })?;
                self.values = original;
                self.state = RowState::Unchanged;
                Ok(())
            }
        }
    }

    /// Deleted before it was ever committed.
    pub(crate) fn is_uncommitted_delete(&self) -> bool {
        self.state == RowState::Deleted && self.original_values.is_none()
    }

    /// Return to `Unchanged`, restoring the snapshot when there is one.
    ///
    /// Unlike [`Row::reject_changes`] this never fails; a row without a
    /// snapshot keeps its current values.
    pub(crate) fn restore_original(&mut self) {
        if let Some(original) = self.original_values.take() {
            self.values = original;
        }
        self.state = RowState::Unchanged;
    }

    pub(crate) fn force_state(&mut self, state: RowState) {
        if state == RowState::Unchanged {
            self.original_values = None;
        }
        self.state = state;
    }
}

fn collect_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Values
where
    K: Into<ColumnName>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_row() -> Row {
        Row::loaded([("Id", Value::from(1)), ("Name", Value::from("One"))])
    }

    #[test]
    fn factories_set_initial_state() {
        assert_eq!(Row::new([("Id", 1)]).state(), RowState::Added);
        assert_eq!(Row::loaded([("Id", 1)]).state(), RowState::Unchanged);
    }

    #[test]
    fn client_keys_are_unique() {
        let a = Row::new([("Id", 1)]);
        let b = Row::new([("Id", 1)]);
        assert_ne!(a.client_key(), b.client_key());
    }

    #[test]
    fn set_on_unchanged_snapshots_and_modifies() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();

        assert_eq!(row.state(), RowState::Modified);
        assert_eq!(row.get("Name"), Some(&Value::from("Uno")));
        assert_eq!(row.original("Name"), Some(&Value::from("One")));

        // a second edit keeps the first snapshot
        row.set("Name", "Eins".into()).unwrap();
        assert_eq!(row.original("Name"), Some(&Value::from("One")));
    }

    #[test]
    fn set_on_added_stays_added() {
        let mut row = Row::new([("Id", 1)]);
        row.set("Id", 2.into()).unwrap();
        assert_eq!(row.state(), RowState::Added);
        assert!(row.original_values().is_none());
    }

    #[test]
    fn set_on_deleted_fails() {
        let mut row = loaded_row();
        row.delete().unwrap();
        let result = row.set("Name", "x".into());
        assert!(matches!(
            result,
            Err(Error::InvalidTransition {
                state: RowState::Deleted,
                ..
            })
        ));
    }

    #[test]
    fn accept_changes() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();
        row.accept_changes().unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
        assert!(row.original_values().is_none());
        assert_eq!(row.get("Name"), Some(&Value::from("Uno")));

        let mut added = Row::new([("Id", 1)]);
        added.accept_changes().unwrap();
        assert_eq!(added.state(), RowState::Unchanged);

        // no-op on unchanged
        row.accept_changes().unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
    }

    #[test]
    fn accept_changes_on_deleted_fails() {
        let mut row = loaded_row();
        row.delete().unwrap();
        assert!(row.accept_changes().is_err());
        assert_eq!(row.state(), RowState::Deleted);
    }

    #[test]
    fn reject_changes_restores_originals() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();
        row.reject_changes().unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
        assert_eq!(row.get("Name"), Some(&Value::from("One")));
        assert!(row.original_values().is_none());
    }

    #[test]
    fn reject_changes_on_added_fails() {
        let mut row = Row::new([("Id", 1)]);
        assert!(matches!(
            row.reject_changes(),
            Err(Error::InvalidTransition {
                state: RowState::Added,
                ..
            })
        ));
        assert_eq!(row.state(), RowState::Added);
    }

    #[test]
    fn reject_changes_undeletes() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();
        row.delete().unwrap();
        assert_eq!(row.state(), RowState::Deleted);

        row.reject_changes().unwrap();
        assert_eq!(row.state(), RowState::Unchanged);
        assert_eq!(row.get("Name"), Some(&Value::from("One")));
    }

    #[test]
    fn delete_from_added_cannot_be_rejected() {
        let mut row = Row::new([("Id", 1)]);
        row.delete().unwrap();
        assert!(row.is_uncommitted_delete());
        assert!(row.reject_changes().is_err());
    }

    #[test]
    fn restore_original_never_fails() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();
        row.restore_original();
        assert_eq!(row.state(), RowState::Unchanged);
        assert_eq!(row.get("Name"), Some(&Value::from("One")));

        let mut bare = Row::with_state(row.values().clone(), RowState::Modified);
        bare.restore_original();
        assert_eq!(bare.state(), RowState::Unchanged);
        assert_eq!(bare.values(), row.values());
    }

    #[test]
    fn delete_twice_fails() {
        let mut row = loaded_row();
        row.delete().unwrap();
        assert!(row.delete().is_err());
    }

    #[test]
    fn client_key_column_takes_precedence() {
        let key = Uuid::new_v4();
        let row = Row::loaded([("Id", Value::Null), (CLIENT_KEY_COLUMN, Value::Guid(key))]);
        assert_eq!(row.client_key(), key);

        let mut plain = Row::loaded([("Id", 1)]);
        plain.set_client_key(key);
        assert_eq!(plain.client_key(), key);
        assert_eq!(plain.state(), RowState::Unchanged);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut row = loaded_row();
        row.set("Name", "Uno".into()).unwrap();
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("originalValues")); // camelCase
        let parsed: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(row, parsed);
    }
}

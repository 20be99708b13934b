//! Row identity: composite primary keys and client-key correlation.
//!
//! The merge engine pairs a current row with its refreshed counterpart by
//! primary key first. Rows created locally may not have a key yet, so the
//! client key acts as a fallback for modes that ask for it.

use crate::{ColumnName, MergeOptions, Row, Table};
use std::collections::HashMap;
use uuid::Uuid;

/// Separator placed between key fragments.
const KEY_SEPARATOR: char = '\u{1f}';

/// A composite primary key rendered as a string.
pub type CompositeKey = String;

/// Effective primary key of `table`: the configured override if there is
/// one, otherwise the table's own key.
pub fn effective_primary_key<'a>(table: &'a Table, options: &'a MergeOptions) -> &'a [ColumnName] {
    options
        .primary_key_overrides
        .get(table.name())
        .map(Vec::as_slice)
        .unwrap_or_else(|| table.primary_key())
}

/// Composite key of `row` over `columns`.
///
/// Returns `None` when `columns` is empty or any component is null or
/// missing; such rows do not take part in primary-key matching.
pub fn composite_key(row: &Row, columns: &[ColumnName]) -> Option<CompositeKey> {
    if columns.is_empty() {
        return None;
    }
    let mut key = String::new();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&row.get(column)?.key_fragment()?);
    }
    Some(key)
}

/// Lookup from identity to row index over one side of a merge.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_key: HashMap<CompositeKey, usize>,
    by_client_key: HashMap<Uuid, usize>,
}

impl IdentityIndex {
    /// Index `rows` by composite key over `primary_key` and, when
    /// `with_client_keys` is set, by client key.
    ///
    /// The first row wins when two rows share an identity.
    pub fn build(rows: &[Row], primary_key: &[ColumnName], with_client_keys: bool) -> Self {
        let mut index = Self::default();
        for (i, row) in rows.iter().enumerate() {
            if let Some(key) = composite_key(row, primary_key) {
                index.by_key.entry(key).or_insert(i);
            }
            if with_client_keys {
                index.by_client_key.entry(row.client_key()).or_insert(i);
            }
        }
        index
    }

    /// Find the counterpart of `row`: primary key first, then client key.
    pub fn find(&self, row: &Row, primary_key: &[ColumnName]) -> Option<usize> {
        composite_key(row, primary_key)
            .and_then(|key| self.by_key.get(&key).copied())
            .or_else(|| self.by_client_key.get(&row.client_key()).copied())
    }

    /// Like [`IdentityIndex::find`], skipping rows already flagged in
    /// `claimed`.
    ///
    /// A claimed primary-key match still lets the client key be tried.
    pub fn find_unclaimed(&self, row: &Row, primary_key: &[ColumnName], claimed: &[bool]) -> Option<usize> {
        let free = |i: &usize| !claimed.get(*i).copied().unwrap_or(false);
        composite_key(row, primary_key)
            .and_then(|key| self.by_key.get(&key).copied())
            .filter(free)
            .or_else(|| self.by_client_key.get(&row.client_key()).copied().filter(free))
    }

    /// Whether the indexed row at `position` owns its identities.
    ///
    /// False for a row whose primary key or client key was already taken by
    /// an earlier row; such duplicates never match and are never added.
    pub fn is_first_writer(&self, position: usize, row: &Row, primary_key: &[ColumnName]) -> bool {
        let by_key = composite_key(row, primary_key)
            .and_then(|key| self.by_key.get(&key).copied())
            .map_or(true, |owner| owner == position);
        let by_client_key = self
            .by_client_key
            .get(&row.client_key())
            .map_or(true, |&owner| owner == position);
        by_key && by_client_key
    }

    /// Number of rows reachable by primary key.
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Value, CLIENT_KEY_COLUMN};

    fn pk(names: &[&str]) -> Vec<ColumnName> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn composite_key_requires_all_components() {
        let row = Row::loaded([("A", Value::from(1)), ("B", Value::Null)]);
        assert!(composite_key(&row, &pk(&["A"])).is_some());
        assert!(composite_key(&row, &pk(&["A", "B"])).is_none());
        assert!(composite_key(&row, &pk(&["A", "C"])).is_none());
        assert!(composite_key(&row, &[]).is_none());
    }

    #[test]
    fn composite_key_is_order_sensitive() {
        let row = Row::loaded([("A", Value::from(1)), ("B", Value::from(2))]);
        assert_ne!(
            composite_key(&row, &pk(&["A", "B"])),
            composite_key(&row, &pk(&["B", "A"]))
        );
    }

    #[test]
    fn first_writer_wins() {
        let rows = vec![
            Row::loaded([("Id", Value::from(1)), ("Name", "first".into())]),
            Row::loaded([("Id", Value::from(1)), ("Name", "second".into())]),
        ];
        let index = IdentityIndex::build(&rows, &pk(&["Id"]), false);
        let lookup = Row::loaded([("Id", 1)]);
        assert_eq!(index.find(&lookup, &pk(&["Id"])), Some(0));
        assert_eq!(index.key_count(), 1);
    }

    #[test]
    fn client_key_fallback() {
        let key = Uuid::new_v4();
        let rows = vec![Row::loaded([
            ("Id", Value::from(42)),
            (CLIENT_KEY_COLUMN, Value::Guid(key)),
        ])];
        let local = Row::new([("Id", Value::Null), (CLIENT_KEY_COLUMN, Value::Guid(key))]);

        let with = IdentityIndex::build(&rows, &pk(&["Id"]), true);
        assert_eq!(with.find(&local, &pk(&["Id"])), Some(0));

        let without = IdentityIndex::build(&rows, &pk(&["Id"]), false);
        assert_eq!(without.find(&local, &pk(&["Id"])), None);
    }

    #[test]
    fn claimed_key_match_falls_through_to_client_key() {
        let key = Uuid::new_v4();
        let rows = vec![
            Row::loaded([("Id", Value::from(1)), (CLIENT_KEY_COLUMN, Value::Guid(Uuid::new_v4()))]),
            Row::loaded([("Id", Value::from(2)), (CLIENT_KEY_COLUMN, Value::Guid(key))]),
        ];
        let index = IdentityIndex::build(&rows, &pk(&["Id"]), true);
        let local = Row::loaded([("Id", Value::from(1)), (CLIENT_KEY_COLUMN, Value::Guid(key))]);

        assert_eq!(index.find_unclaimed(&local, &pk(&["Id"]), &[false, false]), Some(0));
        assert_eq!(index.find_unclaimed(&local, &pk(&["Id"]), &[true, false]), Some(1));
        assert_eq!(index.find_unclaimed(&local, &pk(&["Id"]), &[true, true]), None);
    }

    #[test]
    fn later_duplicates_are_not_first_writers() {
        let rows = vec![
            Row::loaded([("Id", Value::from(1)), ("Name", "A".into())]),
            Row::loaded([("Id", Value::from(1)), ("Name", "B".into())]),
            Row::loaded([("Id", Value::Null), ("Name", "C".into())]),
        ];
        let index = IdentityIndex::build(&rows, &pk(&["Id"]), false);

        assert!(index.is_first_writer(0, &rows[0], &pk(&["Id"])));
        assert!(!index.is_first_writer(1, &rows[1], &pk(&["Id"])));
        // no key at all, nothing to collide with
        assert!(index.is_first_writer(2, &rows[2], &pk(&["Id"])));
    }
}

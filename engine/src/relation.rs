//! Relations between tables and referential-integrity checks.
//!
//! Integrity problems are returned as data, never as errors, so a caller
//! can show every problem in a data set at once.

use crate::{
    identity::{composite_key, CompositeKey},
    row::Values,
    ColumnName, DataSet, RelationName, Row, Table, TableName,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

/// A parent → child link between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub name: RelationName,
    pub parent_table: TableName,
    pub parent_columns: Vec<ColumnName>,
    pub child_table: TableName,
    pub child_columns: Vec<ColumnName>,
}

impl Relation {
    pub fn new<P, C>(
        name: impl Into<RelationName>,
        parent_table: impl Into<TableName>,
        parent_columns: impl IntoIterator<Item = P>,
        child_table: impl Into<TableName>,
        child_columns: impl IntoIterator<Item = C>,
    ) -> Self
    where
        P: Into<ColumnName>,
        C: Into<ColumnName>,
    {
        Self {
            name: name.into(),
            parent_table: parent_table.into(),
            parent_columns: parent_columns.into_iter().map(Into::into).collect(),
            child_table: child_table.into(),
            child_columns: child_columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Why this relation cannot be evaluated against `data_set`, if it can't.
    fn definition_problem(&self, data_set: &DataSet) -> Option<String> {
        if self.parent_columns.is_empty() || self.parent_columns.len() != self.child_columns.len() {
            return Some(format!(
                "relation '{}' links {} parent column(s) to {} child column(s)",
                self.name,
                self.parent_columns.len(),
                self.child_columns.len()
            ));
        }
        let sides = [
            (&self.parent_table, &self.parent_columns),
            (&self.child_table, &self.child_columns),
        ];
        for (table_name, columns) in sides {
            let Some(table) = data_set.table(table_name) else {
                return Some(format!(
                    "relation '{}' references missing table '{table_name}'",
                    self.name
                ));
            };
            if let Some(column) = columns.iter().find(|c| !table.has_column(c)) {
                return Some(format!(
                    "relation '{}' references missing column '{table_name}.{column}'",
                    self.name
                ));
            }
        }
        None
    }
}

/// Switches for [`validate_relations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationValidationOptions {
    /// Report child rows without a parent
    pub check_orphans: bool,
    /// Report deleted parents that still have live children
    pub check_delete_restrict: bool,
    /// Skip deleted child rows in the orphan check
    pub ignore_deleted_children: bool,
    /// Treat a deleted parent row as absent in the orphan check
    pub deleted_parent_is_missing: bool,
    /// A child row with any null foreign key value references nothing
    pub null_foreign_key_is_unset: bool,
    /// Report relations that cannot be evaluated
    pub report_invalid_relations: bool,
}

impl Default for RelationValidationOptions {
    fn default() -> Self {
        Self {
            check_orphans: true,
            check_delete_restrict: true,
            ignore_deleted_children: true,
            deleted_parent_is_missing: true,
            null_foreign_key_is_unset: true,
            report_invalid_relations: true,
        }
    }
}

/// What kind of integrity problem a [`RelationViolation`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    /// Missing table or column, or mismatched column counts
    InvalidRelationDefinition,
    /// A child row references a parent that is not there
    OrphanChildRow,
    /// A deleted parent row still has live children
    DeletedParentHasChildren,
}

/// One referential-integrity problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationViolation {
    pub kind: ViolationKind,
    pub relation: RelationName,
    pub parent_table: TableName,
    pub child_table: TableName,
    /// Key column values of the offending row
    pub key_values: Values,
    /// Client key of the offending row, absent for definition problems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<Uuid>,
    pub message: String,
}

impl RelationViolation {
    fn new(kind: ViolationKind, relation: &Relation, message: String) -> Self {
        Self {
            kind,
            relation: relation.name.clone(),
            parent_table: relation.parent_table.clone(),
            child_table: relation.child_table.clone(),
            key_values: Values::new(),
            client_key: None,
            message,
        }
    }

    fn for_row(mut self, row: &Row, columns: &[ColumnName]) -> Self {
        self.key_values = key_values(row, columns);
        self.client_key = Some(row.client_key());
        self
    }
}

/// Check every relation of `data_set`.
///
/// Violations are ordered by relation, then by kind (orphans before
/// delete-restrict), then by row position.
pub fn validate_relations(
    data_set: &DataSet,
    options: &RelationValidationOptions,
) -> Vec<RelationViolation> {
    let mut violations = Vec::new();

    for relation in data_set.relations() {
        if let Some(message) = relation.definition_problem(data_set) {
            if options.report_invalid_relations {
                violations.push(RelationViolation::new(
                    ViolationKind::InvalidRelationDefinition,
                    relation,
                    message,
                ));
            }
            continue;
        }
        let (Some(parent), Some(child)) = (
            data_set.table(&relation.parent_table),
            data_set.table(&relation.child_table),
        ) else {
            continue;
        };
        if options.check_orphans {
            check_orphans(relation, parent, child, options, &mut violations);
        }
        if options.check_delete_restrict {
            check_delete_restrict(relation, parent, child, &mut violations);
        }
    }

    debug!(
        relations = data_set.relations().len(),
        violations = violations.len(),
        "relations validated"
    );
    violations
}

fn check_orphans(
    relation: &Relation,
    parent: &Table,
    child: &Table,
    options: &RelationValidationOptions,
    violations: &mut Vec<RelationViolation>,
) {
    // key -> whether some parent row with that key counts as present
    let mut parents: HashMap<CompositeKey, bool> = HashMap::new();
    for row in parent.rows() {
        if let Some(key) = composite_key(row, &relation.parent_columns) {
            let present = !row.is_deleted() || !options.deleted_parent_is_missing;
            *parents.entry(key).or_insert(false) |= present;
        }
    }

    for row in child.rows() {
        if row.is_deleted() && options.ignore_deleted_children {
            continue;
        }
        let key = composite_key(row, &relation.child_columns);
        if key.is_none() && options.null_foreign_key_is_unset {
            continue;
        }
        let found = key.is_some_and(|k| parents.get(&k).copied().unwrap_or(false));
        if !found {
            let values = key_values(row, &relation.child_columns);
            let message = format!(
                "row in '{}' references missing '{}' row {}",
                relation.child_table,
                relation.parent_table,
                describe(&values)
            );
            violations.push(
                RelationViolation::new(ViolationKind::OrphanChildRow, relation, message)
                    .for_row(row, &relation.child_columns),
            );
        }
    }
}

fn check_delete_restrict(
    relation: &Relation,
    parent: &Table,
    child: &Table,
    violations: &mut Vec<RelationViolation>,
) {
    let mut children: HashMap<CompositeKey, usize> = HashMap::new();
    for row in child.rows().iter().filter(|r| !r.is_deleted()) {
        if let Some(key) = composite_key(row, &relation.child_columns) {
            *children.entry(key).or_default() += 1;
        }
    }

    for row in parent.rows().iter().filter(|r| r.is_deleted()) {
        let Some(count) = composite_key(row, &relation.parent_columns)
            .and_then(|key| children.get(&key).copied())
        else {
            continue;
        };
        let values = key_values(row, &relation.parent_columns);
        let message = format!(
            "deleted '{}' row {} still has {count} child row(s) in '{}'",
            relation.parent_table,
            describe(&values),
            relation.child_table
        );
        violations.push(
            RelationViolation::new(ViolationKind::DeletedParentHasChildren, relation, message)
                .for_row(row, &relation.parent_columns),
        );
    }
}

fn key_values(row: &Row, columns: &[ColumnName]) -> Values {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or_default()))
        .collect()
}

fn describe(values: &Values) -> String {
    let parts: Vec<String> = values.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("({})", parts.join(", "))
}

/// Order `requested` so every relation parent comes before its children.
///
/// Duplicate names are dropped, keeping the first occurrence. Among tables
/// free to go next, the one requested earliest wins. Relations touching a
/// table outside `requested` are ignored. If the relations form a cycle the
/// de-duplicated request order is returned as is.
pub fn ordered_table_names<S: AsRef<str>>(relations: &[Relation], requested: &[S]) -> Vec<TableName> {
    let mut nodes: Vec<TableName> = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.as_ref();
        if !nodes.iter().any(|n| n == name) {
            nodes.push(name.to_string());
        }
    }
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for relation in relations {
        if let (Some(&from), Some(&to)) = (
            position.get(relation.parent_table.as_str()),
            position.get(relation.child_table.as_str()),
        ) {
            edges.insert((from, to));
        }
    }

    let mut indegree = vec![0usize; nodes.len()];
    for &(_, to) in &edges {
        indegree[to] += 1;
    }

    // ready nodes kept sorted by request position
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &(_, to) in edges.range((next, 0)..=(next, usize::MAX)) {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.insert(to);
            }
        }
    }

    if order.len() < nodes.len() {
        debug!(tables = nodes.len(), "relation cycle, keeping requested order");
        return nodes;
    }
    order.into_iter().map(|i| nodes[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, DataType, Value};
    use pretty_assertions::assert_eq;

    fn rel(name: &str, parent: &str, child: &str) -> Relation {
        Relation::new(name, parent, ["Id"], child, ["ParentId"])
    }

    #[test]
    fn order_keeps_unconstrained_positions() {
        let relations = vec![rel("ab", "A", "B")];
        assert_eq!(ordered_table_names(&relations, &["A", "B", "C"]), vec!["A", "B", "C"]);
    }

    #[test]
    fn order_moves_parent_first() {
        let relations = vec![rel("ca", "C", "A")];
        assert_eq!(ordered_table_names(&relations, &["A", "B", "C"]), vec!["B", "C", "A"]);
    }

    #[test]
    fn order_falls_back_on_cycle() {
        let relations = vec![rel("ab", "A", "B"), rel("ba", "B", "A")];
        assert_eq!(ordered_table_names(&relations, &["A", "B", "C"]), vec!["A", "B", "C"]);
    }

    #[test]
    fn order_dedups_and_ignores_foreign_tables() {
        let relations = vec![rel("xa", "X", "A"), rel("ba", "B", "A"), rel("ba2", "B", "A")];
        assert_eq!(
            ordered_table_names(&relations, &["A", "B", "A", "C"]),
            vec!["B", "A", "C"]
        );
    }

    #[test]
    fn order_of_nothing_is_empty() {
        assert!(ordered_table_names::<&str>(&[], &[]).is_empty());
    }

    fn orders() -> DataSet {
        let mut customers = Table::with_columns(
            "Customers",
            vec![Column::key("Id", DataType::Int), Column::new("Name", DataType::Text)],
        )
        .unwrap();
        customers.load([("Id", Value::from(1)), ("Name", Value::from("Ann"))]).unwrap();
        customers.load([("Id", Value::from(2)), ("Name", Value::from("Bob"))]).unwrap();

        let mut orders = Table::with_columns(
            "Orders",
            vec![
                Column::key("Id", DataType::Int),
                Column::optional("CustomerId", DataType::Int).references("Customers", "Id"),
            ],
        )
        .unwrap();
        orders.load([("Id", Value::from(10)), ("CustomerId", Value::from(1))]).unwrap();

        let mut set = DataSet::new();
        set.add_table(customers).unwrap();
        set.add_table(orders).unwrap();
        set.add_relation(Relation::new("CustomerOrders", "Customers", ["Id"], "Orders", ["CustomerId"]))
            .unwrap();
        set
    }

    #[test]
    fn consistent_set_has_no_violations() {
        let set = orders();
        assert!(validate_relations(&set, &RelationValidationOptions::default()).is_empty());
    }

    #[test]
    fn orphan_child_reported_with_key_snapshot() {
        let mut set = orders();
        set.table_mut("Orders")
            .unwrap()
            .insert([("Id", Value::from(11)), ("CustomerId", Value::from(99))])
            .unwrap();

        let violations = validate_relations(&set, &RelationValidationOptions::default());

        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.kind, ViolationKind::OrphanChildRow);
        assert_eq!(v.relation, "CustomerOrders");
        assert_eq!(v.key_values.get("CustomerId"), Some(&Value::Int(99)));
        assert_eq!(v.client_key, Some(set.table("Orders").unwrap().rows()[1].client_key()));
    }

    #[test]
    fn null_foreign_key_honors_option() {
        let mut set = orders();
        set.table_mut("Orders")
            .unwrap()
            .insert([("Id", Value::from(12)), ("CustomerId", Value::Null)])
            .unwrap();

        assert!(validate_relations(&set, &RelationValidationOptions::default()).is_empty());

        let strict = RelationValidationOptions {
            null_foreign_key_is_unset: false,
            ..Default::default()
        };
        assert_eq!(validate_relations(&set, &strict).len(), 1);
    }

    #[test]
    fn deleted_parent_with_children() {
        let mut set = orders();
        set.table_mut("Customers").unwrap().delete_row(0).unwrap();

        let violations = validate_relations(&set, &RelationValidationOptions::default());
        let kinds: Vec<_> = violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ViolationKind::OrphanChildRow, ViolationKind::DeletedParentHasChildren]
        );
        assert_eq!(violations[1].key_values.get("Id"), Some(&Value::Int(1)));

        let lenient = RelationValidationOptions {
            deleted_parent_is_missing: false,
            check_delete_restrict: false,
            ..Default::default()
        };
        assert!(validate_relations(&set, &lenient).is_empty());
    }

    #[test]
    fn deleted_children_do_not_block_parent_delete() {
        let mut set = orders();
        set.table_mut("Orders").unwrap().delete_row(0).unwrap();
        set.table_mut("Customers").unwrap().delete_row(0).unwrap();

        assert!(validate_relations(&set, &RelationValidationOptions::default()).is_empty());
    }

    #[test]
    fn deleted_orphans_checked_when_not_ignored() {
        let mut set = orders();
        let orders = set.table_mut("Orders").unwrap();
        orders.load([("Id", Value::from(13)), ("CustomerId", Value::from(77))]).unwrap();
        orders.delete_row(1).unwrap();

        assert!(validate_relations(&set, &RelationValidationOptions::default()).is_empty());

        let options = RelationValidationOptions {
            ignore_deleted_children: false,
            ..Default::default()
        };
        assert_eq!(validate_relations(&set, &options).len(), 1);
    }

    #[test]
    fn invalid_definitions() {
        let mut set = orders();
        set.add_relation(Relation::new("Broken", "Customers", ["Nope"], "Orders", ["CustomerId"]))
            .unwrap();
        set.add_relation(Relation::new("Uneven", "Customers", ["Id", "Name"], "Orders", ["CustomerId"]))
            .unwrap();
        set.add_relation(Relation::new("Ghost", "Ghosts", ["Id"], "Orders", ["CustomerId"]))
            .unwrap();

        let violations = validate_relations(&set, &RelationValidationOptions::default());
        assert_eq!(violations.len(), 3);
        assert!(violations
            .iter()
            .all(|v| v.kind == ViolationKind::InvalidRelationDefinition && v.client_key.is_none()));
        assert!(violations[0].message.contains("Customers.Nope"));

        let quiet = RelationValidationOptions {
            report_invalid_relations: false,
            ..Default::default()
        };
        assert!(validate_relations(&set, &quiet).is_empty());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RelationValidationOptions =
            serde_json::from_str(r#"{"checkOrphans": false}"#).unwrap();
        assert!(!options.check_orphans);
        assert!(options.check_delete_restrict);
    }
}

//! # Rowset Engine
//!
//! A change-tracked tabular data model with a deterministic merge engine.
//!
//! This crate keeps typed tables of rows in memory, tracks every local edit
//! per row, and reconciles a locally edited snapshot with a refreshed one
//! from some external source.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or backends
//! - **Deterministic**: same inputs, same outputs, same change report
//! - **Policy driven**: every merge mode is a [`MergePolicy`] over one generic
//!   algorithm
//!
//! ## Core Concepts
//!
//! ### Rows and states
//!
//! A [`Row`] is an ordered map of column name to [`Value`] plus a
//! [`RowState`]:
//! - `Added` - created locally, never accepted
//! - `Modified` - edited since it was last accepted
//! - `Unchanged` - in sync
//! - `Deleted` - marked for removal, removed when its table accepts changes
//!
//! Edits snapshot the original values so they can be rejected later.
//!
//! ### Identity
//!
//! Rows are correlated across snapshots by composite primary key, or by a
//! client key generated when the row is created (see [`CLIENT_KEY_COLUMN`]).
//!
//! ### Merging
//!
//! The [`Merger`] reconciles a current [`DataSet`] with a refreshed one in one
//! of four [`MergeMode`]s:
//! - [`MergeMode::Replace`] - reload everything
//! - [`MergeMode::Refresh`] - overwrite unchanged rows, keep local edits
//! - [`MergeMode::RefreshIfNoChangesExist`] - refuse to run on dirty tables
//! - [`MergeMode::PostSave`] - apply the changeset returned by a save
//!
//! Every change is reported in the [`MergeResult`] owned by the
//! [`MergeConfiguration`].
//!
//! ### Relations
//!
//! [`validate_relations`] reports orphan rows and delete-restrict breaches as
//! data; [`ordered_table_names`] orders tables parents first.
//!
//! ## Quick Start
//!
//! ```rust
//! use rowset_engine::{Column, DataSet, DataType, MergeConfiguration, MergeMode, RowState, Table, Value};
//!
//! // 1. Define a table
//! let columns = vec![
//!     Column::key("Id", DataType::Int),
//!     Column::new("Name", DataType::Text),
//! ];
//! let mut current = DataSet::new();
//! current.add_table(Table::with_columns("Items", columns.clone()).unwrap()).unwrap();
//! current.table_mut("Items").unwrap().load([("Id", Value::from(1)), ("Name", Value::from("One"))]).unwrap();
//!
//! // 2. Get a refreshed copy from somewhere
//! let mut refreshed = DataSet::new();
//! refreshed.add_table(Table::with_columns("Items", columns).unwrap()).unwrap();
//! refreshed.table_mut("Items").unwrap().load([("Id", Value::from(1)), ("Name", Value::from("One_Refreshed"))]).unwrap();
//!
//! // 3. Merge
//! let mut config = MergeConfiguration::new();
//! current.merge(&refreshed, MergeMode::Refresh, &mut config).unwrap();
//!
//! let row = &current.table("Items").unwrap().rows()[0];
//! assert_eq!(row.get("Name"), Some(&Value::from("One_Refreshed")));
//! assert_eq!(row.state(), RowState::Unchanged);
//! assert_eq!(config.result.updated.len(), 1);
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod handler;
pub mod identity;
pub mod merge;
pub mod policy;
pub mod relation;
pub mod row;
pub mod schema;
pub mod table;
pub mod value;

// Re-export main types at crate root
pub use config::{MergeConfiguration, MergeOptions};
pub use dataset::DataSet;
pub use error::{Error, ErrorKind, Result};
pub use handler::{DefaultMergeHandler, MergeHandler};
pub use identity::{composite_key, CompositeKey, IdentityIndex};
pub use merge::{
    merge_row_default, merge_table_default, MergeContext, MergeResult, Merger, RowChange,
    RowMergeOutcome,
};
pub use policy::{AcceptRule, MergeMode, MergePolicy, StateRule};
pub use relation::{
    ordered_table_names, validate_relations, Relation, RelationValidationOptions,
    RelationViolation, ViolationKind,
};
pub use row::{Row, RowState, Values, CLIENT_KEY_COLUMN};
pub use schema::{Column, DataType};
pub use table::{RowMut, Table};
pub use value::Value;

/// Type aliases for clarity
pub type TableName = String;
pub type ColumnName = String;
pub type RelationName = String;

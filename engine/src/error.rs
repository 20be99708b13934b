//! Error types for the rowset engine.

use crate::{ColumnName, RelationName, RowState, TableName};
use thiserror::Error;

/// Coarse classification of [`Error`] variants.
///
/// Callers that only care about *why* a call was refused (for example to pick
/// another merge mode) match on the kind instead of individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A row was asked to make a state change its lifecycle does not allow.
    InvalidTransition,
    /// A merge was invoked on data that does not satisfy the mode's requirements.
    PreconditionViolation,
    /// The merge configuration is inconsistent with the data it is applied to.
    InvalidConfiguration,
    /// A structural schema operation failed (unknown or duplicate names).
    Schema,
    /// Advisory value validation failed.
    Validation,
}

/// All possible errors from the rowset engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Row state errors
    #[error("cannot {action} a row in state {state}")]
    InvalidTransition {
        action: &'static str,
        state: RowState,
    },

    // Merge precondition errors
    #[error("table '{table}' has {pending} pending change(s)")]
    DirtyTable { table: TableName, pending: usize },

    #[error("table '{0}' has no primary key")]
    MissingPrimaryKey(TableName),

    #[error("table '{table}' has a null primary key value in column '{column}'")]
    NullPrimaryKey { table: TableName, column: ColumnName },

    // Configuration errors
    #[error("invalid merge configuration: {0}")]
    InvalidConfiguration(String),

    // Schema errors
    #[error("table not found: {0}")]
    TableNotFound(TableName),

    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: TableName, column: ColumnName },

    #[error("table already exists: {0}")]
    DuplicateTable(TableName),

    #[error("column '{column}' already exists in table '{table}'")]
    DuplicateColumn { table: TableName, column: ColumnName },

    #[error("relation already exists: {0}")]
    DuplicateRelation(RelationName),

    #[error("row index {index} out of bounds for table '{table}'")]
    RowIndexOutOfBounds { table: TableName, index: usize },

    // Validation errors
    #[error("missing required field: {0}")]
    MissingRequiredField(ColumnName),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: ColumnName,
        expected: String,
        got: String,
    },

    #[error("value for field '{field}' is {len} long, maximum is {max}")]
    ValueTooLong {
        field: ColumnName,
        len: usize,
        max: usize,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::DirtyTable { .. }
            | Error::MissingPrimaryKey(_)
            | Error::NullPrimaryKey { .. } => ErrorKind::PreconditionViolation,
            Error::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Error::TableNotFound(_)
            | Error::ColumnNotFound { .. }
            | Error::DuplicateTable(_)
            | Error::DuplicateColumn { .. }
            | Error::DuplicateRelation(_)
            | Error::RowIndexOutOfBounds { .. } => ErrorKind::Schema,
            Error::MissingRequiredField(_)
            | Error::TypeMismatch { .. }
            | Error::ValueTooLong { .. } => ErrorKind::Validation,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

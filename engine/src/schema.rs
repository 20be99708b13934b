//! Column metadata and advisory value validation.
//!
//! Columns describe the shape of a table. The engine itself never rejects a
//! value for having the wrong type; [`Column::validate`] is available to
//! callers that want to check values before saving them.

use crate::{error::Result, ColumnName, Error, TableName, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Guid,
}

impl DataType {
    /// The value a default-populated row holds for this type.
    pub fn default_value(self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int => Value::Int(0),
            DataType::Float => Value::Float(0.0),
            DataType::Text => Value::Text(String::new()),
            DataType::Bytes => Value::Bytes(Vec::new()),
            DataType::Guid => Value::Guid(Uuid::nil()),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => write!(f, "Bool"),
            DataType::Int => write!(f, "Int"),
            DataType::Float => write!(f, "Float"),
            DataType::Text => write!(f, "Text"),
            DataType::Bytes => write!(f, "Bytes"),
            DataType::Guid => write!(f, "Guid"),
        }
    }
}

/// Definition of a column in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name, unique within its table (case-sensitive)
    pub name: ColumnName,
    /// Declared data type
    pub data_type: DataType,
    /// Whether null is an acceptable value
    pub nullable: bool,
    /// Whether this column is part of the primary key
    pub primary_key: bool,
    /// Whether this column references another table
    pub foreign_key: bool,
    /// Referenced table, if this is a foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<TableName>,
    /// Referenced column, if this is a foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<ColumnName>,
    /// Maximum length for text and byte values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl Column {
    /// Create a new non-nullable column.
    pub fn new(name: impl Into<ColumnName>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            primary_key: false,
            foreign_key: false,
            referenced_table: None,
            referenced_column: None,
            max_length: None,
        }
    }

    /// Create a primary-key column.
    pub fn key(name: impl Into<ColumnName>, data_type: DataType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, data_type)
        }
    }

    /// Create a nullable column.
    pub fn optional(name: impl Into<ColumnName>, data_type: DataType) -> Self {
        Self::new(name, data_type).nullable()
    }

    /// Builder: allow nulls.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Builder: mark as a foreign key referencing `table.column`.
    pub fn references(mut self, table: impl Into<TableName>, column: impl Into<ColumnName>) -> Self {
        self.foreign_key = true;
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }

    /// Builder: cap the length of text and byte values.
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// The value this column holds in a default-populated row: null for
    /// nullable columns, the type's default otherwise.
    pub fn default_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.data_type.default_value()
        }
    }

    /// Validate a value against this column definition.
    ///
    /// A missing value is treated like null.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        match value {
            None | Some(Value::Null) if !self.nullable => {
                Err(Error::MissingRequiredField(self.name.clone()))
            }
            None | Some(Value::Null) => Ok(()),
            Some(v) => {
                self.validate_type(v)?;
                self.validate_length(v)
            }
        }
    }

    fn validate_type(&self, value: &Value) -> Result<()> {
        if value.data_type() == Some(self.data_type) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.data_type.to_string(),
                got: value.type_name().to_string(),
            })
        }
    }

    fn validate_length(&self, value: &Value) -> Result<()> {
        let Some(max) = self.max_length else {
            return Ok(());
        };
        let len = match value {
            Value::Text(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            _ => return Ok(()),
        };
        if len > max {
            return Err(Error::ValueTooLong {
                field: self.name.clone(),
                len,
                max,
            });
        }
        Ok(())
    }
}

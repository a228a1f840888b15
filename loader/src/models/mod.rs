//! Domain models for the import engine.
//!
//! - [`Value`] - Dynamic value read from a cell, a config file or a fixture
//! - [`RecordRef`] - Reference to a persisted record (class + id)
//! - [`Record`] - Target instance being populated, with its own error list
//! - [`RecordError`] - Problem attached to a record during population

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value.
///
/// Cells always arrive as strings; typed variants appear through conversion,
/// configuration (YAML/JSON scalars) or association lookups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Empty cell or explicit null.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Related records found by an association lookup.
    Records(Vec<RecordRef>),
}

impl Value {
    /// Read a raw cell. Blank cells become [`Value::Null`].
    pub fn from_cell(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Value::Null
        } else {
            Value::String(raw.to_string())
        }
    }

    /// Null, blank string or empty record list.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Records(r) => r.is_empty(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Records(_) => "records",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Records(refs) => {
                let parts: Vec<String> = refs.iter().map(|r| r.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// =============================================================================
// Record Reference
// =============================================================================

/// Identifies a persisted record of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub class: String,
    pub id: u64,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}

// =============================================================================
// Record Errors
// =============================================================================

/// How bad a record error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Partial failure, the record can still be saved.
    Warning,
    /// The record must not be saved.
    Error,
}

/// A problem recorded against one operator of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Operator name, or `base` for record-wide problems.
    pub operator: String,
    pub message: String,
    pub severity: Severity,
}

// =============================================================================
// Record
// =============================================================================

/// A target instance populated from one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity within a session, stable across saves.
    pub uid: Uuid,
    pub class: String,
    /// Store id, `None` until first persisted.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
}

impl Record {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            class: class.into(),
            id: None,
            values: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Build a record from attribute values (fixtures, tests).
    pub fn with_values<I, K>(class: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut record = Self::new(class);
        record.values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        record
    }

    /// Not yet persisted.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Raw write, no type checks. Setters go through [`crate::registry::Setter`].
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn reference(&self) -> Option<RecordRef> {
        self.id.map(|id| RecordRef { class: self.class.clone(), id })
    }

    pub fn add_error(&mut self, operator: impl Into<String>, message: impl Into<String>) {
        self.errors.push(RecordError {
            operator: operator.into(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    pub fn add_warning(&mut self, operator: impl Into<String>, message: impl Into<String>) {
        self.errors.push(RecordError {
            operator: operator.into(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }

    /// Count of entries that block saving.
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|e| e.severity == Severity::Warning).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Messages recorded against an operator.
    pub fn errors_on(&self, operator: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.operator == operator)
            .map(|e| e.message.as_str())
            .collect()
    }
}

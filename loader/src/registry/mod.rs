//! Operator registry.
//!
//! An operator is a named settable path on a target class: a plain attribute
//! or an association to another class. The registry asks a [`ModelInspector`]
//! which operators a class has, resolves how each one assigns values (its
//! [`Setter`]) once, and caches the result per class for the whole session.
//!
//! ```rust,ignore
//! let schema = ModelSchema::from_path("model.yaml")?;
//! let mut registry = OperatorRegistry::new(schema);
//! let operators = registry.operators_for("Product", &RegistryOptions::default())?;
//! let price = operators.find("Price").unwrap();
//! ```

pub mod schema;

use regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MappingError, MappingResult};
use crate::logs::log_info;
use crate::models::{Record, RecordRef, Value};

pub use schema::{AssociationKind, AssociationSchema, ClassSchema, ModelSchema};

// =============================================================================
// Setters
// =============================================================================

/// Natural type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// Accepts any non-null value (virtual setters).
    Any,
}

/// How an operator writes a value into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    /// Typed attribute write.
    Attribute(FieldType),
    /// Replace a single related record.
    AssociationSingle,
    /// Append to a collection of related records.
    AssociationCollection,
}

impl Setter {
    /// Write `value` under `name`, rejecting values of the wrong shape.
    pub fn apply(&self, record: &mut Record, name: &str, value: Value) -> Result<(), String> {
        if value.is_null() {
            return Err("no value".to_string());
        }

        match self {
            Setter::Attribute(field_type) => {
                let accepted = match (field_type, value) {
                    (FieldType::String, v @ Value::String(_)) => v,
                    (FieldType::Integer, v @ Value::Integer(_)) => v,
                    (FieldType::Float, v @ Value::Float(_)) => v,
                    (FieldType::Float, Value::Integer(i)) => Value::Float(i as f64),
                    (FieldType::Boolean, v @ Value::Bool(_)) => v,
                    (FieldType::Any, Value::Records(_)) => {
                        return Err("expected a scalar, got records".to_string())
                    }
                    (FieldType::Any, v) => v,
                    (expected, v) => {
                        return Err(format!(
                            "expected {:?}, got {}",
                            expected,
                            v.type_name()
                        ))
                    }
                };
                record.set(name, accepted);
                Ok(())
            }
            Setter::AssociationSingle => match value {
                Value::Records(mut refs) if refs.len() == 1 => {
                    record.set(name, Value::Records(vec![refs.remove(0)]));
                    Ok(())
                }
                Value::Records(refs) => Err(format!(
                    "expected exactly one related record, got {}",
                    refs.len()
                )),
                other => Err(format!("expected related record, got {}", other.type_name())),
            },
            Setter::AssociationCollection => match value {
                Value::Records(refs) => {
                    let mut current: Vec<RecordRef> = match record.get(name) {
                        Some(Value::Records(existing)) => existing.clone(),
                        _ => Vec::new(),
                    };
                    for r in refs {
                        if !current.contains(&r) {
                            current.push(r);
                        }
                    }
                    record.set(name, Value::Records(current));
                    Ok(())
                }
                other => Err(format!("expected related records, got {}", other.type_name())),
            },
        }
    }
}

// =============================================================================
// Operator Descriptor
// =============================================================================

/// Attribute or association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Attribute,
    Association,
}

/// One settable path on a target class. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDescriptor {
    pub name: String,
    pub kind: OperatorKind,
    /// One-to-many / many-to-many.
    pub is_collection: bool,
    /// Present iff association.
    pub related_class: Option<String>,
    /// Attribute of the related class searched when the cell names no key.
    pub default_lookup_key: Option<String>,
    /// Extra value always appended to the lookup values.
    pub fixed_lookup_value: Option<String>,
    pub setter: Setter,
}

impl OperatorDescriptor {
    pub fn attribute(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            kind: OperatorKind::Attribute,
            is_collection: false,
            related_class: None,
            default_lookup_key: None,
            fixed_lookup_value: None,
            setter: Setter::Attribute(field_type),
        }
    }

    /// Single-valued association (belongs-to / has-one).
    pub fn association(name: impl Into<String>, related_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperatorKind::Association,
            is_collection: false,
            related_class: Some(related_class.into()),
            default_lookup_key: None,
            fixed_lookup_value: None,
            setter: Setter::AssociationSingle,
        }
    }

    /// Collection association (has-many / many-to-many).
    pub fn collection(name: impl Into<String>, related_class: impl Into<String>) -> Self {
        Self {
            is_collection: true,
            setter: Setter::AssociationCollection,
            ..Self::association(name, related_class)
        }
    }

    pub fn with_lookup_key(mut self, key: impl Into<String>) -> Self {
        self.default_lookup_key = Some(key.into());
        self
    }

    pub fn with_fixed_lookup_value(mut self, value: impl Into<String>) -> Self {
        self.fixed_lookup_value = Some(value.into());
        self
    }

    pub fn is_association(&self) -> bool {
        self.kind == OperatorKind::Association
    }

    /// Assign through the resolved setter.
    pub fn assign(&self, record: &mut Record, value: Value) -> Result<(), String> {
        self.setter.apply(record, &self.name, value)
    }
}

// =============================================================================
// Name Normalization
// =============================================================================

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-\.]+").unwrap());

/// Normalize a header or operator name for matching.
///
/// `" Unit Price= "` and `"unit-price"` both become `"unit_price"`.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('=').trim();
    SEPARATORS.replace_all(&trimmed.to_lowercase(), "_").to_string()
}

// =============================================================================
// Class Operators
// =============================================================================

/// All operators of one class, indexed by normalized name.
#[derive(Debug, Clone)]
pub struct ClassOperators {
    class: String,
    operators: Vec<Arc<OperatorDescriptor>>,
    index: HashMap<String, usize>,
}

impl ClassOperators {
    pub fn new(class: impl Into<String>, descriptors: Vec<OperatorDescriptor>) -> Self {
        let operators: Vec<Arc<OperatorDescriptor>> =
            descriptors.into_iter().map(Arc::new).collect();
        let index = operators
            .iter()
            .enumerate()
            .map(|(i, op)| (normalize_name(&op.name), i))
            .collect();
        Self { class: class.into(), operators, index }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Find an operator by a free-text name.
    pub fn find(&self, name: &str) -> Option<Arc<OperatorDescriptor>> {
        self.index
            .get(&normalize_name(name))
            .map(|&i| Arc::clone(&self.operators[i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<OperatorDescriptor>> {
        self.operators.iter()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

// =============================================================================
// Model Inspector
// =============================================================================

/// Discovers the operators of a class.
pub trait ModelInspector {
    /// `include_instance_methods` widens discovery beyond stored attributes
    /// and associations to virtual setters.
    fn operators_for(
        &self,
        class: &str,
        include_instance_methods: bool,
    ) -> MappingResult<Vec<OperatorDescriptor>>;
}

impl<T: ModelInspector + ?Sized> ModelInspector for Arc<T> {
    fn operators_for(
        &self,
        class: &str,
        include_instance_methods: bool,
    ) -> MappingResult<Vec<OperatorDescriptor>> {
        (**self).operators_for(class, include_instance_methods)
    }
}

/// Options for building a class's operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptions {
    /// Rebuild even if cached.
    pub reload: bool,
    pub include_instance_methods: bool,
}

// =============================================================================
// Operator Registry
// =============================================================================

/// Caches operators per class.
pub struct OperatorRegistry {
    inspector: Box<dyn ModelInspector>,
    classes: HashMap<String, Arc<ClassOperators>>,
}

impl OperatorRegistry {
    pub fn new(inspector: impl ModelInspector + 'static) -> Self {
        Self {
            inspector: Box::new(inspector),
            classes: HashMap::new(),
        }
    }

    /// Operators of `class`, built on first use or when `reload` is set.
    pub fn operators_for(
        &mut self,
        class: &str,
        options: &RegistryOptions,
    ) -> MappingResult<Arc<ClassOperators>> {
        if !options.reload {
            if let Some(cached) = self.classes.get(class) {
                return Ok(Arc::clone(cached));
            }
        }

        log_info(format!("Building operator registry for class {}", class));
        let descriptors = self
            .inspector
            .operators_for(class, options.include_instance_methods)?;
        if descriptors.is_empty() {
            return Err(MappingError::UnknownClass(class.to_string()));
        }

        let operators = Arc::new(ClassOperators::new(class, descriptors));
        self.classes.insert(class.to_string(), Arc::clone(&operators));
        Ok(operators)
    }

    /// Rebuild a class's operators with the given instance-method setting.
    pub fn reload(
        &mut self,
        class: &str,
        include_instance_methods: bool,
    ) -> MappingResult<Arc<ClassOperators>> {
        self.operators_for(
            class,
            &RegistryOptions { reload: true, include_instance_methods },
        )
    }

    pub fn is_loaded(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }
}

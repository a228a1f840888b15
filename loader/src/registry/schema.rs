//! Declarative model description.
//!
//! A schema file lists every class with its typed attributes, associations and
//! optional virtual setters. It is the [`ModelInspector`] used by the binary
//! and by [`crate::store::MemoryStore`] for validation.
//!
//! ```yaml
//! classes:
//!   Product:
//!     attributes: { name: string, price: float, status: string }
//!     required: [name]
//!     associations:
//!       category: { class: Category, kind: belongs_to, lookup_key: title }
//!       tags:     { class: Tag, kind: has_many, lookup_key: name }
//!     instance_methods: { display_label: any }
//!   Category:
//!     attributes: { title: string }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{FieldType, ModelInspector, OperatorDescriptor};
use crate::error::{MappingError, MappingResult, SchemaError};

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_collection(&self) -> bool {
        matches!(self, AssociationKind::HasMany | AssociationKind::ManyToMany)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationSchema {
    /// Related class name
    pub class: String,
    pub kind: AssociationKind,
    #[serde(default)]
    pub lookup_key: Option<String>,
    /// Always appended to the lookup values
    #[serde(default)]
    pub lookup_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassSchema {
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldType>,
    /// Attributes that must be present for a record to be valid
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub associations: BTreeMap<String, AssociationSchema>,
    /// Virtual setters, only discovered on request
    #[serde(default)]
    pub instance_methods: BTreeMap<String, FieldType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    #[serde(default)]
    pub classes: BTreeMap<String, ClassSchema>,
}

impl ModelSchema {
    /// Load from a `.json` file, anything else is read as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn class(&self, name: &str) -> Result<&ClassSchema, SchemaError> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownClass(name.to_string()))
    }
}

impl ModelInspector for ModelSchema {
    fn operators_for(
        &self,
        class: &str,
        include_instance_methods: bool,
    ) -> MappingResult<Vec<OperatorDescriptor>> {
        let schema = self
            .classes
            .get(class)
            .ok_or_else(|| MappingError::UnknownClass(class.to_string()))?;

        let mut operators: Vec<OperatorDescriptor> = schema
            .attributes
            .iter()
            .map(|(name, ty)| OperatorDescriptor::attribute(name, *ty))
            .collect();

        for (name, assoc) in &schema.associations {
            let mut op = if assoc.kind.is_collection() {
                OperatorDescriptor::collection(name, &assoc.class)
            } else {
                OperatorDescriptor::association(name, &assoc.class)
            };
            op.default_lookup_key = assoc.lookup_key.clone();
            op.fixed_lookup_value = assoc.lookup_value.clone();
            operators.push(op);
        }

        if include_instance_methods {
            operators.extend(
                schema
                    .instance_methods
                    .iter()
                    .map(|(name, ty)| OperatorDescriptor::attribute(name, *ty)),
            );
        }

        Ok(operators)
    }
}

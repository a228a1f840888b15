//! Value pipeline.
//!
//! Turns a raw cell into the value handed to the coercer or the association
//! resolver. Rules are keyed by operator name and shared by every row:
//!
//! 1. override: hard replacement, the default step is skipped
//! 2. default: used when the value is empty
//! 3. prefix / postfix: wrapped around the string form, after 1 and 2

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Value;
use crate::registry::normalize_name;

/// Per-operator defaults, overrides, prefixes and postfixes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRules {
    #[serde(default)]
    defaults: BTreeMap<String, Value>,
    #[serde(default)]
    overrides: BTreeMap<String, Value>,
    #[serde(default)]
    prefixes: BTreeMap<String, Value>,
    #[serde(default)]
    postfixes: BTreeMap<String, Value>,
}

impl ValueRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective value for `operator` given the raw cell value.
    pub fn prepare(&self, operator: &str, raw: Value) -> Value {
        let key = normalize_name(operator);

        let mut value = match self.overrides.get(&key) {
            Some(forced) => forced.clone(),
            None if raw.is_empty() => self.defaults.get(&key).cloned().unwrap_or(raw),
            None => raw,
        };

        let prefix = self.prefixes.get(&key);
        let postfix = self.postfixes.get(&key);
        if prefix.is_some() || postfix.is_some() {
            value = Value::String(format!(
                "{}{}{}",
                prefix.map(|p| p.to_string()).unwrap_or_default(),
                value,
                postfix.map(|p| p.to_string()).unwrap_or_default(),
            ));
        }

        value
    }

    pub fn set_default(&mut self, operator: &str, value: impl Into<Value>) {
        self.defaults.insert(normalize_name(operator), value.into());
    }

    pub fn set_override(&mut self, operator: &str, value: impl Into<Value>) {
        self.overrides.insert(normalize_name(operator), value.into());
    }

    pub fn set_prefix(&mut self, operator: &str, value: impl Into<Value>) {
        self.prefixes.insert(normalize_name(operator), value.into());
    }

    pub fn set_postfix(&mut self, operator: &str, value: impl Into<Value>) {
        self.postfixes.insert(normalize_name(operator), value.into());
    }

    pub fn default_value(&self, operator: &str) -> Option<&Value> {
        self.defaults.get(&normalize_name(operator))
    }

    pub fn override_value(&self, operator: &str) -> Option<&Value> {
        self.overrides.get(&normalize_name(operator))
    }

    pub fn prefix(&self, operator: &str) -> Option<&Value> {
        self.prefixes.get(&normalize_name(operator))
    }

    pub fn postfix(&self, operator: &str) -> Option<&Value> {
        self.postfixes.get(&normalize_name(operator))
    }

    /// Configured defaults, keyed by normalized operator name.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` over `self`; its entries win.
    pub fn merge(&mut self, other: ValueRules) {
        let normalized = |map: BTreeMap<String, Value>| {
            map.into_iter().map(|(k, v)| (normalize_name(&k), v))
        };
        self.defaults.extend(normalized(other.defaults));
        self.overrides.extend(normalized(other.overrides));
        self.prefixes.extend(normalized(other.prefixes));
        self.postfixes.extend(normalized(other.postfixes));
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
            && self.overrides.is_empty()
            && self.prefixes.is_empty()
            && self.postfixes.is_empty()
    }
}

//! Load configuration.
//!
//! [`LoadOptions`] drive a session. An [`ImportConfig`] file can supply value
//! rules for a target class and option overrides for loaders:
//!
//! ```yaml
//! Product:                 # target class
//!   defaults:  { status: draft }
//!   overrides: { currency: EUR }
//!   prefixes:  { sku: "SKU-" }
//! loader:                  # every loader
//!   strict: true
//! csv:                     # only the loader named "csv", wins over `loader`
//!   abort_on_failure: true
//! ```
//!
//! Sections are merged in that order: class rules, `loader`, then the
//! loader-specific section. Later entries override earlier ones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::logs::log_info;
use crate::registry::RegistryOptions;
use crate::transform::{MappingOptions, ValueRules};

/// Section applied to every loader.
pub const GENERIC_SECTION: &str = "loader";

/// Environment variable naming a default config file.
pub const CONFIG_ENV: &str = "SHIFTLOAD_CONFIG";

/// Options for one load session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(flatten)]
    pub mapping: MappingOptions,
    /// Stop the run on the first record that fails to save
    #[serde(default)]
    pub abort_on_failure: bool,
    /// Process everything but persist nothing
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub verbose: bool,
    /// Rebuild the operator registry for the class
    #[serde(default)]
    pub reload: bool,
    /// Discover virtual setters as well as attributes
    #[serde(default)]
    pub include_instance_methods: bool,
}

impl LoadOptions {
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            reload: self.reload,
            include_instance_methods: self.include_instance_methods,
        }
    }
}

/// Partial options from a loader section. Absent keys leave options untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OptionsPatch {
    pub strict: Option<bool>,
    pub ignore: Option<Vec<String>>,
    pub mandatory: Option<Vec<String>>,
    pub force_inclusion: Option<Vec<String>>,
    pub include_all: Option<bool>,
    pub abort_on_failure: Option<bool>,
    pub dry_run: Option<bool>,
    pub verbose: Option<bool>,
    pub reload: Option<bool>,
    pub include_instance_methods: Option<bool>,
}

impl OptionsPatch {
    pub fn apply_to(self, options: &mut LoadOptions) {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *target = v;
            }
        }

        set(&mut options.mapping.strict, self.strict);
        set(&mut options.mapping.ignore, self.ignore);
        set(&mut options.mapping.mandatory, self.mandatory);
        set(&mut options.mapping.force_inclusion, self.force_inclusion);
        set(&mut options.mapping.include_all, self.include_all);
        set(&mut options.abort_on_failure, self.abort_on_failure);
        set(&mut options.dry_run, self.dry_run);
        set(&mut options.verbose, self.verbose);
        set(&mut options.reload, self.reload);
        set(&mut options.include_instance_methods, self.include_instance_methods);
    }
}

/// A parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportConfig {
    sections: BTreeMap<String, serde_yaml::Value>,
}

impl ImportConfig {
    /// Load from a `.json` file, anything else is read as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        log_info(format!("Reading loading config: {}", path.display()));
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let sections: Option<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(content)?;
        Ok(Self { sections: sections.unwrap_or_default() })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(Self { sections: serde_json::from_str(content)? })
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Value rules declared for `class`, if any.
    pub fn value_rules(&self, class: &str) -> Result<Option<ValueRules>, ConfigError> {
        self.section(class)
    }

    /// Options patch of a loader section, if any.
    pub fn options_patch(&self, section: &str) -> Result<Option<OptionsPatch>, ConfigError> {
        self.section(section)
    }

    /// Merge class rules, generic loader options and loader-specific options.
    pub fn apply(
        &self,
        class: &str,
        loader: &str,
        rules: &mut ValueRules,
        options: &mut LoadOptions,
    ) -> Result<(), ConfigError> {
        if let Some(class_rules) = self.value_rules(class)? {
            log_info(format!("Assigning defaults and overrides for {} from config", class));
            rules.merge(class_rules);
        }

        for name in [GENERIC_SECTION, loader] {
            if let Some(patch) = self.options_patch(name)? {
                patch.apply_to(options);
            }
        }

        log_info(format!("Loader options: {:?}", options));
        Ok(())
    }

    fn section<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.sections
            .get(name)
            .map(|value| {
                serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidSection {
                    section: name.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    const CONFIG: &str = r#"
Product:
  defaults:
    status: draft
    stock: 0
  overrides:
    currency: EUR
  prefixes:
    sku: "SKU-"
loader:
  strict: true
  abort_on_failure: false
  mandatory: [name]
csv:
  abort_on_failure: true
"#;

    #[test]
    fn test_class_rules_are_merged() {
        let config = ImportConfig::from_yaml_str(CONFIG).unwrap();
        let mut rules = ValueRules::new();
        let mut options = LoadOptions::default();

        config.apply("Product", "csv", &mut rules, &mut options).unwrap();

        assert_eq!(rules.default_value("status"), Some(&Value::from("draft")));
        assert_eq!(rules.default_value("stock"), Some(&Value::Integer(0)));
        assert_eq!(rules.override_value("currency"), Some(&Value::from("EUR")));
        assert_eq!(rules.prefix("sku"), Some(&Value::from("SKU-")));
    }

    #[test]
    fn test_loader_specific_section_wins() {
        let config = ImportConfig::from_yaml_str(CONFIG).unwrap();
        let mut rules = ValueRules::new();

        let mut csv = LoadOptions::default();
        config.apply("Product", "csv", &mut rules, &mut csv).unwrap();
        assert!(csv.mapping.strict);
        assert!(csv.abort_on_failure);
        assert_eq!(csv.mapping.mandatory, vec!["name"]);

        let mut excel = LoadOptions::default();
        config.apply("Product", "excel", &mut rules, &mut excel).unwrap();
        assert!(excel.mapping.strict);
        assert!(!excel.abort_on_failure);
    }

    #[test]
    fn test_config_overrides_existing_rules() {
        let config = ImportConfig::from_yaml_str(CONFIG).unwrap();
        let mut rules = ValueRules::new();
        rules.set_default("status", "live");
        rules.set_default("colour", "black");

        config
            .apply("Product", "csv", &mut rules, &mut LoadOptions::default())
            .unwrap();

        assert_eq!(rules.default_value("status"), Some(&Value::from("draft")));
        assert_eq!(rules.default_value("colour"), Some(&Value::from("black")));
    }

    #[test]
    fn test_invalid_section() {
        let config = ImportConfig::from_yaml_str("loader:\n  strict: [1, 2]\n").unwrap();
        let err = config
            .apply("Product", "csv", &mut ValueRules::new(), &mut LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { .. }));
    }

    #[test]
    fn test_json_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"Product": {"defaults": {"status": "draft"}}}"#).unwrap();

        let config = ImportConfig::from_path(&path).unwrap();
        assert!(config.has_section("Product"));
        assert!(config.value_rules("Product").unwrap().is_some());
        assert!(config.value_rules("Tag").unwrap().is_none());
    }

    #[test]
    fn test_empty_document() {
        let config = ImportConfig::from_yaml_str("").unwrap();
        assert_eq!(config, ImportConfig::default());
    }
}

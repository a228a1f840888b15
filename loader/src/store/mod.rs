//! Persistence seam.
//!
//! The engine never decides how records are stored. It asks a [`Store`] to
//! persist a record and to search related records when resolving
//! associations. [`MemoryStore`] keeps everything in memory, optionally
//! validates against a [`ModelSchema`], and can be seeded from a fixtures file:
//!
//! ```yaml
//! Category:
//!   - { title: Tools }
//!   - { title: Garden }
//! Tag:
//!   - { name: red }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PersistenceError, PersistenceResult, SchemaError};
use crate::models::{Record, RecordRef, Value};
use crate::registry::ModelSchema;

/// Persistence and lookup of target records.
pub trait Store {
    /// Create or update `record`, setting its id. Returns the id.
    fn save(&mut self, record: &mut Record) -> PersistenceResult<u64>;

    /// Check a record without persisting it.
    fn validate(&self, _record: &Record) -> PersistenceResult<()> {
        Ok(())
    }

    /// Records of `class` whose `key` attribute equals one of `values`.
    fn find_all_by(&self, class: &str, key: &str, values: &[String])
        -> PersistenceResult<Vec<Record>>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn save(&mut self, record: &mut Record) -> PersistenceResult<u64> {
        (**self).save(record)
    }

    fn validate(&self, record: &Record) -> PersistenceResult<()> {
        (**self).validate(record)
    }

    fn find_all_by(
        &self,
        class: &str,
        key: &str,
        values: &[String],
    ) -> PersistenceResult<Vec<Record>> {
        (**self).find_all_by(class, key, values)
    }
}

/// In-memory store, one table per class.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schema: Option<Arc<ModelSchema>>,
    tables: BTreeMap<String, Vec<Record>>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate saves against required attributes of the schema.
    pub fn with_schema(schema: Arc<ModelSchema>) -> Self {
        Self { schema: Some(schema), ..Self::default() }
    }

    /// Load fixtures from a `.json` file, anything else is read as YAML.
    pub fn seed_from_path(&mut self, path: impl AsRef<Path>) -> Result<usize, SchemaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let fixtures: BTreeMap<String, Vec<BTreeMap<String, Value>>> =
            if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };
        Ok(self.seed(fixtures))
    }

    /// Insert fixture rows without validation. Returns the number inserted.
    pub fn seed(&mut self, fixtures: BTreeMap<String, Vec<BTreeMap<String, Value>>>) -> usize {
        let mut count = 0;
        for (class, rows) in fixtures {
            for values in rows {
                self.insert(Record::with_values(class.clone(), values));
                count += 1;
            }
        }
        count
    }

    /// Insert a record as is, assigning an id.
    pub fn insert(&mut self, mut record: Record) -> RecordRef {
        let id = self.allocate_id();
        record.id = Some(id);
        let reference = RecordRef { class: record.class.clone(), id };
        self.tables.entry(record.class.clone()).or_default().push(record);
        reference
    }

    pub fn records(&self, class: &str) -> &[Record] {
        self.tables.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, reference: &RecordRef) -> Option<&Record> {
        self.records(&reference.class)
            .iter()
            .find(|r| r.id == Some(reference.id))
    }

    pub fn count(&self, class: &str) -> usize {
        self.records(class).len()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Store for MemoryStore {
    fn save(&mut self, record: &mut Record) -> PersistenceResult<u64> {
        self.validate(record)?;

        let table = self.tables.entry(record.class.clone()).or_default();
        if let Some(id) = record.id {
            if let Some(existing) = table.iter_mut().find(|r| r.id == Some(id)) {
                *existing = record.clone();
                return Ok(id);
            }
        }

        let id = record.id.unwrap_or_else(|| self.allocate_id());
        record.id = Some(id);
        self.tables
            .entry(record.class.clone())
            .or_default()
            .push(record.clone());
        Ok(id)
    }

    fn validate(&self, record: &Record) -> PersistenceResult<()> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };

        let class = schema
            .classes
            .get(&record.class)
            .ok_or_else(|| PersistenceError::UnknownClass(record.class.clone()))?;

        let reasons: Vec<String> = class
            .required
            .iter()
            .filter(|name| record.get(name).map_or(true, Value::is_empty))
            .map(|name| format!("{} can't be blank", name))
            .collect();

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(PersistenceError::Invalid { class: record.class.clone(), reasons })
        }
    }

    fn find_all_by(
        &self,
        class: &str,
        key: &str,
        values: &[String],
    ) -> PersistenceResult<Vec<Record>> {
        if let Some(schema) = &self.schema {
            if !schema.classes.contains_key(class) {
                return Err(PersistenceError::UnknownClass(class.to_string()));
            }
        }

        Ok(self
            .records(class)
            .iter()
            .filter(|r| {
                r.get(key)
                    .map(|v| values.iter().any(|wanted| *wanted == v.to_string()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::from_yaml_str(
                "classes:\n  Product:\n    attributes: { name: string }\n    required: [name]\n  Tag:\n    attributes: { name: string }\n",
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_save_assigns_id_once() {
        let mut store = MemoryStore::new();
        let mut record = Record::with_values("Product", [("name", Value::from("Widget"))]);

        let id = store.save(&mut record).unwrap();
        assert_eq!(record.id, Some(id));

        record.set("name", Value::from("Gadget"));
        assert_eq!(store.save(&mut record).unwrap(), id);
        assert_eq!(store.count("Product"), 1);
        assert_eq!(store.records("Product")[0].get("name"), Some(&Value::from("Gadget")));
    }

    #[test]
    fn test_validation_uses_required_attributes() {
        let mut store = MemoryStore::with_schema(schema());
        let mut record = Record::new("Product");

        let err = store.save(&mut record).unwrap_err();
        assert!(matches!(err, PersistenceError::Invalid { .. }));
        assert!(record.is_new());
        assert_eq!(store.count("Product"), 0);
    }

    #[test]
    fn test_find_all_by_compares_string_forms() {
        let mut store = MemoryStore::new();
        store.insert(Record::with_values("Tag", [("name", Value::from("red"))]));
        store.insert(Record::with_values("Tag", [("name", Value::from("blue"))]));
        store.insert(Record::with_values("Tag", [("code", Value::Integer(7))]));

        let found = store
            .find_all_by("Tag", "name", &["red".into(), "green".into()])
            .unwrap();
        assert_eq!(found.len(), 1);

        let by_code = store.find_all_by("Tag", "code", &["7".into()]).unwrap();
        assert_eq!(by_code.len(), 1);
    }

    #[test]
    fn test_unknown_class_with_schema() {
        let store = MemoryStore::with_schema(schema());
        assert!(store.find_all_by("Ghost", "name", &["x".into()]).is_err());
    }

    #[test]
    fn test_seed_from_yaml_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.yaml");
        std::fs::write(&path, "Tag:\n  - { name: red }\n  - { name: blue }\n").unwrap();

        let mut store = MemoryStore::new();
        assert_eq!(store.seed_from_path(&path).unwrap(), 2);
        assert!(store.records("Tag").iter().all(|r| r.id.is_some()));
    }
}

//! Load session: one import run against one target class.
//!
//! The session owns the record being populated, the value rules shared by
//! every row and the running loaded/failed lists. A record (by uid) is in at
//! most one of those lists; saving it again moves it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LoadOptions;
use crate::error::{CellError, LoadError, LoadResult, MappingResult, PersistenceError};
use crate::logs::{log_debug, log_info, log_success, log_warning, log_warning_indent, LOG_BROADCASTER};
use crate::models::{Record, Value};
use crate::registry::{normalize_name, ClassOperators, OperatorDescriptor};
use crate::store::Store;
use crate::transform::{self, ColumnMap, HeaderMapping, ValueRules};

use super::report::LoadReport;

/// Handler for a force-included column. Receives the raw cell value.
pub type ColumnHandler = Box<dyn FnMut(&mut Record, &Value) -> Result<(), String>>;

pub struct LoadSession<S: Store> {
    operators: Arc<ClassOperators>,
    options: LoadOptions,
    rules: ValueRules,
    store: S,
    column_map: Option<ColumnMap>,
    handlers: HashMap<String, ColumnHandler>,
    record: Record,
    loaded: Vec<Record>,
    failed: Vec<Record>,
    current_value: Option<Value>,
    current_operator: Option<Arc<OperatorDescriptor>>,
    rows: usize,
    started_at: DateTime<Utc>,
}

impl<S: Store> LoadSession<S> {
    pub fn new(operators: Arc<ClassOperators>, options: LoadOptions, store: S) -> Self {
        LOG_BROADCASTER.set_verbose(options.verbose);

        let record = Record::new(operators.class());
        Self {
            operators,
            options,
            rules: ValueRules::new(),
            store,
            column_map: None,
            handlers: HashMap::new(),
            record,
            loaded: Vec::new(),
            failed: Vec::new(),
            current_value: None,
            current_operator: None,
            rows: 0,
            started_at: Utc::now(),
        }
    }

    pub fn with_rules(mut self, rules: ValueRules) -> Self {
        self.rules = rules;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn class(&self) -> &str {
        self.operators.class()
    }

    pub fn operators(&self) -> &ClassOperators {
        &self.operators
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn rules(&self) -> &ValueRules {
        &self.rules
    }

    /// Rules may change between rows; later rows see the new values.
    pub fn rules_mut(&mut self) -> &mut ValueRules {
        &mut self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn column_map(&self) -> Option<&ColumnMap> {
        self.column_map.as_ref()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn loaded_records(&self) -> &[Record] {
        &self.loaded
    }

    pub fn failed_records(&self) -> &[Record] {
        &self.failed
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Value of the cell being processed, after the value rules.
    pub fn current_value(&self) -> Option<&Value> {
        self.current_value.as_ref()
    }

    pub fn current_operator(&self) -> Option<&OperatorDescriptor> {
        self.current_operator.as_deref()
    }

    // -------------------------------------------------------------------------
    // Headers
    // -------------------------------------------------------------------------

    /// Map the header row. Must run before any data row.
    pub fn map_headers(&mut self, headers: &[String]) -> MappingResult<&ColumnMap> {
        log_info(format!("Mapping {} headers to class {}", headers.len(), self.class()));
        let column_map = transform::map_headers(headers, &self.operators, &self.options.mapping)?;
        Ok(&*self.column_map.insert(column_map))
    }

    /// Register a handler for a force-included header.
    pub fn register_column_handler<F>(&mut self, header: &str, handler: F)
    where
        F: FnMut(&mut Record, &Value) -> Result<(), String> + 'static,
    {
        self.handlers.insert(normalize_name(header), Box::new(handler));
    }

    // -------------------------------------------------------------------------
    // Rows and cells
    // -------------------------------------------------------------------------

    /// Start a new record, or continue with `record` when given.
    pub fn reset(&mut self, record: Option<Record>) {
        self.record = record.unwrap_or_else(|| Record::new(self.operators.class()));
        self.current_value = None;
        self.current_operator = None;
    }

    /// Process one cell of the current record by header name.
    pub fn process_cell(&mut self, header: &str, raw: &str) -> Result<(), CellError> {
        let mapping = self
            .column_map
            .as_ref()
            .and_then(|map| map.get(header))
            .cloned();

        match mapping {
            Some(mapping) => self.process_mapped_cell(&mapping, raw),
            None => {
                log_warning_indent(format!("No operator mapped for column '{}', value ignored", header), 1);
                Ok(())
            }
        }
    }

    fn process_mapped_cell(&mut self, mapping: &HeaderMapping, raw: &str) -> Result<(), CellError> {
        self.current_value = None;
        self.current_operator = None;

        let Some(operator) = mapping.operator.clone() else {
            return self.run_column_handler(mapping, raw);
        };

        let value = self.rules.prepare(&operator.name, Value::from_cell(raw));
        self.current_value = Some(value.clone());
        self.current_operator = Some(Arc::clone(&operator));

        if operator.is_association() && !value.is_empty() {
            if operator.is_collection {
                self.save_if_new()?;
            }
            transform::resolve_and_assign(
                &mut self.record,
                &operator,
                mapping.lookup_key.as_deref(),
                &value.to_string(),
                &self.store,
            )?;
        } else {
            transform::assign(&mut self.record, &operator, value)?;
        }

        Ok(())
    }

    fn run_column_handler(&mut self, mapping: &HeaderMapping, raw: &str) -> Result<(), CellError> {
        if !mapping.forced {
            log_warning_indent(format!("No operator mapped for column '{}', value ignored", mapping.header), 1);
            return Ok(());
        }

        let value = Value::from_cell(raw);
        self.current_value = Some(value.clone());

        match self.handlers.get_mut(&normalize_name(&mapping.header)) {
            Some(handler) => handler(&mut self.record, &value).map_err(|message| CellError::Handler {
                header: mapping.header.clone(),
                message,
            }),
            None => {
                log_debug(format!("Forced column '{}' has no handler", mapping.header));
                Ok(())
            }
        }
    }

    /// Persist the record before a collection is assigned to it.
    fn save_if_new(&mut self) -> Result<(), CellError> {
        if !self.record.is_new() || self.options.dry_run || self.record.has_errors() {
            return Ok(());
        }
        if self.store.validate(&self.record).is_ok() {
            self.store.save(&mut self.record)?;
        }
        Ok(())
    }

    /// Process a full data row, cells in header order.
    ///
    /// Cell errors are recorded on the record and never stop the row. Fails
    /// only when headers were not mapped or a save fails under `strict` or
    /// `abort_on_failure`.
    pub fn process_row(&mut self, cells: &[String]) -> LoadResult<()> {
        let mappings: Vec<HeaderMapping> = self
            .column_map
            .as_ref()
            .ok_or(LoadError::NotMapped)?
            .mappings()
            .iter()
            .filter(|m| m.mapped || m.forced)
            .cloned()
            .collect();

        self.rows += 1;
        self.reset(None);

        for mapping in &mappings {
            let raw = cells.get(mapping.column).map(String::as_str).unwrap_or("");
            if let Err(e) = self.process_mapped_cell(mapping, raw) {
                let operator = mapping.operator_name().unwrap_or(&mapping.header).to_string();
                log_warning_indent(format!("Row {}: {}", self.rows, e), 1);
                self.record.add_error(operator, e.to_string());
            }
        }

        self.apply_missing_column_defaults();
        self.finalize_row()
    }

    /// Assign every default whose operator has no column in this file.
    pub fn apply_missing_column_defaults(&mut self) {
        let defaults: Vec<(String, Value)> = self
            .rules
            .defaults()
            .filter(|(name, _)| {
                !self
                    .column_map
                    .as_ref()
                    .is_some_and(|map| map.contains_operator(name))
            })
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        for (name, value) in defaults {
            let Some(operator) = self.operators.find(&name) else {
                log_warning(format!("Default set for unknown operator {} on {}", name, self.class()));
                continue;
            };

            let result = if operator.is_association() && !value.is_empty() {
                let saved = if operator.is_collection { self.save_if_new() } else { Ok(()) };
                saved.and_then(|_| {
                    transform::resolve_and_assign(
                        &mut self.record,
                        &operator,
                        None,
                        &value.to_string(),
                        &self.store,
                    )
                    .map(|_| ())
                })
            } else {
                transform::assign(&mut self.record, &operator, value)
                    .map(|_| ())
                    .map_err(CellError::from)
            };

            if let Err(e) = result {
                self.record.add_error(&operator.name, e.to_string());
            }
        }
    }

    pub fn finalize_row(&mut self) -> LoadResult<()> {
        self.save().map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Persistence and bookkeeping
    // -------------------------------------------------------------------------

    /// Save the current record. Returns whether it was persisted (or, in a dry
    /// run, would have been).
    ///
    /// A failed save moves the record to the failed list; the error escalates
    /// only under `strict` or `abort_on_failure`.
    pub fn save(&mut self) -> LoadResult<bool> {
        let outcome = if self.record.has_errors() {
            Err(PersistenceError::Rejected {
                class: self.record.class.clone(),
                count: self.record.error_count(),
            })
        } else if self.options.dry_run {
            self.store.validate(&self.record)
        } else {
            self.store.save(&mut self.record).map(|_| ())
        };

        match outcome {
            Ok(()) => {
                log_debug(format!("Row {}: {} saved", self.rows, self.record.class));
                self.mark_loaded();
                Ok(true)
            }
            Err(e) => {
                log_warning(format!("Row {}: {}", self.rows, e));
                if !matches!(e, PersistenceError::Rejected { .. }) {
                    self.record.add_error("base", e.to_string());
                }
                self.mark_failed();

                if self.options.mapping.strict || self.options.abort_on_failure {
                    return Err(LoadError::Aborted { row: self.rows, source: e });
                }
                Ok(false)
            }
        }
    }

    fn mark_loaded(&mut self) {
        let uid = self.record.uid;
        self.failed.retain(|r| r.uid != uid);
        match self.loaded.iter_mut().find(|r| r.uid == uid) {
            Some(existing) => *existing = self.record.clone(),
            None => self.loaded.push(self.record.clone()),
        }
    }

    fn mark_failed(&mut self) {
        let uid = self.record.uid;
        self.loaded.retain(|r| r.uid != uid);
        match self.failed.iter_mut().find(|r| r.uid == uid) {
            Some(existing) => *existing = self.record.clone(),
            None => self.failed.push(self.record.clone()),
        }
    }

    /// Summarize the run. Never fails.
    pub fn report(&self) -> LoadReport {
        let report = LoadReport::build(
            self.class(),
            self.rows,
            &self.loaded,
            &self.failed,
            self.options.dry_run,
            self.started_at,
        );

        if report.is_success() {
            log_success(report.summary());
        } else {
            log_warning(report.summary());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordRef, Severity};
    use crate::registry::{ModelSchema, OperatorRegistry};
    use crate::store::MemoryStore;

    const SCHEMA: &str = r#"
classes:
  Product:
    attributes: { name: string, price: float, status: string, sku: string }
    required: [name]
    associations:
      category: { class: Category, kind: belongs_to, lookup_key: title }
      tags: { class: Tag, kind: has_many, lookup_key: name }
  Category:
    attributes: { title: string }
  Tag:
    attributes: { name: string }
"#;

    fn session(options: LoadOptions) -> LoadSession<MemoryStore> {
        let schema = Arc::new(ModelSchema::from_yaml_str(SCHEMA).unwrap());
        let mut registry = OperatorRegistry::new(Arc::clone(&schema));
        let operators = registry
            .operators_for("Product", &options.registry_options())
            .unwrap();

        let mut store = MemoryStore::with_schema(schema);
        store.insert(Record::with_values("Category", [("title", Value::from("Tools"))]));
        for name in ["red", "blue"] {
            store.insert(Record::with_values("Tag", [("name", Value::from(name))]));
        }

        LoadSession::new(operators, options, store)
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn tools(session: &LoadSession<MemoryStore>) -> RecordRef {
        session.store().records("Category")[0].reference().unwrap()
    }

    #[test]
    fn test_end_to_end_row() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["name", "price", "category:title"])).unwrap();

        session.process_row(&row(&["Widget", "9.99", "Tools"])).unwrap();

        assert_eq!(session.loaded_count(), 1);
        let record = &session.loaded_records()[0];
        assert_eq!(record.get("name"), Some(&Value::from("Widget")));
        assert_eq!(record.get("price"), Some(&Value::Float(9.99)));
        assert_eq!(record.get("category"), Some(&Value::Records(vec![tools(&session)])));
        assert!(record.id.is_some());
        assert_eq!(session.store().count("Product"), 1);
    }

    #[test]
    fn test_defaults_for_missing_columns() {
        let mut session = session(LoadOptions::default());
        session.rules_mut().set_default("status", "draft");
        session.map_headers(&row(&["name"])).unwrap();

        session.process_row(&row(&["Widget"])).unwrap();
        session.process_row(&row(&["Gadget"])).unwrap();

        assert_eq!(session.loaded_count(), 2);
        for record in session.loaded_records() {
            assert_eq!(record.get("status"), Some(&Value::from("draft")));
        }
    }

    #[test]
    fn test_default_association_for_missing_column() {
        let mut session = session(LoadOptions::default());
        session.rules_mut().set_default("category", "Tools");
        session.map_headers(&row(&["name"])).unwrap();

        session.process_row(&row(&["Widget"])).unwrap();

        let expected = Value::Records(vec![tools(&session)]);
        assert_eq!(session.loaded_records()[0].get("category"), Some(&expected));
    }

    #[test]
    fn test_override_and_prefix_applied_per_cell() {
        let mut session = session(LoadOptions::default());
        session.rules_mut().set_override("status", "live");
        session.rules_mut().set_prefix("sku", "SKU-");
        session.map_headers(&row(&["name", "status", "sku"])).unwrap();

        session.process_row(&row(&["Widget", "draft", "42"])).unwrap();

        let record = &session.loaded_records()[0];
        assert_eq!(record.get("status"), Some(&Value::from("live")));
        assert_eq!(record.get("sku"), Some(&Value::from("SKU-42")));
    }

    #[test]
    fn test_bad_cell_fails_row_and_run_continues() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["name", "price"])).unwrap();

        session.process_row(&row(&["Widget", "cheap"])).unwrap();
        session.process_row(&row(&["Gadget", "2.50"])).unwrap();

        assert_eq!(session.failed_count(), 1);
        assert_eq!(session.loaded_count(), 1);
        let failed = &session.failed_records()[0];
        assert_eq!(failed.errors_on("price").len(), 1);
        assert_eq!(failed.errors[0].severity, Severity::Error);
        assert_eq!(session.store().count("Product"), 1);
    }

    #[test]
    fn test_abort_on_failure() {
        let options = LoadOptions { abort_on_failure: true, ..Default::default() };
        let mut session = session(options);
        session.map_headers(&row(&["name", "price"])).unwrap();

        session.process_row(&row(&["Widget", "1.00"])).unwrap();
        let err = session.process_row(&row(&["", "2.00"])).unwrap_err();

        match err {
            LoadError::Aborted { row, source } => {
                assert_eq!(row, 2);
                assert!(matches!(source, PersistenceError::Invalid { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.failed_count(), 1);
    }

    #[test]
    fn test_dry_run_persists_nothing() {
        let options = LoadOptions { dry_run: true, ..Default::default() };
        let mut session = session(options);
        session.map_headers(&row(&["name", "tags"])).unwrap();

        session.process_row(&row(&["Widget", "red"])).unwrap();

        assert_eq!(session.loaded_count(), 1);
        assert_eq!(session.store().count("Product"), 0);
        assert!(session.loaded_records()[0].is_new());
        assert!(session.report().dry_run);
    }

    #[test]
    fn test_loaded_and_failed_are_exclusive() {
        let mut session = session(LoadOptions::default());
        session.reset(None);

        assert!(!session.save().unwrap());
        assert_eq!(session.failed_count(), 1);

        session.record_mut().errors.clear();
        session.record_mut().set("name", Value::from("Widget"));
        assert!(session.save().unwrap());

        assert_eq!(session.failed_count(), 0);
        assert_eq!(session.loaded_count(), 1);

        assert!(session.save().unwrap());
        assert_eq!(session.loaded_count(), 1);
        assert_eq!(session.store().count("Product"), 1);
    }

    #[test]
    fn test_collection_saves_record_first() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["name", "tags"])).unwrap();

        session.process_row(&row(&["Widget", "red,green,blue"])).unwrap();

        assert_eq!(session.loaded_count(), 1);
        assert_eq!(session.store().count("Product"), 1);
        let record = &session.loaded_records()[0];
        match record.get("tags") {
            Some(Value::Records(refs)) => assert_eq!(refs.len(), 2),
            other => panic!("unexpected value: {other:?}"),
        }
        assert!(record.errors_on("tags")[0].contains("green"));
        assert_eq!(session.report().warnings, 1);
    }

    #[test]
    fn test_unknown_category_is_a_warning() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["name", "category"])).unwrap();

        session.process_row(&row(&["Widget", "unknown"])).unwrap();

        let record = &session.loaded_records()[0];
        assert!(record.get("category").is_none());
        assert_eq!(record.warning_count(), 1);
    }

    #[test]
    fn test_forced_column_handler() {
        let options = LoadOptions {
            mapping: crate::transform::MappingOptions {
                strict: true,
                force_inclusion: vec!["Legacy Code".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut session = session(options);
        session.register_column_handler("legacy code", |record, value| {
            record.set("sku", Value::from(format!("L-{}", value)));
            Ok(())
        });
        session.map_headers(&row(&["name", "Legacy Code"])).unwrap();

        session.process_row(&row(&["Widget", "77"])).unwrap();

        assert_eq!(session.loaded_records()[0].get("sku"), Some(&Value::from("L-77")));
    }

    #[test]
    fn test_failing_handler_fails_row() {
        let options = LoadOptions {
            mapping: crate::transform::MappingOptions {
                include_all: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut session = session(options);
        session.register_column_handler("notes", |_, _| Err("unsupported".to_string()));
        session.map_headers(&row(&["name", "notes"])).unwrap();

        session.process_row(&row(&["Widget", "x"])).unwrap();

        assert_eq!(session.failed_count(), 1);
        assert!(session.failed_records()[0].errors_on("notes")[0].contains("unsupported"));
    }

    #[test]
    fn test_row_before_headers() {
        let mut session = session(LoadOptions::default());
        assert!(matches!(
            session.process_row(&row(&["Widget"])),
            Err(LoadError::NotMapped)
        ));
    }

    #[test]
    fn test_process_cell_tracks_current_value() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["Name", "weight"])).unwrap();
        session.reset(None);

        session.process_cell("name", "Widget").unwrap();
        assert_eq!(session.current_value(), Some(&Value::from("Widget")));
        assert_eq!(session.current_operator().map(|op| op.name.as_str()), Some("name"));

        session.process_cell("weight", "12").unwrap();
        assert!(session.record().get("weight").is_none());
    }

    #[test]
    fn test_header_lookup_key_any_case() {
        let mut session = session(LoadOptions::default());
        session.map_headers(&row(&["name", "Category:Title"])).unwrap();

        session.process_row(&row(&["Widget", "Tools"])).unwrap();

        let record = &session.loaded_records()[0];
        assert_eq!(record.get("category"), Some(&Value::Records(vec![tools(&session)])));
        assert!(record.errors.is_empty());
    }

    #[test]
    fn test_strict_escalates_failed_save() {
        let options = LoadOptions {
            mapping: crate::transform::MappingOptions { strict: true, ..Default::default() },
            ..Default::default()
        };
        let mut session = session(options);
        session.map_headers(&row(&["name", "price"])).unwrap();

        let err = session.process_row(&row(&["", "2.00"])).unwrap_err();

        assert!(matches!(err, LoadError::Aborted { row: 1, .. }));
        assert_eq!(session.failed_count(), 1);
    }

    #[test]
    fn test_collection_default_saves_record_first() {
        let mut session = session(LoadOptions::default());
        session.rules_mut().set_default("tags", "red,blue");
        session.map_headers(&row(&["name"])).unwrap();
        session.reset(None);
        session.record_mut().set("name", Value::from("Widget"));

        session.apply_missing_column_defaults();

        assert!(!session.record().is_new());
        assert_eq!(session.store().count("Product"), 1);
        match session.record().get("tags") {
            Some(Value::Records(refs)) => assert_eq!(refs.len(), 2),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_follows_each_session() {
        let _verbose = session(LoadOptions { verbose: true, ..Default::default() });
        let _quiet = session(LoadOptions::default());
        assert!(!LOG_BROADCASTER.is_verbose());
    }
}

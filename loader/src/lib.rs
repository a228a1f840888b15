//! # Shiftload - header-driven tabular import
//!
//! Shiftload loads CSV and spreadsheet files into records of a target class.
//! Column headers are matched to the operators (attributes and associations)
//! of the class; each cell is then prepared, coerced and assigned, and every
//! record is saved through a pluggable store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV / XLS  │────▶│   Headers   │────▶│    Cells    │────▶│    Store    │
//! │ (auto-enc)  │     │  (mapper)   │     │ (rules +    │     │ (loaded /   │
//! │             │     │             │     │  coercion)  │     │  failed)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shiftload::{perform_load, LoadOptions, LoadSession, MemoryStore, ModelSchema, OperatorRegistry};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(ModelSchema::from_path("schema.yaml")?);
//! let mut registry = OperatorRegistry::new(Arc::clone(&schema));
//! let options = LoadOptions::default();
//! let operators = registry.operators_for("Product", &options.registry_options())?;
//!
//! let mut session = LoadSession::new(operators, options, MemoryStore::with_schema(schema));
//! let report = perform_load("products.csv", &mut session)?;
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Process log broadcast
//! - [`models`] - Values and records
//! - [`registry`] - Operators of a class and model schemas
//! - [`parser`] - CSV and spreadsheet row sources
//! - [`transform`] - Header mapping, value rules, coercion, associations
//! - [`store`] - Persistence seam
//! - [`config`] - Load options and configuration files
//! - [`loader`] - Load session and reporting

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Operators
pub mod registry;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Persistence
pub mod store;

// Configuration
pub mod config;

// Orchestration
pub mod loader;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AssignmentFailure,
    CellError,
    ConfigError,
    LoadError,
    LoadResult,
    MappingError,
    PersistenceError,
    ResolutionError,
    SchemaError,
    SourceError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Record, RecordError, RecordRef, Severity, Value};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{
    normalize_name,
    ClassOperators,
    FieldType,
    ModelInspector,
    ModelSchema,
    OperatorDescriptor,
    OperatorKind,
    OperatorRegistry,
    RegistryOptions,
    Setter,
};

// =============================================================================
// Re-exports - Row sources
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    open_source,
    CsvSource,
    ExcelSource,
    RowSource,
    SourceKind,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    assign,
    map_headers,
    resolve,
    Assignment,
    AssociationLookupSpec,
    ColumnMap,
    Conversion,
    HeaderMapping,
    MappingOptions,
    ValueRules,
};

// =============================================================================
// Re-exports - Store, config, loader
// =============================================================================

pub use store::{MemoryStore, Store};

pub use config::{ImportConfig, LoadOptions};

pub use loader::{load_rows, perform_load, LoadReport, LoadSession};

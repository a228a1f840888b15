//! Error types for the import engine.
//!
//! Errors fall into two groups:
//!
//! - run-level errors that stop a load before or during processing:
//!   [`MappingError`], [`SourceError`], [`ConfigError`], [`SchemaError`], [`LoadError`]
//! - row-level errors that are attached to the record being populated and never
//!   abort the run on their own: [`AssignmentFailure`], [`ResolutionError`],
//!   [`PersistenceError`], wrapped per cell in [`CellError`]
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Header Mapping Errors
// =============================================================================

/// Errors while reconciling a header row with the operators of a class.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    /// Headers could not be mapped under strict mode.
    #[error("Failed to map header row to operators of {class}: unmapped columns [{}]", .headers.join(", "))]
    Definition { class: String, headers: Vec<String> },

    /// Mandatory operators have no mapped column.
    #[error("Mandatory columns missing for {class}: [{}]", .operators.join(", "))]
    MissingMandatory { class: String, operators: Vec<String> },

    /// The registry knows nothing about the class.
    #[error("No operators registered for class {0}")]
    UnknownClass(String),
}

// =============================================================================
// Assignment Errors
// =============================================================================

/// A value could not be assigned, even after every fallback conversion.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Failed to assign [{value}] to {operator}: {reason}")]
pub struct AssignmentFailure {
    pub operator: String,
    pub value: String,
    pub reason: String,
}

// =============================================================================
// Association Errors
// =============================================================================

/// Errors while resolving an association cell against related records.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    /// Segment names no key and the operator has no default lookup key.
    #[error("Cannot look up {operator} by '{segment}': expected format key:value")]
    MissingLookupKey { operator: String, segment: String },

    /// Segment has a key but no values.
    #[error("Association segment '{segment}' for {operator} contains no values")]
    EmptySegment { operator: String, segment: String },

    /// Operator is a plain attribute.
    #[error("Operator {0} is not an association")]
    NotAssociation(String),

    /// The store failed while searching related records.
    #[error("Lookup on {class} failed: {message}")]
    Lookup { class: String, message: String },
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors raised by a [`crate::store::Store`] while persisting or searching.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistenceError {
    /// Record failed validation.
    #[error("{class} record is invalid: {}", .reasons.join("; "))]
    Invalid { class: String, reasons: Vec<String> },

    /// Record carries errors from population and was not saved.
    #[error("{class} record not saved, it contains {count} error(s)")]
    Rejected { class: String, count: usize },

    /// Store has no collection for the class.
    #[error("Unknown class in store: {0}")]
    UnknownClass(String),

    /// Backend failure.
    #[error("Store failure: {0}")]
    Backend(String),
}

// =============================================================================
// Per-cell Errors
// =============================================================================

/// Everything that can go wrong while processing one cell.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CellError {
    #[error(transparent)]
    Assignment(#[from] AssignmentFailure),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A forced column's handler failed.
    #[error("Column '{header}' handler failed: {message}")]
    Handler { header: String, message: String },
}

// =============================================================================
// Row Source Errors
// =============================================================================

/// Errors reading rows from a file.
#[derive(Debug, Error)]
pub enum SourceError {
    /// File does not exist.
    #[error("Cannot load {0}: file not found")]
    NotFound(String),

    /// Extension not handled by any reader.
    #[error("{0} files not supported, try .csv or .xlsx/.xls/.ods")]
    UnsupportedFileType(String),

    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid CSV content.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: usize, message: String },

    /// Spreadsheet could not be opened or read.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// No header row.
    #[error("No headers found")]
    NoHeaders,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A section has the wrong shape.
    #[error("Invalid config section '{section}': {message}")]
    InvalidSection { section: String, message: String },
}

/// Errors loading a model schema or fixtures.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Schema JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Class referenced but not declared.
    #[error("Unknown class: {0}")]
    UnknownClass(String),
}

// =============================================================================
// Load Errors (top-level)
// =============================================================================

/// Top-level errors returned by [`crate::loader::perform_load`] and the session.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Header row has not been mapped yet.
    #[error("Header row not mapped, call map_headers first")]
    NotMapped,

    /// A save failed and abort_on_failure is set.
    #[error("Load aborted at row {row}: {source}")]
    Aborted {
        row: usize,
        #[source]
        source: PersistenceError,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for header mapping.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for row sources.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for store operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type for a whole load.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let mapping = MappingError::MissingMandatory {
            class: "Product".into(),
            operators: vec!["sku".into()],
        };
        let load: LoadError = mapping.into();
        assert!(load.to_string().contains("sku"));

        let failure = AssignmentFailure {
            operator: "price".into(),
            value: "abc".into(),
            reason: "expected float".into(),
        };
        let cell: CellError = failure.into();
        assert!(cell.to_string().contains("[abc]"));
        assert!(cell.to_string().contains("price"));
    }

    #[test]
    fn test_definition_error_lists_headers() {
        let err = MappingError::Definition {
            class: "Product".into(),
            headers: vec!["colour".into(), "weight".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Product"));
        assert!(msg.contains("colour, weight"));
    }

    #[test]
    fn test_aborted_keeps_source() {
        let err = LoadError::Aborted {
            row: 3,
            source: PersistenceError::Rejected { class: "Product".into(), count: 2 },
        };
        assert!(err.to_string().contains("row 3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

//! Load orchestration.
//!
//! [`LoadSession`] drives one import run; [`perform_load`] feeds it a file.
//!
//! ```rust,ignore
//! use shiftload::{perform_load, LoadOptions, LoadSession, MemoryStore, ModelSchema, OperatorRegistry};
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

pub mod report;
pub mod session;

pub use report::{FailedRecord, LoadReport};
pub use session::{ColumnHandler, LoadSession};

use std::path::Path;

use crate::error::LoadResult;
use crate::logs::log_info;
use crate::parser::{open_source, RowSource};
use crate::store::Store;

/// Load every row of the file at `path` into `session`.
///
/// The reader is chosen by extension: `.csv`, or `.xlsx`/`.xls`/`.ods` for
/// spreadsheets.
pub fn perform_load<S: Store>(path: impl AsRef<Path>, session: &mut LoadSession<S>) -> LoadResult<LoadReport> {
    let path = path.as_ref();
    log_info(format!("Loading {} from {}", session.class(), path.display()));

    let mut source = open_source(path)?;
    load_rows(source.as_mut(), session)
}

/// Map the header row of `source`, then process every data row.
pub fn load_rows<S: Store>(source: &mut dyn RowSource, session: &mut LoadSession<S>) -> LoadResult<LoadReport> {
    let headers = source.header_row()?;
    session.map_headers(&headers)?;

    while let Some(row) = source.next_data_row()? {
        session.process_row(&row)?;
    }

    Ok(session.report())
}

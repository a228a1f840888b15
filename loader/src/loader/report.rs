//! End-of-run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Record, RecordError};

/// Errors of one record that was not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub uid: Uuid,
    pub errors: Vec<RecordError>,
}

/// Counts of a finished (or aborted) load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub class: String,
    /// Data rows processed
    pub rows: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Warnings across loaded and failed records
    pub warnings: usize,
    /// Errors across failed records
    pub errors: usize,
    pub dry_run: bool,
    pub failures: Vec<FailedRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadReport {
    pub(crate) fn build(
        class: &str,
        rows: usize,
        loaded: &[Record],
        failed: &[Record],
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let warnings = loaded
            .iter()
            .chain(failed.iter())
            .map(Record::warning_count)
            .sum();

        Self {
            class: class.to_string(),
            rows,
            loaded: loaded.len(),
            failed: failed.len(),
            warnings,
            errors: failed.iter().map(Record::error_count).sum(),
            dry_run,
            failures: failed
                .iter()
                .map(|r| FailedRecord { uid: r.uid, errors: r.errors.clone() })
                .collect(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} rows processed for {}: {} loaded, {} failed",
            self.rows, self.class, self.loaded, self.failed
        );
        if self.warnings > 0 {
            summary.push_str(&format!(", {} warning(s)", self.warnings));
        }
        if self.dry_run {
            summary.push_str(" (dry run, nothing persisted)");
        }
        summary
    }
}

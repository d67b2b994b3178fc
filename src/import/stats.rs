//! Import statistics tracking.
//!
//! Tracks per-row outcomes while a CSV run is in flight.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregate outcome of one import run.
///
/// Exactly one of `imported`, `duplicates` or `validation_errors` is
/// incremented per data row, so their sum equals the number of rows read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImportStatistics {
    pub total_rows: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub validation_errors: usize,
    /// Row-level error messages in row order.
    pub errors: Vec<String>,
}

impl ImportStatistics {
    pub fn new(total_rows: usize) -> Self {
        Self {
            total_rows,
            ..Self::default()
        }
    }

    pub fn record_imported(&mut self) {
        self.imported += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    /// Count a rejected row and keep its message.
    pub fn record_error(&mut self, message: String) {
        self.validation_errors += 1;
        self.errors.push(message);
    }

    pub fn rows_seen(&self) -> usize {
        self.imported + self.duplicates + self.validation_errors
    }

    /// Merge another ImportStatistics into this one by summing all counts.
    pub fn merge(&mut self, other: ImportStatistics) {
        self.total_rows += other.total_rows;
        self.imported += other.imported;
        self.duplicates += other.duplicates;
        self.validation_errors += other.validation_errors;
        self.errors.extend(other.errors);
    }
}

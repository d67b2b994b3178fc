use crate::import::sink::StoreError;
use crate::progress::ProgressStoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Faults that abort an entire import run.
///
/// Row-level problems never surface here; they are folded into
/// [`ImportStatistics`](crate::import::ImportStatistics) instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Could not open CSV file {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("CSV file is empty or invalid")]
    EmptyOrInvalidFile,
    #[error("CSV must contain at least name and email columns")]
    MissingRequiredColumns,
    #[error("failed to read CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error while reading CSV: {0}")]
    Io(#[from] io::Error),
    #[error("CSV reader stopped: {0}")]
    ReaderStopped(String),
    #[error("failed to load existing contacts: {0}")]
    Contacts(#[from] StoreError),
    #[error("failed to record progress: {0}")]
    Progress(#[from] ProgressStoreError),
}

//! Per-run progress reporting.
//!
//! Percentages: 0 while starting, 5 once rows are counted, then
//! `min(95, 5 + current / total * 90)` while rows stream, 100 on completion.
//! A run over an empty body sits at 50 until it completes.

use crate::import::ImportStatistics;
use crate::progress::store::ProgressStoreError;
use crate::progress::{ProgressHub, ProgressSnapshot};

/// Rows between two mid-run snapshots.
pub const PUBLISH_EVERY: usize = 5;

pub fn processing_percentage(current_row: usize, total_rows: usize) -> u8 {
    if total_rows == 0 {
        return 50;
    }

    let raw = 5.0 + (current_row as f64 / total_rows as f64) * 90.0;
    raw.min(95.0).round() as u8
}

/// Every fifth row, and always the last one.
pub fn should_publish(current_row: usize, total_rows: usize) -> bool {
    current_row % PUBLISH_EVERY == 0 || current_row == total_rows
}

/// Writes the snapshots of one run, remembering the last one so a failure can
/// keep its percentage.
pub struct ProgressPublisher {
    hub: ProgressHub,
    session_id: String,
    file_name: String,
    last: ProgressSnapshot,
}

impl ProgressPublisher {
    pub fn new(hub: ProgressHub, session_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            hub,
            session_id: session_id.into(),
            last: ProgressSnapshot::starting(file_name.clone()),
            file_name,
        }
    }

    pub async fn starting(&mut self) -> Result<(), ProgressStoreError> {
        self.publish(ProgressSnapshot::starting(self.file_name.clone()))
            .await
    }

    pub async fn processing_started(
        &mut self,
        stats: &ImportStatistics,
    ) -> Result<(), ProgressStoreError> {
        let total = stats.total_rows;
        self.publish(ProgressSnapshot::processing(
            self.file_name.clone(),
            format!("Processing {} rows...", total),
            processing_percentage(0, total),
            0,
            stats,
        ))
        .await
    }

    /// Publish after `current_row` has been handled, subject to the cadence.
    pub async fn row_processed(
        &mut self,
        current_row: usize,
        stats: &ImportStatistics,
    ) -> Result<bool, ProgressStoreError> {
        let total = stats.total_rows;
        if !should_publish(current_row, total) {
            return Ok(false);
        }

        self.publish(ProgressSnapshot::processing(
            self.file_name.clone(),
            format!("Processing row {} of {}...", current_row, total),
            processing_percentage(current_row, total),
            current_row,
            stats,
        ))
        .await?;
        Ok(true)
    }

    pub async fn completed(&mut self, stats: &ImportStatistics) -> Result<(), ProgressStoreError> {
        self.publish(ProgressSnapshot::completed(self.file_name.clone(), stats))
            .await
    }

    /// Run-fatal fault: `Processing failed: <error>` at the last percentage.
    pub async fn failed(&mut self, error: &str) -> Result<(), ProgressStoreError> {
        let failed = self
            .last
            .clone()
            .into_failed(format!("Processing failed: {}", error), error);
        self.publish(failed).await
    }

    async fn publish(&mut self, snapshot: ProgressSnapshot) -> Result<(), ProgressStoreError> {
        self.hub.put(&self.session_id, snapshot.clone()).await?;
        self.last = snapshot;
        Ok(())
    }
}

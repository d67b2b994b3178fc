//! End-to-end import of one CSV source.
//!
//! Flow per run: open, detect the delimiter, resolve columns, count rows, load
//! the persisted email snapshot, then stream rows through validation,
//! deduplication and persistence. File work happens on the blocking pool, so
//! the run always reaches an await point where a timeout can cut it off.
//! Row-level problems are folded into the statistics; anything that aborts the
//! run is published as a failed snapshot and returned to the caller.

use crate::import::dedup::Deduplicator;
use crate::import::detector::ColumnMapping;
use crate::import::reader::{
    CandidateRecord, CsvSource, MIN_ROW_FIELDS, RowReceiver, SourceLayout, spawn_reader,
};
use crate::import::sink::{ContactStore, InsertOutcome, NewContact};
use crate::import::validator::validate;
use crate::import::{ImportError, ImportStatistics};
use crate::progress::{ProgressHub, ProgressPublisher};
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

/// Identifies one run for progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSession {
    pub session_id: String,
    pub file_name: String,
}

impl ImportSession {
    pub fn new(session_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            file_name: file_name.into(),
        }
    }
}

#[derive(Clone)]
pub struct ContactImporter {
    contacts: Arc<dyn ContactStore>,
    progress: ProgressHub,
}

impl ContactImporter {
    pub fn new(contacts: Arc<dyn ContactStore>, progress: ProgressHub) -> Self {
        Self { contacts, progress }
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Import the file at `path`, which must stay readable for the whole run.
    pub async fn import_file(
        &self,
        path: &Path,
        session: &ImportSession,
    ) -> Result<ImportStatistics, ImportError> {
        let path = path.to_path_buf();
        self.import_rows(session, move || CsvSource::open_path(&path))
            .await
    }

    /// Import from any seekable reader.
    pub async fn import_reader<R>(
        &self,
        source: R,
        session: &ImportSession,
    ) -> Result<ImportStatistics, ImportError>
    where
        R: Read + Seek + Send + 'static,
    {
        self.import_rows(session, move || CsvSource::open(source))
            .await
    }

    async fn import_rows<R, F>(
        &self,
        session: &ImportSession,
        open: F,
    ) -> Result<ImportStatistics, ImportError>
    where
        R: Read + Seek,
        F: FnOnce() -> Result<CsvSource<R>, ImportError> + Send + 'static,
    {
        let mut publisher = self.publisher(session);
        publisher.starting().await?;

        let rows = spawn_reader(open);
        let result = self.run(rows, &mut publisher).await;

        self.finish(session, result, &mut publisher).await
    }

    fn publisher(&self, session: &ImportSession) -> ProgressPublisher {
        ProgressPublisher::new(
            self.progress.clone(),
            session.session_id.clone(),
            session.file_name.clone(),
        )
    }

    async fn finish(
        &self,
        session: &ImportSession,
        result: Result<ImportStatistics, ImportError>,
        publisher: &mut ProgressPublisher,
    ) -> Result<ImportStatistics, ImportError> {
        match result {
            Ok(stats) => {
                log::info!(
                    "import {}: completed {} rows ({} imported, {} duplicates, {} errors)",
                    session.session_id,
                    stats.total_rows,
                    stats.imported,
                    stats.duplicates,
                    stats.validation_errors
                );
                Ok(stats)
            }
            Err(e) => {
                log::error!("import {}: failed: {}", session.session_id, e);
                if let Err(publish_err) = publisher.failed(&e.to_string()).await {
                    log::error!(
                        "import {}: could not record failure: {}",
                        session.session_id,
                        publish_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        mut rows: RowReceiver,
        publisher: &mut ProgressPublisher,
    ) -> Result<ImportStatistics, ImportError> {
        let SourceLayout {
            mapping,
            total_rows,
        } = rows.layout().await?;
        let mut dedup = Deduplicator::new(self.contacts.existing_emails().await?);
        let mut stats = ImportStatistics::new(total_rows);

        publisher.processing_started(&stats).await?;

        let mut current_row = 0;
        while let Some(row) = rows.next_row().await? {
            current_row += 1;
            self.process_row(&row, current_row, &mapping, &mut dedup, &mut stats)
                .await;
            publisher.row_processed(current_row, &stats).await?;
        }

        publisher.completed(&stats).await?;
        Ok(stats)
    }

    async fn process_row(
        &self,
        row: &[String],
        row_number: usize,
        mapping: &ColumnMapping,
        dedup: &mut Deduplicator,
        stats: &mut ImportStatistics,
    ) {
        if row.len() < MIN_ROW_FIELDS {
            log::debug!("row {}: insufficient columns ({})", row_number, row.len());
            stats.record_error(format!("Row {}: Insufficient columns", row_number));
            return;
        }

        let candidate = CandidateRecord::from_row(row, mapping);

        if let Err(errors) = validate(&candidate) {
            log::debug!("row {}: validation failed: {}", row_number, errors);
            stats.record_error(format!("Row {}: {}", row_number, errors));
            return;
        }

        if dedup.is_duplicate(&candidate.email) {
            stats.record_duplicate();
            return;
        }

        let contact = NewContact::from_candidate(candidate);
        match self.contacts.insert(&contact).await {
            Ok(InsertOutcome::Inserted(_)) => {
                dedup.accept(&contact.email);
                stats.record_imported();
            }
            Ok(InsertOutcome::AlreadyExists) => {
                // Stored by another writer after the email snapshot was taken.
                log::warn!(
                    "row {}: {} hit the unique email constraint",
                    row_number,
                    contact.email
                );
                stats.record_error(format!(
                    "Row {}: Database error - {} already exists",
                    row_number, contact.email
                ));
            }
            Err(e) => {
                log::debug!("row {}: insert failed: {}", row_number, e);
                stats.record_error(format!("Row {}: Database error - {}", row_number, e));
            }
        }
    }
}

//! Streaming CSV row source.
//!
//! [`CsvSource`] wraps a `csv::Reader` configured with the detected delimiter.
//! The header record is consumed on open; rows are then yielded one at a time
//! and never buffered as a whole. [`CsvSource::count_rows`] performs the
//! counting pre-pass and seeks back to the first data row.
//!
//! Reading is blocking I/O, so [`spawn_reader`] drives a source on the blocking
//! pool and hands rows to the async side through a bounded channel. Dropping
//! the [`RowReceiver`] stops the reader thread and closes its file.

use crate::import::dates::parse_birthdate;
use crate::import::detector::{ColumnMapping, detect_delimiter, normalize_header};
use crate::import::ImportError;
use chrono::NaiveDate;
use csv::{ByteRecord, Position, Reader, ReaderBuilder};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Rows shorter than this are rejected before any field is read.
pub const MIN_ROW_FIELDS: usize = 2;

/// Rows buffered between the reader thread and the importer.
pub const ROW_BUFFER: usize = 256;

pub struct CsvSource<R> {
    reader: Reader<R>,
    header: Vec<String>,
    data_start: Position,
    record: ByteRecord,
}

impl CsvSource<File> {
    pub fn open_path(path: &Path) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::open(file)
    }
}

impl<R: Read + Seek> CsvSource<R> {
    /// Detect the delimiter, then consume and normalize the header record.
    pub fn open(mut source: R) -> Result<Self, ImportError> {
        let delimiter = detect_delimiter(&mut source)?;

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(source);

        let mut first = ByteRecord::new();
        if !reader.read_byte_record(&mut first)? {
            return Err(ImportError::EmptyOrInvalidFile);
        }

        let header = normalize_header(&first);
        if header.iter().all(|cell| cell.is_empty()) {
            return Err(ImportError::EmptyOrInvalidFile);
        }

        let data_start = reader.position().clone();

        Ok(Self {
            reader,
            header,
            data_start,
            record: ByteRecord::new(),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Count the remaining data rows, then rewind to the first one.
    pub fn count_rows(&mut self) -> Result<usize, ImportError> {
        let mut count = 0;
        while self.reader.read_byte_record(&mut self.record)? {
            count += 1;
        }

        self.reader.seek(self.data_start.clone())?;
        Ok(count)
    }

    /// Next raw row, decoded lossily, or `None` once the stream is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>, ImportError> {
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }

        Ok(Some(
            self.record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        ))
    }
}

/// What the reader learned before the first data row: resolved columns and
/// the counted number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    pub mapping: ColumnMapping,
    pub total_rows: usize,
}

/// Async end of a reader running on the blocking pool.
pub struct RowReceiver {
    layout: Option<oneshot::Receiver<SourceLayout>>,
    rows: mpsc::Receiver<Vec<String>>,
    reader: Option<JoinHandle<Result<(), ImportError>>>,
}

impl RowReceiver {
    /// Wait for the header and the counting pre-pass.
    pub async fn layout(&mut self) -> Result<SourceLayout, ImportError> {
        let Some(layout) = self.layout.take() else {
            return Err(ImportError::ReaderStopped(
                "layout was already taken".to_string(),
            ));
        };

        match layout.await {
            Ok(layout) => Ok(layout),
            Err(_) => {
                self.reader_result().await?;
                Err(ImportError::ReaderStopped(
                    "reader exited before the header was read".to_string(),
                ))
            }
        }
    }

    /// Next data row, or `None` once the reader finished cleanly.
    pub async fn next_row(&mut self) -> Result<Option<Vec<String>>, ImportError> {
        match self.rows.recv().await {
            Some(row) => Ok(Some(row)),
            None => {
                self.reader_result().await?;
                Ok(None)
            }
        }
    }

    async fn reader_result(&mut self) -> Result<(), ImportError> {
        match self.reader.take() {
            Some(handle) => handle
                .await
                .map_err(|e| ImportError::ReaderStopped(e.to_string()))?,
            None => Ok(()),
        }
    }
}

/// Open, resolve and count on the blocking pool, then stream rows.
///
/// Column resolution runs before counting, so a file without the required
/// columns fails without being scanned.
pub fn spawn_reader<R, F>(open: F) -> RowReceiver
where
    R: Read + Seek,
    F: FnOnce() -> Result<CsvSource<R>, ImportError> + Send + 'static,
{
    let (layout_tx, layout_rx) = oneshot::channel();
    let (row_tx, row_rx) = mpsc::channel(ROW_BUFFER);

    let reader = tokio::task::spawn_blocking(move || -> Result<(), ImportError> {
        let mut source = open()?;
        let mapping = ColumnMapping::resolve(source.header())?;
        let total_rows = source.count_rows()?;

        if layout_tx.send(SourceLayout { mapping, total_rows }).is_err() {
            return Ok(());
        }

        while let Some(row) = source.next_row()? {
            if row_tx.blocking_send(row).is_err() {
                log::debug!("csv reader: importer went away, stopping early");
                break;
            }
        }
        Ok(())
    });

    RowReceiver {
        layout: Some(layout_rx),
        rows: row_rx,
        reader: Some(reader),
    }
}

/// One parsed row, not yet validated or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub name: String,
    /// Trimmed and lower-cased.
    pub email: String,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

impl CandidateRecord {
    pub fn from_row(row: &[String], mapping: &ColumnMapping) -> Self {
        let cell = |idx: usize| row.get(idx).map(|value| value.trim());

        Self {
            name: cell(mapping.name).unwrap_or_default().to_string(),
            email: cell(mapping.email).unwrap_or_default().to_lowercase(),
            phone: mapping
                .phone
                .and_then(cell)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            birthdate: mapping.birthdate.and_then(cell).and_then(parse_birthdate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str) -> CsvSource<Cursor<Vec<u8>>> {
        CsvSource::open(Cursor::new(text.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn counts_rows_without_consuming_them() {
        let mut source = source("Name,Email\nA,a@x.com\nB,b@x.com\nC,c@x.com\n");
        assert_eq!(source.header(), ["name", "email"]);
        assert_eq!(source.count_rows().unwrap(), 3);

        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first, ["A", "a@x.com"]);

        let mut remaining = 1;
        while source.next_row().unwrap().is_some() {
            remaining += 1;
        }
        assert_eq!(remaining, 3);
    }

    #[test]
    fn header_only_file_has_zero_rows() {
        let mut source = source("name;email\n");
        assert_eq!(source.count_rows().unwrap(), 0);
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = CsvSource::open(Cursor::new(Vec::new())).err().unwrap();
        assert!(matches!(err, ImportError::EmptyOrInvalidFile));
    }

    #[test]
    fn semicolon_rows_keep_embedded_commas() {
        let mut source = source("name;email\nDoe, Jane;jane@x.com\n");
        assert_eq!(
            source.next_row().unwrap().unwrap(),
            ["Doe, Jane", "jane@x.com"]
        );
    }

    #[test]
    fn ragged_rows_are_yielded_as_is() {
        let mut source = source("name,email,phone\nonly-one\nA,a@x.com,415-555-2671,extra\n");
        assert_eq!(source.next_row().unwrap().unwrap().len(), 1);
        assert_eq!(source.next_row().unwrap().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn spawned_reader_reports_layout_then_rows() {
        let text = "email;name\na@x.com;A\nb@x.com;B\n";
        let mut rows =
            spawn_reader(move || CsvSource::open(Cursor::new(text.as_bytes().to_vec())));

        let layout = rows.layout().await.unwrap();
        assert_eq!(layout.total_rows, 2);
        assert_eq!(layout.mapping.email, 0);
        assert_eq!(layout.mapping.name, 1);

        assert_eq!(rows.next_row().await.unwrap().unwrap(), ["a@x.com", "A"]);
        assert_eq!(rows.next_row().await.unwrap().unwrap(), ["b@x.com", "B"]);
        assert!(rows.next_row().await.unwrap().is_none());
        assert!(rows.next_row().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn spawned_reader_surfaces_open_errors() {
        let mut rows = spawn_reader(|| CsvSource::open(Cursor::new(b"name,phone\nA,1\n".to_vec())));

        let err = rows.layout().await.unwrap_err();
        assert!(matches!(err, ImportError::MissingRequiredColumns));
    }

    #[test]
    fn candidate_record_normalizes_cells() {
        let mapping = ColumnMapping {
            name: 0,
            email: 1,
            phone: Some(2),
            birthdate: Some(3),
        };
        let row: Vec<String> = ["  Jane Doe ", " Jane@X.com ", " ", "1990-04-03"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let record = CandidateRecord::from_row(&row, &mapping);
        assert_eq!(record.name, "Jane Doe");
        assert_eq!(record.email, "jane@x.com");
        assert_eq!(record.phone, None);
        assert_eq!(record.birthdate, NaiveDate::from_ymd_opt(1990, 4, 3));
    }

    #[test]
    fn short_rows_fill_missing_fields_with_defaults() {
        let mapping = ColumnMapping {
            name: 0,
            email: 3,
            phone: Some(4),
            birthdate: None,
        };
        let row = vec!["A".to_string(), "B".to_string()];

        let record = CandidateRecord::from_row(&row, &mapping);
        assert_eq!(record.name, "A");
        assert_eq!(record.email, "");
        assert_eq!(record.phone, None);
    }
}

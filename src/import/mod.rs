//! CSV contact import.
//!
//! Leaf to root: [`detector`] picks the delimiter and maps header synonyms,
//! [`reader`] streams rows into [`CandidateRecord`]s (with [`dates`] handling
//! birthdates), [`validator`] and [`dedup`] decide what to keep, [`sink`]
//! persists it, and [`pipeline`] ties the steps together with progress
//! reporting.

pub mod dates;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod phone;
pub mod pipeline;
pub mod reader;
pub mod sink;
pub mod stats;
pub mod validator;

pub use dedup::Deduplicator;
pub use detector::{ColumnMapping, Field};
pub use error::ImportError;
pub use pipeline::{ContactImporter, ImportSession};
pub use reader::{CandidateRecord, CsvSource, RowReceiver, SourceLayout, spawn_reader};
pub use sink::{
    ContactStore, InsertOutcome, MemoryContactStore, NewContact, PgContactStore, StoreError,
};
pub use stats::ImportStatistics;

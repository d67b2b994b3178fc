//! Session-scoped import progress.
//!
//! A [`ProgressHub`] pairs a TTL-bound [`ProgressStore`] (the source of truth
//! for pollers) with a [`ProgressBroadcaster`] for live subscribers. The
//! importer talks to it through a [`ProgressPublisher`], one per run.

pub mod channels;
pub mod hub;
pub mod publisher;
pub mod snapshot;
pub mod store;
pub mod sweeper;

pub use channels::{
    BroadcastError, PROGRESS_EVENT, ProgressBroadcaster, ProgressEvent, SessionChannels,
    channel_name,
};
pub use hub::{DEFAULT_PROGRESS_TTL, ProgressHub};
pub use publisher::{ProgressPublisher, processing_percentage, should_publish};
pub use snapshot::{ImportStatus, ProgressSnapshot};
pub use store::{MemoryProgressStore, PgProgressStore, ProgressStore, ProgressStoreError};

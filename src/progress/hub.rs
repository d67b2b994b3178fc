use crate::progress::channels::{ProgressBroadcaster, ProgressEvent, channel_name};
use crate::progress::store::{ProgressStore, ProgressStoreError};
use crate::progress::ProgressSnapshot;
use std::sync::Arc;
use std::time::Duration;

/// Default retention window for progress snapshots.
pub const DEFAULT_PROGRESS_TTL: Duration = Duration::from_secs(600);

/// Single entry point for progress writes: a required store write followed by
/// a best-effort broadcast.
#[derive(Clone)]
pub struct ProgressHub {
    store: Arc<dyn ProgressStore>,
    broadcaster: Arc<dyn ProgressBroadcaster>,
    ttl: Duration,
}

impl ProgressHub {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        broadcaster: Arc<dyn ProgressBroadcaster>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            ttl,
        }
    }

    /// Store the snapshot, then notify live subscribers. Broadcast failures are
    /// logged and swallowed.
    pub async fn put(
        &self,
        session_id: &str,
        snapshot: ProgressSnapshot,
    ) -> Result<(), ProgressStoreError> {
        self.store.put(session_id, &snapshot, self.ttl).await?;

        let event = ProgressEvent::new(session_id, snapshot);
        match self.broadcaster.publish(&event) {
            Ok(delivered) => log::debug!(
                "progress {}: {} {}% delivered to {}",
                channel_name(session_id),
                event.progress.status.as_str(),
                event.progress.percentage,
                delivered
            ),
            Err(e) => log::warn!(
                "progress {}: broadcast failed: {}",
                channel_name(session_id),
                e
            ),
        }

        Ok(())
    }

    /// Stored snapshot, or the waiting default when nothing is stored.
    pub async fn snapshot(&self, session_id: &str) -> Result<ProgressSnapshot, ProgressStoreError> {
        Ok(self.store.get(session_id).await?.unwrap_or_default())
    }

    pub async fn forget(&self, session_id: &str) -> Result<(), ProgressStoreError> {
        self.store.forget(session_id).await
    }

    /// Mark the session failed, keeping its last percentage and counters.
    pub async fn fail(
        &self,
        session_id: &str,
        message: String,
        error: String,
    ) -> Result<ProgressSnapshot, ProgressStoreError> {
        let failed = self.snapshot(session_id).await?.into_failed(message, error);
        self.put(session_id, failed.clone()).await?;
        Ok(failed)
    }

    /// Task-level failure once the job runner gives up on a session.
    pub async fn mark_job_failed(
        &self,
        session_id: &str,
        error: &str,
    ) -> Result<ProgressSnapshot, ProgressStoreError> {
        self.fail(session_id, format!("Job failed: {}", error), error.to_string())
            .await
    }

    pub async fn purge_expired(&self) -> Result<usize, ProgressStoreError> {
        self.store.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::channels::{BroadcastError, SessionChannels};
    use crate::progress::store::MemoryProgressStore;
    use crate::progress::ImportStatus;

    struct FailingBroadcaster;

    impl ProgressBroadcaster for FailingBroadcaster {
        fn publish(&self, event: &ProgressEvent) -> Result<usize, BroadcastError> {
            Err(BroadcastError::Unavailable {
                channel: channel_name(&event.session_id),
                reason: "socket closed".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn broadcast_failure_does_not_fail_the_write() {
        let hub = ProgressHub::new(
            Arc::new(MemoryProgressStore::new()),
            Arc::new(FailingBroadcaster),
            DEFAULT_PROGRESS_TTL,
        );

        hub.put("s1", ProgressSnapshot::starting("a.csv")).await.unwrap();
        assert_eq!(hub.snapshot("s1").await.unwrap().status, ImportStatus::Starting);
    }

    #[tokio::test]
    async fn unknown_sessions_read_as_waiting() {
        let hub = ProgressHub::new(
            Arc::new(MemoryProgressStore::new()),
            Arc::new(SessionChannels::new()),
            DEFAULT_PROGRESS_TTL,
        );

        assert_eq!(hub.snapshot("nobody").await.unwrap(), ProgressSnapshot::waiting());
    }

    #[tokio::test]
    async fn job_failure_is_published_to_subscribers() {
        let channels = Arc::new(SessionChannels::new());
        let hub = ProgressHub::new(
            Arc::new(MemoryProgressStore::new()),
            channels.clone(),
            DEFAULT_PROGRESS_TTL,
        );
        let mut rx = channels.subscribe("s1");

        hub.put("s1", ProgressSnapshot::starting("a.csv")).await.unwrap();
        let failed = hub.mark_job_failed("s1", "timed out").await.unwrap();

        assert_eq!(failed.message, "Job failed: timed out");
        assert_eq!(failed.file_name, "a.csv");
        assert_eq!(rx.recv().await.unwrap().progress.status, ImportStatus::Starting);
        assert_eq!(rx.recv().await.unwrap().progress.status, ImportStatus::Failed);
    }
}

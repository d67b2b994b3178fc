//! Session-keyed progress storage with TTL expiry.
//!
//! Writes replace the whole snapshot for a key and refresh its expiry. Reads
//! never observe a partially written snapshot.

use crate::progress::ProgressSnapshot;
use dashmap::DashMap;
use rocket_db_pools::sqlx::{self, PgPool};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressStoreError {
    #[error("progress store database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("progress snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[rocket::async_trait]
pub trait ProgressStore: Send + Sync {
    async fn put(
        &self,
        session_id: &str,
        snapshot: &ProgressSnapshot,
        ttl: Duration,
    ) -> Result<(), ProgressStoreError>;

    /// Unexpired snapshot for the session, if any.
    async fn get(&self, session_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError>;

    async fn forget(&self, session_id: &str) -> Result<(), ProgressStoreError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, ProgressStoreError>;
}

struct Entry {
    snapshot: ProgressSnapshot,
    expires_at: Instant,
}

/// Process-local store backed by a `DashMap`.
#[derive(Default)]
pub struct MemoryProgressStore {
    entries: DashMap<String, Entry>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[rocket::async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn put(
        &self,
        session_id: &str,
        snapshot: &ProgressSnapshot,
        ttl: Duration,
    ) -> Result<(), ProgressStoreError> {
        self.entries.insert(
            session_id.to_string(),
            Entry {
                snapshot: snapshot.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError> {
        let now = Instant::now();
        let snapshot = self
            .entries
            .get(session_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.snapshot.clone());

        if snapshot.is_none() {
            self.entries
                .remove_if(session_id, |_, entry| entry.expires_at <= now);
        }

        Ok(snapshot)
    }

    async fn forget(&self, session_id: &str) -> Result<(), ProgressStoreError> {
        self.entries.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, ProgressStoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// Shared store in the `import_progress` table, for deployments running more
/// than one server process.
#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl ProgressStore for PgProgressStore {
    async fn put(
        &self,
        session_id: &str,
        snapshot: &ProgressSnapshot,
        ttl: Duration,
    ) -> Result<(), ProgressStoreError> {
        let value = serde_json::to_value(snapshot)?;

        sqlx::query(
            r#"INSERT INTO import_progress (session_id, snapshot, updated_at, expires_at)
               VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
               ON CONFLICT (session_id) DO UPDATE
               SET snapshot = EXCLUDED.snapshot,
                   updated_at = EXCLUDED.updated_at,
                   expires_at = EXCLUDED.expires_at"#,
        )
        .bind(session_id)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError> {
        let value: Option<Value> = sqlx::query_scalar(
            "SELECT snapshot FROM import_progress WHERE session_id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn forget(&self, session_id: &str) -> Result<(), ProgressStoreError> {
        sqlx::query("DELETE FROM import_progress WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, ProgressStoreError> {
        let result = sqlx::query("DELETE FROM import_progress WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryProgressStore::new();
        let ttl = Duration::from_secs(60);

        store.put("s1", &ProgressSnapshot::starting("a.csv"), ttl).await.unwrap();
        store.put("s1", &ProgressSnapshot::queued("b.csv", "1 KB"), ttl).await.unwrap();

        let snapshot = store.get("s1").await.unwrap().unwrap();
        assert_eq!(snapshot.file_name, "b.csv");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_and_purged() {
        let store = MemoryProgressStore::new();
        store
            .put("old", &ProgressSnapshot::starting("a.csv"), Duration::ZERO)
            .await
            .unwrap();
        store
            .put("live", &ProgressSnapshot::starting("b.csv"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.get("old").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.len(), 1);

        store
            .put("old", &ProgressSnapshot::starting("a.csv"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn forget_clears_the_session() {
        let store = MemoryProgressStore::new();
        store
            .put("s1", &ProgressSnapshot::starting("a.csv"), Duration::from_secs(60))
            .await
            .unwrap();
        store.forget("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        assert!(store.is_empty());
    }
}

//! Contact persistence used by the importer.
//!
//! [`ContactStore`] is the seam between the pipeline and storage. The Postgres
//! implementation backs the server; [`MemoryContactStore`] backs dry runs and
//! tests.

use crate::import::phone::normalize_us_phone;
use crate::import::reader::CandidateRecord;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rocket_db_pools::sqlx::{self, PgPool};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Rejected(String),
}

/// A validated, deduplicated row ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

impl NewContact {
    /// Normalize email casing and rewrite the phone to E.164 when it parses.
    pub fn from_candidate(record: CandidateRecord) -> Self {
        Self {
            name: record.name,
            email: record.email.trim().to_lowercase(),
            phone: record.phone.as_deref().map(normalize_us_phone),
            birthdate: record.birthdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i32),
    /// The store already holds this email (case-insensitively).
    AlreadyExists,
}

#[rocket::async_trait]
pub trait ContactStore: Send + Sync {
    /// Lower-cased emails of every stored contact.
    async fn existing_emails(&self) -> Result<HashSet<String>, StoreError>;

    async fn insert(&self, contact: &NewContact) -> Result<InsertOutcome, StoreError>;
}

#[derive(Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl ContactStore for PgContactStore {
    async fn existing_emails(&self) -> Result<HashSet<String>, StoreError> {
        let emails: Vec<String> = sqlx::query_scalar("SELECT lower(email) FROM contacts")
            .fetch_all(&self.pool)
            .await?;

        Ok(emails.into_iter().collect())
    }

    async fn insert(&self, contact: &NewContact) -> Result<InsertOutcome, StoreError> {
        let id: Option<i32> = sqlx::query_scalar(
            r#"INSERT INTO contacts (name, email, phone, birthdate)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT ((lower(email))) DO NOTHING
               RETURNING id"#,
        )
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(contact.birthdate)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match id {
            Some(id) => InsertOutcome::Inserted(id),
            None => InsertOutcome::AlreadyExists,
        })
    }
}

/// Stored row in [`MemoryContactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContact {
    pub id: i32,
    pub contact: NewContact,
}

/// In-process contact store keyed by lower-cased email.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    contacts: DashMap<String, StoredContact>,
    rejected: DashMap<String, String>,
    next_id: AtomicI32,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with existing contacts.
    pub fn with_contacts<I>(contacts: I) -> Self
    where
        I: IntoIterator<Item = NewContact>,
    {
        let store = Self::new();
        for contact in contacts {
            store.store(contact);
        }
        store
    }

    /// Make every insert of `email` fail with `reason`.
    pub fn reject_email(&self, email: &str, reason: &str) {
        self.rejected
            .insert(email.trim().to_lowercase(), reason.to_string());
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, email: &str) -> Option<StoredContact> {
        self.contacts
            .get(&email.trim().to_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// All stored contacts ordered by id.
    pub fn contacts(&self) -> Vec<StoredContact> {
        let mut contacts: Vec<StoredContact> = self
            .contacts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        contacts.sort_by_key(|stored| stored.id);
        contacts
    }

    fn store(&self, contact: NewContact) -> InsertOutcome {
        match self.contacts.entry(contact.email.trim().to_lowercase()) {
            Entry::Occupied(_) => InsertOutcome::AlreadyExists,
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(StoredContact { id, contact });
                InsertOutcome::Inserted(id)
            }
        }
    }
}

#[rocket::async_trait]
impl ContactStore for MemoryContactStore {
    async fn existing_emails(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .contacts
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn insert(&self, contact: &NewContact) -> Result<InsertOutcome, StoreError> {
        if let Some(reason) = self.rejected.get(&contact.email.trim().to_lowercase()) {
            return Err(StoreError::Rejected(reason.value().clone()));
        }

        Ok(self.store(contact.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: &str) -> NewContact {
        NewContact {
            name: "Jane".to_string(),
            email: email.to_string(),
            phone: None,
            birthdate: None,
        }
    }

    #[test]
    fn from_candidate_normalizes_phone_and_email() {
        let contact = NewContact::from_candidate(CandidateRecord {
            name: "Jane".to_string(),
            email: " Jane@X.com".to_string(),
            phone: Some("(415) 555-2671".to_string()),
            birthdate: None,
        });

        assert_eq!(contact.email, "jane@x.com");
        assert_eq!(contact.phone.as_deref(), Some("+14155552671"));
    }

    #[tokio::test]
    async fn memory_store_enforces_case_insensitive_uniqueness() {
        let store = MemoryContactStore::new();

        assert_eq!(
            store.insert(&contact("a@x.com")).await.unwrap(),
            InsertOutcome::Inserted(1)
        );
        assert_eq!(
            store.insert(&contact("A@X.com")).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.len(), 1);
        assert!(store.existing_emails().await.unwrap().contains("a@x.com"));
    }

    #[tokio::test]
    async fn memory_store_can_reject_inserts() {
        let store = MemoryContactStore::new();
        store.reject_email("bad@x.com", "disk full");

        let err = store.insert(&contact("bad@x.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(store.is_empty());
    }
}

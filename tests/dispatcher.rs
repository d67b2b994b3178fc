use contacts_server::import::{
    ContactImporter, ContactStore, InsertOutcome, MemoryContactStore, NewContact, StoreError,
};
use contacts_server::jobs::{ImportDispatcher, JobQueue, JobStatus, NewImportJob, RetryPolicy};
use contacts_server::test_support::{TestDatabase, TestDatabaseError, memory_progress};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping {test_name}: TEST_DATABASE_URL not set");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

/// Memory store that tracks how many inserts are in flight at once.
#[derive(Default)]
struct SlowStore {
    inner: MemoryContactStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[rocket::async_trait]
impl ContactStore for SlowStore {
    async fn existing_emails(&self) -> Result<HashSet<String>, StoreError> {
        self.inner.existing_emails().await
    }

    async fn insert(&self, contact: &NewContact) -> Result<InsertOutcome, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.insert(contact).await
    }
}

fn csv_file(prefix: &str, rows: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "name,email").expect("write header");
    for i in 1..=rows {
        writeln!(file, "{prefix} {i},{prefix}{i}@example.com").expect("write row");
    }
    file.flush().expect("flush csv");
    file
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_jobs_run_side_by_side() {
    let Some(test_db) = provision("dispatcher test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let queue = JobQueue::new(pool.clone());

    let files = [csv_file("left", 6), csv_file("right", 6)];
    for (session, file) in ["left", "right"].iter().zip(&files) {
        queue
            .enqueue(&NewImportJob {
                session_id: session.to_string(),
                file_path: file.path().to_string_lossy().into_owned(),
                file_name: format!("{session}.csv"),
                max_attempts: 1,
            })
            .await
            .expect("enqueue");
    }

    let store = Arc::new(SlowStore::default());
    let (hub, _channels) = memory_progress();
    let importer = ContactImporter::new(store.clone(), hub);
    let dispatcher = ImportDispatcher::new(
        pool,
        importer,
        RetryPolicy::default(),
        Duration::from_millis(20),
        2,
    );
    let handle = tokio::spawn(async move { dispatcher.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let mut done = 0;
        for session in ["left", "right"] {
            let info = queue
                .job_for_session(session)
                .await
                .expect("lookup")
                .expect("job exists");
            assert_ne!(info.status, JobStatus::Failed, "{session} failed");
            if info.status == JobStatus::Succeeded {
                done += 1;
            }
        }
        if done == 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();

    assert_eq!(store.inner.len(), 12);
    assert!(
        store.peak.load(Ordering::SeqCst) >= 2,
        "jobs ran one after another"
    );

    test_db.close().await.expect("failed to drop test database");
}

use crate::import::{ContactImporter, ImportError, ImportSession, ImportStatistics};
use crate::jobs::queue::{ImportJob, JobQueue};
use crate::progress::ProgressHub;
use rocket_db_pools::sqlx::{self, PgPool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Why a single attempt did not complete.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("import timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp,
}

/// Time box and retry budget for import attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: i32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `attempts` counts the attempt that just failed. Backoff grows linearly.
    pub fn decide(&self, attempts: i32, max_attempts: i32) -> RetryDecision {
        if attempts >= max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                after: self.backoff * attempts.max(1) as u32,
            }
        }
    }
}

/// Run one attempt under the wall-clock limit.
///
/// A timed-out attempt is dropped mid-flight (closing its file handle) and the
/// session is marked failed at its last percentage.
pub async fn execute_attempt(
    importer: &ContactImporter,
    path: &Path,
    session: &ImportSession,
    timeout: Duration,
) -> Result<ImportStatistics, AttemptError> {
    match tokio::time::timeout(timeout, importer.import_file(path, session)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            let err = AttemptError::TimedOut(timeout);
            log::error!("import {}: {}", session.session_id, err);
            if let Err(e) = importer
                .progress()
                .fail(
                    &session.session_id,
                    format!("Processing failed: {}", err),
                    err.to_string(),
                )
                .await
            {
                log::error!("import {}: could not record timeout: {}", session.session_id, e);
            }
            Err(err)
        }
    }
}

/// Drains the import queue, running up to `workers` jobs at once.
///
/// Each claimed job runs in its own task holding a semaphore permit, so one
/// long import never holds back other sessions. `SKIP LOCKED` keeps claims
/// exclusive.
pub struct ImportDispatcher {
    queue: JobQueue,
    importer: ContactImporter,
    progress: ProgressHub,
    policy: RetryPolicy,
    poll_interval: Duration,
    workers: Arc<Semaphore>,
}

impl ImportDispatcher {
    pub fn new(
        pool: PgPool,
        importer: ContactImporter,
        policy: RetryPolicy,
        poll_interval: Duration,
        workers: usize,
    ) -> Self {
        let progress = importer.progress().clone();
        Self {
            queue: JobQueue::new(pool),
            importer,
            progress,
            policy,
            poll_interval,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run dispatcher loop forever
    pub async fn run(self) -> ! {
        log::info!(
            "ImportDispatcher started ({} workers)",
            self.workers.available_permits()
        );

        match self.queue.requeue_stale_jobs(self.policy.timeout * 2).await {
            Ok(0) => {}
            Ok(count) => log::warn!("dispatcher: requeued {} stale jobs", count),
            Err(e) => log::error!("dispatcher: failed to requeue stale jobs: {}", e),
        }

        let dispatcher = Arc::new(self);

        loop {
            // Wait for a free worker before claiming, so claimed jobs never sit idle.
            let permit = match dispatcher.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    log::error!("dispatcher: worker pool closed: {}", e);
                    tokio::time::sleep(dispatcher.poll_interval).await;
                    continue;
                }
            };

            let job = match dispatcher.queue.get_next_job().await {
                Ok(Some(job)) => {
                    log::info!(
                        "dispatcher: claimed job {} for session {} (attempt {}/{})",
                        job.id,
                        job.session_id,
                        job.attempts,
                        job.max_attempts
                    );
                    job
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(dispatcher.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    log::error!("dispatcher: failed to get job: {}", e);
                    tokio::time::sleep(dispatcher.poll_interval * 5).await;
                    continue;
                }
            };

            let worker = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let _permit = permit;
                let job_id = job.id;
                if let Err(e) = worker.process_job(job).await {
                    log::error!("job {}: bookkeeping failed: {}", job_id, e);
                }
            });
        }
    }

    async fn process_job(&self, job: ImportJob) -> Result<(), sqlx::Error> {
        let session = ImportSession::new(job.session_id.clone(), job.file_name.clone());
        let path = Path::new(&job.file_path);

        match execute_attempt(&self.importer, path, &session, self.policy.timeout).await {
            Ok(stats) => {
                self.queue.complete_job(job.id).await?;
                log::info!(
                    "job {}: complete - {} imported, {} duplicates, {} errors",
                    job.id,
                    stats.imported,
                    stats.duplicates,
                    stats.validation_errors
                );
            }
            Err(e) => {
                let message = e.to_string();
                match self.policy.decide(job.attempts, job.max_attempts) {
                    RetryDecision::Retry { after } => {
                        log::warn!(
                            "job {}: attempt {} failed, retrying in {}s: {}",
                            job.id,
                            job.attempts,
                            after.as_secs(),
                            message
                        );
                        self.queue.retry_job(job.id, &message, after).await?;
                    }
                    RetryDecision::GiveUp => {
                        log::error!(
                            "job {}: giving up after {} attempts: {}",
                            job.id,
                            job.attempts,
                            message
                        );
                        self.queue.fail_job(job.id, &message).await?;
                        if let Err(e) = self.progress.mark_job_failed(&job.session_id, &message).await
                        {
                            log::error!("job {}: could not record failure: {}", job.id, e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

use crate::jobs::queue::{JobQueue, NewImportJob};
use crate::progress::{ProgressHub, ProgressSnapshot, ProgressStoreError};
use rocket_db_pools::sqlx;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("failed to record queued progress: {0}")]
    Progress(#[from] ProgressStoreError),
    #[error("failed to enqueue import: {0}")]
    Queue(#[from] sqlx::Error),
}

/// Hand a stored upload to the background dispatcher.
///
/// The queued snapshot is written before the job row exists so the worker's
/// first snapshot always lands after it.
pub async fn queue_import(
    queue: &JobQueue,
    progress: &ProgressHub,
    job: &NewImportJob,
    file_size: &str,
) -> Result<i32, IntakeError> {
    progress
        .put(
            &job.session_id,
            ProgressSnapshot::queued(job.file_name.clone(), file_size),
        )
        .await?;

    let job_id = queue.enqueue(job).await?;
    log::info!(
        "intake: queued job {} for session {} ({})",
        job_id,
        job.session_id,
        job.file_name
    );
    Ok(job_id)
}

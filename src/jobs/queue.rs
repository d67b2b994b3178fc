use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "import_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// A claimed import job. `attempts` already counts the current attempt.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportJob {
    pub id: i32,
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Import work to enqueue.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub max_attempts: i32,
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue an import job, available immediately.
    pub async fn enqueue(&self, job: &NewImportJob) -> Result<i32, sqlx::Error> {
        let (id,): (i32,) = sqlx::query_as(
            r#"INSERT INTO import_jobs (session_id, file_path, file_name, max_attempts)
               VALUES ($1, $2, $3, $4)
               RETURNING id"#,
        )
        .bind(&job.session_id)
        .bind(&job.file_path)
        .bind(&job.file_name)
        .bind(job.max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Get next job atomically (SELECT FOR UPDATE SKIP LOCKED)
    pub async fn get_next_job(&self) -> Result<Option<ImportJob>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i32,)> = sqlx::query_as(
            r#"SELECT id FROM import_jobs
               WHERE status = 'queued' AND available_at <= NOW()
               ORDER BY available_at ASC, id ASC
               LIMIT 1
               FOR UPDATE SKIP LOCKED"#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = claimed else {
            return Ok(None);
        };

        let job: ImportJob = sqlx::query_as(
            r#"UPDATE import_jobs
               SET status = 'running', attempts = attempts + 1, started_at = NOW()
               WHERE id = $1
               RETURNING id, session_id, file_path, file_name, attempts, max_attempts"#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(job))
    }

    /// Mark job complete
    pub async fn complete_job(&self, job_id: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs SET status = 'succeeded', completed_at = NOW(), error_message = NULL WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Put a failed attempt back on the queue after `delay`.
    pub async fn retry_job(
        &self,
        job_id: i32,
        error: &str,
        delay: Duration,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE import_jobs
               SET status = 'queued',
                   error_message = $1,
                   available_at = NOW() + make_interval(secs => $2)
               WHERE id = $3"#,
        )
        .bind(error)
        .bind(delay.as_secs_f64())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark job failed
    pub async fn fail_job(&self, job_id: i32, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs SET status = 'failed', completed_at = NOW(), error_message = $1 WHERE id = $2",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Requeue jobs left `running` by a process that died mid-attempt.
    pub async fn requeue_stale_jobs(&self, older_than: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE import_jobs
               SET status = 'queued', available_at = NOW()
               WHERE status = 'running'
                 AND started_at < NOW() - make_interval(secs => $1)"#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Latest job recorded for a session.
    pub async fn job_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<JobStatusInfo>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, session_id, file_name, status, attempts, max_attempts,
                      created_at, started_at, completed_at, error_message
               FROM import_jobs
               WHERE session_id = $1
               ORDER BY id DESC
               LIMIT 1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, JsonSchema)]
pub struct JobStatusInfo {
    pub id: i32,
    pub session_id: String,
    pub file_name: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(key, default_secs))
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Where progress snapshots live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressBackend {
    /// Process-local map; fine for a single server.
    #[default]
    Memory,
    /// `import_progress` table, shared between processes.
    Postgres,
}

impl FromStr for ProgressBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(ProgressBackend::Memory),
            "postgres" | "postgresql" | "database" => Ok(ProgressBackend::Postgres),
            other => Err(format!("unknown progress store '{}'", other)),
        }
    }
}

/// Runtime configuration for uploads and background imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Wall-clock limit per import attempt.
    pub job_timeout: Duration,
    pub max_attempts: i32,
    /// Import jobs run concurrently, one session each.
    pub workers: usize,
    /// Delay before the first retry; later retries wait proportionally longer.
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub progress_ttl: Duration,
    pub progress_backend: ProgressBackend,
    pub sweep_interval: Duration,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let progress_backend = env::var("PROGRESS_STORE")
            .ok()
            .and_then(|value| match value.parse() {
                Ok(backend) => Some(backend),
                Err(e) => {
                    log::warn!("{}, falling back to in-memory progress", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            upload_dir: PathBuf::from(env_string("CONTACTS_UPLOAD_DIR", "./storage/csv_imports")),
            max_upload_bytes: env_u64("CONTACTS_MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            job_timeout: env_duration_secs("IMPORT_JOB_TIMEOUT_SECS", 300),
            max_attempts: env_i32("IMPORT_JOB_MAX_ATTEMPTS", 3).max(1),
            workers: env_usize("IMPORT_WORKERS", 4).max(1),
            retry_backoff: env_duration_secs("IMPORT_JOB_RETRY_BACKOFF_SECS", 5),
            poll_interval: env_duration_millis("IMPORT_QUEUE_POLL_MS", 2_000),
            progress_ttl: env_duration_secs("PROGRESS_TTL_SECS", 600),
            progress_backend,
            sweep_interval: env_duration_secs("PROGRESS_SWEEP_SECS", 60),
        }
    }
}

//! Background import jobs.
//!
//! Uploads are recorded in the `import_jobs` table by [`intake`]; the
//! [`dispatcher`] claims them with `FOR UPDATE SKIP LOCKED`, runs each attempt
//! under a timeout, and retries or fails them according to [`RetryPolicy`].

pub mod dispatcher;
pub mod intake;
pub mod queue;

pub use dispatcher::{AttemptError, ImportDispatcher, RetryDecision, RetryPolicy, execute_attempt};
pub use intake::{IntakeError, queue_import};
pub use queue::{ImportJob, JobQueue, JobStatus, JobStatusInfo, NewImportJob};

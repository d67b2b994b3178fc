use crate::import::ImportStatistics;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of one import session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Waiting,
    Queued,
    Starting,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Waiting => "waiting",
            ImportStatus::Queued => "queued",
            ImportStatus::Starting => "starting",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }
}

/// Externally observable progress of a session. Each write replaces the
/// previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    pub percentage: u8,
    pub current_row: usize,
    pub total_rows: usize,
    pub status: ImportStatus,
    pub message: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<usize>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Final statistics, only on completed snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ImportStatistics>,
    /// Raw failure message, only on failed snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    fn base(status: ImportStatus, message: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            percentage: 0,
            current_row: 0,
            total_rows: 0,
            status,
            message: message.into(),
            file_name: file_name.into(),
            file_size: None,
            imported: None,
            duplicates: None,
            validation_errors: None,
            errors: Vec::new(),
            results: None,
            error: None,
        }
    }

    /// Snapshot served for sessions nobody has written yet.
    pub fn waiting() -> Self {
        Self {
            file_size: Some(String::new()),
            ..Self::base(
                ImportStatus::Waiting,
                "Waiting for processing to start...",
                "",
            )
        }
    }

    pub fn queued(file_name: impl Into<String>, file_size: impl Into<String>) -> Self {
        Self {
            file_size: Some(file_size.into()),
            ..Self::base(
                ImportStatus::Queued,
                "File uploaded successfully. Processing queued...",
                file_name,
            )
        }
    }

    pub fn starting(file_name: impl Into<String>) -> Self {
        Self::base(ImportStatus::Starting, "Starting file processing...", file_name)
    }

    /// Mid-run snapshot carrying the live counters and error list.
    pub fn processing(
        file_name: impl Into<String>,
        message: impl Into<String>,
        percentage: u8,
        current_row: usize,
        stats: &ImportStatistics,
    ) -> Self {
        Self {
            percentage,
            current_row,
            total_rows: stats.total_rows,
            ..Self::base(ImportStatus::Processing, message, file_name)
        }
        .with_counters(stats)
    }

    pub fn completed(file_name: impl Into<String>, stats: &ImportStatistics) -> Self {
        Self {
            percentage: 100,
            current_row: stats.rows_seen(),
            total_rows: stats.total_rows,
            results: Some(stats.clone()),
            ..Self::base(
                ImportStatus::Completed,
                "Processing completed successfully!",
                file_name,
            )
        }
        .with_counters(stats)
    }

    /// Turn this snapshot into a failed one, keeping percentage and counters.
    pub fn into_failed(self, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ImportStatus::Failed,
            message: message.into(),
            error: Some(error.into()),
            results: None,
            ..self
        }
    }

    fn with_counters(mut self, stats: &ImportStatistics) -> Self {
        self.imported = Some(stats.imported);
        self.duplicates = Some(stats.duplicates);
        self.validation_errors = Some(stats.validation_errors);
        self.errors = stats.errors.clone();
        self
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::waiting()
    }
}

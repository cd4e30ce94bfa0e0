//! Job records and completion history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{RepoReference, TransferOptions};
use crate::transfer::progress::{Phase, TransferProgress};
use crate::utils::errors::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Progress phase a job shows once it reaches this terminal status
    pub fn terminal_phase(self) -> Option<Phase> {
        match self {
            JobStatus::Completed => Some(Phase::Done),
            JobStatus::Failed => Some(Phase::Failed),
            JobStatus::Cancelled => Some(Phase::Cancelled),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal findings attached to a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobWarning {
    /// Some files failed but the archive is not empty
    PartialFailure { failed: usize },
    /// Collection stopped at the file cap or directory ceiling
    Truncated { collected: usize },
    /// Directory listings that failed and were left out
    SkippedDirectories { count: usize },
}

/// One logical transfer, from submission to terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: String,
    pub repo: RepoReference,
    pub options: TransferOptions,
    pub status: JobStatus,
    pub progress: TransferProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default)]
    pub warnings: Vec<JobWarning>,
    /// Files written to the archive
    pub file_count: usize,
    pub failed_files: usize,
    /// Bytes downloaded
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    pub fn new(repo: RepoReference, options: TransferOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo,
            options,
            status: JobStatus::Pending,
            progress: TransferProgress::default(),
            error: None,
            warnings: Vec::new(),
            file_count: 0,
            failed_files: 0,
            total_bytes: 0,
            archive_name: None,
            location: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Back to a fresh pending state, keeping identity and inputs.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = TransferProgress::default();
        self.error = None;
        self.warnings.clear();
        self.file_count = 0;
        self.failed_files = 0;
        self.total_bytes = 0;
        self.archive_name = None;
        self.location = None;
        self.started_at = None;
        self.completed_at = None;
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}

/// Append-only history entry written when a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub job_id: String,
    pub repo: RepoReference,
    pub outcome: JobStatus,
    pub file_count: usize,
    #[serde(default)]
    pub failed_files: usize,
    pub total_bytes: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn from_job(job: &TransferJob) -> Self {
        Self {
            job_id: job.id.clone(),
            repo: job.repo.clone(),
            outcome: job.status,
            file_count: job.file_count,
            failed_files: job.failed_files,
            total_bytes: job.total_bytes,
            duration_ms: job.duration_ms(),
            error: job.error.clone(),
            archive_name: job.archive_name.clone(),
            finished_at: job.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueSummary {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a TransferJob>) -> Self {
        let mut summary = Self::default();
        for job in jobs {
            summary.total += 1;
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

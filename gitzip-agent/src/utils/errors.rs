//! Error taxonomy for the download agent.
//!
//! Every failure in the pipeline is expressed as a [`GitzipError`]. The variant
//! decides retry behaviour in the transfer engine and the terminal state of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transfer::progress::format_bytes;

#[derive(Error, Debug)]
pub enum GitzipError {
    #[error("Invalid options: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API rate limit exhausted, resets at {}", reset_at.to_rfc3339())]
    Quota { reset_at: DateTime<Utc> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Selection is {} which exceeds the {} limit", format_bytes(*total), format_bytes(*limit))]
    SizeLimit { total: u64, limit: u64 },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("All {failed} file(s) failed to download")]
    TotalFailure { failed: usize },

    #[error("Nothing to download: the selected folder contains no eligible files")]
    NothingToDownload,

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is {status}, cannot {action}")]
    InvalidTransition {
        job_id: String,
        status: String,
        action: &'static str,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serializable classification of a [`GitzipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Quota,
    NotFound,
    SizeLimit,
    Transient,
    TotalFailure,
    NothingToDownload,
    Cancelled,
    Config,
    Storage,
    Io,
    Serialization,
    Archive,
    JobNotFound,
    InvalidTransition,
    Internal,
}

impl GitzipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GitzipError::Validation(_) => ErrorKind::Validation,
            GitzipError::Auth(_) => ErrorKind::Auth,
            GitzipError::Quota { .. } => ErrorKind::Quota,
            GitzipError::NotFound(_) => ErrorKind::NotFound,
            GitzipError::SizeLimit { .. } => ErrorKind::SizeLimit,
            GitzipError::Transient(_) => ErrorKind::Transient,
            GitzipError::TotalFailure { .. } => ErrorKind::TotalFailure,
            GitzipError::NothingToDownload => ErrorKind::NothingToDownload,
            GitzipError::Cancelled => ErrorKind::Cancelled,
            GitzipError::Config(_) => ErrorKind::Config,
            GitzipError::Storage(_) => ErrorKind::Storage,
            GitzipError::Io(_) => ErrorKind::Io,
            GitzipError::Serialization(_) => ErrorKind::Serialization,
            GitzipError::Archive(_) => ErrorKind::Archive,
            GitzipError::JobNotFound(_) => ErrorKind::JobNotFound,
            GitzipError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            GitzipError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the transfer engine may retry the failed request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitzipError::Transient(_) | GitzipError::Quota { .. })
    }

    /// Whether the user can fix the failure themselves (new token, wait for quota reset).
    pub fn is_user_recoverable(&self) -> bool {
        matches!(self, GitzipError::Auth(_) | GitzipError::Quota { .. })
    }

    /// Structured form stored on failed jobs and completion records.
    pub fn to_job_error(&self) -> JobError {
        JobError {
            kind: self.kind(),
            message: self.to_string(),
            recoverable: self.is_user_recoverable(),
            reset_at: match self {
                GitzipError::Quota { reset_at } => Some(*reset_at),
                _ => None,
            },
        }
    }
}

/// Error details surfaced to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

pub type Result<T> = std::result::Result<T, GitzipError>;

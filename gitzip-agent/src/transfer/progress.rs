//! Progress tracking for transfer jobs.
//!
//! [`TransferProgress`] is the read-only snapshot handed to listeners.
//! [`ProgressTracker`] owns the mutable copy during the transfer phase and
//! derives throughput and ETA from elapsed time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::model::FilePayload;

/// Pipeline phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collecting,
    Transferring,
    Archiving,
    Done,
    Failed,
    Cancelled,
}

/// Progress snapshot of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub phase: Phase,

    /// Number of files in the manifest
    pub files_total: usize,

    /// Files finished so far, failed ones included
    pub files_done: usize,

    pub files_failed: usize,

    /// Total bytes declared by the manifest
    pub bytes_total: u64,

    /// Bytes actually downloaded so far
    pub bytes_done: u64,

    /// Last file that finished
    pub current_path: Option<String>,

    pub started_at: Option<DateTime<Utc>>,

    /// Average bytes/second since the transfer phase began
    pub throughput_estimate: u64,

    /// Estimated time remaining (seconds)
    pub eta_seconds: Option<u64>,
}

impl TransferProgress {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            files_total: 0,
            files_done: 0,
            files_failed: 0,
            bytes_total: 0,
            bytes_done: 0,
            current_path: None,
            started_at: None,
            throughput_estimate: 0,
            eta_seconds: None,
        }
    }

    /// Percentage of files finished (0-100)
    pub fn percent_complete(&self) -> f64 {
        if self.files_total > 0 {
            (self.files_done as f64 / self.files_total as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.files_done >= self.files_total
    }
}

impl Default for TransferProgress {
    fn default() -> Self {
        Self::new(Phase::Collecting)
    }
}

/// Progress tracker with time-based speed calculation
pub struct ProgressTracker {
    start_time: Instant,
    progress: TransferProgress,
}

impl ProgressTracker {
    /// Start tracking a transfer phase over `files_total` files and `bytes_total` bytes
    pub fn new(files_total: usize, bytes_total: u64) -> Self {
        let mut progress = TransferProgress::new(Phase::Transferring);
        progress.files_total = files_total;
        progress.bytes_total = bytes_total;
        progress.started_at = Some(Utc::now());
        Self {
            start_time: Instant::now(),
            progress,
        }
    }

    /// Account for one finished file and refresh the throughput estimate
    pub fn record(&mut self, payload: &FilePayload) -> &TransferProgress {
        self.progress.files_done += 1;
        if payload.is_failed() {
            self.progress.files_failed += 1;
        }
        self.progress.bytes_done += payload.byte_size;
        self.progress.current_path = Some(payload.remote_path.clone());

        self.progress.throughput_estimate = self.average_speed();
        self.progress.eta_seconds = if self.progress.throughput_estimate > 0 {
            let remaining = self.progress.bytes_total.saturating_sub(self.progress.bytes_done);
            Some(remaining / self.progress.throughput_estimate)
        } else {
            None
        };

        &self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.progress.bytes_done as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    pub fn into_progress(self) -> TransferProgress {
        self.progress
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

//! End-to-end execution of one job: credential, quota, collect, transfer,
//! archive, deliver.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::job::{JobWarning, TransferJob};
use super::TransferQueue;
use crate::archive::ArchiveBuilder;
use crate::config::TransferConfig;
use crate::delivery::ArchiveSink;
use crate::forge::{ContentApi, ContentApiFactory};
use crate::storage::{CredentialStore, SettingsStore};
use crate::transfer::progress::{format_bytes, Phase, TransferProgress};
use crate::transfer::TransferEngine;
use crate::tree::TreeCollector;
use crate::utils::errors::{GitzipError, Result};

/// What a successful run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub file_count: usize,
    pub failed_files: usize,
    pub total_bytes: u64,
    pub archive_name: String,
    pub location: String,
    pub warnings: Vec<JobWarning>,
}

/// Forwards phase and progress changes of the running job to the queue.
pub struct JobReporter {
    queue: TransferQueue,
    job_id: String,
}

impl JobReporter {
    pub(crate) fn new(queue: TransferQueue, job_id: String) -> Self {
        Self { queue, job_id }
    }

    pub fn phase(&self, phase: Phase) {
        self.queue
            .update_progress(&self.job_id, |progress| progress.phase = phase);
    }

    pub fn progress(&self, snapshot: &TransferProgress) {
        self.queue
            .update_progress(&self.job_id, |progress| *progress = snapshot.clone());
    }
}

/// Services a job needs, constructed once at startup.
#[derive(Clone)]
pub struct Pipeline {
    forge: Arc<dyn ContentApiFactory>,
    credentials: Arc<CredentialStore>,
    settings: Arc<SettingsStore>,
    sink: Arc<dyn ArchiveSink>,
    config: TransferConfig,
    /// Last credential that passed validation, and when
    validated: Arc<Mutex<Option<(String, Instant)>>>,
}

impl Pipeline {
    pub fn new(
        forge: Arc<dyn ContentApiFactory>,
        credentials: Arc<CredentialStore>,
        settings: Arc<SettingsStore>,
        sink: Arc<dyn ArchiveSink>,
        config: TransferConfig,
    ) -> Self {
        Self {
            forge,
            credentials,
            settings,
            sink,
            config,
            validated: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub async fn run(
        &self,
        job: &TransferJob,
        cancel: &CancellationToken,
        reporter: &JobReporter,
    ) -> Result<RunSummary> {
        if cancel.is_cancelled() {
            return Err(GitzipError::Cancelled);
        }

        let token = self
            .credentials
            .load()
            .await?
            .ok_or_else(|| GitzipError::Auth("no access token configured".to_string()))?;
        let api = self.forge.connect(&token)?;
        self.ensure_valid_credential(&token, api.as_ref()).await?;

        let quota = api.check_quota().await?;
        if quota.remaining <= self.config.rate_limit_buffer {
            warn!(
                "Only {} API request(s) left, quota resets at {}",
                quota.remaining, quota.reset_at
            );
            return Err(GitzipError::Quota {
                reset_at: quota.reset_at,
            });
        }

        reporter.phase(Phase::Collecting);
        let collector = TreeCollector::new(api.clone(), self.config.max_directories);
        let manifest = tokio::select! {
            result = collector.collect(&job.repo, &job.repo.subpath, &job.options) => result?,
            _ = cancel.cancelled() => return Err(GitzipError::Cancelled),
        };
        if manifest.is_empty() {
            return Err(GitzipError::NothingToDownload);
        }

        let mut warnings = Vec::new();
        if manifest.truncated {
            warnings.push(JobWarning::Truncated {
                collected: manifest.len(),
            });
        }
        if manifest.skipped_directories > 0 {
            warnings.push(JobWarning::SkippedDirectories {
                count: manifest.skipped_directories,
            });
        }

        let engine = TransferEngine::new(api, &self.config);
        let payloads = engine
            .transfer(manifest, &job.options, cancel, |snapshot| reporter.progress(snapshot))
            .await?;

        let failed_files = payloads.iter().filter(|p| p.is_failed()).count();
        if failed_files == payloads.len() {
            return Err(GitzipError::TotalFailure {
                failed: failed_files,
            });
        }
        if failed_files > 0 {
            warn!("{} of {} file(s) failed to download", failed_files, payloads.len());
            warnings.push(JobWarning::PartialFailure {
                failed: failed_files,
            });
        }

        reporter.phase(Phase::Archiving);
        let root = job.repo.subpath.clone();
        let output = tokio::task::spawn_blocking(move || ArchiveBuilder::new().build(&payloads, &root))
            .await
            .map_err(|e| GitzipError::Internal(format!("archive task failed: {e}")))??;
        if output.entries == 0 {
            return Err(GitzipError::TotalFailure {
                failed: failed_files + output.skipped,
            });
        }

        let archive_name = job.repo.archive_file_name(Utc::now());
        let archive_size = output.bytes.len() as u64;
        let location = self.sink.deliver(&archive_name, output.bytes).await?;
        info!(
            "Delivered {} ({} file(s), {})",
            archive_name,
            output.entries,
            format_bytes(archive_size)
        );

        Ok(RunSummary {
            file_count: output.entries,
            failed_files,
            total_bytes: output.written_bytes,
            archive_name,
            location,
            warnings,
        })
    }

    /// Validate against the forge unless this token passed recently.
    async fn ensure_valid_credential(&self, token: &str, api: &dyn ContentApi) -> Result<()> {
        let ttl = self.config.credential_revalidate_after();
        let cached = self
            .validated
            .lock()
            .map(|v| matches!(&*v, Some((t, at)) if t == token && at.elapsed() < ttl))
            .unwrap_or(false);
        if cached {
            return Ok(());
        }

        if !api.validate_credential().await? {
            if let Ok(mut validated) = self.validated.lock() {
                *validated = None;
            }
            return Err(GitzipError::Auth(
                "the forge rejected the access token".to_string(),
            ));
        }

        if let Ok(mut validated) = self.validated.lock() {
            *validated = Some((token.to_string(), Instant::now()));
        }
        Ok(())
    }
}

//! Transfer queue and orchestrator.
//!
//! Jobs move `pending -> running -> completed | failed | cancelled`. At most
//! one job runs at a time; the oldest pending job starts whenever the running
//! slot is free. Every transition is published as a [`QueueEvent`], and every
//! terminal state is appended to the completion history.

pub mod job;
pub mod runner;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::model::{RepoReference, TransferOptions};
use crate::transfer::progress::{format_bytes, Phase, TransferProgress};
use crate::utils::errors::{GitzipError, Result};

pub use job::{CompletionRecord, JobStatus, JobWarning, QueueSummary, TransferJob};
pub use runner::{JobReporter, Pipeline, RunSummary};

/// Maximum number of queued events per subscriber
const EVENT_CAPACITY: usize = 1000;

/// Notifications for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum QueueEvent {
    /// Emitted on every status transition
    #[serde(rename = "job:status")]
    StatusChanged(TransferJob),

    /// Emitted on every progress change of the running job
    #[serde(rename = "job:progress")]
    Progress {
        job_id: String,
        progress: TransferProgress,
    },
}

struct Slot {
    job: TransferJob,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    /// Submission order; a retried job keeps its place
    slots: Vec<Slot>,
    running: Option<String>,
}

impl QueueState {
    fn index_of(&self, job_id: &str) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.job.id == job_id)
            .ok_or_else(|| GitzipError::JobNotFound(job_id.to_string()))
    }

    fn slot_mut(&mut self, job_id: &str) -> Result<&mut Slot> {
        let index = self.index_of(job_id)?;
        Ok(&mut self.slots[index])
    }

    fn summary(&self) -> QueueSummary {
        QueueSummary::from_jobs(self.slots.iter().map(|s| &s.job))
    }
}

struct Inner {
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    /// Bumped on every change so waiters can re-check state
    revision: watch::Sender<u64>,
    pipeline: Pipeline,
}

/// Handle to the single system-wide queue. Cheap to clone.
#[derive(Clone)]
pub struct TransferQueue {
    inner: Arc<Inner>,
}

impl TransferQueue {
    pub fn new(pipeline: Pipeline) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                events,
                revision,
                pipeline,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Validate inputs and enqueue a pending job. Never waits on network work.
    pub fn submit(&self, repo: RepoReference, options: TransferOptions) -> Result<TransferJob> {
        repo.validate()?;
        options.validate()?;

        let job = TransferJob::new(repo, options);
        info!("Queued job {} for {}", job.id, job.repo);
        self.lock().slots.push(Slot {
            job: job.clone(),
            cancel: CancellationToken::new(),
        });

        self.publish(QueueEvent::StatusChanged(job.clone()));
        self.kick();
        Ok(job)
    }

    /// Cancel a pending job outright, or signal the running one.
    ///
    /// A running job keeps its status until the pipeline honors the signal.
    pub async fn cancel(&self, job_id: &str) -> Result<TransferJob> {
        let cancelled = {
            let mut state = self.lock();
            let slot = state.slot_mut(job_id)?;
            match slot.job.status {
                JobStatus::Pending => {
                    slot.cancel.cancel();
                    mark_cancelled(&mut slot.job);
                    slot.job.clone()
                }
                JobStatus::Running => {
                    slot.cancel.cancel();
                    info!("Cancellation requested for running job {}", job_id);
                    return Ok(slot.job.clone());
                }
                status => {
                    return Err(GitzipError::InvalidTransition {
                        job_id: job_id.to_string(),
                        status: status.to_string(),
                        action: "cancel",
                    })
                }
            }
        };

        info!("Cancelled pending job {}", job_id);
        self.record(&cancelled).await;
        self.publish(QueueEvent::StatusChanged(cancelled.clone()));
        Ok(cancelled)
    }

    /// Re-enqueue a failed job with fresh progress, keeping its place in the queue.
    pub fn retry(&self, job_id: &str) -> Result<TransferJob> {
        let job = {
            let mut state = self.lock();
            let index = state.index_of(job_id)?;
            let status = state.slots[index].job.status;
            if status != JobStatus::Failed {
                return Err(GitzipError::InvalidTransition {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                    action: "retry",
                });
            }

            let slot = &mut state.slots[index];
            slot.job.reset();
            slot.cancel = CancellationToken::new();
            slot.job.clone()
        };

        info!("Retrying job {}", job_id);
        self.publish(QueueEvent::StatusChanged(job.clone()));
        self.kick();
        Ok(job)
    }

    /// Drop a pending or terminal job from the queue.
    pub fn remove(&self, job_id: &str) -> Result<TransferJob> {
        let removed = {
            let mut state = self.lock();
            let index = state.index_of(job_id)?;
            let status = state.slots[index].job.status;
            if status == JobStatus::Running {
                return Err(GitzipError::InvalidTransition {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                    action: "remove",
                });
            }
            let slot = state.slots.remove(index);
            slot.cancel.cancel();
            slot.job
        };

        debug!("Removed job {}", job_id);
        self.bump();
        Ok(removed)
    }

    /// Cancel pending jobs, signal the running one and drop every terminal job.
    pub async fn clear_queue(&self) -> QueueSummary {
        let (cancelled, summary) = {
            let mut state = self.lock();
            let mut cancelled = Vec::new();
            for slot in state.slots.iter_mut() {
                match slot.job.status {
                    JobStatus::Pending => {
                        slot.cancel.cancel();
                        mark_cancelled(&mut slot.job);
                        cancelled.push(slot.job.clone());
                    }
                    JobStatus::Running => slot.cancel.cancel(),
                    _ => {}
                }
            }
            state.slots.retain(|s| !s.job.status.is_terminal());
            (cancelled, state.summary())
        };

        info!("Queue cleared, {} pending job(s) cancelled", cancelled.len());
        for job in cancelled {
            self.record(&job).await;
            self.publish(QueueEvent::StatusChanged(job));
        }
        self.bump();
        summary
    }

    pub fn status(&self, job_id: &str) -> Result<TransferJob> {
        let state = self.lock();
        let index = state.index_of(job_id)?;
        Ok(state.slots[index].job.clone())
    }

    /// All jobs in queue order.
    pub fn jobs(&self) -> Vec<TransferJob> {
        self.lock().slots.iter().map(|s| s.job.clone()).collect()
    }

    pub fn summary(&self) -> QueueSummary {
        self.lock().summary()
    }

    pub fn running_job(&self) -> Option<String> {
        self.lock().running.clone()
    }

    /// Resolve once the job is terminal.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Result<TransferJob> {
        let mut revision = self.inner.revision.subscribe();
        loop {
            let job = self.status(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            revision
                .changed()
                .await
                .map_err(|_| GitzipError::Internal("queue dropped".to_string()))?;
        }
    }

    /// Resolve once no job is running and none is pending.
    pub async fn wait_until_idle(&self) {
        let mut revision = self.inner.revision.subscribe();
        loop {
            let summary = self.summary();
            if summary.running == 0 && summary.pending == 0 {
                return;
            }
            if revision.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn update_progress(&self, job_id: &str, apply: impl FnOnce(&mut TransferProgress)) {
        let progress = {
            let mut state = self.lock();
            let Ok(slot) = state.slot_mut(job_id) else {
                return;
            };
            if slot.job.status != JobStatus::Running {
                return;
            }
            apply(&mut slot.job.progress);
            slot.job.progress.clone()
        };
        self.publish(QueueEvent::Progress {
            job_id: job_id.to_string(),
            progress,
        });
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
        self.bump();
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|r| *r += 1);
    }

    /// Start the oldest pending job if nothing is running.
    fn kick(&self) {
        let (job, cancel) = {
            let mut state = self.lock();
            if state.running.is_some() {
                return;
            }
            let Some(slot) = state
                .slots
                .iter_mut()
                .find(|s| s.job.status == JobStatus::Pending)
            else {
                return;
            };

            slot.job.status = JobStatus::Running;
            slot.job.started_at = Some(Utc::now());
            slot.job.progress = TransferProgress::new(Phase::Collecting);
            let started = (slot.job.clone(), slot.cancel.clone());
            state.running = Some(started.0.id.clone());
            started
        };

        self.publish(QueueEvent::StatusChanged(job.clone()));
        let queue = self.clone();
        tokio::spawn(async move { queue.drive(job, cancel).await });
    }

    async fn drive(self, job: TransferJob, cancel: CancellationToken) {
        info!("Starting job {} for {}", job.id, job.repo);
        let job_id = job.id.clone();
        let pipeline = self.inner.pipeline.clone();
        let reporter = JobReporter::new(self.clone(), job_id.clone());

        let handle = tokio::spawn(async move { pipeline.run(&job, &cancel, &reporter).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(GitzipError::Internal(format!("job task failed: {e}"))),
        };

        self.finish(&job_id, outcome).await;
        self.kick();
    }

    /// Turn a pipeline outcome into a terminal job, record it, then free the running slot.
    async fn finish(&self, job_id: &str, outcome: Result<RunSummary>) {
        let mut job = match self.status(job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!("Finished job vanished from the queue: {}", e);
                self.release(job_id);
                return;
            }
        };

        job.completed_at = Some(Utc::now());
        match outcome {
            Ok(summary) => {
                info!(
                    "Job {} completed: {} file(s), {}, {} failed",
                    job_id,
                    summary.file_count,
                    format_bytes(summary.total_bytes),
                    summary.failed_files
                );
                job.status = JobStatus::Completed;
                job.file_count = summary.file_count;
                job.failed_files = summary.failed_files;
                job.total_bytes = summary.total_bytes;
                job.archive_name = Some(summary.archive_name);
                job.location = Some(summary.location);
                job.warnings = summary.warnings;
            }
            Err(GitzipError::Cancelled) => {
                info!("Job {} cancelled", job_id);
                job.status = JobStatus::Cancelled;
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                job.status = JobStatus::Failed;
                job.failed_files = job.progress.files_failed;
                job.error = Some(e.to_job_error());
            }
        }
        if let Some(phase) = job.status.terminal_phase() {
            job.progress.phase = phase;
        }

        self.record(&job).await;
        {
            let mut state = self.lock();
            if let Ok(slot) = state.slot_mut(job_id) {
                slot.job = job.clone();
            }
        }
        self.release(job_id);
        self.publish(QueueEvent::StatusChanged(job));
    }

    fn release(&self, job_id: &str) {
        let mut state = self.lock();
        if state.running.as_deref() == Some(job_id) {
            state.running = None;
        }
    }

    async fn record(&self, job: &TransferJob) {
        let record = CompletionRecord::from_job(job);
        if let Err(e) = self.inner.pipeline.settings().add_history(record).await {
            error!("Failed to record history for job {}: {}", job.id, e);
        }
    }
}

fn mark_cancelled(job: &mut TransferJob) {
    job.status = JobStatus::Cancelled;
    job.completed_at = Some(Utc::now());
    job.progress.phase = Phase::Cancelled;
}

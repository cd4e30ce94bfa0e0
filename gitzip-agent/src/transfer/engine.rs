//! Batched, retrying, cancellable downloader.
//!
//! The manifest is split into batches of `min(concurrency, ceiling)` entries.
//! Batches run one after another, and every download inside a batch runs
//! concurrently. Peak concurrency is the batch size. Cancellation is checked
//! at batch boundaries, so an in-flight batch always settles.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::progress::{format_bytes, format_speed, ProgressTracker, TransferProgress};
use super::retry::RetryPolicy;
use crate::config::TransferConfig;
use crate::forge::ContentApi;
use crate::model::{FilePayload, Manifest, TransferOptions};
use crate::utils::errors::{GitzipError, Result};

pub struct TransferEngine {
    api: Arc<dyn ContentApi>,
    retry: RetryPolicy,
    concurrency_ceiling: usize,
    batch_pacing: Duration,
}

impl TransferEngine {
    pub fn new(api: Arc<dyn ContentApi>, config: &TransferConfig) -> Self {
        Self {
            api,
            retry: config.retry_policy(),
            concurrency_ceiling: config.concurrency_ceiling,
            batch_pacing: config.batch_pacing(),
        }
    }

    pub fn batch_size(&self, options: &TransferOptions) -> usize {
        options.concurrency.min(self.concurrency_ceiling).max(1)
    }

    /// Download every manifest entry.
    ///
    /// Returns one payload per entry, in manifest order. File failures are
    /// represented as failed payloads, never as an `Err`. The only error is
    /// [`GitzipError::Cancelled`], in which case completed payloads are discarded.
    pub async fn transfer<F>(
        &self,
        manifest: Manifest,
        options: &TransferOptions,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Vec<FilePayload>>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        let batch_size = self.batch_size(options);
        let mut tracker = ProgressTracker::new(manifest.len(), manifest.total_bytes());
        on_progress(tracker.progress());

        info!(
            "Transferring {} file(s) ({}) in batches of {}",
            manifest.len(),
            format_bytes(manifest.total_bytes()),
            batch_size
        );

        let mut payloads = Vec::with_capacity(manifest.len());

        for (index, batch) in manifest.entries.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.batch_pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                info!("Transfer cancelled before batch {}", index + 1);
                return Err(GitzipError::Cancelled);
            }

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(slot, entry)| async move {
                    let (result, attempts) =
                        self.retry.run(|| self.api.fetch_blob(&entry.content_ref)).await;
                    (slot, entry, result, attempts)
                })
                .collect();

            let mut slots: Vec<Option<FilePayload>> = vec![None; batch.len()];
            while let Some((slot, entry, result, attempts)) = in_flight.next().await {
                let payload = match result {
                    Ok(data) => FilePayload::success(entry.remote_path.as_str(), data),
                    Err(e) => {
                        warn!(
                            "Failed to download {} after {} attempt(s): {}",
                            entry.remote_path, attempts, e
                        );
                        FilePayload::failed(entry.remote_path.as_str(), &e, attempts)
                    }
                };
                on_progress(tracker.record(&payload));
                slots[slot] = Some(payload);
            }
            payloads.extend(slots.into_iter().flatten());
        }

        if cancel.is_cancelled() {
            info!("Transfer cancelled after the last batch");
            return Err(GitzipError::Cancelled);
        }

        let progress = tracker.progress();
        info!(
            "Transferred {} of {} file(s), {} in {:.1}s ({})",
            progress.files_done - progress.files_failed,
            progress.files_total,
            format_bytes(progress.bytes_done),
            tracker.elapsed().as_secs_f64(),
            format_speed(progress.throughput_estimate)
        );
        Ok(payloads)
    }
}

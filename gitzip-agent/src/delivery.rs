//! Hand-off of finished archives to the host.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use crate::transfer::progress::format_bytes;
use crate::utils::errors::{GitzipError, Result};

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Persist or offer `bytes` under `file_name`. Returns where it ended up.
    async fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Writes archives into a downloads directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArchiveSink for DirectorySink {
    async fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(GitzipError::Internal(format!("invalid archive name: {file_name:?}")));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(file_name);
        let partial = self.dir.join(format!("{file_name}.part"));

        let size = bytes.len() as u64;
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &target).await?;

        info!("Saved {} ({})", target.display(), format_bytes(size));
        Ok(target.display().to_string())
    }
}

/// Keeps delivered archives in memory.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(file_name, bytes)` pairs, oldest first.
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ArchiveSink for MemorySink {
    async fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        self.delivered
            .lock()
            .map_err(|_| GitzipError::Internal("memory sink poisoned".to_string()))?
            .push((file_name.to_string(), bytes));
        Ok(format!("memory://{file_name}"))
    }
}

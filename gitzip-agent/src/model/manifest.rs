//! Manifest and payload types shared by the collector, engine and archive builder.
//!
//! A manifest is the flattened, filtered list of remote files selected for a
//! transfer. Every manifest entry produces exactly one payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::utils::errors::{ErrorKind, GitzipError};

/// Where the bytes of a remote file are fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ContentRef {
    /// Direct raw download URL
    Download(String),
    /// Git blob API URL, fetched with the raw media type
    GitBlob(String),
}

/// One selected remote file. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub remote_path: String,
    pub content_ref: ContentRef,
    pub byte_size: u64,
    pub content_hash: String,
}

/// Result of a tree collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    /// Collection stopped at the file-count cap or the directory ceiling
    pub truncated: bool,
    /// Directory listings that failed and were skipped
    pub skipped_directories: usize,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.byte_size).sum()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.remote_path.as_str()).collect()
    }
}

/// Downloaded bytes, or an explicit failure marker.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadContent {
    Data(Bytes),
    Failed {
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },
}

/// Outcome of downloading one manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub remote_path: String,
    pub byte_size: u64,
    pub content: PayloadContent,
}

impl FilePayload {
    pub fn success(remote_path: impl Into<String>, data: Bytes) -> Self {
        Self {
            remote_path: remote_path.into(),
            byte_size: data.len() as u64,
            content: PayloadContent::Data(data),
        }
    }

    pub fn failed(remote_path: impl Into<String>, error: &GitzipError, attempts: u32) -> Self {
        Self {
            remote_path: remote_path.into(),
            byte_size: 0,
            content: PayloadContent::Failed {
                kind: error.kind(),
                message: error.to_string(),
                attempts,
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.content, PayloadContent::Failed { .. })
    }

    pub fn data(&self) -> Option<&Bytes> {
        match &self.content {
            PayloadContent::Data(data) => Some(data),
            PayloadContent::Failed { .. } => None,
        }
    }
}

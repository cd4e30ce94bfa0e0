//! Remote content client for the forge REST API.
//!
//! [`ContentApi`] is the seam the collector, engine and orchestrator talk to.
//! [`client::ForgeClient`] implements it over HTTP. Calls never retry on their own:
//! they fail fast with a classified [`GitzipError`](crate::GitzipError) and
//! leave retry decisions to the transfer engine.

pub mod classify;
pub mod client;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ForgeConfig;
use crate::model::{ContentRef, RepoReference};
use crate::Result;

pub use client::ForgeClient;

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything else the collector ignores
    #[serde(other)]
    Other,
}

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub content_ref: ContentRef,
    pub sha: String,
}

/// Remaining API budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContentApi: Send + Sync {
    /// List a directory. A file path yields a one-element listing.
    async fn list_directory(&self, repo: &RepoReference, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Fetch the raw bytes behind a content reference.
    async fn fetch_blob(&self, content_ref: &ContentRef) -> Result<Bytes>;

    async fn check_quota(&self) -> Result<Quota>;

    /// `Ok(false)` when the forge rejects the credential.
    async fn validate_credential(&self) -> Result<bool>;
}

/// Builds an authenticated [`ContentApi`] for a credential.
pub trait ContentApiFactory: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn ContentApi>>;
}

/// Factory for the HTTP client.
pub struct ForgeConnector {
    config: ForgeConfig,
}

impl ForgeConnector {
    pub fn new(config: ForgeConfig) -> Self {
        Self { config }
    }
}

impl ContentApiFactory for ForgeConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn ContentApi>> {
        Ok(Arc::new(ForgeClient::new(&self.config, token)?))
    }
}

//! In-memory [`ContentApi`] with call counters and scripted failures.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ContentApi, ContentApiFactory, EntryKind, Quota, RemoteEntry};
use crate::model::repo::normalize_path;
use crate::model::{ContentRef, RepoReference};
use crate::utils::errors::{GitzipError, Result};

const SCHEME: &str = "mem://";

/// Error class a scripted failure produces.
#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    Transient,
    Auth,
    NotFound,
    Quota,
}

impl FailKind {
    fn to_error(self, path: &str) -> GitzipError {
        match self {
            FailKind::Transient => GitzipError::Transient(format!("HTTP 502: {path}")),
            FailKind::Auth => GitzipError::Auth("Bad credentials".to_string()),
            FailKind::NotFound => GitzipError::NotFound(path.to_string()),
            FailKind::Quota => GitzipError::Quota {
                reset_at: Utc::now() + ChronoDuration::seconds(60),
            },
        }
    }
}

type FetchHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct MemoryForge {
    files: BTreeMap<String, Bytes>,
    dirs: BTreeSet<String>,
    quota: Quota,
    credential_valid: bool,
    failing_listings: HashMap<String, FailKind>,
    /// Remaining scripted failures per file path
    failing_fetches: Mutex<HashMap<String, (FailKind, u32)>>,
    fetch_delay: Duration,
    on_fetch: Option<FetchHook>,

    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub quota_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl MemoryForge {
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert(String::new());
        Self {
            files: BTreeMap::new(),
            dirs,
            quota: Quota {
                limit: 5000,
                remaining: 5000,
                used: 0,
                reset_at: Utc::now() + ChronoDuration::hours(1),
            },
            credential_valid: true,
            failing_listings: HashMap::new(),
            failing_fetches: Mutex::new(HashMap::new()),
            fetch_delay: Duration::ZERO,
            on_fetch: None,
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            quota_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Add a file, creating its ancestor directories.
    pub fn with_file(mut self, path: &str, data: impl Into<Bytes>) -> Self {
        let path = normalize_path(path);
        let mut parent = parent_of(&path);
        loop {
            self.dirs.insert(parent.to_string());
            if parent.is_empty() {
                break;
            }
            parent = parent_of(parent);
        }
        self.files.insert(path, data.into());
        self
    }

    pub fn with_remaining_quota(mut self, remaining: u64) -> Self {
        self.quota.remaining = remaining;
        self.quota.used = self.quota.limit.saturating_sub(remaining);
        self
    }

    pub fn with_invalid_credential(mut self) -> Self {
        self.credential_valid = false;
        self
    }

    pub fn fail_listing(mut self, path: &str, kind: FailKind) -> Self {
        self.failing_listings.insert(normalize_path(path), kind);
        self
    }

    /// Fail the next `times` fetches of `path`. `u32::MAX` fails forever.
    pub fn fail_fetch(self, path: &str, kind: FailKind, times: u32) -> Self {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert(normalize_path(path), (kind, times));
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Run `hook` with the path at the start of every fetch.
    pub fn on_fetch(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_fetch = Some(Box::new(hook));
        self
    }

    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    pub fn network_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.fetch_calls.load(Ordering::SeqCst)
            + self.quota_calls.load(Ordering::SeqCst)
            + self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Paths fetched so far, in start order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn file_entry(&self, path: &str, data: &Bytes) -> RemoteEntry {
        RemoteEntry {
            name: name_of(path).to_string(),
            path: path.to_string(),
            kind: EntryKind::File,
            size: Some(data.len() as u64),
            content_ref: ContentRef::Download(format!("{SCHEME}{path}")),
            sha: format!("sha-{path}"),
        }
    }
}

impl Default for MemoryForge {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

#[async_trait]
impl ContentApi for MemoryForge {
    async fn list_directory(&self, _repo: &RepoReference, path: &str) -> Result<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let path = normalize_path(path);

        if let Some(kind) = self.failing_listings.get(&path) {
            return Err(kind.to_error(&path));
        }
        if let Some(data) = self.files.get(&path) {
            return Ok(vec![self.file_entry(&path, data)]);
        }
        if !self.dirs.contains(&path) {
            return Err(GitzipError::NotFound(path));
        }

        let mut entries: Vec<RemoteEntry> = self
            .files
            .iter()
            .filter(|(p, _)| parent_of(p) == path)
            .map(|(p, data)| self.file_entry(p, data))
            .collect();
        entries.extend(
            self.dirs
                .iter()
                .filter(|d| !d.is_empty() && parent_of(d) == path)
                .map(|d| RemoteEntry {
                    name: name_of(d).to_string(),
                    path: d.clone(),
                    kind: EntryKind::Dir,
                    size: None,
                    content_ref: ContentRef::GitBlob(format!("{SCHEME}tree/{d}")),
                    sha: format!("tree-{d}"),
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch_blob(&self, content_ref: &ContentRef) -> Result<Bytes> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let url = match content_ref {
            ContentRef::Download(url) | ContentRef::GitBlob(url) => url,
        };
        let path = url.strip_prefix(SCHEME).unwrap_or(url).to_string();
        self.fetched.lock().unwrap().push(path.clone());
        if let Some(hook) = &self.on_fetch {
            hook(&path);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = {
            let mut failing = self.failing_fetches.lock().unwrap();
            match failing.get_mut(&path) {
                Some((kind, remaining)) if *remaining > 0 => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    Some(*kind)
                }
                _ => None,
            }
        };
        if let Some(kind) = scripted {
            return Err(kind.to_error(&path));
        }

        self.files
            .get(&path)
            .cloned()
            .ok_or(GitzipError::NotFound(path))
    }

    async fn check_quota(&self) -> Result<Quota> {
        self.quota_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.quota.clone())
    }

    async fn validate_credential(&self) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.credential_valid)
    }
}

/// Hands out the same [`MemoryForge`] for every credential.
pub struct MemoryConnector(pub Arc<MemoryForge>);

impl ContentApiFactory for MemoryConnector {
    fn connect(&self, _token: &str) -> Result<Arc<dyn ContentApi>> {
        Ok(self.0.clone())
    }
}

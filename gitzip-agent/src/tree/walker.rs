//! Breadth-first traversal of a remote subtree.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::filter::FileFilter;
use crate::forge::{ContentApi, EntryKind};
use crate::model::repo::normalize_path;
use crate::model::{Manifest, ManifestEntry, RepoReference, TransferOptions};
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{GitzipError, Result};

/// Expands a repository subtree into a flat, filtered manifest.
pub struct TreeCollector {
    api: Arc<dyn ContentApi>,
    /// Safety ceiling on directory expansions per collection
    max_directories: usize,
}

impl TreeCollector {
    pub fn new(api: Arc<dyn ContentApi>, max_directories: usize) -> Self {
        Self {
            api,
            max_directories,
        }
    }

    /// Collect every eligible file below `root_path`.
    ///
    /// A failed listing of the root path is returned as-is. Failed listings
    /// below it are logged and their subtrees skipped. The collection stops
    /// early, without error, at `max_file_count` files or at the directory
    /// ceiling. The total-size budget is checked once traversal is over.
    pub async fn collect(
        &self,
        repo: &RepoReference,
        root_path: &str,
        options: &TransferOptions,
    ) -> Result<Manifest> {
        let filter = FileFilter::new(options)?;
        let root = normalize_path(root_path);

        let mut manifest = Manifest::default();
        let mut seen = HashSet::new();
        let mut worklist = VecDeque::from([(root.clone(), 0usize)]);
        let mut expanded = 0usize;

        'walk: while let Some((dir, depth)) = worklist.pop_front() {
            if expanded >= self.max_directories {
                warn!(
                    "Directory ceiling of {} reached, {} director(ies) left unexpanded",
                    self.max_directories,
                    worklist.len() + 1
                );
                manifest.truncated = true;
                break;
            }
            expanded += 1;

            let entries = match self.api.list_directory(repo, &dir).await {
                Ok(entries) => entries,
                Err(e) if dir == root => return Err(e),
                Err(e) => {
                    warn!("Skipping subtree {}: {}", dir, e);
                    manifest.skipped_directories += 1;
                    continue;
                }
            };

            for entry in entries {
                match entry.kind {
                    EntryKind::File => {
                        let size = entry.size.unwrap_or(0);
                        if let Some(reason) = filter.check_file(&entry.name, &entry.path, size) {
                            debug!("Skipping {} ({:?})", entry.path, reason);
                            continue;
                        }
                        if !seen.insert(entry.path.clone()) {
                            continue;
                        }

                        manifest.entries.push(ManifestEntry {
                            remote_path: entry.path,
                            content_ref: entry.content_ref,
                            byte_size: size,
                            content_hash: entry.sha,
                        });

                        if manifest.len() >= options.max_file_count {
                            info!("File cap of {} reached, stopping collection", options.max_file_count);
                            manifest.truncated = true;
                            break 'walk;
                        }
                    }
                    EntryKind::Dir => {
                        if depth >= options.max_depth {
                            debug!("Not expanding {} at depth {}", entry.path, depth + 1);
                        } else if filter.is_excluded(&entry.path) {
                            debug!("Skipping excluded directory {}", entry.path);
                        } else {
                            worklist.push_back((entry.path, depth + 1));
                        }
                    }
                    EntryKind::Other => debug!("Ignoring {}", entry.path),
                }
            }
        }

        let total = manifest.total_bytes();
        if total > options.max_total_size {
            return Err(GitzipError::SizeLimit {
                total,
                limit: options.max_total_size,
            });
        }

        info!(
            "Collected {} file(s), {} from {} director(ies) of {}",
            manifest.len(),
            format_bytes(total),
            expanded,
            repo
        );
        Ok(manifest)
    }
}

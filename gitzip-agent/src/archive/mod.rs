//! ZIP archive assembly from downloaded payloads.
//!
//! Entries are written in payload order under paths relative to the selected
//! root. Failed payloads never reach the archive.

pub mod sanitize;

use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::model::FilePayload;
use crate::transfer::progress::format_bytes;
use crate::utils::errors::Result;
use sanitize::{relative_path, sanitize_path};

/// Moderate DEFLATE level: the user waits on this step.
const COMPRESSION_LEVEL: i64 = 6;

/// Finished archive plus what was left out of it.
#[derive(Debug)]
pub struct ArchiveOutput {
    pub bytes: Vec<u8>,
    /// Number of files written
    pub entries: usize,
    /// Uncompressed size of the files written
    pub written_bytes: u64,
    /// Failed payloads excluded from the archive
    pub excluded: usize,
    /// Payloads dropped for an empty or duplicate sanitized name
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a ZIP from `payloads`, with paths relative to `root`.
    pub fn build(&self, payloads: &[FilePayload], root: &str) -> Result<ArchiveOutput> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut names = HashSet::new();
        let mut entries = 0;
        let mut written_bytes = 0u64;
        let mut excluded = 0;
        let mut skipped = 0;

        for payload in payloads {
            let Some(data) = payload.data() else {
                excluded += 1;
                continue;
            };

            let Some(name) = sanitize_path(relative_path(&payload.remote_path, root)) else {
                debug!("Skipping {}: empty archive name", payload.remote_path);
                skipped += 1;
                continue;
            };
            if !names.insert(name.clone()) {
                warn!("Skipping {}: duplicate archive name {}", payload.remote_path, name);
                skipped += 1;
                continue;
            }

            writer.start_file(name, options)?;
            writer.write_all(data)?;
            entries += 1;
            written_bytes += data.len() as u64;
        }

        let bytes = writer.finish()?.into_inner();
        info!(
            "Archive built: {} entr(ies), {} excluded, {} skipped, {}",
            entries,
            excluded,
            skipped,
            format_bytes(bytes.len() as u64)
        );

        Ok(ArchiveOutput {
            bytes,
            entries,
            written_bytes,
            excluded,
            skipped,
        })
    }
}

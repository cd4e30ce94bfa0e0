//! Transfer options, their defaults and validation bounds.

use serde::{Deserialize, Serialize};

use crate::utils::errors::{GitzipError, Result};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Upper bounds accepted by [`TransferOptions::validate`].
pub const MAX_FILE_SIZE_LIMIT: u64 = GIB;
pub const MAX_TOTAL_SIZE_LIMIT: u64 = 10 * GIB;
pub const MAX_FILE_COUNT_LIMIT: usize = 10_000;
pub const MAX_CONCURRENCY_LIMIT: usize = 20;
pub const MAX_DEPTH_LIMIT: usize = 64;

/// Budgets and filters for one transfer. Validated once at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOptions {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_file_count: usize,
    /// Directories below this depth (relative to the root path) are not expanded
    pub max_depth: usize,
    pub concurrency: usize,
    pub exclude_patterns: Vec<String>,
    pub include_hidden: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_file_size: 100 * MIB,
            max_total_size: GIB,
            max_file_count: 1000,
            max_depth: 20,
            concurrency: 5,
            exclude_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                ".DS_Store".to_string(),
            ],
            include_hidden: false,
        }
    }
}

impl TransferOptions {
    pub fn validate(&self) -> Result<()> {
        check_range("max_file_size", self.max_file_size, 1, MAX_FILE_SIZE_LIMIT)?;
        check_range("max_total_size", self.max_total_size, 1, MAX_TOTAL_SIZE_LIMIT)?;
        check_range("max_file_count", self.max_file_count as u64, 1, MAX_FILE_COUNT_LIMIT as u64)?;
        check_range("concurrency", self.concurrency as u64, 1, MAX_CONCURRENCY_LIMIT as u64)?;
        check_range("max_depth", self.max_depth as u64, 0, MAX_DEPTH_LIMIT as u64)?;

        if self.exclude_patterns.iter().any(|p| p.is_empty()) {
            return Err(GitzipError::Validation(
                "exclude_patterns must not contain empty patterns".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial override on top of these options.
    pub fn merged(&self, overrides: &TransferOptionsOverride) -> Self {
        Self {
            max_file_size: overrides.max_file_size.unwrap_or(self.max_file_size),
            max_total_size: overrides.max_total_size.unwrap_or(self.max_total_size),
            max_file_count: overrides.max_file_count.unwrap_or(self.max_file_count),
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
            concurrency: overrides.concurrency.unwrap_or(self.concurrency),
            exclude_patterns: overrides
                .exclude_patterns
                .clone()
                .unwrap_or_else(|| self.exclude_patterns.clone()),
            include_hidden: overrides.include_hidden.unwrap_or(self.include_hidden),
        }
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(GitzipError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Caller-supplied overrides; unset fields fall back to the stored settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptionsOverride {
    pub max_file_size: Option<u64>,
    pub max_total_size: Option<u64>,
    pub max_file_count: Option<usize>,
    pub max_depth: Option<usize>,
    pub concurrency: Option<usize>,
    pub exclude_patterns: Option<Vec<String>>,
    pub include_hidden: Option<bool>,
}

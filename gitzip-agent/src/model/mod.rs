//! Core data model: what to download, with which budgets, and what came back.

pub mod manifest;
pub mod options;
pub mod repo;

pub use manifest::{ContentRef, FilePayload, Manifest, ManifestEntry, PayloadContent};
pub use options::{TransferOptions, TransferOptionsOverride};
pub use repo::RepoReference;

//! Tree collection: remote subtree to flat manifest.

pub mod filter;
pub mod walker;

pub use filter::{FileFilter, SkipReason};
pub use walker::TreeCollector;

//! GitZip Agent Library
//!
//! Downloads a folder of a remote Git repository as a single ZIP archive.
//! Jobs go through one queue: collect the file tree, download in bounded
//! batches, package into a DEFLATE archive and hand it to the host.

pub mod api;
pub mod archive;
pub mod config;
pub mod daemon;
pub mod delivery;
pub mod forge;
pub mod model;
pub mod queue;
pub mod storage;
pub mod transfer;
pub mod tree;
pub mod utils;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{GitzipError, Result};

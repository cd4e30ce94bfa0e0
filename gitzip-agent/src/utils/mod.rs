//! Utility modules for the download agent.

pub mod errors;
pub mod logger;

pub use errors::{ErrorKind, GitzipError, JobError, Result};

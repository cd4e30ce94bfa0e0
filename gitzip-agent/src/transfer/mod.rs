//! Transfer engine: manifest to in-memory payloads.

pub mod engine;
pub mod progress;
pub mod retry;

pub use engine::TransferEngine;
pub use progress::{Phase, ProgressTracker, TransferProgress};
pub use retry::RetryPolicy;

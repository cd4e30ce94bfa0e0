//! Process lifecycle for the agent daemon.

pub mod shutdown;

pub use shutdown::ShutdownCoordinator;

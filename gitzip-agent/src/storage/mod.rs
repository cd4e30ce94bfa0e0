//! Host persistence: one credential, the settings record and the completion history.
//!
//! Everything is stored as JSON values under fixed keys in a [`KeyValueStore`].

pub mod credential;
pub mod file;
pub mod memory;
pub mod settings;

use async_trait::async_trait;
use serde_json::Value;

use crate::utils::errors::Result;

pub use credential::{CredentialStatus, CredentialStore};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use settings::{ExportDocument, SettingsPatch, SettingsStore, UserSettings};

pub const TOKEN_KEY: &str = "github_token";
pub const SETTINGS_KEY: &str = "user_settings";
pub const HISTORY_KEY: &str = "download_history";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

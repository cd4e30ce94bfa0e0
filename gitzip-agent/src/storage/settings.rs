//! User settings record and completion history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{KeyValueStore, HISTORY_KEY, SETTINGS_KEY};
use crate::model::{TransferOptions, TransferOptionsOverride};
use crate::queue::CompletionRecord;
use crate::utils::errors::{GitzipError, Result};

/// Persisted defaults for new transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(flatten)]
    pub transfer: TransferOptions,
    pub show_notifications: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            transfer: TransferOptions::default(),
            show_notifications: true,
        }
    }
}

/// Partial settings update; unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(flatten)]
    pub transfer: TransferOptionsOverride,
    pub show_notifications: Option<bool>,
}

/// Settings plus history, as exported to and imported from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub settings: UserSettings,
    #[serde(default)]
    pub download_history: Vec<CompletionRecord>,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    history_limit: usize,
    /// Serializes read-modify-write cycles on the history list
    history_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>, history_limit: usize) -> Self {
        Self {
            store,
            history_limit: history_limit.max(1),
            history_lock: Mutex::new(()),
        }
    }

    /// Stored settings merged over the defaults.
    pub async fn get(&self) -> Result<UserSettings> {
        let Some(stored) = self.store.get(SETTINGS_KEY).await? else {
            return Ok(UserSettings::default());
        };

        let mut merged = serde_json::to_value(UserSettings::default())?;
        match (merged.as_object_mut(), stored) {
            (Some(base), Value::Object(fields)) => base.extend(fields),
            (_, other) => {
                warn!("Ignoring malformed stored settings: {}", other);
                return Ok(UserSettings::default());
            }
        }

        match serde_json::from_value::<UserSettings>(merged) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Ignoring unreadable stored settings: {}", e);
                Ok(UserSettings::default())
            }
        }
    }

    pub async fn update(&self, patch: &SettingsPatch) -> Result<UserSettings> {
        let current = self.get().await?;
        let updated = UserSettings {
            transfer: current.transfer.merged(&patch.transfer),
            show_notifications: patch.show_notifications.unwrap_or(current.show_notifications),
        };
        self.save(&updated).await?;
        Ok(updated)
    }

    pub async fn reset(&self) -> Result<UserSettings> {
        self.store.remove(SETTINGS_KEY).await?;
        info!("Settings reset to defaults");
        Ok(UserSettings::default())
    }

    async fn save(&self, settings: &UserSettings) -> Result<()> {
        settings.transfer.validate()?;
        self.store.set(SETTINGS_KEY, serde_json::to_value(settings)?).await
    }

    /// Completion records, newest first.
    pub async fn history(&self) -> Result<Vec<CompletionRecord>> {
        match self.store.get(HISTORY_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Prepend `record`, dropping the oldest entries past the cap.
    pub async fn add_history(&self, record: CompletionRecord) -> Result<()> {
        let _guard = self.history_lock.lock().await;
        let mut history = self.history().await?;
        history.insert(0, record);
        history.truncate(self.history_limit);
        self.store.set(HISTORY_KEY, serde_json::to_value(&history)?).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        let _guard = self.history_lock.lock().await;
        self.store.remove(HISTORY_KEY).await
    }

    pub async fn export(&self) -> Result<ExportDocument> {
        Ok(ExportDocument {
            settings: self.get().await?,
            download_history: self.history().await?,
            exported_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Replace settings and history with an exported document.
    pub async fn import(&self, document: ExportDocument) -> Result<usize> {
        document.settings.transfer.validate().map_err(|e| {
            GitzipError::Validation(format!("imported settings rejected: {e}"))
        })?;

        let _guard = self.history_lock.lock().await;
        let mut history = document.download_history;
        history.truncate(self.history_limit);

        self.store
            .set(SETTINGS_KEY, serde_json::to_value(&document.settings)?)
            .await?;
        self.store.set(HISTORY_KEY, serde_json::to_value(&history)?).await?;

        info!(
            "Imported settings and {} history record(s) from version {}",
            history.len(),
            document.version
        );
        Ok(history.len())
    }
}

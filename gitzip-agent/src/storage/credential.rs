//! The single stored forge credential.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::info;

use super::{KeyValueStore, TOKEN_KEY};
use crate::utils::errors::{GitzipError, Result};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(ghp_[a-zA-Z0-9]{36}|github_pat_[a-zA-Z0-9_]+)$")
            .expect("token pattern is valid")
    })
}

/// Classic (`ghp_`) or fine-grained (`github_pat_`) personal access token.
pub fn is_token_shaped(token: &str) -> bool {
    token_pattern().is_match(token)
}

/// What presentation layers may learn about the stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub configured: bool,
    /// First and last characters only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store `token` after checking its shape.
    pub async fn save(&self, token: &str) -> Result<CredentialStatus> {
        let token = token.trim();
        if !is_token_shaped(token) {
            return Err(GitzipError::Validation(
                "token must be a ghp_ or github_pat_ personal access token".to_string(),
            ));
        }
        self.store.set(TOKEN_KEY, Value::String(token.to_string())).await?;
        info!("Credential saved");
        Ok(status_for(Some(token)))
    }

    pub async fn load(&self) -> Result<Option<String>> {
        match self.store.get(TOKEN_KEY).await? {
            Some(Value::String(token)) if !token.is_empty() => Ok(Some(token)),
            Some(Value::String(_)) | None => Ok(None),
            Some(other) => Err(GitzipError::Storage(format!(
                "stored credential has unexpected type: {other}"
            ))),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY).await?;
        info!("Credential cleared");
        Ok(())
    }

    pub async fn status(&self) -> Result<CredentialStatus> {
        Ok(status_for(self.load().await?.as_deref()))
    }
}

fn status_for(token: Option<&str>) -> CredentialStatus {
    CredentialStatus {
        configured: token.is_some(),
        masked: token.map(mask),
    }
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

//! Repository references and the archive names derived from them.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::utils::errors::{GitzipError, Result};

const DEFAULT_REF: &str = "main";

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/]+)/([^/]+?)(?:/(?:tree|blob)/([^/]+)(?:/(.*?))?)?/?$")
            .expect("repository URL pattern is valid")
    })
}

/// Immutable identity of what to download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoReference {
    pub owner: String,
    pub name: String,
    /// Branch, tag or commit
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    /// Folder inside the repository; empty means the whole repository
    #[serde(default, deserialize_with = "deserialize_subpath")]
    pub subpath: String,
}

fn default_ref() -> String {
    DEFAULT_REF.to_string()
}

fn deserialize_subpath<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_path(&raw))
}

impl RepoReference {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        git_ref: impl Into<String>,
        subpath: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            git_ref: git_ref.into(),
            subpath: normalize_path(&subpath.into()),
        }
    }

    /// Parse a repository, folder or file URL from the forge web UI.
    pub fn parse_url(url: &str) -> Result<Self> {
        let captures = repo_url_pattern()
            .captures(url.trim())
            .ok_or_else(|| GitzipError::Validation(format!("not a repository URL: {url}")))?;

        let owner = &captures[1];
        let name = &captures[2];
        let git_ref = captures.get(3).map_or(DEFAULT_REF, |m| m.as_str());
        let subpath = captures.get(4).map_or("", |m| m.as_str());

        Ok(Self::new(owner, name, git_ref, subpath))
    }

    /// Checks identity fields before any network call is made.
    pub fn validate(&self) -> Result<()> {
        let valid_segment = |s: &str| !s.is_empty() && !s.contains('/') && s != "." && s != "..";
        if !valid_segment(&self.owner) {
            return Err(GitzipError::Validation(format!("invalid owner: {:?}", self.owner)));
        }
        if !valid_segment(&self.name) {
            return Err(GitzipError::Validation(format!("invalid repository name: {:?}", self.name)));
        }
        if self.git_ref.trim().is_empty() {
            return Err(GitzipError::Validation("ref must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.subpath.is_empty()
    }

    /// File name offered to the host for the finished archive:
    /// `<owner>-<repo>-<folder-or-root>-<timestamp>.zip`.
    pub fn archive_file_name(&self, at: DateTime<Utc>) -> String {
        let folder = if self.is_root() {
            "root".to_string()
        } else {
            self.subpath.replace('/', "-")
        };
        let timestamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}-{}-{}-{}.zip", self.owner, self.name, folder, timestamp)
    }
}

impl fmt::Display for RepoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.git_ref)?;
        if !self.is_root() {
            write!(f, ":{}", self.subpath)?;
        }
        Ok(())
    }
}

/// Trim leading/trailing slashes and collapse repeated separators.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

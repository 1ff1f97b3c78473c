/// Webhook directory: maps delivery target names to webhook URLs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the directory that holds `webhooks.json`.
pub const WORKSPACE_ENV: &str = "WORKSPACE";

/// File name of the webhook directory inside the workspace.
pub const WEBHOOKS_FILE: &str = "webhooks.json";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolves a target name to a webhook URL.
///
/// `Ok(None)` means the store was readable but has no entry for `name`.
pub trait WebhookStore {
    fn webhook_url(&self, name: &str) -> Result<Option<String>, WebhookError>;
}

/// An in-memory webhook directory, e.g. `{"general": "https://..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookMap {
    hooks: HashMap<String, String>,
}

impl WebhookMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.hooks.insert(name.into(), url.into());
    }

    /// Parse a webhook directory from a JSON object string.
    pub fn parse_json(input: &str) -> Result<WebhookMap, WebhookError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a webhook directory from a JSON file.
    pub fn load_from_json(path: &Path) -> Result<WebhookMap, WebhookError> {
        let contents = std::fs::read_to_string(path).map_err(|source| WebhookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_json(&contents)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.hooks.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WebhookMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = WebhookMap::new();
        for (name, url) in iter {
            map.insert(name, url);
        }
        map
    }
}

impl WebhookStore for WebhookMap {
    fn webhook_url(&self, name: &str) -> Result<Option<String>, WebhookError> {
        Ok(self.get(name).map(str::to_string))
    }
}

/// A `webhooks.json` file on disk, re-read on every lookup so edits take
/// effect without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookFile {
    path: PathBuf,
}

impl WebhookFile {
    /// `<dir>/webhooks.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(WEBHOOKS_FILE),
        }
    }

    /// `$WORKSPACE/webhooks.json`.
    pub fn from_env() -> Result<Self, WebhookError> {
        let dir = std::env::var_os(WORKSPACE_ENV).ok_or(WebhookError::MissingEnv(WORKSPACE_ENV))?;
        Ok(Self::in_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WebhookStore for WebhookFile {
    fn webhook_url(&self, name: &str) -> Result<Option<String>, WebhookError> {
        WebhookMap::load_from_json(&self.path)?.webhook_url(name)
    }
}

//! Runtime configuration, read from the environment (and `.env` when present).

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the local cache documents
    pub data_dir: PathBuf,

    /// Remote store connection, when both endpoint and key are configured
    pub remote: Option<RemoteConfig>,
}

#[derive(Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub key: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("CRM_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let url = lookup("CRM_REMOTE_URL").filter(|v| !v.trim().is_empty());
        let key = lookup("CRM_REMOTE_KEY").filter(|v| !v.trim().is_empty());
        let remote = match (url, key) {
            (Some(url), Some(key)) => Some(RemoteConfig {
                url,
                key,
                max_connections: lookup("CRM_REMOTE_MAX_CONNECTIONS")
                    .unwrap_or_else(|| "5".to_string())
                    .parse()
                    .context("Invalid CRM_REMOTE_MAX_CONNECTIONS")?,
            }),
            _ => None,
        };

        Ok(Self { data_dir, remote })
    }

    pub fn with_data_dir(mut self, dir: Option<&Path>) -> Self {
        if let Some(dir) = dir {
            self.data_dir = dir.to_path_buf();
        }
        self
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("simpler-crm"))
        .unwrap_or_else(|| PathBuf::from(".simpler-crm"))
}

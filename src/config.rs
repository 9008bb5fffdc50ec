use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::codec::TagPolicy;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for tree-state-sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Host (domain suffix) of the hosting proxy that strips query parameters
    #[serde(default = "defaults::redirect_host")]
    pub redirect_host: String,
    /// Host (domain suffix) the browser comes from before that redirect
    #[serde(default = "defaults::origin_host")]
    pub origin_host: String,
    /// URL polling period
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Public base URL used for share links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default)]
    pub tag_policy: TagPolicy,
    /// File backing the profile-scoped store
    #[serde(default = "defaults::local_store_path")]
    pub local_store_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            redirect_host: defaults::redirect_host(),
            origin_host: defaults::origin_host(),
            poll_interval_ms: defaults::poll_interval_ms(),
            public_url: None,
            tag_policy: TagPolicy::default(),
            local_store_path: defaults::local_store_path(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from the default config file (if any) and environment variables
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_with(Some(&config_path))
    }

    /// Load from `path` when it exists (defaults otherwise), then apply env overrides
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::debug!("loading tree-state-sync config from {:?}", path);
                Self::load_from_file(path)?
            }
            _ => Self::default(),
        };

        if let Ok(host) = env::var("TREE_STATE_REDIRECT_HOST") {
            config.redirect_host = host;
        }

        if let Ok(host) = env::var("TREE_STATE_ORIGIN_HOST") {
            config.origin_host = host;
        }

        if let Ok(interval) = env::var("TREE_STATE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval
                .parse()
                .context("Failed to parse TREE_STATE_POLL_INTERVAL_MS as u64")?;
        }

        if let Ok(url) = env::var("TREE_STATE_PUBLIC_URL") {
            config.public_url = Some(url).filter(|url| !url.is_empty());
        }

        if let Ok(path) = env::var("TREE_STATE_LOCAL_STORE") {
            config.local_store_path = expand_tilde(&PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: SyncConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.local_store_path = expand_tilde(&config.local_store_path);

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/tree-state-sync/config.yaml"))
            .context("Could not determine home directory for config file")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(crate::error::Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            )
            .into());
        }
        if self.redirect_host.is_empty() {
            return Err(crate::error::Error::Config("redirect_host is empty".to_string()).into());
        }
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(crate) fn redirect_host() -> String {
        "googleusercontent.com".to_string()
    }

    pub(crate) fn origin_host() -> String {
        "storage.cloud.google.com".to_string()
    }

    pub(crate) fn poll_interval_ms() -> u64 {
        500
    }

    pub(crate) fn local_store_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("tree-state-sync/local.yaml"))
            .unwrap_or_else(|| PathBuf::from(".tree-state-sync/local.yaml"))
    }
}

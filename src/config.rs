use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::remote::{FilesystemRemote, HttpRemote, Remote};

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

/// Configuration for obs-checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObsConfig {
    /// Base URL of the API, or `file://<dir>` for a local source directory
    pub api_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Check out the expanded sources of linked packages
    #[serde(default = "defaults::expand_links")]
    pub expand_links: bool,
    /// Maximum number of concurrent uploads and downloads
    #[serde(default = "defaults::transfer_concurrency")]
    pub transfer_concurrency: usize,
}

impl ObsConfig {
    /// Load configuration from the config file and environment variables
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        tracing::debug!("loading obs-checkout config from {:?}", config_path);
        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else if let Ok(api_url) = env::var("OBS_API_URL") {
            Self::new(api_url)
        } else {
            anyhow::bail!(
                "config file not found at {:?} and OBS_API_URL is not set",
                config_path
            );
        };

        if let Ok(api_url) = env::var("OBS_API_URL") {
            config.api_url = api_url;
        }

        if let Ok(username) = env::var("OBS_USERNAME") {
            config.username = Some(username);
        }

        if let Ok(password) = env::var("OBS_PASSWORD") {
            config.password = Some(password);
        }

        if let Ok(concurrency) = env::var("OBS_TRANSFER_CONCURRENCY") {
            config.transfer_concurrency = concurrency
                .parse()
                .context("Failed to parse OBS_TRANSFER_CONCURRENCY as usize")?;
        }
        Ok(config)
    }

    /// Configuration with defaults for everything but the API URL
    pub fn new(api_url: impl Into<String>) -> Self {
        ObsConfig {
            api_url: api_url.into(),
            username: None,
            password: None,
            expand_links: defaults::expand_links(),
            transfer_concurrency: defaults::transfer_concurrency(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ObsConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get config file path, `OBS_CHECKOUT_CONFIG` overriding the default location
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = env::var("OBS_CHECKOUT_CONFIG") {
            return Ok(expand_tilde(Path::new(&path)));
        }
        dirs::home_dir()
            .map(|home| home.join(".config/obs-checkout/config.yaml"))
            .context("Could not determine home directory for config file")
    }

    /// Local directory served by [`FilesystemRemote`], if the API URL points to one
    pub fn local_source_dir(&self) -> Option<PathBuf> {
        if let Some(path) = self.api_url.strip_prefix("file://") {
            return Some(expand_tilde(Path::new(path)));
        }
        if self.api_url.contains("://") {
            return None;
        }
        Some(expand_tilde(Path::new(&self.api_url)))
    }

    /// Build the remote described by this configuration
    pub fn remote(&self) -> Result<Box<dyn Remote>> {
        match self.local_source_dir() {
            Some(dir) => Ok(Box::new(FilesystemRemote::new(dir))),
            None => Ok(Box::new(HttpRemote::new(
                &self.api_url,
                self.username.clone(),
                self.password.clone(),
            )?)),
        }
    }

    pub fn checkout_options(&self) -> CheckoutOptions {
        CheckoutOptions {
            expand_links: self.expand_links,
            revision: None,
            download_concurrency: self.transfer_concurrency,
        }
    }

    pub fn commit_options(&self, message: Option<String>) -> CommitOptions {
        CommitOptions {
            message,
            upload_concurrency: self.transfer_concurrency,
        }
    }
}

/// Options of a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Check out the expanded sources when the package is a link
    pub expand_links: bool,
    /// Revision number or source hash; latest when unset
    pub revision: Option<String>,
    pub download_concurrency: usize,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        CheckoutOptions {
            expand_links: defaults::expand_links(),
            revision: None,
            download_concurrency: defaults::transfer_concurrency(),
        }
    }
}

/// Options of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    /// Commit message stored with the new revision
    pub message: Option<String>,
    pub upload_concurrency: usize,
}

impl Default for CommitOptions {
    fn default() -> Self {
        CommitOptions {
            message: None,
            upload_concurrency: defaults::transfer_concurrency(),
        }
    }
}

mod defaults {
    pub(crate) fn expand_links() -> bool {
        true
    }

    pub(crate) fn transfer_concurrency() -> usize {
        4
    }
}

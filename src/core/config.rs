//! Configuration module for ImageVault
//!
//! Handles server configuration including:
//! - Storage root and file naming policy
//! - Server-wide encryption secret
//! - Thumbnail re-encode quality
//! - Legacy numeric link store
//! - Logging

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use secrecy::SecretString;
use serde::Deserialize;

use super::error::{ConfigError, Result};
use crate::logging::LoggingConfig;

/// Default thumbnail JPEG quality
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 50;

/// Default lifetime of an issued link (24 hours)
pub const DEFAULT_LINK_TTL_SECS: u64 = 24 * 60 * 60;

/// Default legacy sweep interval (24 hours)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Main server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Root directory holding every asset, derivative and sidecar
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Server-wide secret that seals capability tokens
    #[serde(default = "default_encryption_secret")]
    pub encryption_secret: SecretString,

    /// JPEG quality used when re-encoding thumbnails (1-100)
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,

    /// Map names through a fan-out content hash instead of using them verbatim
    #[serde(default)]
    pub hash_filenames: bool,

    /// Lifetime applied to links issued without an explicit expiry
    #[serde(default = "default_link_ttl_secs")]
    pub default_link_ttl_secs: u64,

    /// Legacy numeric link store
    #[serde(default)]
    pub legacy_links: LegacyLinkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Legacy numeric link store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyLinkConfig {
    /// Whether numeric links are served at all
    #[serde(default)]
    pub enabled: bool,

    /// SQLite file backing the durable store; memory-only when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Seconds between expiry sweeps, 0 disables sweeping
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_storage_root() -> PathBuf {
    std::env::temp_dir().join("imagevault")
}

fn default_encryption_secret() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}

fn default_thumbnail_quality() -> u8 {
    DEFAULT_THUMBNAIL_QUALITY
}

fn default_link_ttl_secs() -> u64 {
    DEFAULT_LINK_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            encryption_secret: default_encryption_secret(),
            thumbnail_quality: default_thumbnail_quality(),
            hash_filenames: false,
            default_link_ttl_secs: default_link_ttl_secs(),
            legacy_links: LegacyLinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LegacyLinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_path: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LegacyLinkConfig {
    /// Sweep interval, `None` when sweeping is turned off
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl ServerConfig {
    /// Create a configuration rooted at `storage_root` with defaults elsewhere
    pub fn with_storage_root(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            ..Default::default()
        }
    }

    /// Set the server-wide secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.encryption_secret = SecretString::new(secret.into());
        self
    }

    /// Enable or disable hashed file naming
    pub fn with_hash_filenames(mut self, enabled: bool) -> Self {
        self.hash_filenames = enabled;
        self
    }

    /// Set the thumbnail quality
    pub fn with_thumbnail_quality(mut self, quality: u8) -> Self {
        self.thumbnail_quality = quality;
        self
    }

    /// Load configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON document and validate it
    pub fn from_json(content: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.thumbnail_quality) {
            return Err(ConfigError::InvalidValue {
                field: "thumbnail_quality".to_string(),
                value: self.thumbnail_quality.to_string(),
            }
            .into());
        }
        if self.default_link_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_link_ttl_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Create the storage root if it does not exist yet
    pub fn ensure_storage_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage_root).map_err(ConfigError::Io)?;
        tracing::info!("Writing images to {}", self.storage_root.display());
        Ok(())
    }

    /// Lifetime of links issued without an explicit expiry
    pub fn default_link_ttl(&self) -> Duration {
        Duration::from_secs(self.default_link_ttl_secs)
    }
}

//! Configuration for the librarian service core.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/librarian/config.toml`.
//! Secrets (the token encryption key) normally arrive through environment
//! overrides rather than the file on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scan.max_folders must be at least 1, got {0}")]
    InvalidMaxFolders(usize),

    #[error("scan.max_files must be at least 1, got {0}")]
    InvalidMaxFiles(usize),

    #[error("scan.max_depth must be at least 1, got {0}")]
    InvalidMaxDepth(usize),

    #[error("scan.eligible_mime_types must not be empty")]
    EmptyMimeSet,

    #[error("download.max_batch must be at least 1, got {0}")]
    InvalidMaxBatch(usize),

    #[error("download.max_file_size must be greater than 0, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("vault.refresh_lookahead_secs must be between 1 and 3600, got {0}")]
    InvalidLookahead(u64),

    #[error("vault.token_key must be base64 for exactly 32 bytes: {0}")]
    InvalidTokenKey(String),

    #[error("api url must start with http:// or https://, got {0}")]
    InvalidApiUrl(String),
}

/// Main configuration structure for the librarian core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Local storage layout.
    pub storage: StorageConfig,

    /// Credential encryption and refresh policy.
    pub vault: VaultConfig,

    /// Tree scan bounds and eligibility.
    pub scan: ScanConfig,

    /// Download batch and streaming limits.
    pub download: DownloadConfig,

    /// Remote API endpoints and client credentials.
    pub api: ApiConfig,
}

/// Local storage layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for per-user storage. Users land under
    /// `<root>/users/user_<id>/`.
    pub root: PathBuf,
}

/// Credential encryption and refresh policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte key for token encryption at rest. Usually
    /// supplied via the LIBRARIAN_TOKEN_KEY environment override.
    pub token_key: String,

    /// Refresh the access token when it expires within this window.
    pub refresh_lookahead_secs: u64,
}

/// Tree scan bounds and eligibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum folders visited in one scan.
    pub max_folders: usize,

    /// Maximum file nodes observed in one scan, eligible or not.
    pub max_files: usize,

    /// Maximum folder depth below the root.
    pub max_depth: usize,

    /// MIME types accepted for download.
    pub eligible_mime_types: Vec<String>,

    /// Network timeout per listing/metadata request, in seconds.
    pub request_timeout_secs: u64,
}

/// Download batch and streaming limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum file ids accepted in one download request.
    pub max_batch: usize,

    /// Per-file size ceiling in bytes, enforced both at selection time and
    /// against the actual byte count during transfer.
    pub max_file_size: u64,

    /// Network timeout for one content download, in seconds.
    pub stream_timeout_secs: u64,
}

/// Remote API endpoints and OAuth client credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the file storage API.
    pub drive_base_url: String,

    /// OAuth token endpoint for refresh exchanges.
    pub token_url: String,

    /// OAuth client id issued to this deployment.
    pub client_id: String,

    /// OAuth client secret issued to this deployment.
    pub client_secret: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            token_key: String::new(),
            refresh_lookahead_secs: 300, // 5 minutes
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_folders: 1000,
            max_files: 5000,
            max_depth: 32,
            eligible_mime_types: vec![
                "application/pdf".to_string(),
                "application/epub+zip".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            ],
            request_timeout_secs: 60,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_batch: 20,
            max_file_size: 50 * 1024 * 1024, // 50MB
            stream_timeout_secs: 120,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("librarian")
        .join("config.toml")
}

impl VaultConfig {
    /// Refresh lookahead as a [`Duration`].
    pub fn refresh_lookahead(&self) -> Duration {
        Duration::from_secs(self.refresh_lookahead_secs)
    }

    /// Decoded 32-byte key material, if a key is configured.
    pub fn decoded_token_key(&self) -> Result<Vec<u8>, ConfigError> {
        let bytes = BASE64
            .decode(self.token_key.as_bytes())
            .map_err(|e| ConfigError::InvalidTokenKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(ConfigError::InvalidTokenKey(format!(
                "decoded to {} bytes, expected 32",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

impl ScanConfig {
    /// Network timeout per listing/metadata request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DownloadConfig {
    /// Network timeout for one content download.
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

impl LibrarianConfig {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LIBRARIAN_TOKEN_KEY: Override the token encryption key
    /// - LIBRARIAN_STORAGE_ROOT: Override the storage base directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LIBRARIAN_TOKEN_KEY") {
            if !key.is_empty() {
                tracing::info!("Overriding vault token key from environment");
                self.vault.token_key = key;
            }
        }

        if let Ok(root) = std::env::var("LIBRARIAN_STORAGE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding storage root from environment: {}", root);
                self.storage.root = PathBuf::from(root);
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.max_folders < 1 {
            return Err(ConfigError::InvalidMaxFolders(self.scan.max_folders));
        }
        if self.scan.max_files < 1 {
            return Err(ConfigError::InvalidMaxFiles(self.scan.max_files));
        }
        if self.scan.max_depth < 1 {
            return Err(ConfigError::InvalidMaxDepth(self.scan.max_depth));
        }
        if self.scan.eligible_mime_types.is_empty() {
            return Err(ConfigError::EmptyMimeSet);
        }

        if self.download.max_batch < 1 {
            return Err(ConfigError::InvalidMaxBatch(self.download.max_batch));
        }
        if self.download.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize(self.download.max_file_size));
        }

        if self.vault.refresh_lookahead_secs < 1 || self.vault.refresh_lookahead_secs > 3600 {
            return Err(ConfigError::InvalidLookahead(
                self.vault.refresh_lookahead_secs,
            ));
        }
        if !self.vault.token_key.is_empty() {
            self.vault.decoded_token_key()?;
        }

        for url in [&self.api.drive_base_url, &self.api.token_url] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::InvalidApiUrl(url.clone()));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

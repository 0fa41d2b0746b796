//! Configuration file handling
//!
//! Configuration lives in a TOML file, by default
//! `<config_dir>/s3tk/config.toml`. A missing file is not an error: every
//! setting has a default and command-line flags take precedence anyway.
//!
//! ```toml
//! [client]
//! region = "eu-west-1"
//! connect_timeout_secs = 10
//!
//! [client.retry]
//! max_attempts = 8
//!
//! [sync]
//! src = "s3://source-bucket/data/"
//! dst = "s3://target-bucket/data/"
//! compare_mode = "etag"
//! delete_extra = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::download::DownloadOptions;
use crate::error::{Error, Result};
use crate::relocate::MoveOptions;
use crate::sync::SyncOptions;
use crate::copy::{MaskCopyOptions, SplitOptions};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "S3TK_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Retry policy applied by store adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

/// Connection settings for the store client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Named profile from the shared AWS config files
    pub profile: Option<String>,
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,

    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Use path-style addressing (`endpoint/bucket/key`)
    pub force_path_style: bool,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,

    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: None,
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Per-command section: optional source/destination plus the command options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct Section<T> {
    pub src: Option<String>,
    pub dst: Option<String>,
    #[serde(flatten)]
    pub options: T,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub sync: Section<SyncOptions>,
    #[serde(rename = "move")]
    pub relocate: Section<MoveOptions>,
    pub copy: Section<MaskCopyOptions>,
    pub split: SplitSection,
    pub download: Section<DownloadOptions>,
}

/// `[split]` section: one bucket, four roots
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SplitSection {
    pub bucket: Option<String>,
    pub src_root: Option<String>,
    pub ref_root: Option<String>,
    pub common_dst_root: Option<String>,
    pub addon_dst_root: Option<String>,
    #[serde(flatten)]
    pub options: SplitOptions,
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges of every section
    pub fn validate(&self) -> Result<()> {
        if self.client.retry.max_attempts == 0 {
            return Err(Error::Config(
                "client.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        self.sync.options.validate()?;
        self.relocate.options.validate()?;
        self.copy.options.validate()?;
        self.split.options.validate()?;
        self.download.options.validate()?;
        Ok(())
    }
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use the default location, honouring [`CONFIG_DIR_ENV`]
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?
                .join("s3tk"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE_NAME)))
    }

    /// Use an explicit file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, falling back to defaults when it does not exist
    pub fn load(&self) -> Result<Config> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                tracing::debug!(path = %self.path.display(), "Loaded configuration");
                Config::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No configuration file, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! Configuration for publishers, repositories, and the resend service.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default AWS region.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Default schema version for newly built messages.
pub const DEFAULT_VERSION: u8 = 1;

/// Default age (seconds) an outbox row must reach before a resend pass picks it up.
pub const DEFAULT_RESEND_TIMEOUT_SECS: u64 = 120;

/// Schema versions with a known validator.
pub const SUPPORTED_VERSIONS: [u8; 2] = [1, 2];

/// Backing store for outbox and inbox rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// SQLite database via raw SQL.
    #[default]
    Sqlite,
    /// In-process store, lost on restart.
    Memory,
}

impl StorageDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Storage selection. When absent from [`Config`], outbox and inbox are disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub driver: StorageDriver,
    /// Database file for the SQLite driver. `None` opens an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: StorageDriver::Sqlite,
            path: Some(path.into()),
        }
    }

    pub fn memory() -> Self {
        Self {
            driver: StorageDriver::Memory,
            path: None,
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// AWS account id used in ARNs and queue URLs.
    #[serde(default)]
    pub aws_account_id: String,
    /// AWS region used in ARNs and queue URLs.
    #[serde(default = "default_region")]
    pub aws_region: String,
    /// Deployment/environment tag, the first segment of every resource name.
    pub instance: String,
    /// Identity of the owning service.
    pub publisher: String,
    /// Schema version for messages built from this config.
    #[serde(default = "default_version")]
    pub version: u8,
    /// Seconds an outbox row must age before a resend pass retries it.
    #[serde(default = "default_resend_timeout_secs")]
    pub resend_timeout_secs: u64,
    /// Outbox/inbox storage; `None` disables both.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_version() -> u8 {
    DEFAULT_VERSION
}

fn default_resend_timeout_secs() -> u64 {
    DEFAULT_RESEND_TIMEOUT_SECS
}

impl Config {
    /// Create a config with defaults for everything except identity.
    pub fn new(instance: impl Into<String>, publisher: impl Into<String>) -> Self {
        Self {
            log_level: default_log_level(),
            aws_account_id: String::new(),
            aws_region: default_region(),
            instance: instance.into(),
            publisher: publisher.into(),
            version: DEFAULT_VERSION,
            resend_timeout_secs: DEFAULT_RESEND_TIMEOUT_SECS,
            storage: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        self.aws_account_id = account_id.into();
        self.aws_region = region.into();
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_resend_timeout(mut self, timeout: Duration) -> Self {
        self.resend_timeout_secs = timeout.as_secs();
        self
    }

    /// Load configuration from a file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override configuration from `LARIAT_*` environment variables.
    pub fn load_from_env(&mut self) -> CoreResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LARIAT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(account_id) = lookup("LARIAT_AWS_ACCOUNT_ID") {
            self.aws_account_id = account_id;
        }
        if let Some(region) = lookup("LARIAT_AWS_REGION") {
            self.aws_region = region;
        }
        if let Some(instance) = lookup("LARIAT_INSTANCE") {
            self.instance = instance;
        }
        if let Some(publisher) = lookup("LARIAT_PUBLISHER") {
            self.publisher = publisher;
        }
        if let Some(raw) = lookup("LARIAT_VERSION") {
            self.version = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("LARIAT_VERSION is not an integer: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("LARIAT_RESEND_TIMEOUT_SECS") {
            self.resend_timeout_secs = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("LARIAT_RESEND_TIMEOUT_SECS is not an integer: {raw}"))
            })?;
        }
        Ok(())
    }

    /// Check invariants that every component relies on.
    pub fn validate(&self) -> CoreResult<()> {
        if self.instance.trim().is_empty() {
            return Err(CoreError::Config("instance must not be empty".to_string()));
        }
        if self.publisher.trim().is_empty() {
            return Err(CoreError::Config("publisher must not be empty".to_string()));
        }
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(CoreError::Config(format!(
                "unsupported schema version {}, expected one of {:?}",
                self.version, SUPPORTED_VERSIONS
            )));
        }
        Ok(())
    }

    /// Age before an outbox row becomes eligible for resend.
    pub fn resend_timeout(&self) -> Duration {
        Duration::from_secs(self.resend_timeout_secs)
    }

    /// Whether outbox/inbox persistence is configured.
    pub fn storage_enabled(&self) -> bool {
        self.storage.is_some()
    }
}

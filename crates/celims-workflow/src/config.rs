//! Laboratory configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration, usually read from `celims.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

/// Where and how the store is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file; `None` keeps everything in memory
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

/// Workflow tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Extra attempts after a sample-code collision
    pub sample_code_retries: u32,
    /// Seed users, projects, methods and equipment into an empty database
    pub seed_reference_data: bool,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            workflow: WorkflowConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            sample_code_retries: 3,
            seed_reference_data: true,
        }
    }
}

impl DatabaseConfig {
    #[inline]
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl LabConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a database file
    #[inline]
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = Some(path.into());
        self
    }

    /// With sample-code retry budget
    #[inline]
    #[must_use]
    pub fn with_sample_code_retries(mut self, retries: u32) -> Self {
        self.workflow.sample_code_retries = retries;
        self
    }

    /// With reference data seeding on or off
    #[inline]
    #[must_use]
    pub fn with_seed_reference_data(mut self, seed: bool) -> Self {
        self.workflow.seed_reference_data = seed;
        self
    }

    /// With log filter
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Parse TOML; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`LabConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

//! Runtime settings, loaded from a TOML file.

use std::collections::BTreeSet;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use toml::de::Error as TomlError;
use tracing::info;

use crate::assignment::VehicleSource;
use crate::error::DispatchError;
use crate::model::{Category, FillThreshold};
use crate::tracking::FailurePolicy;

#[derive(thiserror::Error, Debug)]
/// Errors raised while loading the configuration.
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: TomlError,
    },
    /// A value is syntactically fine but out of range.
    #[error("invalid setting: {0}")]
    Invalid(#[from] DispatchError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Every setting of a dispatch deployment.
pub struct DispatchConfig {
    /// Backend connection.
    pub api: ApiConfig,
    /// Live vehicle tracking.
    pub tracking: TrackingConfig,
    /// Operator notices.
    pub notices: NoticeConfig,
    /// Crew assignment.
    pub assignment: AssignmentConfig,
    /// Planning form defaults.
    pub planning: PlanningConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or when the
    /// default planning threshold is above 100.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the text is not valid for this schema.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.planning.threshold()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Backend connection settings.
pub struct ApiConfig {
    /// Base URL every endpoint is resolved against.
    pub base_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_owned(),
            user_agent: "tourdispatch/0.1".to_owned(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Live tracking settings.
pub struct TrackingConfig {
    /// Delay between two position polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// What a failed poll does to the markers.
    pub on_failure: FailurePolicy,
}

impl TrackingConfig {
    /// Delay between two position polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            on_failure: FailurePolicy::Retain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Notice lifetimes.
pub struct NoticeConfig {
    /// How long a success notice stays visible, in milliseconds.
    pub success_ttl_ms: u64,
    /// How long an error notice stays visible, in milliseconds.
    pub error_ttl_ms: u64,
}

impl NoticeConfig {
    /// Success notice lifetime.
    #[must_use]
    pub fn success_ttl(&self) -> Duration {
        Duration::from_millis(self.success_ttl_ms)
    }

    /// Error notice lifetime.
    #[must_use]
    pub fn error_ttl(&self) -> Duration {
        Duration::from_millis(self.error_ttl_ms)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            success_ttl_ms: 3000,
            error_ttl_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Crew assignment settings.
pub struct AssignmentConfig {
    /// Where the displayed vehicle of an assigned tour comes from.
    pub vehicle_source: VehicleSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Defaults of the planning form.
pub struct PlanningConfig {
    /// Categories preselected on start.
    pub default_categories: BTreeSet<Category>,
    /// Fill threshold preselected on start.
    pub default_threshold: u8,
}

impl PlanningConfig {
    /// Validated default threshold.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidThreshold`] when the value is above 100.
    pub fn threshold(&self) -> Result<FillThreshold, DispatchError> {
        FillThreshold::new(self.default_threshold)
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            default_categories: BTreeSet::from([Category::Plastic]),
            default_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Log output settings.
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// File the log is written to.
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            file: PathBuf::from("tourdispatch.log"),
        }
    }
}

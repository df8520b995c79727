//! Configuration loading and typed config structures for the points daemon.
//!
//! The configuration lives in `points-config.yaml` in the working
//! directory, or wherever `POINTS_CONFIG` points. Every field has a
//! default, so a missing file is not an error. Selected values can be
//! overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `POINTS_HOST` | `server.host` |
//! | `POINTS_PORT` | `server.port` |
//! | `POINTS_DATABASE` | `storage.database` |
//! | `POINTS_BACKUP_DIR` | `storage.backup_dir` |
//! | `POINTS_SECRET_FILE` | `storage.secret_file` |

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "points-config.yaml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_VAR: &str = "POINTS_CONFIG";

/// The only hardware driver this build provides.
pub const MOCK_DRIVER: &str = "mock";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value '{value}' for {key}")]
    InvalidOverride {
        /// The environment variable.
        key: &'static str,
        /// Its value.
        value: String,
    },

    /// The configured hardware driver is not available.
    #[error("unsupported hardware driver '{0}' (available: mock)")]
    UnsupportedDriver(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level daemon configuration.
///
/// Mirrors the structure of `points-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PointsConfig {
    /// Listening address of the control API.
    #[serde(default)]
    pub server: HttpConfig,

    /// Database, backup and secret file locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Servo controller settings.
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PointsConfig {
    /// Load configuration, then apply environment overrides.
    ///
    /// The file is `POINTS_CONFIG` if set, else [`DEFAULT_CONFIG_PATH`].
    /// A missing file yields the defaults. `env` looks up environment
    /// variables; the daemon passes `std::env::var`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// if an override is malformed, or if the driver is unsupported.
    pub fn load(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = env(CONFIG_PATH_VAR)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a YAML file, without overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, without overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Replace values with those set in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `POINTS_PORT` is not a
    /// port number.
    pub fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = env("POINTS_HOST") {
            self.server.host = val;
        }
        if let Some(val) = env("POINTS_PORT") {
            self.server.port = val
                .trim()
                .parse()
                .map_err(|_e: std::num::ParseIntError| ConfigError::InvalidOverride {
                    key: "POINTS_PORT",
                    value: val.clone(),
                })?;
        }
        if let Some(val) = env("POINTS_DATABASE") {
            self.storage.database = PathBuf::from(val);
        }
        if let Some(val) = env("POINTS_BACKUP_DIR") {
            self.storage.backup_dir = PathBuf::from(val);
        }
        if let Some(val) = env("POINTS_SECRET_FILE") {
            self.storage.secret_file = PathBuf::from(val);
        }
        Ok(())
    }

    /// Reject settings this build cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedDriver`] for any driver but `mock`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hardware.driver == MOCK_DRIVER {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedDriver(self.hardware.driver.clone()))
        }
    }
}

/// Control API listening address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Snapshot of the live collection.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Directory holding backups. Must exist at startup.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// File whose first line is the shared API secret.
    #[serde(default = "default_secret_file")]
    pub secret_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            backup_dir: default_backup_dir(),
            secret_file: default_secret_file(),
        }
    }
}

/// Servo controller settings.
///
/// `i2c_address` and `pwm_frequency_hz` describe the physical controller
/// and are reported at startup; the mock driver does not use them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HardwareConfig {
    /// Driver name.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Bus address of the PWM controller.
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,

    /// PWM frequency in hertz.
    #[serde(default = "default_pwm_frequency_hz")]
    pub pwm_frequency_hz: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            i2c_address: default_i2c_address(),
            pwm_frequency_hz: default_pwm_frequency_hz(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

fn default_database() -> PathBuf {
    PathBuf::from("points.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_secret_file() -> PathBuf {
    PathBuf::from("secret.txt")
}

fn default_driver() -> String {
    MOCK_DRIVER.to_owned()
}

const fn default_i2c_address() -> u8 {
    0x40
}

const fn default_pwm_frequency_hz() -> u32 {
    50
}

fn default_log_level() -> String {
    "info".to_owned()
}

//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file. Every field has a built-in
//! default, so a missing or partial file never prevents startup.
//!
//! # Resolution order
//! 1. Command-line arguments (applied by the binary, highest priority)
//! 2. Environment variables (`FIINNY_ORACLE_URL`, `FIINNY_DATABASE_PATH`,
//!    `FIINNY_BIND`, `FIINNY_LOG_LEVEL`)
//! 3. TOML config file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FIINNY_CONFIG";
pub const ORACLE_URL_ENV: &str = "FIINNY_ORACLE_URL";
pub const DATABASE_PATH_ENV: &str = "FIINNY_DATABASE_PATH";
pub const BIND_ENV: &str = "FIINNY_BIND";
pub const LOG_LEVEL_ENV: &str = "FIINNY_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// SQLite database file (optional, defaults under the platform data dir)
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP trigger surface
    pub server: ServerConfig,

    /// Classification oracle
    pub oracle: OracleConfig,

    /// Job processing policy
    pub pipeline: PipelineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

/// Classification oracle configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Oracle endpoint; `None` runs the pipeline on keyword heuristics only
    pub endpoint: Option<String>,

    /// Hard deadline for one oracle call
    pub timeout_secs: u64,

    /// Locale sent with every request
    pub locale: String,

    /// Treat timeouts and transport failures as a degraded (heuristic)
    /// result instead of a retryable failure
    pub degrade_on_unreachable: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
            locale: "en-IN".to_string(),
            degrade_on_unreachable: false,
        }
    }
}

/// Job processing policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Failed attempts after which a job is marked `failed`
    pub max_retries: u32,

    /// Currency assumed when a job carries none
    pub default_currency: String,

    /// Channel assumed when a job carries none
    pub default_channel: String,

    /// Merchant names passed to the oracle as hints
    pub known_merchants: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_currency: "INR".to_string(),
            default_channel: "sms".to_string(),
            known_merchants: ["Zomato", "Blinkit", "Swiggy", "Zepto", "Amazon", "Flipkart"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the documented resolution order
    ///
    /// An explicitly named file that cannot be read is an error. A missing
    /// default-location file only logs a warning and falls back to defaults.
    /// Environment overrides are applied and the result validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    info!(path = %path.display(), "Loading configuration");
                    Self::from_file(&path)?
                }
                _ => {
                    warn!("No configuration file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `FIINNY_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ORACLE_URL_ENV) {
            self.oracle.endpoint = Some(url);
        }
        if let Some(path) = non_empty_env(DATABASE_PATH_ENV) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(bind) = non_empty_env(BIND_ENV) {
            self.server.bind = bind;
        }
        if let Some(level) = non_empty_env(LOG_LEVEL_ENV) {
            self.logging.level = level;
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oracle.timeout_secs == 0 {
            return Err(Error::Config("oracle.timeout_secs must be > 0".to_string()));
        }
        if self.pipeline.max_retries == 0 {
            return Err(Error::Config("pipeline.max_retries must be >= 1".to_string()));
        }
        if self.pipeline.default_currency.trim().is_empty() {
            return Err(Error::Config(
                "pipeline.default_currency must not be empty".to_string(),
            ));
        }
        if let Some(endpoint) = &self.oracle.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "oracle.endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }
        Ok(())
    }

    /// Database file, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Default config file location (`<config dir>/fiinny/ingest.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fiinny").join("ingest.toml"))
}

/// Default database location (`<data dir>/fiinny/ingest.db`)
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("fiinny"))
        .unwrap_or_else(|| PathBuf::from("./fiinny_data"))
        .join("ingest.db")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

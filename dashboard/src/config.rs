//! Dashboard configuration file support.
//!
//! Configuration is read from a TOML file and can be overridden from the
//! environment. Every field has a default, so an empty file (or no file at
//! all) yields a working local setup pointing at `http://localhost:5001`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("No dashboard.toml found in standard locations")]
    NotFound,
}

/// Complete dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Statistical backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// `"http"` for the real backend, `"local"` for the in-memory one.
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Debounce settings for the map-only channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Analysis defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    /// Treatment column picked after discovery when none is selected.
    #[serde(default)]
    pub default_treatment: Option<String>,
    /// Control variable picked after discovery when none is selected.
    #[serde(default)]
    pub default_control: Option<String>,
}

/// Session API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_backend_kind() -> String {
    "http".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_settle_ms() -> u64 {
    300
}

fn default_histogram_bins() -> usize {
    40
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

impl SchedulerSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            histogram_bins: default_histogram_bins(),
            default_treatment: None,
            default_control: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DashboardConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(DashboardConfig)` if successful
    /// * `Err(ConfigError)` if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `dashboard.toml` in:
    /// 1. Current directory
    /// 2. `dashboard/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("dashboard.toml"),
            PathBuf::from("dashboard/dashboard.toml"),
            PathBuf::from("../dashboard.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ConfigError::NotFound)
    }

    /// Default-location config if present, built-in defaults otherwise.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::from_default_location() {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply overrides from `DASHBOARD_BACKEND`, `BACKEND_URL`, `HOST`,
    /// `PORT` and `DASHBOARD_SETTLE_MS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(kind) = std::env::var("DASHBOARD_BACKEND") {
            if !kind.trim().is_empty() {
                self.backend.kind = kind.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend.url = url;
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Ok(settle) = std::env::var("DASHBOARD_SETTLE_MS") {
            self.scheduler.settle_ms =
                settle.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "DASHBOARD_SETTLE_MS".to_string(),
                    value: settle.clone(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: DashboardConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend.url, "http://localhost:5001");
        assert_eq!(config.backend.kind, "http");
        assert_eq!(config.scheduler.settle_ms, 300);
        assert_eq!(config.analysis.histogram_bins, 40);
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[backend]
url = "http://stats.internal:5001"
timeout_secs = 30
max_retries = 5
retry_delay_ms = 250

[scheduler]
settle_ms = 150

[analysis]
histogram_bins = 20
default_treatment = "lawA"

[server]
host = "127.0.0.1"
port = 9000
"#;

        let config: DashboardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.url, "http://stats.internal:5001");
        assert_eq!(config.backend.max_retries, 5);
        assert_eq!(config.scheduler.settle(), Duration::from_millis(150));
        assert_eq!(config.analysis.default_treatment.as_deref(), Some("lawA"));
        assert_eq!(config.analysis.default_control, None);
        assert_eq!(config.server.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nsettle_ms = 500").unwrap();

        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.settle_ms, 500);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nsettle_ms = \"soon\"").unwrap();

        let err = DashboardConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DashboardConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

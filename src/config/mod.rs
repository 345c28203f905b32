//! Configuration management for registry-scan-gate
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// Prefix shared by every environment variable read by `from_env`
pub const ENV_PREFIX: &str = "REGISTRY_SCAN_GATE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Listener/upstream pairs, one proxy per entry
    #[serde(default)]
    pub entrypoints: Vec<EntrypointConfig>,

    /// Scanner configuration
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Upstream client configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix REGISTRY_SCAN_GATE_
    ///
    /// `REGISTRY_SCAN_GATE_ENTRYPOINTS=hub,internal` enumerates entrypoint keys;
    /// each key then reads `REGISTRY_SCAN_GATE_ENTRYPOINT_<KEY>_ADDRESS`,
    /// `..._UPSTREAM_URL` and the optional `..._REGISTRY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|v| !v.trim().is_empty())
        };

        let mut config = Config::default();

        let keys = var("ENTRYPOINTS").unwrap_or_default();
        for name in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let prefix = format!("ENTRYPOINT_{}", env_key(name));
            let address = var(&format!("{}_ADDRESS", prefix)).ok_or_else(|| {
                ConfigError::MissingRequired(format!("{}{}_ADDRESS", ENV_PREFIX, prefix))
            })?;
            let upstream_url = var(&format!("{}_UPSTREAM_URL", prefix)).ok_or_else(|| {
                ConfigError::MissingRequired(format!("{}{}_UPSTREAM_URL", ENV_PREFIX, prefix))
            })?;

            config.entrypoints.push(EntrypointConfig {
                name: name.to_string(),
                address,
                upstream_url,
                registry: var(&format!("{}_REGISTRY", prefix)),
            });
        }

        // Scanner config from env
        if let Some(path) = var("TRIVY_PATH") {
            config.scanner.trivy_path = path;
        }
        if let Some(cache_dir) = var("TRIVY_CACHE_DIR") {
            config.scanner.cache_dir = Some(cache_dir);
        }

        // Upstream config from env
        if let Some(timeout) = var("UPSTREAM_CONNECT_TIMEOUT_SECS") {
            config.upstream.connect_timeout_secs = timeout.parse().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{}UPSTREAM_CONNECT_TIMEOUT_SECS: {}",
                    ENV_PREFIX, timeout
                ))
            })?;
        }

        // Logging config from env
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the entrypoint collection
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entrypoints.is_empty() {
            return Err(ConfigError::MissingRequired("entrypoints".to_string()));
        }

        let mut names = HashSet::new();
        for entrypoint in &self.entrypoints {
            entrypoint.validate()?;
            if !names.insert(entrypoint.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate entrypoint name: {}",
                    entrypoint.name
                )));
            }
        }
        Ok(())
    }
}

/// Upper-case an entrypoint key for use in a variable name
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// One listener fronting one upstream registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntrypointConfig {
    /// Entrypoint name used in logs
    pub name: String,

    /// Listen address (`host:port`, or `:port` for all interfaces)
    pub address: String,

    /// Upstream registry base URL
    pub upstream_url: String,

    /// Registry host used in scan targets (defaults to the upstream host)
    #[serde(default)]
    pub registry: Option<String>,
}

impl EntrypointConfig {
    /// Socket address to bind
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = self.address.trim();
        let address = if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_string()
        };
        address.parse().map_err(|_| {
            ConfigError::InvalidValue(format!(
                "entrypoint {}: invalid address {}",
                self.name, self.address
            ))
        })
    }

    /// Registry host the scanner resolves images against
    pub fn scan_registry(&self) -> String {
        if let Some(ref registry) = self.registry {
            return registry.trim_end_matches('/').to_string();
        }
        reqwest::Url::parse(&self.upstream_url)
            .ok()
            .and_then(|url| {
                url.host_str().map(|host| match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                })
            })
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("entrypoints.name".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "entrypoints.{}.address",
                self.name
            )));
        }
        if self.upstream_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "entrypoints.{}.upstream_url",
                self.name
            )));
        }

        self.listen_addr()?;

        let url = reqwest::Url::parse(&self.upstream_url).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "entrypoint {}: invalid upstream URL {}: {}",
                self.name, self.upstream_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "entrypoint {}: upstream URL must be http(s) with a host: {}",
                self.name, self.upstream_url
            )));
        }
        Ok(())
    }
}

/// Vulnerability scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerConfig {
    /// Path to the trivy binary
    #[serde(default = "default_trivy_path")]
    pub trivy_path: String,

    /// Trivy cache directory
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Extra arguments passed to `trivy image`
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            trivy_path: default_trivy_path(),
            cache_dir: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_trivy_path() -> String {
    "trivy".to_string()
}

/// Upstream HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `text`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

//! Configuration management for vsphere-collector
//!
//! Handles loading and validating configuration from YAML files.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Inventory gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Collection settings for the vCenter instance
    #[serde(default)]
    pub check: CheckConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Inventory gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the JSON gateway in front of the vCenter API
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Instance name, reported as `vcenter_server:<name>`
    #[serde(default = "default_instance_name")]
    pub name: String,

    /// Extra tags attached to every emitted metric
    #[serde(default)]
    pub tags: Vec<String>,

    /// Include/exclude rules deciding which objects are collected
    #[serde(default)]
    pub resource_filters: Vec<RawResourceFilter>,

    /// Resource type to regexes excluding matching counter names
    #[serde(default)]
    pub metric_filters: HashMap<String, Vec<String>>,

    /// Resource type to regexes enabling per-instance collection
    #[serde(default)]
    pub collect_per_instance_filters: HashMap<String, Vec<String>>,

    /// Tag keys kept out of external host tags and attached to metrics instead
    #[serde(default)]
    pub excluded_host_tags: Vec<String>,

    /// Report VMs under their in-guest hostname when available
    #[serde(default)]
    pub use_guest_hostname: bool,

    /// Counter catalogue level (1-4)
    #[serde(default = "default_collection_level")]
    pub collection_level: u8,

    /// Prefix applied to hierarchy tag keys
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Also collect datastores, datacenters and clusters
    #[serde(default)]
    pub collect_historical: bool,
}

/// Resource filter definition as written in the config file
///
/// Every field is optional here; [`crate::check::filters`] turns these into
/// validated filters and drops the ones that are incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResourceFilter {
    pub resource: Option<String>,
    pub property: Option<String>,
    #[serde(rename = "type")]
    pub filter_type: Option<String>,
    pub patterns: Option<Vec<String>>,
}

// Default value functions
fn default_port() -> u16 {
    9651
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8989/api".to_string()
}

fn default_timeout() -> u64 {
    10000
}

fn default_instance_name() -> String {
    "vcenter".to_string()
}

fn default_collection_level() -> u8 {
    1
}

fn default_tag_prefix() -> String {
    "vsphere_".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_metrics_path(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            timeout_ms: default_timeout(),
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            tags: Vec::new(),
            resource_filters: Vec::new(),
            metric_filters: HashMap::new(),
            collect_per_instance_filters: HashMap::new(),
            excluded_host_tags: Vec::new(),
            use_guest_hostname: false,
            collection_level: default_collection_level(),
            tag_prefix: default_tag_prefix(),
            collect_historical: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    /// Use `Config::load_or_default()` if you want fallback to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to defaults if not found
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Validate the configuration
    ///
    /// Only structural problems are fatal here. Bad filter definitions are
    /// reported and dropped when the check is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "Metrics path must start with '/'".to_string(),
            ));
        }

        if matches!(self.server.path.as_str(), "/" | "/health" | "/external_tags") {
            return Err(ConfigError::ValidationError(format!(
                "Metrics path '{}' conflicts with a built-in endpoint",
                self.server.path
            )));
        }

        let url = url::Url::parse(&self.gateway.url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid gateway url '{}': {}",
                self.gateway.url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "Gateway url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.gateway.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Gateway timeout must be greater than 0".to_string(),
            ));
        }

        if !(1..=4).contains(&self.check.collection_level) {
            return Err(ConfigError::ValidationError(format!(
                "collection_level must be between 1 and 4, got {}",
                self.check.collection_level
            )));
        }

        if self.check.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Instance name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

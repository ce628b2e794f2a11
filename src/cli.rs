//! CLI argument parsing for vsphere-collector
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: VSPHERE_CONFIG)
//! - `--port` / `-p`: Server port (env: VSPHERE_PORT)
//! - `--bind-address`: Server bind address (env: VSPHERE_BIND_ADDRESS)
//! - `--metrics-path`: Metrics endpoint path (env: VSPHERE_METRICS_PATH)
//! - `--gateway-url`: Inventory gateway URL (env: VSPHERE_GATEWAY_URL)
//! - `--gateway-timeout`: Gateway timeout in milliseconds (env: VSPHERE_GATEWAY_TIMEOUT)
//! - `--validate`: Validate configuration and filters, then exit
//! - `--dry-run`: Show the active collection plan, then exit
//! - `--once`: Run a single collection cycle and print the result
//! - `--log-level` / `-l`: Log level (env: VSPHERE_LOG_LEVEL)
//! - `--log-format`: Log output format, text or json (env: VSPHERE_LOG_FORMAT)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//!
//! CLI arguments take precedence over environment variables, which take
//! precedence over the configuration file.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// vsphere-collector - vSphere inventory and performance metrics collector
///
/// Discovers vCenter objects, applies resource filters, resolves hierarchy
/// tags and exports the latest performance samples in Prometheus format.
#[derive(Parser, Debug)]
#[command(name = "vsphere-collector")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "VSPHERE_CONFIG"
    )]
    pub config: PathBuf,

    /// Server port (overrides config file)
    #[arg(short, long, value_name = "PORT", env = "VSPHERE_PORT")]
    pub port: Option<u16>,

    /// Server bind address (overrides config file)
    /// Supported values: IP addresses (0.0.0.0, 127.0.0.1, ::1) or "localhost"
    #[arg(long, value_name = "ADDRESS", env = "VSPHERE_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Metrics endpoint path (overrides config file)
    #[arg(long, value_name = "PATH", env = "VSPHERE_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// Inventory gateway URL (overrides config file)
    #[arg(long, value_name = "URL", env = "VSPHERE_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Gateway HTTP timeout in milliseconds (overrides config file)
    #[arg(long, value_name = "MS", env = "VSPHERE_GATEWAY_TIMEOUT")]
    pub gateway_timeout: Option<u64>,

    /// Validate configuration and resource filters, then exit
    #[arg(long)]
    pub validate: bool,

    /// Show the active collection plan, then exit
    #[arg(long, conflicts_with = "once")]
    pub dry_run: bool,

    /// Run a single collection cycle and print the metrics
    #[arg(long)]
    pub once: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "VSPHERE_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "VSPHERE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log line format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["vsphere-collector"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.port, None);
        assert_eq!(cli.gateway_url, None);
        assert_eq!(cli.gateway_timeout, None);
        assert!(!cli.validate);
        assert!(!cli.dry_run);
        assert!(!cli.once);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert_eq!(cli.output_format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_with_options() {
        let cli = Cli::parse_from([
            "vsphere-collector",
            "-c",
            "vc.yaml",
            "-p",
            "9000",
            "--gateway-url",
            "http://gw:8989/api",
            "--gateway-timeout",
            "2500",
            "--log-format",
            "json",
            "--once",
        ]);
        assert_eq!(cli.config, PathBuf::from("vc.yaml"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.gateway_url.as_deref(), Some("http://gw:8989/api"));
        assert_eq!(cli.gateway_timeout, Some(2500));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.once);
    }

    #[test]
    fn test_cli_dry_run_conflicts_with_once() {
        assert!(Cli::try_parse_from(["vsphere-collector", "--dry-run", "--once"]).is_err());

        let cli = Cli::parse_from(["vsphere-collector", "--dry-run", "--output-format", "yaml"]);
        assert!(cli.dry_run);
        assert_eq!(cli.output_format, OutputFormat::Yaml);
    }
}

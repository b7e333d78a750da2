//! Configuration management for the Wayfinder launcher
//!
//! Sources, lowest precedence first:
//!
//! 1. `conf/wayfinder.yml` (or `--config <path>`), optional
//! 2. `WAYFINDER_*` environment variables, `__` separating nested keys
//!    (e.g. `WAYFINDER_DISCOVERY__NAME`, `WAYFINDER_LOGGING__LEVEL`)
//! 3. command line flags

use anyhow::Context;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use wayfinder_discovery::{BridgeOptions, DiscoveryOptions};

pub const DEFAULT_CONFIG_PATH: &str = "conf/wayfinder.yml";
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "wayfinder-server", version, about = "Standalone service discovery registry")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    /// Catalog file to bridge into the registry
    #[arg(long = "catalog", env = "WAYFINDER_CATALOG")]
    pub catalog: Option<String>,
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
    #[arg(long = "log-dir")]
    pub log_dir: Option<String>,
}

/// Logging section of the configuration file
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingSettings {
    /// Log directory; `~/wayfinder/logs` when unset
    pub dir: Option<String>,
    pub console: bool,
    pub file: bool,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            console: true,
            file: false,
            level: "info".to_string(),
        }
    }
}

/// Launcher configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub discovery: DiscoveryOptions,
    /// Options of the catalog bridge
    pub bridge: BridgeOptions,
    /// Catalog file; no bridge is started when unset
    pub catalog: Option<String>,
    pub logging: LoggingSettings,
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryOptions::default(),
            bridge: BridgeOptions::default(),
            catalog: None,
            logging: LoggingSettings::default(),
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Parse the command line and load the layered configuration
    pub fn from_args() -> anyhow::Result<Self> {
        Self::load(&Cli::parse())
    }

    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&cli.config).required(false))
            .add_source(
                Environment::with_prefix("WAYFINDER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(catalog) = &cli.catalog {
            builder = builder.set_override("catalog", catalog.as_str())?;
        }
        if let Some(level) = &cli.log_level {
            builder = builder.set_override("logging.level", level.as_str())?;
        }
        if let Some(dir) = &cli.log_dir {
            builder = builder.set_override("logging.dir", dir.as_str())?;
        }

        let config: ServerConfig = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", cli.config))?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.bridge.validate()?;
        if config.catalog.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("catalog path must not be empty");
        }
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wayfinder_discovery::BackendOptions;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn cli_for(path: &str) -> Cli {
        Cli {
            config: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load(&cli_for("/nonexistent/wayfinder.yml")).unwrap();
        assert_eq!(config.discovery, DiscoveryOptions::default());
        assert_eq!(config.bridge, BridgeOptions::default());
        assert_eq!(config.shutdown_timeout_ms, DEFAULT_SHUTDOWN_TIMEOUT_MS);
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
discovery:
  name: node-7
  usage-topic: ""
  backend:
    kind: file
    dir: /var/lib/wayfinder
bridge:
  poll-interval-ms: 500
  retract-on-stop: true
catalog: conf/catalog.yml
logging:
  level: debug
  file: true
"#,
        );
        let config = ServerConfig::load(&cli_for(file.path().to_str().unwrap())).unwrap();

        assert_eq!(config.discovery.name, "node-7");
        assert_eq!(
            config.discovery.backend,
            BackendOptions::File {
                dir: "/var/lib/wayfinder".to_string()
            }
        );
        assert_eq!(config.bridge.poll_interval_ms, 500);
        assert!(config.bridge.retract_on_stop);
        assert_eq!(config.catalog.as_deref(), Some("conf/catalog.yml"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.file);
        assert!(config.logging.console);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config("catalog: a.yml\nlogging:\n  level: warn\n");
        let cli = Cli {
            config: file.path().to_str().unwrap().to_string(),
            catalog: Some("b.yml".to_string()),
            log_level: Some("trace".to_string()),
            log_dir: Some("/tmp/wayfinder-logs".to_string()),
        };
        let config = ServerConfig::load(&cli).unwrap();

        assert_eq!(config.catalog.as_deref(), Some("b.yml"));
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.dir.as_deref(), Some("/tmp/wayfinder-logs"));
    }

    #[test]
    fn test_invalid_bridge_options_rejected() {
        let file = write_config("bridge:\n  fetch-timeout-ms: 0\n");
        let err = ServerConfig::load(&cli_for(file.path().to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("fetch-timeout-ms"));
    }
}

//! File-based logging with per-component log files.
//!
//! | Log File         | Component                    | Target Prefixes                                   |
//! |------------------|------------------------------|---------------------------------------------------|
//! | wayfinder.log    | Root logger (all components) | (all)                                             |
//! | registry.log     | Registry and backends        | wayfinder_discovery::registry, ::backend          |
//! | reference.log    | Bindings and service objects | wayfinder_discovery::reference, ::service_type    |
//! | bridge.log       | Bridges and catalog sources  | wayfinder_discovery::bridge, wayfinder_server::catalog |
//!
//! Log files are stored in `~/wayfinder/logs` by default.
//! Override with `WAYFINDER_LOG_DIR` or `logging.dir` in the configuration file.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LoggingSettings;

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

/// Each entry produces a separate rolling log file, routed by `tracing`
/// target. The root `wayfinder.log` file always captures every event.
const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "registry.log",
        targets: &[
            "wayfinder_discovery::registry",
            "wayfinder_discovery::backend",
            "wayfinder_discovery::discovery",
        ],
    },
    ComponentLogDef {
        file_name: "reference.log",
        targets: &[
            "wayfinder_discovery::reference",
            "wayfinder_discovery::service_type",
        ],
    },
    ComponentLogDef {
        file_name: "bridge.log",
        targets: &["wayfinder_discovery::bridge", "wayfinder_server::catalog"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

fn default_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WAYFINDER_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/wayfinder/logs", home))
}

/// Logging configuration for the launcher.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from the `logging` section of the configuration.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let log_dir = settings
            .dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);
        let level = settings.level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output: settings.console,
            console_level: level,
            file_logging: settings.file,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }
}

/// Keeps the non-blocking file writers alive.
///
/// Dropping it flushes buffered log output, so hold it until `main` returns.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize console output, the root log file and the component log files.
///
/// `RUST_LOG` takes precedence over the configured level for the console
/// and root file layers. Component files capture everything from their
/// targets.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "wayfinder.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: wayfinder.log (root) + {} component log files",
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_settings() {
        let settings = LoggingSettings {
            dir: Some("/tmp/test-logs".to_string()),
            console: false,
            file: true,
            level: "debug".to_string(),
        };
        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/test-logs"));
        assert!(!config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_unparseable_level_falls_back_to_info() {
        let settings = LoggingSettings {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(LoggingConfig::from_settings(&settings).console_level, Level::INFO);
    }

    #[test]
    fn test_log_rotation_conversion() {
        assert!(matches!(Rotation::from(LogRotation::Daily), Rotation::DAILY));
        assert!(matches!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY));
        assert!(matches!(Rotation::from(LogRotation::Never), Rotation::NEVER));
    }

    #[test]
    fn test_component_targets_are_crate_paths() {
        for component in COMPONENT_LOGS {
            assert!(component.file_name.ends_with(".log"));
            assert!(!component.targets.is_empty());
            for target in component.targets {
                assert!(target.starts_with("wayfinder_"), "unexpected target {}", target);
            }
        }
    }
}

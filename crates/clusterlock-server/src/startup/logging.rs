//! File-based logging.
//!
//! Besides the console, events are written to a root log file and to a few
//! component files with daily rotation:
//!
//! | Log File          | Component                         | Target Prefixes           |
//! |-------------------|-----------------------------------|---------------------------|
//! | clusterlock.log   | Root logger (all components)      | (all)                     |
//! | lock.log          | Acquisition, heartbeat, manager   | clusterlock_core          |
//! | persistence.log   | Lock table access                 | clusterlock_persistence   |
//! | job.log           | Protected command                 | clusterlock_server::job   |
//!
//! Log files are stored in `~/clusterlock/logs` by default.
//! Override with `CLUSTERLOCK_LOG_DIR` or the `clusterlock.logs.path` config key.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Root log file name
pub const ROOT_LOG_FILE: &str = "clusterlock.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["clusterlock_core"],
    },
    ComponentLogDef {
        file_name: "persistence.log",
        targets: &["clusterlock_persistence", "sea_orm", "sqlx"],
    },
    ComponentLogDef {
        file_name: "job.log",
        targets: &["clusterlock_server::job"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// Rotate daily (default)
    Daily,
    Hourly,
    /// Never rotate (single file)
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

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown log rotation '{}'", other)),
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/clusterlock/logs", home))
}

/// Logging configuration for the binary.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/clusterlock/logs`)
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
            file_logging: true,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration.
    ///
    /// `CLUSTERLOCK_LOG_DIR` wins over the configured directory.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
        rotation: LogRotation,
    ) -> Self {
        let log_dir = std::env::var("CLUSTERLOCK_LOG_DIR")
            .ok()
            .or(log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation,
        }
    }
}

/// Guard that keeps the file writers alive.
///
/// Buffered output is flushed when it is dropped, so it must live until the
/// process exits.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    /// Number of file writers held by the guard
    pub fn file_count(&self) -> usize {
        self._file_guards.len()
    }
}

fn file_layers(
    config: &LoggingConfig,
    guards: &mut Vec<WorkerGuard>,
) -> std::io::Result<Vec<Box<dyn Layer<Registry> + Send + Sync>>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let root_appender =
        RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
    let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
    guards.push(root_guard);

    let root_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
    layers.push(Box::new(
        fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter),
    ));

    for component in COMPONENT_LOGS {
        let appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, component.file_name);
        let (nb, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);

        // Component files take everything at or above the file level from their targets
        let level: LevelFilter = config.file_level.into();
        let targets = component
            .targets
            .iter()
            .fold(Targets::new(), |targets, target| {
                targets.with_target(*target, level)
            });

        layers.push(Box::new(
            fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets),
        ));
    }

    Ok(layers)
}

/// Initialize console and file logging.
///
/// `RUST_LOG` overrides the configured level for the console and the root
/// file. Component files route events by target prefix.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        layers.push(Box::new(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_filter(filter),
        ));
    }

    if config.file_logging {
        layers.extend(file_layers(config, &mut guards)?);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
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
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.console_level, Level::INFO);
        assert_eq!(config.rotation, LogRotation::Daily);
        assert!(config.log_dir.ends_with("clusterlock/logs"));
    }

    #[test]
    fn test_logging_config_from_config() {
        let config = LoggingConfig::from_config(
            Some("/tmp/test-logs".to_string()),
            false,
            true,
            "debug".to_string(),
            LogRotation::Never,
        );
        if std::env::var("CLUSTERLOCK_LOG_DIR").is_err() {
            assert_eq!(config.log_dir, PathBuf::from("/tmp/test-logs"));
        }
        assert!(!config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.file_level, Level::DEBUG);
        assert_eq!(config.rotation, LogRotation::Never);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config =
            LoggingConfig::from_config(None, true, false, "loud".to_string(), LogRotation::Daily);
        assert_eq!(config.console_level, Level::INFO);
    }

    #[test]
    fn test_log_rotation_parse() {
        assert_eq!("daily".parse::<LogRotation>().unwrap(), LogRotation::Daily);
        assert_eq!("HOURLY".parse::<LogRotation>().unwrap(), LogRotation::Hourly);
        assert_eq!("never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_component_log_definitions() {
        for component in COMPONENT_LOGS {
            assert!(component.file_name.ends_with(".log"));
            assert!(!component.targets.is_empty());
            assert_ne!(component.file_name, ROOT_LOG_FILE);
        }
    }

    #[test]
    fn test_file_layers_create_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: dir.path().join("nested").join("logs"),
            rotation: LogRotation::Never,
            ..LoggingConfig::default()
        };

        let mut guards = Vec::new();
        let layers = file_layers(&config, &mut guards).unwrap();

        assert!(config.log_dir.is_dir());
        assert_eq!(layers.len(), COMPONENT_LOGS.len() + 1);
        assert_eq!(guards.len(), COMPONENT_LOGS.len() + 1);
    }
}

//! Configuration management for the clusterlock binary
//!
//! Sources, lowest precedence first: `conf/application.yml` (optional),
//! `CLUSTERLOCK`-prefixed environment variables, command line flags.

use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use clusterlock_common::{
    ClusterLockError, DEFAULT_ERROR_CHANNEL_CAPACITY, DEFAULT_HEARTBEAT_MAX_FAILURES,
    DEFAULT_LOCK_DATABASE, DEFAULT_LOCK_TABLE, local_ip,
};
use clusterlock_core::{
    IntervalClass, LeasePolicy, LeasePolicyTable, LockManagerOptions, RetryPolicy, lock_space,
};
use clusterlock_persistence::StorageMode;

use super::constants::*;
use crate::startup::{LogRotation, LoggingConfig};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "clusterlock", about = "Run a command while holding a cluster-wide lock")]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,
    /// Lock name
    #[arg(short = 'n', long = "name")]
    name: Option<String>,
    /// Interval class (short or medium)
    #[arg(long = "class")]
    class: Option<String>,
    /// Owner identity written into the lock table
    #[arg(long = "identity")]
    identity: Option<String>,
    /// Storage backend (memory or external_db)
    #[arg(short = 's', long = "storage")]
    storage: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Command to run while the lock is held
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

fn config_error(e: impl std::fmt::Display) -> ClusterLockError {
    ClusterLockError::ConfigError(e.to_string())
}

impl Configuration {
    /// Load from the process arguments; exits with usage on bad flags.
    pub fn new() -> Result<Self, ClusterLockError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_args<I, T>(args: I) -> Result<Self, ClusterLockError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(config_error)?;
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Self, ClusterLockError> {
        let mut builder = Config::builder()
            .add_source(config::File::with_name(&cli.config_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(".")
                    .try_parsing(true),
            );

        let overrides = [
            (JOB_NAME, cli.name),
            (JOB_CLASS, cli.class),
            (IDENTITY, cli.identity),
            (STORAGE_MODE, cli.storage),
            (DB_URL, cli.database_url),
        ];
        for (key, value) in overrides {
            if let Some(v) = value {
                builder = builder.set_override(key, v).map_err(config_error)?;
            }
        }
        if !cli.command.is_empty() {
            builder = builder
                .set_override(JOB_COMMAND, cli.command)
                .map_err(config_error)?;
        }

        let config = builder.build().map_err(config_error)?;
        Ok(Configuration { config })
    }

    fn get_u64(&self, key: &str, default: u64) -> Result<u64, ClusterLockError> {
        match self.config.get_int(key) {
            Ok(v) => u64::try_from(v)
                .map_err(|_| config_error(format!("{} must not be negative, got {}", key, v))),
            Err(config::ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(config_error(e)),
        }
    }

    // ========================================================================
    // Node and Job
    // ========================================================================

    /// Owner identity, defaulting to the first non-loopback IPv4 address
    pub fn identity(&self) -> String {
        self.config
            .get_string(IDENTITY)
            .unwrap_or_else(|_| local_ip())
    }

    /// Storage backend; must be set explicitly
    ///
    /// A memory store is private to one process, so falling back to it would
    /// let every node believe it holds the lock.
    pub fn storage_mode(&self) -> Result<StorageMode, ClusterLockError> {
        match self.config.get_string(STORAGE_MODE) {
            Ok(v) => v.parse().map_err(config_error),
            Err(_) => Err(config_error(format!(
                "{} is required (--storage external_db, or memory for a single process)",
                STORAGE_MODE
            ))),
        }
    }

    pub fn lock_name(&self) -> Result<String, ClusterLockError> {
        self.config
            .get_string(JOB_NAME)
            .map_err(|_| config_error(format!("lock name is required (--name or {})", JOB_NAME)))
    }

    pub fn lock_class(&self) -> Result<IntervalClass, ClusterLockError> {
        match self.config.get_string(JOB_CLASS) {
            Ok(v) => v.parse().map_err(config_error),
            Err(_) => Ok(IntervalClass::Short),
        }
    }

    /// Program and arguments of the protected command
    pub fn job_command(&self) -> Result<Vec<String>, ClusterLockError> {
        let command = self
            .config
            .get::<Vec<String>>(JOB_COMMAND)
            .unwrap_or_default();
        if command.is_empty() {
            return Err(config_error(format!(
                "no command given (trailing arguments or {})",
                JOB_COMMAND
            )));
        }
        Ok(command)
    }

    // ========================================================================
    // Lock Manager
    // ========================================================================

    pub fn lock_database(&self) -> String {
        self.config
            .get_string(LOCK_DATABASE)
            .unwrap_or(DEFAULT_LOCK_DATABASE.to_string())
    }

    pub fn lock_table(&self) -> String {
        self.config
            .get_string(LOCK_TABLE)
            .unwrap_or(DEFAULT_LOCK_TABLE.to_string())
    }

    pub fn heartbeat_max_failures(&self) -> Result<u32, ClusterLockError> {
        let v = self.get_u64(HEARTBEAT_MAX_FAILURES, DEFAULT_HEARTBEAT_MAX_FAILURES as u64)?;
        u32::try_from(v).map_err(config_error)
    }

    pub fn error_channel_capacity(&self) -> Result<usize, ClusterLockError> {
        let v = self.get_u64(ERROR_CHANNEL_CAPACITY, DEFAULT_ERROR_CHANNEL_CAPACITY as u64)?;
        if v == 0 {
            return Err(config_error(format!("{} must be at least 1", ERROR_CHANNEL_CAPACITY)));
        }
        usize::try_from(v).map_err(config_error)
    }

    /// How long to wait for the command to exit after cancelling it
    pub fn shutdown_timeout(&self) -> Result<Duration, ClusterLockError> {
        self.get_u64(SHUTDOWN_TIMEOUT_SECS, DEFAULT_SHUTDOWN_TIMEOUT_SECS)
            .map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ClusterLockError> {
        let strategy = self
            .config
            .get_string(RETRY_STRATEGY)
            .unwrap_or(RETRY_STRATEGY_FIXED.to_string());

        let policy = match strategy.to_ascii_lowercase().as_str() {
            RETRY_STRATEGY_FIXED => RetryPolicy::Fixed,
            RETRY_STRATEGY_EXPONENTIAL => RetryPolicy::ExponentialJitter {
                initial: Duration::from_millis(
                    self.get_u64(RETRY_INITIAL_MS, DEFAULT_RETRY_INITIAL_MS)?,
                ),
                max: Duration::from_millis(self.get_u64(RETRY_MAX_MS, DEFAULT_RETRY_MAX_MS)?),
                multiplier: self
                    .config
                    .get_float(RETRY_MULTIPLIER)
                    .unwrap_or(DEFAULT_RETRY_MULTIPLIER),
            },
            other => {
                return Err(config_error(format!(
                    "unknown retry strategy '{}', expected '{}' or '{}'",
                    other, RETRY_STRATEGY_FIXED, RETRY_STRATEGY_EXPONENTIAL
                )));
            }
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Default lease table with per-class overrides applied
    pub fn lease_policies(&self) -> Result<LeasePolicyTable, ClusterLockError> {
        let mut table = LeasePolicyTable::default();
        for class in IntervalClass::ALL {
            let current = table.get(class);
            let lease = self.get_u64(
                &interval_lease_key(class.as_str()),
                current.lease_duration.as_secs(),
            )?;
            let heartbeat = self.get_u64(
                &interval_heartbeat_key(class.as_str()),
                current.heartbeat_period.as_secs(),
            )?;
            let policy = LeasePolicy::new(Duration::from_secs(lease), Duration::from_secs(heartbeat));
            if policy != current {
                table = table.with_policy(class, policy)?;
            }
        }
        Ok(table)
    }

    pub fn lock_manager_options(&self) -> Result<LockManagerOptions, ClusterLockError> {
        Ok(LockManagerOptions::default()
            .with_identity(self.identity())
            .with_space(lock_space(&self.lock_database(), &self.lock_table()))
            .with_policies(self.lease_policies()?)
            .with_retry(self.retry_policy()?)
            .with_max_failures(self.heartbeat_max_failures()?))
    }

    // ========================================================================
    // Logging
    // ========================================================================

    pub fn logging_config(&self) -> Result<LoggingConfig, ClusterLockError> {
        let rotation = match self.config.get_string(LOGS_ROTATION) {
            Ok(v) => v.parse::<LogRotation>().map_err(config_error)?,
            Err(_) => LogRotation::Daily,
        };
        Ok(LoggingConfig::from_config(
            self.config.get_string(LOGS_PATH).ok(),
            self.config.get_bool(LOGS_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOGS_FILE).unwrap_or(false),
            self.config
                .get_string(LOGS_LEVEL)
                .unwrap_or("info".to_string()),
            rotation,
        ))
    }

    // ========================================================================
    // Database
    // ========================================================================

    /// `(max, min)` pool connections
    pub fn pool_size(&self) -> Result<(u32, u32), ClusterLockError> {
        let max = u32::try_from(self.get_u64(DB_MAX_CONNECTIONS, 10)?).map_err(config_error)?;
        let min = u32::try_from(self.get_u64(DB_MIN_CONNECTIONS, 1)?).map_err(config_error)?;
        if min > max {
            return Err(config_error(format!(
                "{} ({}) exceeds {} ({})",
                DB_MIN_CONNECTIONS, min, DB_MAX_CONNECTIONS, max
            )));
        }
        Ok((max, min))
    }

    pub async fn database_connection(&self) -> Result<DatabaseConnection, ClusterLockError> {
        let (max_connections, min_connections) = self.pool_size()?;
        let connect_timeout = self.get_u64(DB_CONNECT_TIMEOUT_SECS, 30)?;
        let acquire_timeout = self.get_u64(DB_ACQUIRE_TIMEOUT_SECS, 8)?;
        let sqlx_logging = self.config.get_bool(DB_SQLX_LOGGING).unwrap_or(false);

        let url = self
            .config
            .get_string(DB_URL)
            .map_err(|_| config_error(format!("{} is required for external_db storage", DB_URL)))?;

        let mut opt = ConnectOptions::new(url);

        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout = connect_timeout,
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        Database::connect(opt)
            .await
            .map_err(|e| ClusterLockError::DatabaseError(e.to_string()))
    }
}

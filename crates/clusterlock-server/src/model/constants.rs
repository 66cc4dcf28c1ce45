// Configuration keys and defaults for the clusterlock binary

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "clusterlock";

// Node
pub const IDENTITY: &str = "clusterlock.identity";
pub const STORAGE_MODE: &str = "clusterlock.storage.mode";

// Protected job
pub const JOB_NAME: &str = "clusterlock.job.name";
pub const JOB_CLASS: &str = "clusterlock.job.class";
pub const JOB_COMMAND: &str = "clusterlock.job.command";

// Lock table
pub const LOCK_DATABASE: &str = "clusterlock.lock.database";
pub const LOCK_TABLE: &str = "clusterlock.lock.table";

// Heartbeat and acquisition
pub const HEARTBEAT_MAX_FAILURES: &str = "clusterlock.heartbeat.max_failures";
pub const RETRY_STRATEGY: &str = "clusterlock.retry.strategy";
pub const RETRY_INITIAL_MS: &str = "clusterlock.retry.initial_ms";
pub const RETRY_MAX_MS: &str = "clusterlock.retry.max_ms";
pub const RETRY_MULTIPLIER: &str = "clusterlock.retry.multiplier";
pub const ERROR_CHANNEL_CAPACITY: &str = "clusterlock.error_channel.capacity";
pub const SHUTDOWN_TIMEOUT_SECS: &str = "clusterlock.shutdown.timeout_secs";

pub const RETRY_STRATEGY_FIXED: &str = "fixed";
pub const RETRY_STRATEGY_EXPONENTIAL: &str = "exponential";
pub const DEFAULT_RETRY_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 60_000;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// Logging
pub const LOGS_PATH: &str = "clusterlock.logs.path";
pub const LOGS_LEVEL: &str = "clusterlock.logs.level";
pub const LOGS_CONSOLE: &str = "clusterlock.logs.console";
pub const LOGS_FILE: &str = "clusterlock.logs.file";
pub const LOGS_ROTATION: &str = "clusterlock.logs.rotation";

// Database
pub const DB_URL: &str = "db.url";
pub const DB_MAX_CONNECTIONS: &str = "db.max_connections";
pub const DB_MIN_CONNECTIONS: &str = "db.min_connections";
pub const DB_CONNECT_TIMEOUT_SECS: &str = "db.connect_timeout_secs";
pub const DB_ACQUIRE_TIMEOUT_SECS: &str = "db.acquire_timeout_secs";
pub const DB_SQLX_LOGGING: &str = "db.sqlx_logging";

/// Per-class lease override, e.g. `clusterlock.interval.short.lease_secs`
pub fn interval_lease_key(class: &str) -> String {
    format!("clusterlock.interval.{}.lease_secs", class)
}

/// Per-class heartbeat override, e.g. `clusterlock.interval.medium.heartbeat_secs`
pub fn interval_heartbeat_key(class: &str) -> String {
    format!("clusterlock.interval.{}.heartbeat_secs", class)
}

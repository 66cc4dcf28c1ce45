//! Clusterlock Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all clusterlock components:
//! - Error types and error codes
//! - Node identity helpers
//! - Lock name validation
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{ClusterLockError, ErrorCode};
pub use utils::{is_valid_lock_name, local_ip};

/// Longest accepted lock name; the key column is `VARCHAR(255)`
pub const MAX_LOCK_NAME_LEN: usize = 255;

/// Database (schema) that holds the lock table
pub const DEFAULT_LOCK_DATABASE: &str = "d_meta";

/// Table holding one row per lock name
pub const DEFAULT_LOCK_TABLE: &str = "t_lock";

/// Consecutive heartbeat failures after which a lease is considered lost
pub const DEFAULT_HEARTBEAT_MAX_FAILURES: u32 = 3;

/// Capacity of the lease-loss reporting channel (single slot)
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 1;

/// Column names of the lock table
pub const COLUMN_NAME: &str = "name";
pub const COLUMN_VERSION: &str = "version";
pub const COLUMN_OWNER: &str = "owner";
pub const COLUMN_UPDATE_TIME: &str = "update_time";

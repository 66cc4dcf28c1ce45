//! Error types and error codes for clusterlock
//!
//! This module defines:
//! - `ClusterLockError`: Application-specific error enum
//! - `ErrorCode`: Structured error codes attached to surfaced failures

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum ClusterLockError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("lock '{0}' lease lost")]
    LeaseLost(String),

    #[error("lock failure: {0}")]
    LockFailure(String),
}

impl ClusterLockError {
    /// The error code reported alongside this error
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            ClusterLockError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            ClusterLockError::DatabaseError(_) => DATA_ACCESS_ERROR,
            ClusterLockError::ConfigError(_) => CONFIG_ERROR,
            ClusterLockError::InternalError(_) => SERVER_ERROR,
            ClusterLockError::LeaseLost(_) => LOCK_LEASE_LOST,
            ClusterLockError::LockFailure(_) => LOCK_FAILURE,
        }
    }
}

/// Error code structure for surfaced failures
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

// General error codes
pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const CONFIG_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20014,
    message: "configuration error",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

// Lock error codes
pub const LOCK_FAILURE: ErrorCode<'static> = ErrorCode {
    code: 60001,
    message: "lock failure",
};

pub const LOCK_LEASE_LOST: ErrorCode<'static> = ErrorCode {
    code: 60002,
    message: "lock lease lost",
};

//! Lock manager error types

use clusterlock_common::ClusterLockError;
use clusterlock_common::error::{
    DATA_ACCESS_ERROR, ErrorCode, LOCK_FAILURE, PARAMETER_VALIDATE_ERROR,
};

use crate::lease::IntervalClass;

#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("invalid lock name '{0}'")]
    InvalidName(String),

    #[error("invalid lease policy for class '{class}': {reason}")]
    InvalidPolicy { class: IntervalClass, reason: String },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("lock manager is shut down")]
    ShutDown,
}

impl LockError {
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            LockError::InvalidName(_)
            | LockError::InvalidPolicy { .. }
            | LockError::InvalidOption(_) => PARAMETER_VALIDATE_ERROR,
            LockError::Store(_) => DATA_ACCESS_ERROR,
            LockError::ShutDown => LOCK_FAILURE,
        }
    }
}

impl From<LockError> for ClusterLockError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::InvalidName(_)
            | LockError::InvalidPolicy { .. }
            | LockError::InvalidOption(_) => ClusterLockError::IllegalArgument(err.to_string()),
            LockError::Store(e) => ClusterLockError::DatabaseError(e.to_string()),
            LockError::ShutDown => ClusterLockError::LockFailure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_display() {
        assert_eq!(
            LockError::InvalidName("a b".to_string()).to_string(),
            "invalid lock name 'a b'"
        );
        let err = LockError::InvalidPolicy {
            class: IntervalClass::Short,
            reason: "zero lease".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid lease policy for class 'short': zero lease"
        );
    }

    #[test]
    fn test_lock_error_code() {
        assert_eq!(LockError::ShutDown.code(), LOCK_FAILURE);
        assert_eq!(
            LockError::Store(anyhow::anyhow!("down")).code(),
            DATA_ACCESS_ERROR
        );
        assert_eq!(
            LockError::InvalidName(String::new()).code(),
            PARAMETER_VALIDATE_ERROR
        );
    }

    #[test]
    fn test_into_cluster_lock_error() {
        let err: ClusterLockError = LockError::Store(anyhow::anyhow!("connection refused")).into();
        assert!(matches!(err, ClusterLockError::DatabaseError(ref m) if m == "connection refused"));

        let err: ClusterLockError = LockError::ShutDown.into();
        assert_eq!(err.code(), LOCK_FAILURE);
        assert_eq!(err.code(), LockError::ShutDown.code());
    }
}

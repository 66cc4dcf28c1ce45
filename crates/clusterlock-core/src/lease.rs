//! Lease policy table
//!
//! An interval class names a (lease duration, heartbeat period) pair. Callers
//! pick a class per lock name; the manager looks the pair up locally.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LockError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalClass {
    /// 10 minute lease, 1 minute heartbeat
    Short,
    /// 1 hour lease, 10 minute heartbeat
    Medium,
}

impl IntervalClass {
    pub const ALL: [IntervalClass; 2] = [IntervalClass::Short, IntervalClass::Medium];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalClass::Short => "short",
            IntervalClass::Medium => "medium",
        }
    }
}

impl fmt::Display for IntervalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntervalClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(IntervalClass::Short),
            "medium" => Ok(IntervalClass::Medium),
            _ => Err(format!("Invalid interval class: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeasePolicy {
    pub lease_duration: Duration,
    pub heartbeat_period: Duration,
}

impl LeasePolicy {
    pub const fn new(lease_duration: Duration, heartbeat_period: Duration) -> Self {
        Self {
            lease_duration,
            heartbeat_period,
        }
    }

    pub fn validate(&self, class: IntervalClass) -> Result<(), LockError> {
        let invalid = |reason: &str| LockError::InvalidPolicy {
            class,
            reason: reason.to_string(),
        };

        if self.lease_duration.is_zero() {
            return Err(invalid("lease duration must be positive"));
        }
        if self.heartbeat_period.is_zero() {
            return Err(invalid("heartbeat period must be positive"));
        }
        if self.heartbeat_period >= self.lease_duration {
            return Err(invalid("heartbeat period must be shorter than the lease"));
        }
        Ok(())
    }
}

const SHORT: LeasePolicy = LeasePolicy::new(Duration::from_secs(10 * 60), Duration::from_secs(60));
const MEDIUM: LeasePolicy =
    LeasePolicy::new(Duration::from_secs(60 * 60), Duration::from_secs(10 * 60));

/// Policy per interval class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeasePolicyTable {
    short: LeasePolicy,
    medium: LeasePolicy,
}

impl Default for LeasePolicyTable {
    fn default() -> Self {
        Self {
            short: SHORT,
            medium: MEDIUM,
        }
    }
}

impl LeasePolicyTable {
    pub fn get(&self, class: IntervalClass) -> LeasePolicy {
        match class {
            IntervalClass::Short => self.short,
            IntervalClass::Medium => self.medium,
        }
    }

    /// Replace the policy of `class`, rejecting invalid pairs
    pub fn with_policy(mut self, class: IntervalClass, policy: LeasePolicy) -> Result<Self, LockError> {
        policy.validate(class)?;
        match class {
            IntervalClass::Short => self.short = policy,
            IntervalClass::Medium => self.medium = policy,
        }
        Ok(self)
    }
}

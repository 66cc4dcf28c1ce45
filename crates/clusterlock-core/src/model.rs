//! Lock record model
//!
//! One row per lock name in `d_meta.t_lock`. `version` is the fencing token,
//! bumped by every ownership-transferring write.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clusterlock_common::{COLUMN_NAME, COLUMN_OWNER, COLUMN_UPDATE_TIME, COLUMN_VERSION};
use clusterlock_persistence::{ColumnKind, Record, Space};
use serde::{Deserialize, Serialize};

use crate::clock::to_chrono;

/// Schema of the lock table
pub fn lock_space(database: &str, table: &str) -> Space {
    Space::new(database, table, COLUMN_NAME)
        .with_column(COLUMN_VERSION, ColumnKind::Int)
        .with_column(COLUMN_OWNER, ColumnKind::Text)
        .with_column(COLUMN_UPDATE_TIME, ColumnKind::Time)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub version: i64,
    pub owner: String,
    pub update_time: DateTime<Utc>,
}

impl LockRecord {
    /// A freshly inserted row
    pub fn new(name: &str, owner: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            version: 0,
            owner: owner.to_string(),
            update_time: now,
        }
    }

    /// Time since the last write; negative if `now` is behind the writer's clock
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.update_time
    }

    /// A row is expired once strictly more than `lease` has passed since its last write
    pub fn is_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.elapsed(now) > to_chrono(lease)
    }

    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.owner == identity
    }

    pub fn to_record(&self) -> Record {
        Record::new()
            .with(COLUMN_NAME, self.name.as_str())
            .with(COLUMN_VERSION, self.version)
            .with(COLUMN_OWNER, self.owner.as_str())
            .with(COLUMN_UPDATE_TIME, self.update_time)
    }

    pub fn from_record(record: &Record) -> anyhow::Result<Self> {
        Ok(Self {
            name: record.get_str(COLUMN_NAME)?.to_string(),
            version: record.get_i64(COLUMN_VERSION)?,
            owner: record.get_str(COLUMN_OWNER)?.to_string(),
            update_time: record.get_time(COLUMN_UPDATE_TIME)?,
        })
    }
}

/// Per-name lifecycle inside one process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unregistered,
    /// Registered, retrying acquisition
    Acquiring,
    /// Acquired; job and heartbeat running
    Held,
    /// Heartbeat gave up; entry awaits removal
    Lost,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unregistered => write!(f, "unregistered"),
            LockState::Acquiring => write!(f, "acquiring"),
            LockState::Held => write!(f, "held"),
            LockState::Lost => write!(f, "lost"),
        }
    }
}

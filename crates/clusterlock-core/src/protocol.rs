//! Acquisition protocol
//!
//! Ownership moves only through a conditional write on `name = X AND version = V`
//! that bumps the version, so at most one contender wins each version. Renewal
//! writes on `name = X AND owner = self` and touches only `update_time`.

use std::sync::Arc;
use std::time::Duration;

use clusterlock_common::{COLUMN_NAME, COLUMN_OWNER, COLUMN_UPDATE_TIME, COLUMN_VERSION};
use clusterlock_persistence::{Condition, Record, RecordStore, Space};

use crate::clock::Clock;
use crate::error::LockError;
use crate::model::LockRecord;

/// Result of one acquisition attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This node owns the lock at `version`
    Acquired { version: i64 },
    /// Another node wrote the row within the lease
    HeldElsewhere { owner: String, elapsed: chrono::Duration },
    /// Another node's write landed first
    LostRace,
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }

    /// Label used in metrics
    pub fn label(&self) -> &'static str {
        match self {
            AcquireOutcome::Acquired { .. } => "acquired",
            AcquireOutcome::HeldElsewhere { .. } => "held_elsewhere",
            AcquireOutcome::LostRace => "lost_race",
        }
    }
}

/// Compare-and-swap operations on the lock table for one node identity
pub struct LockProtocol {
    store: Arc<dyn RecordStore>,
    space: Space,
    identity: String,
    clock: Arc<dyn Clock>,
}

impl LockProtocol {
    pub fn new(
        store: Arc<dyn RecordStore>,
        space: Space,
        identity: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            space,
            identity: identity.into(),
            clock,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// One acquisition attempt for `name`, judging expiry against `lease`
    pub async fn try_lock(&self, name: &str, lease: Duration) -> Result<AcquireOutcome, LockError> {
        let by_name = Condition::eq(COLUMN_NAME, name);

        if self.store.count(&self.space, &by_name).await? == 0 {
            let record = LockRecord::new(name, &self.identity, self.clock.now());
            let affected = self.store.insert(&self.space, record.to_record()).await?;
            return Ok(if affected > 0 {
                AcquireOutcome::Acquired { version: 0 }
            } else {
                AcquireOutcome::LostRace
            });
        }

        let Some(row) = self.current(name).await? else {
            // Row vanished between count and search
            return Ok(AcquireOutcome::LostRace);
        };

        if !row.is_owned_by(&self.identity) {
            let now = self.clock.now();
            if !row.is_expired(now, lease) {
                return Ok(AcquireOutcome::HeldElsewhere {
                    elapsed: row.elapsed(now),
                    owner: row.owner,
                });
            }
            tracing::debug!(
                lock = %name,
                owner = %row.owner,
                version = row.version,
                "Lease expired, attempting takeover"
            );
        }

        let next = row.version + 1;
        let cas = by_name.and_eq(COLUMN_VERSION, row.version);
        let fields = Record::new()
            .with(COLUMN_VERSION, next)
            .with(COLUMN_OWNER, self.identity.as_str())
            .with(COLUMN_UPDATE_TIME, self.clock.now());

        let affected = self.store.update(&self.space, &cas, fields).await?;
        Ok(if affected == 1 {
            AcquireOutcome::Acquired { version: next }
        } else {
            AcquireOutcome::LostRace
        })
    }

    /// Refresh `update_time` if this node still owns `name`
    pub async fn renew(&self, name: &str) -> Result<bool, LockError> {
        let cas = Condition::eq(COLUMN_NAME, name).and_eq(COLUMN_OWNER, self.identity.as_str());
        let fields = Record::new().with(COLUMN_UPDATE_TIME, self.clock.now());
        let affected = self.store.update(&self.space, &cas, fields).await?;
        Ok(affected > 0)
    }

    /// Current row for `name`, if any
    pub async fn current(&self, name: &str) -> Result<Option<LockRecord>, LockError> {
        let rows = self
            .store
            .search(&self.space, &Condition::eq(COLUMN_NAME, name))
            .await?;
        rows.first()
            .map(LockRecord::from_record)
            .transpose()
            .map_err(LockError::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clusterlock_persistence::MemoryRecordStore;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::lock_space;

    const LEASE: Duration = Duration::from_secs(600);

    fn protocol(
        store: &Arc<MemoryRecordStore>,
        clock: &Arc<ManualClock>,
        identity: &str,
    ) -> LockProtocol {
        LockProtocol::new(
            store.clone(),
            lock_space("d_meta", "t_lock"),
            identity,
            clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_first_acquire_inserts_version_zero() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let node = protocol(&store, &clock, "10.0.0.1");

        let outcome = node.try_lock("job-a", LEASE).await.unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired { version: 0 });

        let row = node.current("job-a").await.unwrap().unwrap();
        assert_eq!(row.version, 0);
        assert_eq!(row.owner, "10.0.0.1");
        assert_eq!(row.update_time, clock.now());
    }

    #[tokio::test]
    async fn test_own_row_is_reacquired_with_version_bump() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let node = protocol(&store, &clock, "10.0.0.1");

        node.try_lock("job-a", LEASE).await.unwrap();
        clock.advance(Duration::from_secs(30));

        // Not expired, but the row is ours
        let outcome = node.try_lock("job-a", LEASE).await.unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired { version: 1 });
    }

    #[tokio::test]
    async fn test_live_row_is_held_elsewhere() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let x = protocol(&store, &clock, "10.0.0.1");
        let y = protocol(&store, &clock, "10.0.0.2");

        x.try_lock("job-a", LEASE).await.unwrap();
        clock.advance(LEASE);

        // Exactly at the lease boundary the row is still held
        let outcome = y.try_lock("job-a", LEASE).await.unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::HeldElsewhere {
                owner: "10.0.0.1".to_string(),
                elapsed: chrono::Duration::minutes(10),
            }
        );
        assert_eq!(x.current("job-a").await.unwrap().unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_renew_touches_only_update_time() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let x = protocol(&store, &clock, "10.0.0.1");
        let y = protocol(&store, &clock, "10.0.0.2");

        x.try_lock("job-a", LEASE).await.unwrap();
        clock.advance(Duration::from_secs(60));

        assert!(x.renew("job-a").await.unwrap());
        let row = x.current("job-a").await.unwrap().unwrap();
        assert_eq!(row.version, 0);
        assert_eq!(row.update_time, clock.now());

        // Not the owner
        assert!(!y.renew("job-a").await.unwrap());
        // No row at all
        assert!(!x.renew("job-b").await.unwrap());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(AcquireOutcome::Acquired { version: 1 }.label(), "acquired");
        assert_eq!(AcquireOutcome::LostRace.label(), "lost_race");
        assert!(!AcquireOutcome::LostRace.is_acquired());
    }
}

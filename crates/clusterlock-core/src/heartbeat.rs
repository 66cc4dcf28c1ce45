//! Heartbeat supervisor
//!
//! Renews one held lease every heartbeat period and counts consecutive
//! failures. A renewal that matches no row and a store error both count.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::cancel::CancellationSignal;
use crate::metrics;
use crate::protocol::LockProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatExit {
    /// `consecutive_failures` renewals in a row failed
    LeaseLost { consecutive_failures: u32 },
    /// The manager was shut down
    Shutdown,
}

pub(crate) struct HeartbeatSupervisor {
    pub(crate) protocol: Arc<LockProtocol>,
    pub(crate) name: String,
    pub(crate) period: Duration,
    pub(crate) max_failures: u32,
    pub(crate) shutdown: CancellationSignal,
}

impl HeartbeatSupervisor {
    /// Renew until the lease is lost or the manager shuts down.
    ///
    /// Job cancellation does not stop this loop.
    pub(crate) async fn run(self) -> HeartbeatExit {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the lease was just written
        ticker.tick().await;

        let mut failures: u32 = 0;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return HeartbeatExit::Shutdown,
                _ = ticker.tick() => {}
            }

            let renewed = match self.protocol.renew(&self.name).await {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(
                        lock = %self.name,
                        owner = %self.protocol.identity(),
                        failures = failures + 1,
                        "Heartbeat matched no row, lock no longer owned"
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        lock = %self.name,
                        failures = failures + 1,
                        error = %e,
                        "Heartbeat failed"
                    );
                    false
                }
            };
            metrics::record_heartbeat(&self.name, renewed);

            if renewed {
                if failures > 0 {
                    tracing::info!(lock = %self.name, after = failures, "Heartbeat recovered");
                }
                failures = 0;
                continue;
            }

            failures += 1;
            if failures >= self.max_failures {
                return HeartbeatExit::LeaseLost {
                    consecutive_failures: failures,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clusterlock_persistence::{Condition, MemoryRecordStore, Record, RecordStore};

    use super::*;
    use crate::clock::TokioClock;
    use crate::model::lock_space;

    const PERIOD: Duration = Duration::from_secs(60);

    async fn held(identity: &str) -> (Arc<MemoryRecordStore>, Arc<LockProtocol>) {
        let store = Arc::new(MemoryRecordStore::new());
        let protocol = Arc::new(LockProtocol::new(
            store.clone(),
            lock_space("d_meta", "t_lock"),
            identity,
            Arc::new(TokioClock::starting_at(Utc::now())),
        ));
        protocol
            .try_lock("job-a", Duration::from_secs(600))
            .await
            .unwrap();
        (store, protocol)
    }

    fn supervisor(protocol: Arc<LockProtocol>, shutdown: CancellationSignal) -> HeartbeatSupervisor {
        HeartbeatSupervisor {
            protocol,
            name: "job-a".to_string(),
            period: PERIOD,
            max_failures: 3,
            shutdown,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_failures() {
        let (store, protocol) = held("10.0.0.1").await;
        store
            .update(
                protocol.space(),
                &Condition::eq("name", "job-a"),
                Record::new().with("owner", "10.0.0.2"),
            )
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        let exit = supervisor(protocol, CancellationSignal::new()).run().await;

        assert_eq!(
            exit,
            HeartbeatExit::LeaseLost {
                consecutive_failures: 3
            }
        );
        assert_eq!(start.elapsed(), PERIOD * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_renewing_until_shutdown() {
        let (_store, protocol) = held("10.0.0.1").await;
        let shutdown = CancellationSignal::new();
        let handle = tokio::spawn(supervisor(protocol.clone(), shutdown.clone()).run());

        tokio::time::sleep(PERIOD * 10 + Duration::from_secs(1)).await;
        let row = protocol.current("job-a").await.unwrap().unwrap();
        assert_eq!(row.owner, "10.0.0.1");
        assert_eq!(row.version, 0);

        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatExit::Shutdown);
    }
}

//! Lock manager
//!
//! Owns the local registry of lock names this process holds or is trying to
//! hold. Each registration runs on its own task: retry acquisition, then run
//! the job and the heartbeat supervisor side by side until the lease is lost
//! or the manager shuts down.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use clusterlock_common::{
    ClusterLockError, DEFAULT_HEARTBEAT_MAX_FAILURES, DEFAULT_LOCK_DATABASE, DEFAULT_LOCK_TABLE,
    is_valid_lock_name, local_ip,
};
use clusterlock_persistence::{RecordStore, Space};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::backoff::RetryPolicy;
use crate::cancel::CancellationSignal;
use crate::clock::{Clock, SystemClock};
use crate::error::LockError;
use crate::heartbeat::{HeartbeatExit, HeartbeatSupervisor};
use crate::job::LockedJob;
use crate::lease::{IntervalClass, LeasePolicyTable};
use crate::metrics;
use crate::model::{LockState, lock_space};
use crate::protocol::{AcquireOutcome, LockProtocol};

/// Published once per registration when its heartbeat gives up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseLost {
    pub name: String,
    pub owner: String,
    pub consecutive_failures: u32,
}

impl fmt::Display for LeaseLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock '{}' lease lost by {} after {} consecutive heartbeat failures",
            self.name, self.owner, self.consecutive_failures
        )
    }
}

impl From<LeaseLost> for ClusterLockError {
    fn from(event: LeaseLost) -> Self {
        ClusterLockError::LeaseLost(event.name)
    }
}

pub struct LockManagerOptions {
    /// Owner identity written into lock rows
    pub identity: String,
    pub space: Space,
    pub policies: LeasePolicyTable,
    pub retry: RetryPolicy,
    /// Consecutive heartbeat failures that end a lease
    pub max_failures: u32,
    pub clock: Arc<dyn Clock>,
}

impl Default for LockManagerOptions {
    fn default() -> Self {
        Self {
            identity: local_ip(),
            space: lock_space(DEFAULT_LOCK_DATABASE, DEFAULT_LOCK_TABLE),
            policies: LeasePolicyTable::default(),
            retry: RetryPolicy::default(),
            max_failures: DEFAULT_HEARTBEAT_MAX_FAILURES,
            clock: Arc::new(SystemClock),
        }
    }
}

impl LockManagerOptions {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn with_policies(mut self, policies: LeasePolicyTable) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn validate(&self) -> Result<(), LockError> {
        if self.identity.is_empty() {
            return Err(LockError::InvalidOption(
                "owner identity must not be empty".to_string(),
            ));
        }
        if self.max_failures == 0 {
            return Err(LockError::InvalidOption(
                "heartbeat failure threshold must be at least 1".to_string(),
            ));
        }
        for class in IntervalClass::ALL {
            self.policies.get(class).validate(class)?;
        }
        self.retry.validate()
    }
}

struct Registration {
    class: IntervalClass,
    state: LockState,
    job_signal: Option<CancellationSignal>,
}

struct Inner {
    protocol: Arc<LockProtocol>,
    policies: LeasePolicyTable,
    retry: RetryPolicy,
    max_failures: u32,
    registry: RwLock<HashMap<String, Registration>>,
    error_tx: mpsc::Sender<LeaseLost>,
    shutdown: CancellationSignal,
}

/// Runs jobs under named distributed locks
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<Inner>,
}

impl LockManager {
    /// Create a manager publishing lease losses on `error_tx`.
    ///
    /// The receiving side must be drained. Publishing happens on a detached
    /// task per loss, so a full channel parks that task, never a heartbeat.
    pub fn new(
        store: Arc<dyn RecordStore>,
        options: LockManagerOptions,
        error_tx: mpsc::Sender<LeaseLost>,
    ) -> Result<Self, LockError> {
        options.validate()?;

        let protocol = LockProtocol::new(store, options.space, options.identity, options.clock);
        Ok(Self {
            inner: Arc::new(Inner {
                protocol: Arc::new(protocol),
                policies: options.policies,
                retry: options.retry,
                max_failures: options.max_failures,
                registry: RwLock::new(HashMap::new()),
                error_tx,
                shutdown: CancellationSignal::new(),
            }),
        })
    }

    /// Create the lock table if needed
    pub async fn prepare(&self) -> Result<(), LockError> {
        let protocol = &self.inner.protocol;
        protocol.store().ensure_space(protocol.space()).await?;
        Ok(())
    }

    pub fn identity(&self) -> &str {
        self.inner.protocol.identity()
    }

    /// Register `name` and start acquiring it in the background.
    ///
    /// Returns `Ok(false)` without side effects if `name` is already
    /// registered in this process. Once acquired, `job` runs with a
    /// cancellation signal that fires when the lease is lost.
    pub async fn run_under_lock<J: LockedJob>(
        &self,
        name: &str,
        class: IntervalClass,
        job: J,
    ) -> Result<bool, LockError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(LockError::ShutDown);
        }
        if !is_valid_lock_name(name) {
            return Err(LockError::InvalidName(name.to_string()));
        }

        {
            let mut registry = self.inner.registry.write();
            if registry.contains_key(name) {
                tracing::info!(lock = %name, "Lock already registered in this process, ignoring");
                return Ok(false);
            }
            registry.insert(
                name.to_string(),
                Registration {
                    class,
                    state: LockState::Acquiring,
                    job_signal: None,
                },
            );
        }

        tracing::info!(lock = %name, class = %class, owner = %self.identity(), "Lock registered");
        tokio::spawn(
            self.inner
                .clone()
                .drive(name.to_string(), class, Arc::new(job)),
        );
        Ok(true)
    }

    pub fn state(&self, name: &str) -> LockState {
        self.inner
            .registry
            .read()
            .get(name)
            .map(|r| r.state)
            .unwrap_or_default()
    }

    /// Registered names and their interval classes, sorted by name
    pub fn registered(&self) -> Vec<(String, IntervalClass)> {
        let mut names: Vec<_> = self
            .inner
            .registry
            .read()
            .iter()
            .map(|(name, r)| (name.clone(), r.class))
            .collect();
        names.sort();
        names
    }

    /// Stop every acquisition loop and heartbeat and cancel every running job.
    ///
    /// Rows are left in place; other nodes take over once the lease expires.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        tracing::info!(owner = %self.identity(), "Shutting down lock manager");
        self.inner.shutdown.cancel();
        for registration in self.inner.registry.read().values() {
            if let Some(signal) = &registration.job_signal {
                signal.cancel();
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, name: String, class: IntervalClass, job: Arc<dyn LockedJob>) {
        let policy = self.policies.get(class);

        let Some(version) = self.acquire(&name, policy.lease_duration).await else {
            self.deregister(&name);
            return;
        };

        let job_signal = CancellationSignal::new();
        self.mark(&name, LockState::Held, Some(job_signal.clone()));
        if self.shutdown.is_cancelled() {
            // shutdown() ran before the signal was registered
            job_signal.cancel();
        }
        metrics::set_held(&name, true);
        tracing::info!(lock = %name, version, owner = %self.protocol.identity(), "Lock acquired, starting job");

        let job_name = name.clone();
        let signal = job_signal.clone();
        tokio::spawn(async move {
            match job.run(signal).await {
                Ok(()) => tracing::info!(lock = %job_name, "Job finished"),
                Err(e) => tracing::error!(lock = %job_name, error = %e, "Job failed"),
            }
        });

        let supervisor = HeartbeatSupervisor {
            protocol: self.protocol.clone(),
            name: name.clone(),
            period: policy.heartbeat_period,
            max_failures: self.max_failures,
            shutdown: self.shutdown.clone(),
        };
        let exit = supervisor.run().await;
        metrics::set_held(&name, false);
        job_signal.cancel();

        match exit {
            HeartbeatExit::Shutdown => {
                tracing::info!(lock = %name, "Heartbeat stopped by shutdown");
                self.deregister(&name);
            }
            HeartbeatExit::LeaseLost {
                consecutive_failures,
            } => {
                tracing::error!(
                    lock = %name,
                    owner = %self.protocol.identity(),
                    consecutive_failures,
                    "Lease lost, job cancelled"
                );
                self.mark(&name, LockState::Lost, None);
                metrics::record_lease_lost(&name);
                self.publish(LeaseLost {
                    name: name.clone(),
                    owner: self.protocol.identity().to_string(),
                    consecutive_failures,
                });

                // Keep the name reserved for one more lease before allowing a new cycle
                tokio::select! {
                    _ = tokio::time::sleep(policy.lease_duration) => {}
                    _ = self.shutdown.cancelled() => {}
                }
                self.deregister(&name);
                tracing::info!(lock = %name, "Lock deregistered after lease loss");
            }
        }
    }

    /// Retry until acquired; `None` if the manager shut down first
    async fn acquire(&self, name: &str, lease: std::time::Duration) -> Option<i64> {
        let mut backoff = self.retry.backoff(lease);
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            match self.protocol.try_lock(name, lease).await {
                Ok(outcome) => {
                    metrics::record_acquire_attempt(name, outcome.label());
                    match outcome {
                        AcquireOutcome::Acquired { version } => return Some(version),
                        AcquireOutcome::HeldElsewhere { owner, elapsed } => {
                            tracing::debug!(
                                lock = %name,
                                owner = %owner,
                                elapsed_secs = elapsed.num_seconds(),
                                "Lock held by another node"
                            );
                        }
                        AcquireOutcome::LostRace => {
                            tracing::debug!(lock = %name, "Lost acquisition race");
                        }
                    }
                }
                Err(e) => {
                    metrics::record_acquire_attempt(name, "error");
                    tracing::warn!(lock = %name, error = %e, "Lock acquisition attempt failed");
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!(lock = %name, attempt = backoff.attempts(), delay_ms = delay.as_millis() as u64, "Retrying lock acquisition");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    fn publish(&self, event: LeaseLost) {
        let tx = self.error_tx.clone();
        tokio::spawn(async move {
            let name = event.name.clone();
            if tx.send(event).await.is_err() {
                tracing::warn!(lock = %name, "Lease loss receiver dropped, event discarded");
            }
        });
    }

    fn mark(&self, name: &str, state: LockState, job_signal: Option<CancellationSignal>) {
        if let Some(registration) = self.registry.write().get_mut(name) {
            registration.state = state;
            registration.job_signal = job_signal;
        }
    }

    fn deregister(&self, name: &str) {
        self.registry.write().remove(name);
    }
}

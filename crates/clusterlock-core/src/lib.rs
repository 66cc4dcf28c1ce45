//! Clusterlock Core - Lease-based distributed lock manager
//!
//! This crate provides:
//! - Lease policy table (interval classes and their lease/heartbeat pairs)
//! - Lock record model stored in the shared record store
//! - Acquisition protocol (compare-and-swap on name + version)
//! - Heartbeat supervisor (renewal on name + owner, loss detection)
//! - Lock manager (local registry, retry loop, job supervision)

pub mod backoff;
pub mod cancel;
pub mod clock;
pub mod error;
mod heartbeat;
pub mod job;
pub mod lease;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod protocol;

// Re-export commonly used types
pub use backoff::RetryPolicy;
pub use cancel::CancellationSignal;
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use error::LockError;
pub use job::LockedJob;
pub use lease::{IntervalClass, LeasePolicy, LeasePolicyTable};
pub use manager::{LeaseLost, LockManager, LockManagerOptions};
pub use model::{LockRecord, LockState, lock_space};
pub use protocol::{AcquireOutcome, LockProtocol};

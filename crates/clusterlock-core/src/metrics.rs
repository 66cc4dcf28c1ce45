// Lock metrics
// Counters and gauges published through the `metrics` facade; no exporter is installed here

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const LOCK_ACQUIRE_ATTEMPTS_TOTAL: &str = "lock_acquire_attempts_total";
pub const LOCK_HEARTBEATS_TOTAL: &str = "lock_heartbeats_total";
pub const LOCK_LEASE_LOST_TOTAL: &str = "lock_lease_lost_total";
pub const LOCK_HELD: &str = "lock_held";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        LOCK_ACQUIRE_ATTEMPTS_TOTAL,
        "Total number of lock acquisition attempts, by outcome"
    );
    describe_counter!(
        LOCK_HEARTBEATS_TOTAL,
        "Total number of lease renewals, by outcome"
    );
    describe_counter!(
        LOCK_LEASE_LOST_TOTAL,
        "Total number of leases given up after repeated heartbeat failures"
    );
    describe_gauge!(LOCK_HELD, "Whether this process currently holds the lock");

    tracing::info!("Metrics initialized");
}

/// Record an acquisition attempt
pub fn record_acquire_attempt(lock: &str, outcome: &'static str) {
    counter!(LOCK_ACQUIRE_ATTEMPTS_TOTAL, "lock" => lock.to_string(), "outcome" => outcome).increment(1);
}

/// Record a heartbeat
pub fn record_heartbeat(lock: &str, success: bool) {
    let outcome = if success { "ok" } else { "failed" };
    counter!(LOCK_HEARTBEATS_TOTAL, "lock" => lock.to_string(), "outcome" => outcome).increment(1);
}

/// Record a lost lease
pub fn record_lease_lost(lock: &str) {
    counter!(LOCK_LEASE_LOST_TOTAL, "lock" => lock.to_string()).increment(1);
}

/// Update the held gauge
pub fn set_held(lock: &str, held: bool) {
    gauge!(LOCK_HELD, "lock" => lock.to_string()).set(if held { 1.0 } else { 0.0 });
}

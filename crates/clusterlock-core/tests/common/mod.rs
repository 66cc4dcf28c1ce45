//! Shared fixtures for lock manager integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clusterlock_core::{CancellationSignal, LockRecord, LockedJob, lock_space};
use clusterlock_persistence::{
    Condition, MemoryRecordStore, Record, RecordStore, Space, StorageMode,
};
use parking_lot::Mutex;
use tokio::sync::{Barrier, mpsc};

pub fn space() -> Space {
    lock_space("d_meta", "t_lock")
}

/// Insert a row as if `owner` had written it at `at`
pub async fn seed(store: &dyn RecordStore, name: &str, version: i64, owner: &str, at: DateTime<Utc>) {
    let record = LockRecord {
        name: name.to_string(),
        version,
        owner: owner.to_string(),
        update_time: at,
    };
    assert_eq!(store.insert(&space(), record.to_record()).await.unwrap(), 1);
}

pub async fn row(store: &dyn RecordStore, name: &str) -> LockRecord {
    let rows = store
        .search(&space(), &Condition::eq("name", name))
        .await
        .unwrap();
    LockRecord::from_record(&rows[0]).unwrap()
}

/// Overwrite the owner column, as a competing writer would
pub async fn steal(store: &dyn RecordStore, name: &str, owner: &str) {
    let affected = store
        .update(
            &space(),
            &Condition::eq("name", name),
            Record::new().with("owner", owner),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started(String),
    Cancelled(String),
}

/// A job that reports when it starts and when it observes cancellation
pub fn probe_job(label: &str, events: mpsc::UnboundedSender<JobEvent>) -> impl LockedJob {
    let label = label.to_string();
    move |cancel: CancellationSignal| {
        let events = events.clone();
        let label = label.clone();
        async move {
            let _ = events.send(JobEvent::Started(label.clone()));
            cancel.cancelled().await;
            let _ = events.send(JobEvent::Cancelled(label));
            Ok::<(), anyhow::Error>(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    AfterCount,
    AfterSearch,
}

/// Holds the first two callers at `gate` until both have reached it,
/// forcing two acquisition attempts to interleave. Later calls pass freely.
pub struct GateStore {
    inner: MemoryRecordStore,
    gate: Gate,
    barrier: Barrier,
    remaining: AtomicU32,
}

impl GateStore {
    pub fn new(gate: Gate) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            gate,
            barrier: Barrier::new(2),
            remaining: AtomicU32::new(2),
        }
    }

    async fn pass(&self, at: Gate) {
        if self.gate != at {
            return;
        }
        let armed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.barrier.wait().await;
        }
    }
}

#[async_trait]
impl RecordStore for GateStore {
    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn ensure_space(&self, space: &Space) -> anyhow::Result<()> {
        self.inner.ensure_space(space).await
    }

    async fn count(&self, space: &Space, condition: &Condition) -> anyhow::Result<u64> {
        let count = self.inner.count(space, condition).await?;
        self.pass(Gate::AfterCount).await;
        Ok(count)
    }

    async fn search(&self, space: &Space, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        let rows = self.inner.search(space, condition).await?;
        self.pass(Gate::AfterSearch).await;
        Ok(rows)
    }

    async fn insert(&self, space: &Space, record: Record) -> anyhow::Result<u64> {
        self.inner.insert(space, record).await
    }

    async fn update(
        &self,
        space: &Space,
        condition: &Condition,
        fields: Record,
    ) -> anyhow::Result<u64> {
        self.inner.update(space, condition, fields).await
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails heartbeat writes (updates keyed on owner) following a script.
///
/// Each heartbeat pops one entry: `true` passes through, `false` returns a
/// store error. Once the script is exhausted every heartbeat fails.
pub struct FlakyStore {
    inner: MemoryRecordStore,
    script: Mutex<VecDeque<bool>>,
    heartbeats: AtomicU32,
    healthy: AtomicBool,
}

impl FlakyStore {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            script: Mutex::new(script.into_iter().collect()),
            heartbeats: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn heartbeats(&self) -> u32 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn ensure_space(&self, space: &Space) -> anyhow::Result<()> {
        self.inner.ensure_space(space).await
    }

    async fn count(&self, space: &Space, condition: &Condition) -> anyhow::Result<u64> {
        if !self.healthy.load(Ordering::SeqCst) {
            anyhow::bail!("store unreachable");
        }
        self.inner.count(space, condition).await
    }

    async fn search(&self, space: &Space, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        self.inner.search(space, condition).await
    }

    async fn insert(&self, space: &Space, record: Record) -> anyhow::Result<u64> {
        self.inner.insert(space, record).await
    }

    async fn update(
        &self,
        space: &Space,
        condition: &Condition,
        fields: Record,
    ) -> anyhow::Result<u64> {
        if condition.value_of("owner").is_some() {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            let pass = self.script.lock().pop_front().unwrap_or(false);
            if !pass {
                anyhow::bail!("injected heartbeat failure");
            }
        }
        self.inner.update(space, condition, fields).await
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

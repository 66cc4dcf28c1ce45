//! Record store trait for the storage abstraction layer
//!
//! Every backend exposes the same four primitives over a `Space`:
//! count, search, insert and a conditional update. Predicates are
//! conjunctions of equality comparisons (`Condition`).

use async_trait::async_trait;

use crate::model::{Condition, Record, Space, StorageMode};

/// Durable record store shared by every node
///
/// Implementations must apply `update` atomically per row: the predicate is
/// evaluated and the new fields written as one step, so that a predicate on
/// `version` or `owner` acts as a compare-and-swap.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get the storage mode of this backend
    fn storage_mode(&self) -> StorageMode;

    /// Create the table backing `space` if it does not exist yet
    async fn ensure_space(&self, space: &Space) -> anyhow::Result<()>;

    /// Number of records matching `condition`
    async fn count(&self, space: &Space, condition: &Condition) -> anyhow::Result<u64>;

    /// Records matching `condition`
    async fn search(&self, space: &Space, condition: &Condition) -> anyhow::Result<Vec<Record>>;

    /// Insert `record`, returning the number of rows written.
    ///
    /// A record whose key already exists is not an error: it yields `Ok(0)`.
    async fn insert(&self, space: &Space, record: Record) -> anyhow::Result<u64>;

    /// Overwrite `fields` on every record matching `condition`, returning the
    /// number of rows written.
    async fn update(
        &self,
        space: &Space,
        condition: &Condition,
        fields: Record,
    ) -> anyhow::Result<u64>;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}

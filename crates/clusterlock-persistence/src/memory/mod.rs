//! In-memory record store
//!
//! Tables live in process memory and are lost on exit. Each table is guarded
//! by its own mutex, so predicate evaluation and the write it guards happen
//! under one lock acquisition.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::{Condition, FieldValue, Record, Space, StorageMode};
use crate::traits::RecordStore;

type Table = Arc<Mutex<BTreeMap<FieldValue, Record>>>;

/// Process-local record store
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: DashMap<String, Table>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The DashMap shard guard is dropped before the table mutex is taken.
    fn table(&self, space: &Space) -> Table {
        self.tables
            .entry(space.full_name())
            .or_insert_with(|| Arc::new(Mutex::new(BTreeMap::new())))
            .value()
            .clone()
    }

    fn existing_table(&self, space: &Space) -> Option<Table> {
        self.tables
            .get(&space.full_name())
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn ensure_space(&self, space: &Space) -> anyhow::Result<()> {
        self.table(space);
        Ok(())
    }

    async fn count(&self, space: &Space, condition: &Condition) -> anyhow::Result<u64> {
        let Some(table) = self.existing_table(space) else {
            return Ok(0);
        };
        let rows = table.lock();
        Ok(rows.values().filter(|r| condition.matches(r)).count() as u64)
    }

    async fn search(&self, space: &Space, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        let Some(table) = self.existing_table(space) else {
            return Ok(Vec::new());
        };
        let rows = table.lock();
        Ok(rows
            .values()
            .filter(|r| condition.matches(r))
            .cloned()
            .collect())
    }

    async fn insert(&self, space: &Space, record: Record) -> anyhow::Result<u64> {
        space.check(&record)?;
        let key = match record.get(&space.key) {
            Some(key) if !key.is_null() => key.clone(),
            _ => anyhow::bail!("record for {} has no '{}' key", space.full_name(), space.key),
        };

        let table = self.table(space);
        let mut rows = table.lock();
        if rows.contains_key(&key) {
            tracing::debug!(table = %space.full_name(), key = %key, "Duplicate key on insert");
            return Ok(0);
        }
        rows.insert(key, record);
        Ok(1)
    }

    async fn update(
        &self,
        space: &Space,
        condition: &Condition,
        fields: Record,
    ) -> anyhow::Result<u64> {
        space.check(&fields)?;
        if fields.contains(&space.key) {
            anyhow::bail!(
                "updating key column '{}' of {} is not supported",
                space.key,
                space.full_name()
            );
        }

        let Some(table) = self.existing_table(space) else {
            return Ok(0);
        };
        let mut rows = table.lock();

        // Keyed lookups avoid a scan; the full condition is still checked.
        if let Some(key) = condition.value_of(&space.key) {
            return Ok(match rows.get_mut(key) {
                Some(row) if condition.matches(row) => {
                    row.merge(&fields);
                    1
                }
                _ => 0,
            });
        }

        let mut affected = 0;
        for row in rows.values_mut().filter(|r| condition.matches(r)) {
            row.merge(&fields);
            affected += 1;
        }
        Ok(affected)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

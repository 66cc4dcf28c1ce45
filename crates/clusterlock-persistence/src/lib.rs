//! Clusterlock Persistence - Record store abstraction and storage backends
//!
//! This crate provides:
//! - The `RecordStore` trait: count/search/insert/update over a named space
//! - A small condition language (conjunctions of equality comparisons)
//! - Table schemas (`Space`) shared by every backend
//! - An in-memory backend and a SQL backend (MySQL/PostgreSQL/SQLite via SeaORM)

pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export the store trait
pub use traits::RecordStore;

// Re-export backends
pub use memory::MemoryRecordStore;
pub use sql::SqlRecordStore;

// Re-export model types
pub use model::{ColumnKind, ColumnSpec, Condition, FieldValue, Record, Space, StorageMode};

//! SQL-based record store (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Statements are built with sea-query from the `Space` schema, so the same
//! store serves any table without generated entities.

use async_trait::async_trait;
use clusterlock_common::MAX_LOCK_NAME_LEN;
use sea_orm::sea_query::{
    Alias, Asterisk, ColumnDef, Cond, Expr, IntoIden, Query, SimpleExpr, Table, TableRef,
};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, QueryResult, SqlErr,
};

use crate::model::{ColumnKind, Condition, FieldValue, Record, Space, StorageMode};
use crate::traits::RecordStore;

/// Length of text columns; bounded so the key column can be a primary key on MySQL
const TEXT_COLUMN_LENGTH: u32 = MAX_LOCK_NAME_LEN as u32;

/// External database record store
///
/// Wraps a SeaORM `DatabaseConnection`. On MySQL and PostgreSQL tables are
/// addressed as `database.table`; SQLite has no schemas, so the table name is
/// used alone there.
pub struct SqlRecordStore {
    db: DatabaseConnection,
    qualified: bool,
}

impl SqlRecordStore {
    /// Create a new SqlRecordStore with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        let qualified = !matches!(db.get_database_backend(), DatabaseBackend::Sqlite);
        Self { db, qualified }
    }

    /// Address tables by name only, ignoring `Space::database`
    pub fn unqualified(mut self) -> Self {
        self.qualified = false;
        self
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn backend(&self) -> DatabaseBackend {
        self.db.get_database_backend()
    }

    fn table_ref(&self, space: &Space) -> TableRef {
        if self.qualified {
            TableRef::SchemaTable(
                Alias::new(&space.database).into_iden(),
                Alias::new(&space.table).into_iden(),
            )
        } else {
            TableRef::Table(Alias::new(&space.table).into_iden())
        }
    }

    async fn ensure_database(&self, space: &Space) -> anyhow::Result<()> {
        let sql = match self.backend() {
            DatabaseBackend::MySql => {
                format!("CREATE DATABASE IF NOT EXISTS `{}`", space.database)
            }
            DatabaseBackend::Postgres => {
                format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", space.database)
            }
            DatabaseBackend::Sqlite => return Ok(()),
        };
        self.db.execute_unprepared(&sql).await?;
        Ok(())
    }
}

fn to_cond(condition: &Condition) -> Cond {
    condition
        .clauses()
        .iter()
        .fold(Cond::all(), |cond, (column, value)| {
            cond.add(Expr::col(Alias::new(column)).eq(sea_orm::Value::from(value.clone())))
        })
}

fn read_column(row: &QueryResult, column: &str, kind: ColumnKind) -> Result<FieldValue, DbErr> {
    let value = match kind {
        ColumnKind::Int => row.try_get::<Option<i64>>("", column)?.map(FieldValue::Int),
        ColumnKind::Text => row.try_get::<Option<String>>("", column)?.map(FieldValue::Text),
        ColumnKind::Time => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>>("", column)?
            .map(FieldValue::Time),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn is_duplicate_key(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::ExternalDb
    }

    async fn ensure_space(&self, space: &Space) -> anyhow::Result<()> {
        if self.qualified {
            self.ensure_database(space).await?;
        }

        let mut stmt = Table::create();
        stmt.table(self.table_ref(space)).if_not_exists();
        for spec in &space.columns {
            let mut column = ColumnDef::new(Alias::new(&spec.name));
            match spec.kind {
                ColumnKind::Int => column.big_integer(),
                ColumnKind::Text => column.string_len(TEXT_COLUMN_LENGTH),
                ColumnKind::Time => column.timestamp_with_time_zone(),
            };
            column.not_null();
            if spec.name == space.key {
                column.primary_key();
            }
            stmt.col(&mut column);
        }

        self.db.execute(self.backend().build(&stmt)).await?;
        tracing::debug!(table = %space.full_name(), "Ensured table exists");
        Ok(())
    }

    async fn count(&self, space: &Space, condition: &Condition) -> anyhow::Result<u64> {
        let mut stmt = Query::select();
        stmt.expr_as(Expr::col(Asterisk).count(), Alias::new("cnt"))
            .from(self.table_ref(space))
            .cond_where(to_cond(condition));

        let row = self.db.query_one(self.backend().build(&stmt)).await?;
        let count = match row {
            Some(row) => row.try_get::<i64>("", "cnt")?,
            None => 0,
        };
        Ok(u64::try_from(count)?)
    }

    async fn search(&self, space: &Space, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        let mut stmt = Query::select();
        stmt.columns(space.columns.iter().map(|c| Alias::new(&c.name)))
            .from(self.table_ref(space))
            .cond_where(to_cond(condition));

        let rows = self.db.query_all(self.backend().build(&stmt)).await?;
        rows.iter()
            .map(|row| {
                space
                    .columns
                    .iter()
                    .map(|c| Ok((c.name.clone(), read_column(row, &c.name, c.kind)?)))
                    .collect::<anyhow::Result<Record>>()
            })
            .collect()
    }

    async fn insert(&self, space: &Space, record: Record) -> anyhow::Result<u64> {
        space.check(&record)?;

        let (columns, values): (Vec<_>, Vec<SimpleExpr>) = record
            .iter()
            .map(|(column, value)| {
                (
                    Alias::new(column),
                    SimpleExpr::from(sea_orm::Value::from(value.clone())),
                )
            })
            .unzip();

        let mut stmt = Query::insert();
        stmt.into_table(self.table_ref(space)).columns(columns);
        stmt.values(values)?;

        match self.db.execute(self.backend().build(&stmt)).await {
            Ok(result) => Ok(result.rows_affected()),
            Err(err) if is_duplicate_key(&err) => {
                tracing::debug!(table = %space.full_name(), "Duplicate key on insert");
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(
        &self,
        space: &Space,
        condition: &Condition,
        fields: Record,
    ) -> anyhow::Result<u64> {
        space.check(&fields)?;
        if fields.is_empty() {
            anyhow::bail!("update of {} sets no columns", space.full_name());
        }

        let values: Vec<(Alias, SimpleExpr)> = fields
            .iter()
            .map(|(column, value)| {
                (
                    Alias::new(column),
                    SimpleExpr::from(sea_orm::Value::from(value.clone())),
                )
            })
            .collect();

        let mut stmt = Query::update();
        stmt.table(self.table_ref(space))
            .values(values)
            .cond_where(to_cond(condition));

        let result = self.db.execute(self.backend().build(&stmt)).await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sea_orm::{ConnectOptions, Database};

    use super::*;

    async fn sqlite_store() -> SqlRecordStore {
        // A single connection keeps every statement on the same in-memory database
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.unwrap();
        SqlRecordStore::new(db)
    }

    fn space() -> Space {
        Space::new("d_meta", "t_lock", "name")
            .with_column("version", ColumnKind::Int)
            .with_column("owner", ColumnKind::Text)
            .with_column("update_time", ColumnKind::Time)
    }

    fn row(name: &str, version: i64, owner: &str) -> Record {
        Record::new()
            .with("name", name)
            .with("version", version)
            .with("owner", owner)
            .with("update_time", Utc::now())
    }

    #[tokio::test]
    async fn test_sqlite_ensure_space_is_idempotent() {
        let store = sqlite_store().await;
        store.ensure_space(&space()).await.unwrap();
        store.ensure_space(&space()).await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.storage_mode(), StorageMode::ExternalDb);
    }

    #[tokio::test]
    async fn test_sqlite_insert_count_search() {
        let store = sqlite_store().await;
        let space = space();
        store.ensure_space(&space).await.unwrap();

        assert_eq!(store.count(&space, &Condition::eq("name", "job-a")).await.unwrap(), 0);
        assert_eq!(store.insert(&space, row("job-a", 0, "10.0.0.1")).await.unwrap(), 1);
        assert_eq!(store.count(&space, &Condition::eq("name", "job-a")).await.unwrap(), 1);

        let rows = store.search(&space, &Condition::eq("name", "job-a")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("owner").unwrap(), "10.0.0.1");
        assert_eq!(rows[0].get_i64("version").unwrap(), 0);
        assert!(rows[0].get_time("update_time").is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_insert_returns_zero() {
        let store = sqlite_store().await;
        let space = space();
        store.ensure_space(&space).await.unwrap();

        assert_eq!(store.insert(&space, row("job-a", 0, "n1")).await.unwrap(), 1);
        assert_eq!(store.insert(&space, row("job-a", 0, "n2")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_version_cas_update() {
        let store = sqlite_store().await;
        let space = space();
        store.ensure_space(&space).await.unwrap();
        store.insert(&space, row("job-a", 0, "n1")).await.unwrap();

        let cas = Condition::eq("name", "job-a").and_eq("version", 0);
        let later = Utc::now() + Duration::minutes(11);
        let fields = Record::new()
            .with("version", 1)
            .with("owner", "n2")
            .with("update_time", later);

        assert_eq!(store.update(&space, &cas, fields.clone()).await.unwrap(), 1);
        assert_eq!(store.update(&space, &cas, fields).await.unwrap(), 0);

        let rows = store.search(&space, &Condition::eq("name", "job-a")).await.unwrap();
        assert_eq!(rows[0].get_i64("version").unwrap(), 1);
        assert_eq!(rows[0].get_str("owner").unwrap(), "n2");
    }

    #[tokio::test]
    async fn test_sqlite_owner_predicate_misses_after_takeover() {
        let store = sqlite_store().await;
        let space = space();
        store.ensure_space(&space).await.unwrap();
        store.insert(&space, row("job-a", 0, "n1")).await.unwrap();

        store
            .update(
                &space,
                &Condition::eq("name", "job-a"),
                Record::new().with("owner", "n2"),
            )
            .await
            .unwrap();

        let heartbeat = Condition::eq("name", "job-a").and_eq("owner", "n1");
        let affected = store
            .update(&space, &heartbeat, Record::new().with("update_time", Utc::now()))
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }
}

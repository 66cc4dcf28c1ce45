//! Storage model types shared by every record store backend
//!
//! A `Space` names a table and describes its columns, a `Record` is one row,
//! and a `Condition` is a conjunction of equality comparisons used as the
//! predicate of count/search/update.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single column value
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(_) => Some(ColumnKind::Int),
            FieldValue::Text(_) => Some(ColumnKind::Text),
            FieldValue::Time(_) => Some(ColumnKind::Time),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "'{}'", v),
            FieldValue::Time(v) => write!(f, "'{}'", v.to_rfc3339()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<FieldValue> for sea_orm::Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Null => sea_orm::Value::String(None),
            FieldValue::Int(v) => v.into(),
            FieldValue::Text(v) => v.into(),
            FieldValue::Time(v) => v.into(),
        }
    }
}

/// One row: column name to value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<String, FieldValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> anyhow::Result<&str> {
        match self.get(column) {
            Some(FieldValue::Text(v)) => Ok(v),
            Some(other) => anyhow::bail!("column '{}' is not text: {}", column, other),
            None => anyhow::bail!("column '{}' is missing", column),
        }
    }

    pub fn get_i64(&self, column: &str) -> anyhow::Result<i64> {
        match self.get(column) {
            Some(FieldValue::Int(v)) => Ok(*v),
            Some(other) => anyhow::bail!("column '{}' is not an integer: {}", column, other),
            None => anyhow::bail!("column '{}' is missing", column),
        }
    }

    pub fn get_time(&self, column: &str) -> anyhow::Result<DateTime<Utc>> {
        match self.get(column) {
            Some(FieldValue::Time(v)) => Ok(*v),
            Some(other) => anyhow::bail!("column '{}' is not a timestamp: {}", column, other),
            None => anyhow::bail!("column '{}' is missing", column),
        }
    }

    /// Overwrite this record's columns with the ones present in `fields`
    pub fn merge(&mut self, fields: &Record) {
        for (column, value) in fields.iter() {
            self.0.insert(column.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

/// Conjunction of `column = value` clauses
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Condition {
    clauses: Vec<(String, FieldValue)>,
}

impl Condition {
    pub fn eq(column: &str, value: impl Into<FieldValue>) -> Self {
        Self::default().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.clauses.push((column.to_string(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, FieldValue)] {
        &self.clauses
    }

    /// Value compared against `column`, if the condition constrains it
    pub fn value_of(&self, column: &str) -> Option<&FieldValue> {
        self.clauses
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// An empty condition matches every record. NULL never compares equal.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|(column, expected)| {
            !expected.is_null() && record.get(column).is_some_and(|actual| actual == expected)
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "TRUE");
        }
        for (i, (column, value)) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{} = {}", column, value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Int,
    Text,
    Time,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// A table: where it lives, its key column and its columns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Space {
    pub database: String,
    pub table: String,
    pub key: String,
    pub columns: Vec<ColumnSpec>,
}

impl Space {
    /// Create a space whose primary key is the text column `key`
    pub fn new(database: &str, table: &str, key: &str) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            key: key.to_string(),
            columns: vec![ColumnSpec {
                name: key.to_string(),
                kind: ColumnKind::Text,
            }],
        }
    }

    pub fn with_column(mut self, name: &str, kind: ColumnKind) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// `database.table`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check that every column of `record` exists with a matching kind
    pub fn check(&self, record: &Record) -> anyhow::Result<()> {
        for (column, value) in record.iter() {
            let spec = self
                .column(column)
                .ok_or_else(|| anyhow::anyhow!("unknown column '{}' in {}", column, self.full_name()))?;
            if let Some(kind) = value.kind()
                && kind != spec.kind
            {
                anyhow::bail!(
                    "column '{}' in {} expects {:?}, got {}",
                    column,
                    self.full_name(),
                    spec.kind,
                    value
                );
            }
        }
        Ok(())
    }
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Process-local tables, lost on exit
    #[default]
    Memory,
    /// External database (MySQL/PostgreSQL/SQLite via SeaORM)
    ExternalDb,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::ExternalDb => write!(f, "external_db"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageMode::Memory),
            "external_db" => Ok(StorageMode::ExternalDb),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}

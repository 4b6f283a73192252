use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{Record, RecordStore, StoreError};

/// In-process record store.
///
/// Enforces the unique columns registered with [`MemoryStore::with_unique`], so it
/// reports duplicate keys the same way a real backend would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    unique: HashMap<String, Vec<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register unique columns for `table`
    pub fn with_unique(mut self, table: impl Into<String>, columns: &[&str]) -> Self {
        self.unique
            .entry(table.into())
            .or_default()
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Number of successful inserts and updates so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of rows currently in `table`
    pub async fn len(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Vec::len)
    }

    /// Check `candidate` against every row except the one at `skip`.
    fn check_unique(
        &self,
        table: &str,
        rows: &[Record],
        candidate: &Record,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        let Some(columns) = self.unique.get(table) else {
            return Ok(());
        };

        for column in columns {
            let Some(value) = candidate.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let duplicate = rows
                .iter()
                .enumerate()
                .filter(|(idx, _)| Some(*idx) != skip)
                .any(|(_, row)| row.get(column) == Some(value));
            if duplicate {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate value for {}.{}",
                    table, column
                )));
            }
        }
        Ok(())
    }
}

fn matches_id(row: &Record, id_field: &str, id_value: &str) -> bool {
    match row.get(id_field) {
        Some(Value::String(s)) => s == id_value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == id_value,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        self.check_unique(table, rows, &record, None)?;
        rows.push(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        tracing::debug!("Memory store insert into {} ({} rows)", table, rows.len());
        Ok(record)
    }

    async fn select_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| matches_id(row, id_field, id_value)))
            .cloned())
    }

    async fn update_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
        fields: Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(None);
        };
        let Some(idx) = rows
            .iter()
            .position(|row| matches_id(row, id_field, id_value))
        else {
            return Ok(None);
        };

        let mut updated = rows[idx].clone();
        updated.extend(fields);
        self.check_unique(table, rows, &updated, Some(idx))?;

        rows[idx] = updated.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(updated))
    }
}

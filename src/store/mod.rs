//! Table-style record store the patient service persists through.
//!
//! Records are plain JSON objects keyed by column name. Backends are selected at
//! startup and shared behind an `Arc<dyn RecordStore>`; each call is a single,
//! independent request against the backend.

pub mod memory;
pub mod postgres;
pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rest::RestStore;

/// One row, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would duplicate a value in a unique column.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("record store request failed: {0}")]
    Backend(String),

    #[error("unexpected record store response: {0}")]
    Decode(String),

    #[error("invalid table or column name: {0:?}")]
    InvalidIdentifier(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert `record` and return the row as stored.
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;

    /// Fetch the row whose `id_field` equals `id_value`, if any.
    async fn select_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
    ) -> Result<Option<Record>, StoreError>;

    /// Overwrite only the columns in `fields` on the matching row and return the
    /// updated row. `None` means nothing matched and nothing was written.
    async fn update_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
        fields: Record,
    ) -> Result<Option<Record>, StoreError>;
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`, the names that are safe to splice into SQL
/// and REST paths.
pub(crate) fn validate_identifier(ident: &str) -> Result<&str, StoreError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(ident)
    } else {
        Err(StoreError::InvalidIdentifier(ident.to_string()))
    }
}

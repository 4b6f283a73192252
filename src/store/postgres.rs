use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;

use super::{validate_identifier, Record, RecordStore, StoreError};

const CREATE_PATIENT_TABLE: &str = include_str!("../../migrations/0001_create_patient.sql");

/// Direct Postgres access to the same tables the hosted REST API exposes.
///
/// Rows travel as `jsonb`: writes go through `jsonb_populate_record` and reads come
/// back through `to_jsonb`, so the store stays schema-agnostic.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!("✓ Database connected successfully");
        Ok(Self::new(pool))
    }

    /// Create the patient table under `table` if it does not exist yet
    pub async fn run_migrations(&self, table: &str) -> Result<(), StoreError> {
        let sql = CREATE_PATIENT_TABLE.replace("{table}", &quote_ident(table)?);
        self.pool.execute(sql.as_str()).await.map_err(map_sqlx_error)?;

        tracing::info!("✓ Migrations applied for table {}", table);
        Ok(())
    }
}

fn quote_ident(ident: &str) -> Result<String, StoreError> {
    Ok(format!("\"{}\"", validate_identifier(ident)?))
}

fn column_list(record: &Record) -> Result<String, StoreError> {
    if record.is_empty() {
        return Err(StoreError::Backend("no columns to write".to_string()));
    }
    let columns = record
        .keys()
        .map(|key| quote_ident(key))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.join(", "))
}

fn insert_sql(table: &str, record: &Record) -> Result<String, StoreError> {
    let table = quote_ident(table)?;
    let columns = column_list(record)?;
    Ok(format!(
        "INSERT INTO {table} AS t ({columns}) \
         SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
         RETURNING to_jsonb(t.*)"
    ))
}

fn select_sql(table: &str, id_field: &str) -> Result<String, StoreError> {
    Ok(format!(
        "SELECT to_jsonb(t.*) FROM {} AS t WHERE t.{}::text = $1",
        quote_ident(table)?,
        quote_ident(id_field)?
    ))
}

fn update_sql(table: &str, id_field: &str, fields: &Record) -> Result<String, StoreError> {
    let table = quote_ident(table)?;
    let id_field = quote_ident(id_field)?;
    let columns = column_list(fields)?;
    Ok(format!(
        "UPDATE {table} AS t SET ({columns}) = \
         (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) \
         WHERE t.{id_field}::text = $2 \
         RETURNING to_jsonb(t.*)"
    ))
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.message().to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

fn into_record(value: Value) -> Result<Record, StoreError> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(StoreError::Decode(format!("expected a row object, got {}", other))),
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let sql = insert_sql(table, &record)?;
        let row: Value = sqlx::query_scalar(&sql)
            .bind(Value::Object(record))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn select_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let sql = select_sql(table, id_field)?;
        let row: Option<Value> = sqlx::query_scalar(&sql)
            .bind(id_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(into_record).transpose()
    }

    async fn update_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
        fields: Record,
    ) -> Result<Option<Record>, StoreError> {
        let sql = update_sql(table, id_field, &fields)?;
        let row: Option<Value> = sqlx::query_scalar(&sql)
            .bind(Value::Object(fields))
            .bind(id_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(into_record).transpose()
    }
}

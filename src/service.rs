//! Patient record operations on top of the record store.
//!
//! Validation always runs before the store is touched, and credentials are hashed
//! on the blocking pool before they are written.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    fields, CreatePatient, PasswordUpdate, PasswordUpdated, PatientRecord, PatientView,
    UpdatePatient, ValidationError,
};
use crate::security::{CredentialHasher, HashError};
use crate::store::{Record, RecordStore, StoreError};

pub const DEFAULT_PATIENT_TABLE: &str = "Patient";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Patient with ID {0} not found")]
    NotFound(Uuid),

    /// A unique column (such as `email`) already holds the submitted value.
    #[error("{0}")]
    Conflict(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(message) => ServiceError::Conflict(message),
            other => ServiceError::Store(other.to_string()),
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::Malformed(message) => {
                ServiceError::Validation(ValidationError::new(fields::PASSWORD_HASH, message))
            }
            HashError::Hashing(message) => ServiceError::Internal(message),
        }
    }
}

/// CRUD operations for patients. Cheap to clone; the store is shared.
#[derive(Clone)]
pub struct PatientService {
    store: Arc<dyn RecordStore>,
    hasher: CredentialHasher,
    table: String,
}

impl PatientService {
    pub fn new(store: Arc<dyn RecordStore>, hasher: CredentialHasher) -> Self {
        Self {
            store,
            hasher,
            table: DEFAULT_PATIENT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Register a new patient and return its public view.
    pub async fn create(&self, input: CreatePatient) -> Result<PatientView, ServiceError> {
        input.validate()?;

        let password_hash = self.hash_password(input.password.clone()).await?;
        let record = PatientRecord::new(Uuid::new_v4(), input, password_hash).into_record();

        let stored = self.store.insert(&self.table, record).await?;
        let patient = to_view(stored)?;

        tracing::info!("✓ Patient created: {}", patient.patient_id);
        Ok(patient)
    }

    pub async fn get(&self, patient_id: Uuid) -> Result<PatientView, ServiceError> {
        let record = self
            .store
            .select_by_id(&self.table, fields::PATIENT_ID, &patient_id.to_string())
            .await?
            .ok_or(ServiceError::NotFound(patient_id))?;

        to_view(record)
    }

    /// Apply a partial profile update. Only fields present in `input` are written.
    pub async fn update(
        &self,
        patient_id: Uuid,
        input: UpdatePatient,
    ) -> Result<PatientView, ServiceError> {
        let changes = input.into_fields()?;
        let changed: Vec<String> = changes.keys().cloned().collect();

        let record = self
            .store
            .update_by_id(&self.table, fields::PATIENT_ID, &patient_id.to_string(), changes)
            .await?
            .ok_or(ServiceError::NotFound(patient_id))?;

        tracing::info!("✓ Patient updated: {} ({})", patient_id, changed.join(", "));
        to_view(record)
    }

    /// Replace the stored credential. Touches `password_hash` only.
    pub async fn update_password(
        &self,
        patient_id: Uuid,
        input: PasswordUpdate,
    ) -> Result<PasswordUpdated, ServiceError> {
        input.validate()?;

        let password_hash = self.hash_password(input.new_password).await?;
        let mut changes = Record::new();
        changes.insert(
            fields::PASSWORD_HASH.to_string(),
            Value::String(password_hash),
        );

        self.store
            .update_by_id(&self.table, fields::PATIENT_ID, &patient_id.to_string(), changes)
            .await?
            .ok_or(ServiceError::NotFound(patient_id))?;

        tracing::info!("✓ Password updated for patient: {}", patient_id);
        Ok(PasswordUpdated::new(patient_id))
    }

    async fn hash_password(&self, plaintext: String) -> Result<String, ServiceError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| ServiceError::Internal(format!("hashing task failed: {}", e)))??;
        Ok(hash)
    }
}

fn to_view(record: Record) -> Result<PatientView, ServiceError> {
    PatientView::from_record(record)
        .map_err(|e| ServiceError::Store(format!("stored patient record is malformed: {}", e)))
}

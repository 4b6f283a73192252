use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    models::{CreatePatient, PasswordUpdate, PasswordUpdated, PatientView, UpdatePatient},
    AppState,
};

/// `patient_id` path segment, parsed as a UUID.
///
/// Anything unparsable is rejected with 422 before a handler runs.
#[derive(Debug, Clone, Copy)]
pub struct PatientId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PatientId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::unprocessable("patient_id", rejection.body_text()))?;

        Uuid::parse_str(&raw).map(PatientId).map_err(|_| {
            ApiError::unprocessable("patient_id", format!("'{}' is not a valid UUID", raw))
        })
    }
}

/// POST /patients
/// Register a new patient
pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<CreatePatient>, JsonRejection>,
) -> Result<(StatusCode, Json<PatientView>), ApiError> {
    let Json(input) = payload?;
    let patient = state.patients.create(input).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /patients/{patient_id}
/// Retrieve a patient by ID
pub async fn get_patient(
    State(state): State<AppState>,
    PatientId(id): PatientId,
) -> Result<Json<PatientView>, ApiError> {
    let patient = state.patients.get(id).await?;
    Ok(Json(patient))
}

/// PUT /patients/{patient_id}
/// Partially update profile fields; omitted and null fields are kept
pub async fn update_patient(
    State(state): State<AppState>,
    PatientId(id): PatientId,
    payload: Result<Json<UpdatePatient>, JsonRejection>,
) -> Result<Json<PatientView>, ApiError> {
    let Json(input) = payload?;
    let patient = state.patients.update(id, input).await?;
    Ok(Json(patient))
}

/// PUT /patients/{patient_id}/password
/// Replace the patient's password
pub async fn update_password(
    State(state): State<AppState>,
    PatientId(id): PatientId,
    payload: Result<Json<PasswordUpdate>, JsonRejection>,
) -> Result<Json<PasswordUpdated>, ApiError> {
    let Json(input) = payload?;
    let confirmation = state.patients.update_password(id, input).await?;
    Ok(Json(confirmation))
}

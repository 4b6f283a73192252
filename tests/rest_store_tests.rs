//! `RestStore` against a local stand-in for the hosted PostgREST API.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use med_sense_backend::{
    handlers::ApiError,
    models::{CreatePatient, PasswordUpdate, UpdatePatient},
    security::CredentialHasher,
    store::{Record, RecordStore, RestStore, StoreError},
    PatientService, ServiceError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const API_KEY: &str = "test-anon-key";

#[derive(Clone, Default)]
struct Stub {
    rows: Arc<Mutex<Vec<Record>>>,
}

fn check_request(headers: &HeaderMap, table: &str) -> Option<Response> {
    let authorized = headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
        && headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some(format!("Bearer {}", API_KEY).as_str());
    if !authorized {
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Invalid API key"})),
            )
                .into_response(),
        );
    }

    if table != "Patient" {
        return Some(
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "code": "42P01",
                    "message": format!("relation \"public.{}\" does not exist", table),
                    "details": null
                })),
            )
                .into_response(),
        );
    }
    None
}

/// Split a PostgREST `column=eq.value` filter out of the query string.
fn eq_filter(params: &HashMap<String, String>) -> Option<(String, String)> {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != "select")
        .find_map(|(key, value)| {
            value
                .strip_prefix("eq.")
                .map(|v| (key.clone(), v.to_string()))
        })
}

fn matches(row: &Record, filter: &Option<(String, String)>) -> bool {
    match filter {
        Some((column, value)) => row.get(column).and_then(Value::as_str) == Some(value.as_str()),
        None => true,
    }
}

async fn insert_row(
    State(stub): State<Stub>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(row): Json<Record>,
) -> Response {
    if let Some(response) = check_request(&headers, &table) {
        return response;
    }
    assert_eq!(
        headers.get("prefer").and_then(|v| v.to_str().ok()),
        Some("return=representation")
    );

    // The hosted table declares `dob NOT NULL`; PostgREST echoes the whole row back.
    if row.get("dob") == Some(&Value::Null) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "23502",
                "message": "null value in column \"dob\" of relation \"Patient\" violates not-null constraint",
                "details": format!("Failing row contains ({}).", failing_row(&row)),
                "hint": null
            })),
        )
            .into_response();
    }

    let mut rows = stub.rows.lock().unwrap();
    if let Some(existing) = rows.iter().find(|r| r.get("email") == row.get("email")) {
        let email = existing.get("email").and_then(Value::as_str).unwrap_or_default();
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"Patient_email_key\"",
                "details": format!("Key (email)=({}) already exists.", email),
                "hint": null
            })),
        )
            .into_response();
    }
    rows.push(row.clone());
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

fn failing_row(row: &Record) -> String {
    row.values()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

async fn select_rows(
    State(stub): State<Stub>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(response) = check_request(&headers, &table) {
        return response;
    }
    let filter = eq_filter(&params);
    let rows = stub.rows.lock().unwrap();
    let found: Vec<Record> = rows.iter().filter(|r| matches(r, &filter)).cloned().collect();
    Json(found).into_response()
}

async fn update_rows(
    State(stub): State<Stub>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(fields): Json<Record>,
) -> Response {
    if let Some(response) = check_request(&headers, &table) {
        return response;
    }
    let filter = eq_filter(&params);
    let mut rows = stub.rows.lock().unwrap();
    let mut updated = Vec::new();
    for row in rows.iter_mut().filter(|r| matches(r, &filter)) {
        row.extend(fields.clone());
        updated.push(row.clone());
    }
    Json(updated).into_response()
}

async fn spawn_stub() -> (String, Stub) {
    let stub = Stub::default();
    let router = Router::new()
        .route(
            "/rest/v1/:table",
            post(insert_row).get(select_rows).patch(update_rows),
        )
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), stub)
}

fn store(base_url: &str) -> RestStore {
    RestStore::new(base_url, API_KEY, Duration::from_secs(5)).unwrap()
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

#[tokio::test]
async fn test_insert_select_update() {
    let (url, _) = spawn_stub().await;
    let store = store(&url);

    let inserted = store
        .insert(
            "Patient",
            record(json!({"patient_id": "p1", "name": "A", "email": "a@x.com"})),
        )
        .await
        .unwrap();
    assert_eq!(inserted["name"], "A");

    let fetched = store
        .select_by_id("Patient", "patient_id", "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, inserted);

    let updated = store
        .update_by_id("Patient", "patient_id", "p1", record(json!({"name": "Jane"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["name"], "Jane");
    assert_eq!(updated["email"], "a@x.com");
}

#[tokio::test]
async fn test_missing_rows_are_none() {
    let (url, _) = spawn_stub().await;
    let store = store(&url);

    assert!(store
        .select_by_id("Patient", "patient_id", "nope")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .update_by_id("Patient", "patient_id", "nope", record(json!({"name": "Jane"})))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_is_unique_violation() {
    let (url, stub) = spawn_stub().await;
    let store = store(&url);
    let row = json!({"patient_id": "p1", "email": "a@x.com"});

    store.insert("Patient", record(row.clone())).await.unwrap();
    let err = store.insert("Patient", record(row)).await.unwrap_err();

    match err {
        StoreError::UniqueViolation(message) => {
            assert!(message.contains("Patient_email_key"));
            assert!(!message.contains("a@x.com"));
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    assert_eq!(stub.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_backend_errors_forward_message() {
    let (url, _) = spawn_stub().await;

    let err = store(&url)
        .select_by_id("Patients", "patient_id", "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(ref m) if m.contains("does not exist")));

    let bad_key = RestStore::new(url.as_str(), "wrong", Duration::from_secs(5)).unwrap();
    let err = bad_key
        .select_by_id("Patient", "patient_id", "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(ref m) if m.contains("401")));
}

#[tokio::test]
async fn test_unreachable_backend() {
    let store = RestStore::new("http://127.0.0.1:1", API_KEY, Duration::from_secs(2)).unwrap();
    let err = store
        .select_by_id("Patient", "patient_id", "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
}

#[tokio::test]
async fn test_patient_service_over_rest() {
    let (url, stub) = spawn_stub().await;
    let hasher = CredentialHasher::new(8, 1, 1).unwrap();
    let service = PatientService::new(Arc::new(store(&url)), hasher.clone());

    let input: CreatePatient = serde_json::from_value(json!({
        "name": "A",
        "email": "a@x.com",
        "password": "secret1",
        "dob": "1990-01-01"
    }))
    .unwrap();
    let created = service.create(input.clone()).await.unwrap();
    assert_eq!(service.get(created.patient_id).await.unwrap(), created);

    let err = service.create(input).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let update: UpdatePatient = serde_json::from_value(json!({"is_oku": true})).unwrap();
    let updated = service.update(created.patient_id, update).await.unwrap();
    assert!(updated.is_oku);
    assert_eq!(updated.dob, created.dob);

    service
        .update_password(
            created.patient_id,
            PasswordUpdate {
                new_password: "secret2".to_string(),
            },
        )
        .await
        .unwrap();
    let hash = stub.rows.lock().unwrap()[0]["password_hash"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(hasher.verify("secret2", &hash).unwrap());

    let err = service.get(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_constraint_failure_does_not_leak_row() {
    let (url, stub) = spawn_stub().await;
    let service = PatientService::new(
        Arc::new(store(&url)),
        CredentialHasher::new(8, 1, 1).unwrap(),
    );

    let input: CreatePatient = serde_json::from_value(json!({
        "name": "A",
        "email": "a@x.com",
        "password": "secret1"
    }))
    .unwrap();
    let err = service.create(input).await.unwrap_err();

    match &err {
        ServiceError::Store(message) => {
            assert!(message.contains("not-null constraint"));
            assert!(message.contains("23502"));
            assert!(!message.contains("Failing row"));
            assert!(!message.contains("$argon2id$"));
        }
        other => panic!("expected store error, got {other:?}"),
    }

    let api = ApiError::from(err);
    assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!api.body.detail.contains("$argon2id$"));
    assert!(!api.body.detail.contains("a@x.com"));
    assert!(stub.rows.lock().unwrap().is_empty());
}

//! HTTP API for registering patients and managing their profiles and passwords.
//!
//! Persistence is delegated to an external record store (a hosted PostgREST
//! backend, Postgres directly, or an in-process store); this crate owns the
//! request contract, validation and credential hashing.

use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod handlers;
pub mod models;
pub mod security;
pub mod service;
pub mod store;

pub use service::{PatientService, ServiceError};

/// Shared, immutable state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub patients: Arc<PatientService>,
}

impl AppState {
    pub fn new(patients: PatientService) -> Self {
        Self {
            patients: Arc::new(patients),
        }
    }
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/patients", post(handlers::create_patient))
        .route(
            "/patients/:patient_id",
            get(handlers::get_patient).put(handlers::update_patient),
        )
        .route("/patients/:patient_id/password", put(handlers::update_password))
        // Health check
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

use med_sense_backend::{
    app,
    config::{AppConfig, StoreBackend},
    models::fields,
    security::CredentialHasher,
    store::{MemoryStore, PgStore, RecordStore, RestStore},
    AppState, PatientService,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let store: Arc<dyn RecordStore> = match &config.backend {
        StoreBackend::Rest {
            url,
            api_key,
            timeout,
        } => {
            tracing::info!("Using hosted record store at {}", url);
            Arc::new(RestStore::new(url.as_str(), api_key.as_str(), *timeout)?)
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
            run_migrations,
        } => {
            let store = PgStore::connect(database_url, *max_connections).await?;
            if *run_migrations {
                store.run_migrations(&config.patient_table).await?;
            }
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠ Using in-memory record store; data is lost on restart");
            Arc::new(
                MemoryStore::new()
                    .with_unique(config.patient_table.as_str(), &[fields::PATIENT_ID, fields::EMAIL]),
            )
        }
    };

    let hasher = CredentialHasher::new(
        config.hash.memory_kib,
        config.hash.iterations,
        config.hash.parallelism,
    )?;
    let patients = PatientService::new(store, hasher).with_table(config.patient_table.as_str());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("🚀 Server running on http://{}", config.bind_addr);

    axum::serve(listener, app(AppState::new(patients)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("✗ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

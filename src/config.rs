use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::service::DEFAULT_PATIENT_TABLE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where patient records live.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Hosted PostgREST API
    Rest {
        url: String,
        api_key: String,
        timeout: Duration,
    },
    /// Direct Postgres connection
    Postgres {
        database_url: String,
        max_connections: u32,
        run_migrations: bool,
    },
    /// In-process store, lost on restart
    Memory,
}

impl fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Rest { url, timeout, .. } => f
                .debug_struct("Rest")
                .field("url", url)
                .field("api_key", &"<redacted>")
                .field("timeout", timeout)
                .finish(),
            StoreBackend::Postgres {
                max_connections,
                run_migrations,
                ..
            } => f
                .debug_struct("Postgres")
                .field("database_url", &"<redacted>")
                .field("max_connections", max_connections)
                .field("run_migrations", run_migrations)
                .finish(),
            StoreBackend::Memory => f.write_str("Memory"),
        }
    }
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub patient_table: String,
    pub backend: StoreBackend,
    pub hash: HashConfig,
}

impl AppConfig {
    /// Read configuration from environment variables with fallbacks
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?;
        let patient_table =
            lookup("PATIENT_TABLE").unwrap_or_else(|| DEFAULT_PATIENT_TABLE.to_string());

        let backend_name = lookup("STORE_BACKEND").unwrap_or_else(|| "rest".to_string());
        let backend = match backend_name.to_ascii_lowercase().as_str() {
            "rest" => StoreBackend::Rest {
                url: required("SUPABASE_URL")?,
                api_key: required("SUPABASE_KEY")?,
                timeout: Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 10)?),
            },
            "postgres" => StoreBackend::Postgres {
                database_url: required("DATABASE_URL")?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
                run_migrations: parse_or(&lookup, "DB_RUN_MIGRATIONS", false)?,
            },
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: backend_name,
                })
            }
        };

        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: parse_or(&lookup, "HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&lookup, "HASH_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            bind_addr,
            patient_table,
            backend,
            hash,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

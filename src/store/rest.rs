use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::{validate_identifier, Record, RecordStore, StoreError};

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Client for a hosted PostgREST endpoint (`{base_url}/rest/v1/{table}`).
///
/// The API key is sent both as `apikey` and as a bearer token, which is what hosted
/// backends built on PostgREST expect for anonymous and service-role keys alike.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Error body returned by PostgREST.
///
/// `details` and `hint` are not read: for constraint failures `details` echoes the
/// whole failing row, stored credentials included.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> Result<String, StoreError> {
        Ok(format!("{}/rest/v1/{}", self.base_url, validate_identifier(table)?))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<Record>, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows(response).await
    }
}

impl fmt::Debug for RestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Decode a PostgREST response into rows, classifying failures.
async fn rows(response: Response) -> Result<Vec<Record>, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Vec<Record>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();

    let message = match &parsed {
        Some(ApiErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("{} [{}]", message, code),
        Some(ApiErrorBody {
            message: Some(message),
            ..
        }) => message.clone(),
        _ => status.to_string(),
    };

    let is_unique = status == StatusCode::CONFLICT
        || parsed.as_ref().and_then(|p| p.code.as_deref()) == Some(UNIQUE_VIOLATION);

    if is_unique {
        Err(StoreError::UniqueViolation(message))
    } else {
        tracing::warn!("Record store returned {}: {}", status, message);
        Err(StoreError::Backend(format!("{}: {}", status, message)))
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let request = self
            .request(Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&record);

        self.send(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))
    }

    async fn select_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let filter = format!("eq.{}", id_value);
        let request = self
            .request(Method::GET, self.table_url(table)?)
            .query(&[(validate_identifier(id_field)?, filter.as_str()), ("select", "*")]);

        Ok(self.send(request).await?.into_iter().next())
    }

    async fn update_by_id(
        &self,
        table: &str,
        id_field: &str,
        id_value: &str,
        fields: Record,
    ) -> Result<Option<Record>, StoreError> {
        for column in fields.keys() {
            validate_identifier(column)?;
        }

        let filter = format!("eq.{}", id_value);
        let request = self
            .request(Method::PATCH, self.table_url(table)?)
            .query(&[(validate_identifier(id_field)?, filter.as_str())])
            .header("Prefer", "return=representation")
            .json(&fields);

        Ok(self.send(request).await?.into_iter().next())
    }
}

//! Permission store backed by an OpenFGA server over its HTTP API.
//!
//! Only the read, check and write endpoints are used. OpenFGA's own
//! continuation tokens are passed through untouched, so callers can treat
//! them exactly like the memory backend's cursors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    PaginatedResult, PaginationOptions, PermissionStore, StoredTuple, TupleFilter,
};

/// Connection settings for an OpenFGA store.
#[derive(Debug, Clone)]
pub struct OpenFgaConfig {
    /// Base URL of the OpenFGA HTTP API, e.g. `http://localhost:8080`.
    pub api_url: String,
    pub store_id: String,
    /// Model to evaluate against; the store's latest model when unset.
    pub authorization_model_id: Option<String>,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl OpenFgaConfig {
    pub fn new(api_url: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            store_id: store_id.into(),
            authorization_model_id: None,
            api_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct TupleKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relation: Option<String>,
    object: String,
}

#[derive(Debug, Serialize)]
struct ReadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    tuple_key: Option<TupleKey>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    tuples: Vec<ReadTuple>,
    #[serde(default)]
    continuation_token: String,
}

#[derive(Debug, Deserialize)]
struct ReadTuple {
    key: WireTupleKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTupleKey {
    user: String,
    relation: String,
    object: String,
}

impl From<&StoredTuple> for WireTupleKey {
    fn from(tuple: &StoredTuple) -> Self {
        Self {
            user: tuple.user(),
            relation: tuple.relation.clone(),
            object: tuple.object(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    tuple_key: CheckTupleKey<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CheckTupleKey<'a> {
    user: &'a str,
    relation: &'a str,
    object: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct TupleKeys {
    tuple_keys: Vec<WireTupleKey>,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// [`PermissionStore`] talking to OpenFGA.
#[derive(Debug, Clone)]
pub struct OpenFgaStore {
    client: Client,
    config: OpenFgaConfig,
}

impl OpenFgaStore {
    /// Builds the HTTP client. Fails only if the TLS backend cannot initialise.
    pub fn new(config: OpenFgaConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::ConnectionError {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenFgaConfig {
        &self.config
    }

    fn store_url(&self, suffix: &str) -> String {
        format!(
            "{}/stores/{}{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.store_id,
            suffix
        )
    }

    async fn post<B, R>(&self, operation: &str, suffix: &str, body: &B) -> StorageResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.post(self.store_url(suffix)).json(body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(map_status_error(status, body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| StorageError::SerializationError {
                message: format!("{operation}: failed to decode response: {e}"),
            })
    }
}

fn map_transport_error(operation: &str, err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout {
            operation: operation.to_string(),
        }
    } else if err.is_connect() {
        StorageError::ConnectionError {
            message: err.to_string(),
        }
    } else {
        StorageError::QueryError {
            message: format!("{operation}: {err}"),
        }
    }
}

fn map_status_error(status: StatusCode, body: ErrorBody) -> StorageError {
    let message = if body.message.is_empty() {
        format!("upstream returned {status}")
    } else {
        body.message
    };
    match status {
        StatusCode::BAD_REQUEST if body.code == "invalid_continuation_token" => {
            StorageError::InvalidContinuationToken { message }
        }
        s if s.is_client_error() => StorageError::InvalidInput { message },
        _ => StorageError::QueryError { message },
    }
}

/// Converts a [`TupleFilter`] into OpenFGA's read key.
///
/// OpenFGA requires an object type whenever any key field is set.
fn read_key(filter: &TupleFilter) -> StorageResult<Option<TupleKey>> {
    let Some(object_type) = &filter.object_type else {
        if filter.relation.is_some() || filter.user.is_some() || filter.object_id.is_some() {
            return Err(StorageError::InvalidInput {
                message: "filtering by relation or user requires object_type".to_string(),
            });
        }
        return Ok(None);
    };
    let object = match &filter.object_id {
        Some(id) => format!("{object_type}:{id}"),
        None => format!("{object_type}:"),
    };
    Ok(Some(TupleKey {
        user: filter.user.clone(),
        relation: filter.relation.clone(),
        object,
    }))
}

#[async_trait]
impl PermissionStore for OpenFgaStore {
    fn backend_name(&self) -> &'static str {
        "openfga"
    }

    async fn check(&self, user: &str, relation: &str, object: &str) -> StorageResult<bool> {
        let body = CheckRequest {
            tuple_key: CheckTupleKey {
                user,
                relation,
                object,
            },
            authorization_model_id: self.config.authorization_model_id.as_deref(),
        };
        let response: CheckResponse = self.post("check", "/check", &body).await?;
        Ok(response.allowed)
    }

    #[instrument(skip(self), fields(object_type = ?filter.object_type))]
    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>> {
        let body = ReadRequest {
            tuple_key: read_key(filter)?,
            page_size: pagination.effective_page_size() as u32,
            continuation_token: pagination
                .continuation_token
                .clone()
                .filter(|t| !t.is_empty()),
        };
        let response: ReadResponse = self.post("read", "/read", &body).await?;

        let mut items = Vec::with_capacity(response.tuples.len());
        for tuple in response.tuples {
            match StoredTuple::parse(&tuple.key.user, &tuple.key.relation, &tuple.key.object) {
                Ok(parsed) => items.push(parsed),
                Err(e) => warn!(error = %e, object = %tuple.key.object, "Skipping malformed tuple from OpenFGA"),
            }
        }
        debug!(count = items.len(), "Read tuples from OpenFGA");

        Ok(PaginatedResult {
            items,
            continuation_token: Some(response.continuation_token).filter(|t| !t.is_empty()),
        })
    }

    async fn write_tuples(
        &self,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        if writes.is_empty() && deletes.is_empty() {
            return Ok(());
        }
        let section = |tuples: &[StoredTuple]| {
            (!tuples.is_empty()).then(|| TupleKeys {
                tuple_keys: tuples.iter().map(WireTupleKey::from).collect(),
            })
        };
        let body = WriteRequest {
            writes: section(writes.as_slice()),
            deletes: section(deletes.as_slice()),
            authorization_model_id: self.config.authorization_model_id.as_deref(),
        };
        let _: serde_json::Value = self.post("write", "/write", &body).await?;
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        let mut request = self.client.get(self.store_url(""));
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error("health_check", e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            Err(map_status_error(status, body))
        }
    }
}

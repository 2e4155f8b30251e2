use async_trait::async_trait;
use ingestwatch_engine::{CollaboratorError, CollaboratorResult, ConfigError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const KUSTO_URI_ENV: &str = "INGESTWATCH_KUSTO_URI";
pub const KUSTO_TOKEN_ENV: &str = "INGESTWATCH_KUSTO_TOKEN";
pub const KUSTO_TIMEOUT_ENV: &str = "INGESTWATCH_KUSTO_TIMEOUT_SECONDS";
pub const DEFAULT_KUSTO_TIMEOUT: Duration = Duration::from_secs(30);

const QUERY_PATH: &str = "/v1/rest/query";
const MANAGEMENT_PATH: &str = "/v1/rest/mgmt";
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Body of a v1 REST query or management response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KustoResponse {
    #[serde(default)]
    pub tables: Vec<KustoTable>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KustoTable {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<KustoColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KustoColumn {
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

impl KustoResponse {
    /// The primary result table. v1 responses put it first.
    pub fn primary(&self) -> CollaboratorResult<&KustoTable> {
        self.tables
            .first()
            .ok_or_else(|| CollaboratorError::Decode("response has no tables".to_string()))
    }
}

impl KustoTable {
    pub fn column_index(&self, column: &str) -> CollaboratorResult<usize> {
        self.columns
            .iter()
            .position(|candidate| candidate.column_name == column)
            .ok_or_else(|| CollaboratorError::Decode(format!("missing column '{column}'")))
    }

    /// Value of `column` in the first row; `None` when the table has no rows.
    pub fn first_value(&self, column: &str) -> CollaboratorResult<Option<&Value>> {
        let index = self.column_index(column)?;
        let Some(row) = self.rows.first() else {
            return Ok(None);
        };
        row.get(index).map(Some).ok_or_else(|| {
            CollaboratorError::Decode(format!("row is shorter than column '{column}'"))
        })
    }

    /// First-row `column` as a non-negative count; null or no rows read as `None`.
    pub fn first_count(&self, column: &str) -> CollaboratorResult<Option<u64>> {
        match self.first_value(column)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value_as_count(value, column).map(Some),
        }
    }
}

fn value_as_count(value: &Value, column: &str) -> CollaboratorResult<u64> {
    let invalid = || CollaboratorError::Decode(format!("column '{column}' is not a count: {value}"));
    match value {
        Value::Number(number) => {
            if let Some(count) = number.as_u64() {
                return Ok(count);
            }
            match number.as_f64() {
                Some(real) if real >= 0.0 && real.fract() == 0.0 && real <= u64::MAX as f64 => {
                    Ok(real as u64)
                }
                _ => Err(invalid()),
            }
        }
        Value::String(text) => text.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[async_trait]
pub trait KustoQueryClient: Send + Sync {
    /// Runs a query (`/v1/rest/query`) against `database`.
    async fn query(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse>;

    /// Runs a control command (`/v1/rest/mgmt`) against `database`.
    async fn management(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse>;
}

#[async_trait]
impl<T: KustoQueryClient + ?Sized> KustoQueryClient for Arc<T> {
    async fn query(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        (**self).query(database, csl).await
    }

    async fn management(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        (**self).management(database, csl).await
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct KustoSettings {
    pub cluster_uri: String,
    /// Bearer token passed through as-is; acquiring it is the caller's job.
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for KustoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KustoSettings")
            .field("cluster_uri", &self.cluster_uri)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KustoSettings {
    pub fn new(cluster_uri: impl Into<String>) -> Self {
        Self {
            cluster_uri: cluster_uri.into(),
            access_token: None,
            timeout: DEFAULT_KUSTO_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cluster_uri = non_blank(lookup(KUSTO_URI_ENV))
            .ok_or_else(|| ConfigError::Invalid(format!("{KUSTO_URI_ENV} is required")))?;
        let timeout = match non_blank(lookup(KUSTO_TIMEOUT_ENV)) {
            None => DEFAULT_KUSTO_TIMEOUT,
            Some(raw) => parse_timeout_seconds(KUSTO_TIMEOUT_ENV, &raw)?,
        };
        Ok(Self {
            cluster_uri,
            access_token: non_blank(lookup(KUSTO_TOKEN_ENV)),
            timeout,
        })
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_timeout_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let seconds = raw.parse::<i64>().map_err(|_| ConfigError::Unparsable {
        key,
        value: raw.to_string(),
    })?;
    if seconds <= 0 {
        return Err(ConfigError::NotPositive {
            field: key,
            value: seconds,
        });
    }
    Ok(Duration::from_secs(seconds.unsigned_abs()))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn truncate_body(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Maps an HTTP status and body to a decoded response.
pub fn response_from_body(status: reqwest::StatusCode, body: &str) -> CollaboratorResult<KustoResponse> {
    if !status.is_success() {
        return Err(CollaboratorError::Rejected {
            status: status.as_u16(),
            message: truncate_body(body),
        });
    }
    serde_json::from_str(body)
        .map_err(|err| CollaboratorError::Decode(format!("http json decode failed: {err}")))
}

#[derive(Clone, Debug)]
pub struct ReqwestKustoClient {
    client: reqwest::Client,
    cluster_uri: String,
    access_token: Option<String>,
}

impl ReqwestKustoClient {
    pub fn new(settings: &KustoSettings) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| CollaboratorError::InvalidInput(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
            cluster_uri: settings.cluster_uri.clone(),
            access_token: settings.access_token.clone(),
        })
    }

    pub fn cluster_uri(&self) -> &str {
        &self.cluster_uri
    }

    async fn execute(
        &self,
        path: &str,
        database: &str,
        csl: &str,
    ) -> CollaboratorResult<KustoResponse> {
        let request_id = format!("ingestwatch;{}", uuid::Uuid::new_v4());
        tracing::debug!(%request_id, database, path, "kusto request");

        let mut request = self
            .client
            .post(endpoint(&self.cluster_uri, path))
            .header(CLIENT_REQUEST_ID_HEADER, &request_id)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "db": database, "csl": csl }));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            CollaboratorError::Unavailable(format!("http post failed: {err}"))
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            CollaboratorError::Unavailable(format!("http read body failed: {err}"))
        })?;
        response_from_body(status, &text).inspect_err(|error| {
            tracing::warn!(%request_id, error = %error, "kusto request failed");
        })
    }
}

#[async_trait]
impl KustoQueryClient for ReqwestKustoClient {
    async fn query(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        self.execute(QUERY_PATH, database, csl).await
    }

    async fn management(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        self.execute(MANAGEMENT_PATH, database, csl).await
    }
}

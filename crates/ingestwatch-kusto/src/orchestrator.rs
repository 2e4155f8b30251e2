use crate::client::{endpoint, non_blank, parse_timeout_seconds, truncate_body};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingestwatch_engine::{
    CollaboratorError, CollaboratorResult, ConfigError, EndTimeProvider, RunRef,
};
use serde::Deserialize;
use std::time::Duration;

pub const ORCHESTRATOR_URL_ENV: &str = "INGESTWATCH_ORCHESTRATOR_URL";
pub const ORCHESTRATOR_TOKEN_ENV: &str = "INGESTWATCH_ORCHESTRATOR_TOKEN";
pub const ORCHESTRATOR_TIMEOUT_ENV: &str = "INGESTWATCH_ORCHESTRATOR_TIMEOUT_SECONDS";
pub const DEFAULT_ORCHESTRATOR_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RUN_STATUS_PATH: &str =
    "/organizations/{organization_id}/workspaces/{workspace_id}/runs/{run_id}/status";

#[derive(Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub base_url: String,
    pub access_token: Option<String>,
    /// Path with `{organization_id}`, `{workspace_id}` and `{run_id}` placeholders.
    pub status_path: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OrchestratorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorSettings")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("status_path", &self.status_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OrchestratorSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
            status_path: DEFAULT_RUN_STATUS_PATH.to_string(),
            timeout: DEFAULT_ORCHESTRATOR_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_blank(lookup(ORCHESTRATOR_URL_ENV))
            .ok_or_else(|| ConfigError::Invalid(format!("{ORCHESTRATOR_URL_ENV} is required")))?;
        let timeout = match non_blank(lookup(ORCHESTRATOR_TIMEOUT_ENV)) {
            None => DEFAULT_ORCHESTRATOR_TIMEOUT,
            Some(raw) => parse_timeout_seconds(ORCHESTRATOR_TIMEOUT_ENV, &raw)?,
        };
        Ok(Self {
            access_token: non_blank(lookup(ORCHESTRATOR_TOKEN_ENV)),
            timeout,
            ..Self::new(base_url)
        })
    }

    pub fn status_path_for(&self, run: &RunRef) -> String {
        self.status_path
            .replace("{organization_id}", &run.organization_id)
            .replace("{workspace_id}", &run.workspace_id)
            .replace("{run_id}", &run.run_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunStatusBody {
    #[serde(default)]
    end_time: Option<String>,
}

/// Parses a run status body. A missing, null or blank `endTime` means the run
/// has not ended yet.
pub fn parse_end_time(body: &str) -> CollaboratorResult<Option<DateTime<Utc>>> {
    let status: RunStatusBody = serde_json::from_str(body)
        .map_err(|err| CollaboratorError::Decode(format!("run status decode failed: {err}")))?;
    let Some(raw) = status.end_time.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|err| CollaboratorError::Decode(format!("invalid endTime '{raw}': {err}")))
}

/// Maps a run status response: 404 means the run is not known yet, any other
/// non-success status is a rejection.
pub fn end_time_from_response(
    status: reqwest::StatusCode,
    body: &str,
) -> CollaboratorResult<Option<DateTime<Utc>>> {
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(CollaboratorError::Rejected {
            status: status.as_u16(),
            message: truncate_body(body),
        });
    }
    parse_end_time(body)
}

/// Reads run end times from the orchestration service's run status endpoint.
#[derive(Clone, Debug)]
pub struct HttpEndTimeProvider {
    client: reqwest::Client,
    settings: OrchestratorSettings,
}

impl HttpEndTimeProvider {
    pub fn new(settings: OrchestratorSettings) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| CollaboratorError::InvalidInput(format!("http client build failed: {err}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }
}

#[async_trait]
impl EndTimeProvider for HttpEndTimeProvider {
    async fn resolve_end_time(&self, run: &RunRef) -> CollaboratorResult<Option<DateTime<Utc>>> {
        let url = endpoint(&self.settings.base_url, &self.settings.status_path_for(run));
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.settings.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            CollaboratorError::Unavailable(format!("http get failed: {err}"))
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            CollaboratorError::Unavailable(format!("http read body failed: {err}"))
        })?;
        let end_time = end_time_from_response(status, &text).inspect_err(|error| {
            tracing::warn!(run_id = %run.run_id, error = %error, "run status lookup failed");
        })?;
        tracing::debug!(run_id = %run.run_id, ?end_time, "run end time resolved");
        Ok(end_time)
    }
}

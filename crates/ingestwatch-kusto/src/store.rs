use crate::client::KustoQueryClient;
use chrono::{DateTime, SecondsFormat, Utc};
use ingestwatch_engine::{
    CollaboratorError, CollaboratorResult, FailureLogStore, MessageCountStore, database_name,
};
use serde::{Deserialize, Serialize};

/// Database that answers cluster-level diagnostics.
pub const DEFAULT_DATABASE_NAME: &str = "NetDefaultDB";
pub const HEALTH_COMMAND: &str = ".show diagnostics | project IsHealthy";

const SENT_COLUMN: &str = "SentMessagesTotal";
const COUNT_COLUMN: &str = "Count";
const HEALTHY_COLUMN: &str = "IsHealthy";

/// Quotes `value` as a KQL single-quoted string literal.
pub fn kql_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

pub fn kql_datetime(at: DateTime<Utc>) -> String {
    format!("datetime({})", at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub fn sent_messages_query(simulation_id: &str) -> String {
    format!(
        "ControlPlane | where SimulationRun == {} | summarize {SENT_COLUMN} = sum({SENT_COLUMN})",
        kql_string(simulation_id)
    )
}

pub fn landed_measures_query(simulation_id: &str) -> String {
    format!(
        "ProbesMeasures | where SimulationRun == {} | count",
        kql_string(simulation_id)
    )
}

pub fn ingestion_failures_command(
    database: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        ".show ingestion failures | where Database == {} and FailedOn between ({} .. {}) | count",
        kql_string(database),
        kql_datetime(start),
        kql_datetime(end)
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum StoreHealth {
    Up,
    Down { reason: String },
}

impl StoreHealth {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Sent/landed counters and the ingestion-failure log, read from a Kusto cluster.
///
/// Each organization/workspace pair lives in its own database, named
/// `{organization_id}-{workspace_id}`.
#[derive(Clone, Debug)]
pub struct KustoIngestionStore<Q> {
    client: Q,
}

impl<Q> KustoIngestionStore<Q> {
    pub fn new(client: Q) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Q {
        &self.client
    }
}

impl<Q: KustoQueryClient> KustoIngestionStore<Q> {
    async fn query_count(&self, database: &str, csl: &str, column: &str) -> CollaboratorResult<u64> {
        let response = self.client.query(database, csl).await?;
        Ok(response.primary()?.first_count(column)?.unwrap_or(0))
    }

    /// Probes cluster diagnostics. Any error is reported as `Down`, never propagated.
    pub async fn health(&self) -> StoreHealth {
        let response = match self
            .client
            .management(DEFAULT_DATABASE_NAME, HEALTH_COMMAND)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(error = %error, "kusto health probe failed");
                return StoreHealth::Down {
                    reason: error.to_string(),
                };
            }
        };
        health_from_response(&response)
    }
}

fn health_from_response(response: &crate::client::KustoResponse) -> StoreHealth {
    let healthy = response.primary().and_then(|table| {
        match table.first_value(HEALTHY_COLUMN)? {
            Some(serde_json::Value::Bool(flag)) => Ok(Some(u64::from(*flag))),
            _ => table.first_count(HEALTHY_COLUMN),
        }
    });
    match healthy {
        Ok(Some(1)) => StoreHealth::Up,
        Ok(Some(flag)) => StoreHealth::Down {
            reason: format!("cluster reports {HEALTHY_COLUMN}={flag}"),
        },
        Ok(None) => StoreHealth::Down {
            reason: "diagnostics returned no rows".to_string(),
        },
        Err(error) => StoreHealth::Down {
            reason: error.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl<Q: KustoQueryClient> MessageCountStore for KustoIngestionStore<Q> {
    async fn count_sent(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        let database = database_name(organization_id, workspace_id);
        let sent = self
            .query_count(&database, &sent_messages_query(simulation_id), SENT_COLUMN)
            .await?;
        tracing::debug!(%database, simulation_id, sent, "sent messages counted");
        Ok(sent)
    }

    async fn count_landed(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        let database = database_name(organization_id, workspace_id);
        let landed = self
            .query_count(&database, &landed_measures_query(simulation_id), COUNT_COLUMN)
            .await?;
        tracing::debug!(%database, simulation_id, landed, "landed measures counted");
        Ok(landed)
    }
}

#[async_trait::async_trait]
impl<Q: KustoQueryClient> FailureLogStore for KustoIngestionStore<Q> {
    async fn any_failure_in_window(
        &self,
        organization_id: &str,
        workspace_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollaboratorResult<bool> {
        if end < start {
            return Err(CollaboratorError::InvalidInput(format!(
                "failure window ends before it starts: {start} .. {end}"
            )));
        }
        let database = database_name(organization_id, workspace_id);
        let command = ingestion_failures_command(&database, start, end);
        let response = self.client.management(&database, &command).await?;
        let failures = response.primary()?.first_count(COUNT_COLUMN)?.unwrap_or(0);
        tracing::debug!(%database, failures, "ingestion failures counted");
        Ok(failures > 0)
    }
}

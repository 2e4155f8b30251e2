use crate::client::{KustoColumn, KustoQueryClient, KustoResponse, KustoTable};
use async_trait::async_trait;
use ingestwatch_engine::{CollaboratorError, CollaboratorResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum KustoEndpoint {
    Query,
    Management,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedKustoRequest {
    pub endpoint: KustoEndpoint,
    pub database: String,
    pub csl: String,
}

/// Kusto client that answers from canned responses keyed by exact command text.
///
/// Unscripted commands are rejected with status 400, so a query built with
/// the wrong text fails loudly instead of reading as zero.
#[derive(Clone, Debug, Default)]
pub struct ScriptedKustoClient {
    inner: Arc<Mutex<ScriptedState>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    responses: BTreeMap<(KustoEndpoint, String), CollaboratorResult<KustoResponse>>,
    requests: Vec<RecordedKustoRequest>,
}

impl ScriptedKustoClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_query(&self, csl: impl Into<String>, response: CollaboratorResult<KustoResponse>) {
        self.script(KustoEndpoint::Query, csl.into(), response);
    }

    pub fn script_management(
        &self,
        csl: impl Into<String>,
        response: CollaboratorResult<KustoResponse>,
    ) {
        self.script(KustoEndpoint::Management, csl.into(), response);
    }

    pub fn requests(&self) -> Vec<RecordedKustoRequest> {
        self.inner
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    fn script(&self, endpoint: KustoEndpoint, csl: String, response: CollaboratorResult<KustoResponse>) {
        if let Ok(mut state) = self.inner.lock() {
            state.responses.insert((endpoint, csl), response);
        }
    }

    fn answer(
        &self,
        endpoint: KustoEndpoint,
        database: &str,
        csl: &str,
    ) -> CollaboratorResult<KustoResponse> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("scripted client mutex poisoned".to_string()))?;
        state.requests.push(RecordedKustoRequest {
            endpoint,
            database: database.to_string(),
            csl: csl.to_string(),
        });
        state
            .responses
            .get(&(endpoint, csl.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                Err(CollaboratorError::Rejected {
                    status: 400,
                    message: format!("no scripted response for {endpoint:?}: {csl}"),
                })
            })
    }
}

#[async_trait]
impl KustoQueryClient for ScriptedKustoClient {
    async fn query(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        self.answer(KustoEndpoint::Query, database, csl)
    }

    async fn management(&self, database: &str, csl: &str) -> CollaboratorResult<KustoResponse> {
        self.answer(KustoEndpoint::Management, database, csl)
    }
}

/// Single-table response with one column and the given rows.
pub fn single_column_response(column: &str, rows: Vec<Value>) -> KustoResponse {
    KustoResponse {
        tables: vec![KustoTable {
            table_name: "Table_0".to_string(),
            columns: vec![KustoColumn {
                column_name: column.to_string(),
                data_type: None,
                column_type: None,
            }],
            rows: rows.into_iter().map(|value| vec![value]).collect(),
        }],
    }
}

pub fn scalar_response(column: &str, value: Value) -> KustoResponse {
    single_column_response(column, vec![value])
}

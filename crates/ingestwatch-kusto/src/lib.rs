#![doc = r#"
Kusto and orchestration adapters for the ingestion completeness engine.

Collaborator mapping:

| Engine trait | Adapter | Remote call |
| --- | --- | --- |
| `MessageCountStore::count_sent` | `KustoIngestionStore` | `POST /v1/rest/query` on `ControlPlane` |
| `MessageCountStore::count_landed` | `KustoIngestionStore` | `POST /v1/rest/query` on `ProbesMeasures` |
| `FailureLogStore::any_failure_in_window` | `KustoIngestionStore` | `POST /v1/rest/mgmt` `.show ingestion failures` |
| `EndTimeProvider::resolve_end_time` | `HttpEndTimeProvider` | `GET {orchestrator}/organizations/.../runs/{run_id}/status` |
| (health probe) | `KustoIngestionStore::health` | `POST /v1/rest/mgmt` `.show diagnostics` on `NetDefaultDB` |

Implementation notes:
- Every query targets the database `{organization_id}-{workspace_id}`.
- String literals embedded in KQL are escaped; simulation ids never reach the cluster unquoted.
- Tokens are passed through verbatim as bearer credentials; acquiring them is out of scope.
"#]

pub mod client;
pub mod orchestrator;
pub mod store;
pub mod testing;

pub use client::{
    DEFAULT_KUSTO_TIMEOUT, KUSTO_TIMEOUT_ENV, KUSTO_TOKEN_ENV, KUSTO_URI_ENV, KustoColumn,
    KustoQueryClient, KustoResponse, KustoSettings, KustoTable, ReqwestKustoClient,
    response_from_body,
};
pub use orchestrator::{
    DEFAULT_ORCHESTRATOR_TIMEOUT, DEFAULT_RUN_STATUS_PATH, HttpEndTimeProvider,
    ORCHESTRATOR_TIMEOUT_ENV, ORCHESTRATOR_TOKEN_ENV, ORCHESTRATOR_URL_ENV, OrchestratorSettings,
    end_time_from_response, parse_end_time,
};
pub use store::{
    DEFAULT_DATABASE_NAME, HEALTH_COMMAND, KustoIngestionStore, StoreHealth,
    ingestion_failures_command, kql_datetime, kql_string, landed_measures_query,
    sent_messages_query,
};
pub use testing::ScriptedKustoClient;

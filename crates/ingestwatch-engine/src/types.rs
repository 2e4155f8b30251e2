use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type OrganizationId = String;
pub type WorkspaceId = String;
pub type RunId = String;
pub type SimulationId = String;

/// Identity of a run: every query made on its behalf is scoped by this triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    pub organization_id: OrganizationId,
    pub workspace_id: WorkspaceId,
    pub run_id: RunId,
}

impl RunRef {
    pub fn new(
        organization_id: impl Into<String>,
        workspace_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            workspace_id: workspace_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Analytical store database holding this run's organization/workspace data.
    pub fn database_name(&self) -> String {
        database_name(&self.organization_id, &self.workspace_id)
    }
}

pub fn database_name(organization_id: &str, workspace_id: &str) -> String {
    format!("{organization_id}-{workspace_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestionState {
    Unknown,
    InProgress,
    Successful,
    Failure,
}

impl IngestionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::InProgress => "InProgress",
            Self::Successful => "Successful",
            Self::Failure => "Failure",
        }
    }

    /// A terminal verdict will not change on later polls for the same simulation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failure)
    }
}

impl std::fmt::Display for IngestionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentReason {
    EndTimeUnknown,
    Settling,
    AllLanded,
    AwaitingFirstMessage,
    NoDataTimeout,
    IngestionFailureLogged,
    CatchingUp,
}

impl AssessmentReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndTimeUnknown => "end_time_unknown",
            Self::Settling => "settling",
            Self::AllLanded => "all_landed",
            Self::AwaitingFirstMessage => "awaiting_first_message",
            Self::NoDataTimeout => "no_data_timeout",
            Self::IngestionFailureLogged => "ingestion_failure_logged",
            Self::CatchingUp => "catching_up",
        }
    }

    pub fn state(self) -> IngestionState {
        match self {
            Self::EndTimeUnknown => IngestionState::Unknown,
            Self::Settling | Self::AwaitingFirstMessage | Self::CatchingUp => {
                IngestionState::InProgress
            }
            Self::AllLanded => IngestionState::Successful,
            Self::NoDataTimeout | Self::IngestionFailureLogged => IngestionState::Failure,
        }
    }
}

/// Snapshot of one evaluation: the verdict plus every signal it was derived from.
///
/// Fields are `None` when the evaluation stopped before reading that signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestionAssessment {
    pub run: RunRef,
    pub simulation_id: SimulationId,
    pub state: IngestionState,
    pub reason: AssessmentReason,
    pub evaluated_at: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<i64>,
    pub sent_count: Option<u64>,
    pub landed_count: Option<u64>,
    pub failure_logged: Option<bool>,
}

impl IngestionAssessment {
    pub(crate) fn new(
        run: &RunRef,
        simulation_id: &str,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run: run.clone(),
            simulation_id: simulation_id.to_string(),
            state: IngestionState::Unknown,
            reason: AssessmentReason::EndTimeUnknown,
            evaluated_at,
            end_time: None,
            elapsed_seconds: None,
            sent_count: None,
            landed_count: None,
            failure_logged: None,
        }
    }

    pub(crate) fn conclude(mut self, reason: AssessmentReason) -> Self {
        self.reason = reason;
        self.state = reason.state();
        self
    }
}

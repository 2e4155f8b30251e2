use crate::types::RunRef;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Failure reported by an adapter when it could not answer a read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Operational error from a state check. Never a verdict: the caller could not ask.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("run end time lookup failed: {0}")]
    EndTime(#[source] CollaboratorError),

    #[error("sent message count query failed: {0}")]
    SentCount(#[source] CollaboratorError),

    #[error("landed measure count query failed: {0}")]
    LandedCount(#[source] CollaboratorError),

    #[error("ingestion failure log query failed: {0}")]
    FailureLog(#[source] CollaboratorError),
}

impl StateError {
    pub fn collaborator(&self) -> &'static str {
        match self {
            Self::EndTime(_) => "end_time",
            Self::SentCount(_) => "sent_count",
            Self::LandedCount(_) => "landed_count",
            Self::FailureLog(_) => "failure_log",
        }
    }

    pub fn source_error(&self) -> &CollaboratorError {
        match self {
            Self::EndTime(error)
            | Self::SentCount(error)
            | Self::LandedCount(error)
            | Self::FailureLog(error) => error,
        }
    }
}

#[async_trait::async_trait]
pub trait EndTimeProvider: Send + Sync {
    /// `None` while the run has not finished, or its completion is not yet known.
    async fn resolve_end_time(&self, run: &RunRef) -> CollaboratorResult<Option<DateTime<Utc>>>;
}

#[async_trait::async_trait]
pub trait MessageCountStore: Send + Sync {
    async fn count_sent(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64>;

    async fn count_landed(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64>;
}

#[async_trait::async_trait]
pub trait FailureLogStore: Send + Sync {
    /// Whether any ingestion failure was logged in `[start, end]`.
    async fn any_failure_in_window(
        &self,
        organization_id: &str,
        workspace_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollaboratorResult<bool>;
}

#[async_trait::async_trait]
impl<T: EndTimeProvider + ?Sized> EndTimeProvider for Arc<T> {
    async fn resolve_end_time(&self, run: &RunRef) -> CollaboratorResult<Option<DateTime<Utc>>> {
        (**self).resolve_end_time(run).await
    }
}

#[async_trait::async_trait]
impl<T: MessageCountStore + ?Sized> MessageCountStore for Arc<T> {
    async fn count_sent(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        (**self)
            .count_sent(organization_id, workspace_id, simulation_id)
            .await
    }

    async fn count_landed(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        (**self)
            .count_landed(organization_id, workspace_id, simulation_id)
            .await
    }
}

#[async_trait::async_trait]
impl<T: FailureLogStore + ?Sized> FailureLogStore for Arc<T> {
    async fn any_failure_in_window(
        &self,
        organization_id: &str,
        workspace_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollaboratorResult<bool> {
        (**self)
            .any_failure_in_window(organization_id, workspace_id, start, end)
            .await
    }
}

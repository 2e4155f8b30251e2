use crate::store::{
    CollaboratorError, CollaboratorResult, EndTimeProvider, FailureLogStore, MessageCountStore,
};
use crate::types::RunRef;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// How many times each collaborator read has been served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryCallCounts {
    pub resolve_end_time: usize,
    pub count_sent: usize,
    pub count_landed: usize,
    pub any_failure_in_window: usize,
}

type SimulationKey = (String, String, String);
type WorkspaceKey = (String, String);

#[derive(Debug, Default)]
struct MemoryState {
    end_times: HashMap<RunRef, DateTime<Utc>>,
    counts: BTreeMap<SimulationKey, (u64, u64)>,
    failures: BTreeMap<WorkspaceKey, Vec<DateTime<Utc>>>,
    end_time_errors: VecDeque<CollaboratorError>,
    sent_errors: VecDeque<CollaboratorError>,
    landed_errors: VecDeque<CollaboratorError>,
    failure_log_errors: VecDeque<CollaboratorError>,
    last_failure_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    calls: MemoryCallCounts,
}

/// In-process stand-in for the orchestration system and the analytical store.
///
/// Implements all three collaborator traits over one shared state; clones share it.
#[derive(Clone, Debug, Default)]
pub struct MemoryIngestionBackend {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryIngestionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut *state)
    }

    pub fn set_end_time(&self, run: &RunRef, end_time: Option<DateTime<Utc>>) {
        self.with_state(|state| match end_time {
            Some(end_time) => {
                state.end_times.insert(run.clone(), end_time);
            }
            None => {
                state.end_times.remove(run);
            }
        });
    }

    pub fn set_counts(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
        sent: u64,
        landed: u64,
    ) {
        self.with_state(|state| {
            state.counts.insert(
                simulation_key(organization_id, workspace_id, simulation_id),
                (sent, landed),
            );
        });
    }

    pub fn record_failure(&self, organization_id: &str, workspace_id: &str, at: DateTime<Utc>) {
        self.with_state(|state| {
            state
                .failures
                .entry((organization_id.to_string(), workspace_id.to_string()))
                .or_default()
                .push(at);
        });
    }

    pub fn fail_next_end_time(&self, error: CollaboratorError) {
        self.with_state(|state| state.end_time_errors.push_back(error));
    }

    pub fn fail_next_count_sent(&self, error: CollaboratorError) {
        self.with_state(|state| state.sent_errors.push_back(error));
    }

    pub fn fail_next_count_landed(&self, error: CollaboratorError) {
        self.with_state(|state| state.landed_errors.push_back(error));
    }

    pub fn fail_next_failure_log(&self, error: CollaboratorError) {
        self.with_state(|state| state.failure_log_errors.push_back(error));
    }

    pub fn calls(&self) -> MemoryCallCounts {
        self.with_state(|state| state.calls)
    }

    /// Bounds of the most recent failure-log query.
    pub fn last_failure_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.with_state(|state| state.last_failure_window)
    }
}

fn simulation_key(organization_id: &str, workspace_id: &str, simulation_id: &str) -> SimulationKey {
    (
        organization_id.to_string(),
        workspace_id.to_string(),
        simulation_id.to_string(),
    )
}

#[async_trait::async_trait]
impl EndTimeProvider for MemoryIngestionBackend {
    async fn resolve_end_time(&self, run: &RunRef) -> CollaboratorResult<Option<DateTime<Utc>>> {
        self.with_state(|state| {
            state.calls.resolve_end_time += 1;
            if let Some(error) = state.end_time_errors.pop_front() {
                return Err(error);
            }
            Ok(state.end_times.get(run).copied())
        })
    }
}

#[async_trait::async_trait]
impl MessageCountStore for MemoryIngestionBackend {
    async fn count_sent(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        self.with_state(|state| {
            state.calls.count_sent += 1;
            if let Some(error) = state.sent_errors.pop_front() {
                return Err(error);
            }
            let key = simulation_key(organization_id, workspace_id, simulation_id);
            Ok(state.counts.get(&key).map_or(0, |(sent, _)| *sent))
        })
    }

    async fn count_landed(
        &self,
        organization_id: &str,
        workspace_id: &str,
        simulation_id: &str,
    ) -> CollaboratorResult<u64> {
        self.with_state(|state| {
            state.calls.count_landed += 1;
            if let Some(error) = state.landed_errors.pop_front() {
                return Err(error);
            }
            let key = simulation_key(organization_id, workspace_id, simulation_id);
            Ok(state.counts.get(&key).map_or(0, |(_, landed)| *landed))
        })
    }
}

#[async_trait::async_trait]
impl FailureLogStore for MemoryIngestionBackend {
    async fn any_failure_in_window(
        &self,
        organization_id: &str,
        workspace_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollaboratorResult<bool> {
        self.with_state(|state| {
            state.calls.any_failure_in_window += 1;
            if end < start {
                return Err(CollaboratorError::InvalidInput(format!(
                    "failure window ends before it starts: {start} .. {end}"
                )));
            }
            state.last_failure_window = Some((start, end));
            if let Some(error) = state.failure_log_errors.pop_front() {
                return Err(error);
            }
            let key = (organization_id.to_string(), workspace_id.to_string());
            Ok(state
                .failures
                .get(&key)
                .is_some_and(|logged| logged.iter().any(|at| *at >= start && *at <= end)))
        })
    }
}

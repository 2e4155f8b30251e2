use crate::clock::{Clock, SystemClock, elapsed_since};
use crate::config::IngestionPolicy;
use crate::store::{CollaboratorError, EndTimeProvider, FailureLogStore, MessageCountStore, StateError};
use crate::types::{AssessmentReason, IngestionAssessment, IngestionState, RunRef};
use tracing::Instrument;

/// Decides how far the analytical store has got in absorbing a run's telemetry.
///
/// Holds no mutable state: every call re-reads the collaborators, so concurrent
/// and repeated polls are safe. Successive calls may disagree while the store
/// is still converging.
#[derive(Clone, Debug)]
pub struct IngestionStateResolver<E, M, F, C = SystemClock> {
    end_times: E,
    counts: M,
    failures: F,
    policy: IngestionPolicy,
    clock: C,
}

impl<E, M, F> IngestionStateResolver<E, M, F, SystemClock> {
    pub fn new(end_times: E, counts: M, failures: F, policy: IngestionPolicy) -> Self {
        Self::with_clock(end_times, counts, failures, policy, SystemClock)
    }
}

impl<E, M, F, C> IngestionStateResolver<E, M, F, C> {
    pub fn with_clock(end_times: E, counts: M, failures: F, policy: IngestionPolicy, clock: C) -> Self {
        Self {
            end_times,
            counts,
            failures,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &IngestionPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<E, M, F, C> IngestionStateResolver<E, M, F, C>
where
    E: EndTimeProvider,
    M: MessageCountStore,
    F: FailureLogStore,
    C: Clock,
{
    pub async fn state_for(
        &self,
        run: &RunRef,
        simulation_id: &str,
    ) -> Result<IngestionState, StateError> {
        Ok(self.assess(run, simulation_id).await?.state)
    }

    pub async fn assess(
        &self,
        run: &RunRef,
        simulation_id: &str,
    ) -> Result<IngestionAssessment, StateError> {
        let span = tracing::debug_span!(
            "ingestion_state",
            organization_id = %run.organization_id,
            workspace_id = %run.workspace_id,
            run_id = %run.run_id,
            simulation_id = %simulation_id,
        );
        self.evaluate(run, simulation_id).instrument(span).await
    }

    async fn evaluate(
        &self,
        run: &RunRef,
        simulation_id: &str,
    ) -> Result<IngestionAssessment, StateError> {
        let now = self.clock.now();
        let mut assessment = IngestionAssessment::new(run, simulation_id, now);

        let end_time = self
            .end_times
            .resolve_end_time(run)
            .await
            .map_err(StateError::EndTime)?;
        let Some(end_time) = end_time else {
            tracing::debug!("run end time not available yet");
            return Ok(assessment.conclude(AssessmentReason::EndTimeUnknown));
        };

        let elapsed = elapsed_since(now, end_time);
        assessment.end_time = Some(end_time);
        assessment.elapsed_seconds = Some(elapsed.num_seconds());

        // Counters are not read at all until the settle delay has passed.
        if elapsed < self.policy.settle_delay() {
            tracing::debug!(elapsed_seconds = elapsed.num_seconds(), "within settle delay");
            return Ok(assessment.conclude(AssessmentReason::Settling));
        }

        let sent = self
            .counts
            .count_sent(&run.organization_id, &run.workspace_id, simulation_id)
            .await
            .map_err(StateError::SentCount)?;
        let landed = self
            .counts
            .count_landed(&run.organization_id, &run.workspace_id, simulation_id)
            .await
            .map_err(StateError::LandedCount)?;
        assessment.sent_count = Some(sent);
        assessment.landed_count = Some(landed);
        tracing::debug!(sent, landed, "ingestion counters read");

        if sent == 0 {
            if elapsed >= self.policy.no_data_grace() {
                tracing::warn!(
                    elapsed_seconds = elapsed.num_seconds(),
                    "no messages sent before no-data timeout"
                );
                return Ok(assessment.conclude(AssessmentReason::NoDataTimeout));
            }
            return Ok(assessment.conclude(AssessmentReason::AwaitingFirstMessage));
        }

        if landed >= sent {
            return Ok(assessment.conclude(AssessmentReason::AllLanded));
        }

        let window_end = end_time
            .checked_add_signed(self.policy.observation_window())
            .ok_or_else(|| {
                StateError::FailureLog(CollaboratorError::InvalidInput(format!(
                    "failure window past {end_time} is out of the timestamp range"
                )))
            })?;
        let failure_logged = self
            .failures
            .any_failure_in_window(&run.organization_id, &run.workspace_id, end_time, window_end)
            .await
            .map_err(StateError::FailureLog)?;
        assessment.failure_logged = Some(failure_logged);

        if failure_logged {
            tracing::warn!(sent, landed, "ingestion failure logged while measures are missing");
            return Ok(assessment.conclude(AssessmentReason::IngestionFailureLogged));
        }
        Ok(assessment.conclude(AssessmentReason::CatchingUp))
    }
}

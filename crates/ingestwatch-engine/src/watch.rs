use crate::clock::Clock;
use crate::resolver::IngestionStateResolver;
use crate::store::{EndTimeProvider, FailureLogStore, MessageCountStore, StateError};
use crate::types::{IngestionAssessment, RunRef};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    /// Zero means poll until the verdict is terminal.
    pub max_polls: usize,
    pub initial_backoff: Duration,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_polls: 0,
            initial_backoff: Duration::from_secs(1),
            backoff_factor: 2,
            max_backoff: Duration::from_secs(60),
            max_consecutive_errors: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WatchOutcome {
    pub assessment: IngestionAssessment,
    pub polls: usize,
    /// False when `max_polls` ran out before a terminal verdict.
    pub settled: bool,
}

pub fn backoff_for_attempt(attempt: u32, config: &WatchConfig) -> Duration {
    let exp = attempt.saturating_sub(1);
    let factor = config.backoff_factor.max(1).saturating_pow(exp);
    config
        .initial_backoff
        .saturating_mul(factor)
        .min(config.max_backoff)
}

/// Polls `resolver` until the verdict is terminal or the poll budget runs out.
///
/// Operational errors are retried with exponential backoff; after
/// `max_consecutive_errors` in a row the last one is returned.
pub async fn watch_until_settled<E, M, F, C>(
    resolver: &IngestionStateResolver<E, M, F, C>,
    run: &RunRef,
    simulation_id: &str,
    config: &WatchConfig,
    mut on_poll: impl FnMut(&IngestionAssessment),
) -> Result<WatchOutcome, StateError>
where
    E: EndTimeProvider,
    M: MessageCountStore,
    F: FailureLogStore,
    C: Clock,
{
    let mut polls = 0_usize;
    let mut consecutive_errors = 0_u32;

    loop {
        polls += 1;
        let budget_spent = config.max_polls != 0 && polls >= config.max_polls;

        match resolver.assess(run, simulation_id).await {
            Ok(assessment) => {
                consecutive_errors = 0;
                on_poll(&assessment);
                let settled = assessment.state.is_terminal();
                if settled || budget_spent {
                    tracing::debug!(polls, settled, state = %assessment.state, "watch finished");
                    return Ok(WatchOutcome {
                        assessment,
                        polls,
                        settled,
                    });
                }
                tokio::time::sleep(config.poll_interval).await;
            }
            Err(error) => {
                consecutive_errors += 1;
                tracing::warn!(
                    polls,
                    consecutive_errors,
                    collaborator = error.collaborator(),
                    error = %error,
                    "state check failed"
                );
                if budget_spent || consecutive_errors >= config.max_consecutive_errors.max(1) {
                    return Err(error);
                }
                tokio::time::sleep(backoff_for_attempt(consecutive_errors, config)).await;
            }
        }
    }
}

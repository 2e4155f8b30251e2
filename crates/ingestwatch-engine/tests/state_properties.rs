use chrono::{DateTime, Duration, TimeZone, Utc};
use ingestwatch_engine::{
    AssessmentReason, CollaboratorError, CollaboratorResult, FixedClock, IngestionPolicy,
    IngestionPolicyConfig, IngestionState, IngestionStateResolver, MemoryIngestionBackend,
    MessageCountStore, RunRef, StateError,
};

const ORG: &str = "my-organization-id";
const WORKSPACE: &str = "my-workspace-key";
const RUN: &str = "sr-myscenarioRunId";
const SIMULATION: &str = "my-csm-simulation-run";

type MemoryResolver = IngestionStateResolver<
    MemoryIngestionBackend,
    MemoryIngestionBackend,
    MemoryIngestionBackend,
    FixedClock,
>;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 10, 0, 0).unwrap()
}

fn run() -> RunRef {
    RunRef::new(ORG, WORKSPACE, RUN)
}

fn policy(settle_delay_seconds: i64, no_data_timeout_seconds: i64) -> IngestionPolicy {
    IngestionPolicyConfig {
        settle_delay_seconds,
        no_data_timeout_seconds,
        ..IngestionPolicyConfig::default()
    }
    .validate()
    .expect("policy should validate")
}

fn resolver(backend: &MemoryIngestionBackend, policy: IngestionPolicy) -> MemoryResolver {
    IngestionStateResolver::with_clock(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        policy,
        FixedClock::new(now()),
    )
}

fn ended_seconds_ago(backend: &MemoryIngestionBackend, seconds: i64) -> DateTime<Utc> {
    let end_time = now() - Duration::seconds(seconds);
    backend.set_end_time(&run(), Some(end_time));
    end_time
}

/// Counter store that fails the test if the resolver reads it.
struct UntouchableCounts;

#[async_trait::async_trait]
impl MessageCountStore for UntouchableCounts {
    async fn count_sent(&self, _: &str, _: &str, _: &str) -> CollaboratorResult<u64> {
        panic!("sent counter must not be read");
    }

    async fn count_landed(&self, _: &str, _: &str, _: &str) -> CollaboratorResult<u64> {
        panic!("landed counter must not be read");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_missing_end_time_expected_unknown_regardless_of_counters() {
    let backend = MemoryIngestionBackend::new();
    for (sent, landed) in [(0, 0), (42, 42), (42, 33), (0, 7)] {
        backend.set_counts(ORG, WORKSPACE, SIMULATION, sent, landed);
        let state = resolver(&backend, IngestionPolicy::default())
            .state_for(&run(), SIMULATION)
            .await
            .expect("state check should succeed");
        assert_eq!(state, IngestionState::Unknown);
    }
    assert_eq!(backend.calls().count_sent, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_within_settle_delay_expected_in_progress_without_reading_counters() {
    let backend = MemoryIngestionBackend::new();
    backend.set_end_time(&run(), Some(now() - Duration::seconds(1)));

    let resolver = IngestionStateResolver::with_clock(
        backend.clone(),
        UntouchableCounts,
        backend.clone(),
        policy(3600, 60),
        FixedClock::new(now()),
    );

    let state = resolver
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::InProgress);
    assert_eq!(backend.calls().any_failure_in_window, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_elapsed_equal_to_settle_delay_expected_counters_read() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 15);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 42);

    let state = resolver(&backend, policy(15, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::Successful);
    assert_eq!(backend.calls().count_sent, 1);
    assert_eq!(backend.calls().count_landed, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_one_second_before_settle_delay_expected_in_progress_without_reading_counters() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 14);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 42);

    let assessment = resolver(&backend, policy(15, 60))
        .assess(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(assessment.state, IngestionState::InProgress);
    assert_eq!(assessment.reason, AssessmentReason::Settling);
    assert_eq!(backend.calls().count_sent, 0);
    assert_eq!(backend.calls().count_landed, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_landed_at_least_sent_expected_successful() {
    for (sent, landed) in [(42, 42), (42, 111), (1, 1)] {
        let backend = MemoryIngestionBackend::new();
        ended_seconds_ago(&backend, 10);
        backend.set_counts(ORG, WORKSPACE, SIMULATION, sent, landed);

        let state = resolver(&backend, policy(1, 60))
            .state_for(&run(), SIMULATION)
            .await
            .expect("state check should succeed");
        assert_eq!(state, IngestionState::Successful, "sent={sent} landed={landed}");
        assert_eq!(backend.calls().any_failure_in_window, 0);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_no_messages_before_timeout_expected_in_progress() {
    for landed in [0, 42] {
        let backend = MemoryIngestionBackend::new();
        ended_seconds_ago(&backend, 10);
        backend.set_counts(ORG, WORKSPACE, SIMULATION, 0, landed);

        let state = resolver(&backend, policy(1, 60))
            .state_for(&run(), SIMULATION)
            .await
            .expect("state check should succeed");
        assert_eq!(state, IngestionState::InProgress, "landed={landed}");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_no_messages_after_timeout_expected_failure() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 70);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 0, 0);

    let assessment = resolver(&backend, policy(1, 60))
        .assess(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(assessment.state, IngestionState::Failure);
    assert_eq!(assessment.reason, AssessmentReason::NoDataTimeout);
    assert_eq!(backend.calls().any_failure_in_window, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_no_messages_at_exact_grace_boundary_expected_failure() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 61);

    let state = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::Failure);

    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 60);
    let state = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::InProgress);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_missing_measures_without_failure_expected_in_progress_even_past_timeout() {
    for elapsed in [10, 70, 86_400] {
        let backend = MemoryIngestionBackend::new();
        ended_seconds_ago(&backend, elapsed);
        backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 33);

        let state = resolver(&backend, policy(1, 60))
            .state_for(&run(), SIMULATION)
            .await
            .expect("state check should succeed");
        assert_eq!(state, IngestionState::InProgress, "elapsed={elapsed}");
        assert_eq!(backend.calls().any_failure_in_window, 1);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_missing_measures_with_failure_in_window_expected_failure() {
    let backend = MemoryIngestionBackend::new();
    let end_time = ended_seconds_ago(&backend, 10);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 33);
    backend.record_failure(ORG, WORKSPACE, end_time + Duration::seconds(2));

    let assessment = resolver(&backend, policy(1, 60))
        .assess(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(assessment.state, IngestionState::Failure);
    assert_eq!(assessment.reason, AssessmentReason::IngestionFailureLogged);
    assert_eq!(
        backend.last_failure_window(),
        Some((end_time, end_time + Duration::minutes(5)))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_failure_outside_window_expected_in_progress() {
    let backend = MemoryIngestionBackend::new();
    let end_time = ended_seconds_ago(&backend, 3_600);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 33);
    backend.record_failure(ORG, WORKSPACE, end_time - Duration::seconds(1));
    backend.record_failure(ORG, WORKSPACE, end_time + Duration::minutes(6));

    let state = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::InProgress);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_stale_simulation_counts_expected_not_conflated() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 10);
    backend.set_counts(ORG, WORKSPACE, "previous-simulation", 42, 42);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 10);

    let state = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(state, IngestionState::InProgress);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_repeated_calls_expected_identical_verdicts() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 10);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 33);
    let resolver = resolver(&backend, policy(1, 60));

    let first = resolver
        .assess(&run(), SIMULATION)
        .await
        .expect("first check should succeed");
    let second = resolver
        .assess(&run(), SIMULATION)
        .await
        .expect("second check should succeed");
    assert_eq!(first, second);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_end_time_appearing_between_polls_expected_progression() {
    let backend = MemoryIngestionBackend::new();
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 42);
    let resolver = resolver(&backend, policy(1, 60));

    let before = resolver
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(before, IngestionState::Unknown);

    ended_seconds_ago(&backend, 5);
    let after = resolver
        .state_for(&run(), SIMULATION)
        .await
        .expect("state check should succeed");
    assert_eq!(after, IngestionState::Successful);
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_counter_errors_expected_operational_error_not_verdict() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 10);
    backend.fail_next_count_sent(CollaboratorError::Unavailable("timeout".to_string()));

    let error = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect_err("sent count failure should propagate");
    assert!(matches!(error, StateError::SentCount(_)));

    backend.fail_next_count_landed(CollaboratorError::Decode("bad body".to_string()));
    let error = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect_err("landed count failure should propagate");
    assert!(matches!(error, StateError::LandedCount(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_failure_log_unreachable_expected_distinct_error() {
    let backend = MemoryIngestionBackend::new();
    ended_seconds_ago(&backend, 10);
    backend.set_counts(ORG, WORKSPACE, SIMULATION, 42, 33);
    backend.fail_next_failure_log(CollaboratorError::Rejected {
        status: 503,
        message: "service unavailable".to_string(),
    });

    let error = resolver(&backend, policy(1, 60))
        .state_for(&run(), SIMULATION)
        .await
        .expect_err("failure log outage should propagate");
    assert!(matches!(error, StateError::FailureLog(_)));
    assert_eq!(error.collaborator(), "failure_log");
}

#[tokio::test(flavor = "current_thread")]
async fn state_for_end_time_lookup_error_expected_operational_error() {
    let backend = MemoryIngestionBackend::new();
    backend.fail_next_end_time(CollaboratorError::Unavailable("refused".to_string()));

    let error = resolver(&backend, IngestionPolicy::default())
        .state_for(&run(), SIMULATION)
        .await
        .expect_err("end time failure should propagate");
    assert!(matches!(error, StateError::EndTime(_)));
}

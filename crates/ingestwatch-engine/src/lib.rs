//! Ingestion completeness engine.
//!
//! Decides, for a finished simulation run, whether the analytical store has
//! absorbed every message the run emitted, is still catching up, or has failed.
//! The verdict is recomputed from three eventually-consistent signals on every
//! call: the run end time, the sent/landed counters, and the store's
//! ingestion-failure log.

pub mod clock;
pub mod config;
pub mod memory;
pub mod resolver;
pub mod store;
pub mod types;
pub mod watch;

pub use clock::{Clock, FixedClock, SystemClock, elapsed_since};
pub use config::{ConfigError, IngestionPolicy, IngestionPolicyConfig};
pub use memory::{MemoryCallCounts, MemoryIngestionBackend};
pub use resolver::IngestionStateResolver;
pub use store::{
    CollaboratorError, CollaboratorResult, EndTimeProvider, FailureLogStore, MessageCountStore,
    StateError,
};
pub use types::{
    AssessmentReason, IngestionAssessment, IngestionState, OrganizationId, RunId, RunRef,
    SimulationId, WorkspaceId, database_name,
};
pub use watch::{WatchConfig, WatchOutcome, backoff_for_attempt, watch_until_settled};

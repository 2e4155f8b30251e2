use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTLE_DELAY_SECONDS: i64 = 15;
pub const DEFAULT_NO_DATA_TIMEOUT_SECONDS: i64 = 180;
pub const DEFAULT_FAILURE_OBSERVATION_WINDOW_MINUTES: i64 = 5;

/// Upper bound for every policy duration.
pub const MAX_POLICY_SPAN_DAYS: i64 = 366;

pub const SETTLE_DELAY_ENV: &str = "INGESTWATCH_SETTLE_DELAY_SECONDS";
pub const NO_DATA_TIMEOUT_ENV: &str = "INGESTWATCH_NO_DATA_TIMEOUT_SECONDS";
pub const FAILURE_WINDOW_ENV: &str = "INGESTWATCH_FAILURE_WINDOW_MINUTES";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: i64 },
    #[error("invalid configuration: {key}={value:?} is not an integer")]
    Unparsable { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Policy values as supplied by the operator, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionPolicyConfig {
    pub settle_delay_seconds: i64,
    pub no_data_timeout_seconds: i64,
    pub failure_observation_window_minutes: i64,
}

impl Default for IngestionPolicyConfig {
    fn default() -> Self {
        Self {
            settle_delay_seconds: DEFAULT_SETTLE_DELAY_SECONDS,
            no_data_timeout_seconds: DEFAULT_NO_DATA_TIMEOUT_SECONDS,
            failure_observation_window_minutes: DEFAULT_FAILURE_OBSERVATION_WINDOW_MINUTES,
        }
    }
}

impl IngestionPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from a key lookup; blank or missing keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            settle_delay_seconds: read_i64(&lookup, SETTLE_DELAY_ENV)?
                .unwrap_or(defaults.settle_delay_seconds),
            no_data_timeout_seconds: read_i64(&lookup, NO_DATA_TIMEOUT_ENV)?
                .unwrap_or(defaults.no_data_timeout_seconds),
            failure_observation_window_minutes: read_i64(&lookup, FAILURE_WINDOW_ENV)?
                .unwrap_or(defaults.failure_observation_window_minutes),
        })
    }

    pub fn validate(&self) -> Result<IngestionPolicy, ConfigError> {
        let settle_delay = positive("settle_delay_seconds", self.settle_delay_seconds)?;
        let no_data_timeout = positive("no_data_timeout_seconds", self.no_data_timeout_seconds)?;
        let window = positive(
            "failure_observation_window_minutes",
            self.failure_observation_window_minutes,
        )?;

        let observation_window = bounded(
            "failure_observation_window_minutes",
            window,
            Duration::try_minutes(window),
        )?;
        let settle_delay = bounded(
            "settle_delay_seconds",
            settle_delay,
            Duration::try_seconds(settle_delay),
        )?;
        let no_data_timeout = bounded(
            "no_data_timeout_seconds",
            no_data_timeout,
            Duration::try_seconds(no_data_timeout),
        )?;
        let no_data_grace = settle_delay.checked_add(&no_data_timeout).ok_or_else(|| {
            ConfigError::Invalid("settle delay plus no-data timeout overflows".to_string())
        })?;

        Ok(IngestionPolicy {
            settle_delay,
            no_data_timeout,
            observation_window,
            no_data_grace,
        })
    }
}

fn read_i64<F>(lookup: &F, key: &'static str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key).filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|_| ConfigError::Unparsable { key, value: raw })
}

fn positive(field: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(value)
}

fn bounded(
    field: &'static str,
    value: i64,
    duration: Option<Duration>,
) -> Result<Duration, ConfigError> {
    duration
        .filter(|duration| *duration <= Duration::days(MAX_POLICY_SPAN_DAYS))
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "{field} {value} exceeds the {MAX_POLICY_SPAN_DAYS}-day limit"
            ))
        })
}

/// Validated, immutable timing policy shared by every state check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestionPolicy {
    settle_delay: Duration,
    no_data_timeout: Duration,
    observation_window: Duration,
    no_data_grace: Duration,
}

impl IngestionPolicy {
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn no_data_timeout(&self) -> Duration {
        self.no_data_timeout
    }

    pub fn observation_window(&self) -> Duration {
        self.observation_window
    }

    /// Time after the run end before zero traffic counts as a failure.
    pub fn no_data_grace(&self) -> Duration {
        self.no_data_grace
    }
}

impl Default for IngestionPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::seconds(DEFAULT_SETTLE_DELAY_SECONDS),
            no_data_timeout: Duration::seconds(DEFAULT_NO_DATA_TIMEOUT_SECONDS),
            observation_window: Duration::minutes(DEFAULT_FAILURE_OBSERVATION_WINDOW_MINUTES),
            no_data_grace: Duration::seconds(
                DEFAULT_SETTLE_DELAY_SECONDS + DEFAULT_NO_DATA_TIMEOUT_SECONDS,
            ),
        }
    }
}

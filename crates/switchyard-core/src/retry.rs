//! Retry policies for trigger delivery and operation execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Result, TopologyError};

/// Default per-attempt (or ack) deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

/// Bounded exponential-backoff retry policy.
///
/// Fields are private so that every instance satisfies
/// `max_attempts >= 1`, `min_backoff <= max_backoff` and `deadline > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RetryConfig", into = "RetryConfig")]
pub struct RetryPolicy {
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
    deadline: Duration,
}

impl RetryPolicy {
    /// Build a policy with the default deadline.
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Result<Self> {
        Self::with_deadline(max_attempts, min_backoff, max_backoff, DEFAULT_DEADLINE)
    }

    pub fn with_deadline(
        max_attempts: u32,
        min_backoff: Duration,
        max_backoff: Duration,
        deadline: Duration,
    ) -> Result<Self> {
        let policy = Self {
            max_attempts,
            min_backoff,
            max_backoff,
            deadline,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Check the policy bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(TopologyError::InvalidRetryPolicy(format!(
                "max_attempts must be at least 1 (got {})",
                self.max_attempts
            )));
        }
        if self.min_backoff > self.max_backoff {
            return Err(TopologyError::InvalidRetryPolicy(format!(
                "min_backoff ({}) exceeds max_backoff ({})",
                humantime::format_duration(self.min_backoff),
                humantime::format_duration(self.max_backoff)
            )));
        }
        if self.deadline.is_zero() {
            return Err(TopologyError::InvalidRetryPolicy(
                "deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retries after the first attempt (`max_attempts - 1`).
    pub fn max_retries(&self) -> u32 {
        self.max_attempts - 1
    }

    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Ack deadline (topic edges) or attempt deadline (cron edges).
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Delay before retrying after the `attempt`-th failure (1-based).
    ///
    /// Doubles from `min_backoff` and saturates at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempts={} backoff={}..{} deadline={}",
            self.max_attempts,
            humantime::format_duration(self.min_backoff),
            humantime::format_duration(self.max_backoff),
            humantime::format_duration(self.deadline)
        )
    }
}

/// Serialized form of a [`RetryPolicy`]; durations use humantime syntax (`30s`, `5m`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_min_backoff")]
    pub min_backoff: String,

    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,

    #[serde(default = "default_deadline", alias = "ack_deadline", alias = "attempt_deadline")]
    pub deadline: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff: default_min_backoff(),
            max_backoff: default_max_backoff(),
            deadline: default_deadline(),
        }
    }
}

impl RetryConfig {
    /// Convert to a validated policy.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::try_from(self.clone())
    }
}

impl TryFrom<RetryConfig> for RetryPolicy {
    type Error = TopologyError;

    fn try_from(raw: RetryConfig) -> Result<Self> {
        RetryPolicy::with_deadline(
            raw.max_attempts,
            parse_duration("min_backoff", &raw.min_backoff)?,
            parse_duration("max_backoff", &raw.max_backoff)?,
            parse_duration("deadline", &raw.deadline)?,
        )
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            min_backoff: humantime::format_duration(policy.min_backoff).to_string(),
            max_backoff: humantime::format_duration(policy.max_backoff).to_string(),
            deadline: humantime::format_duration(policy.deadline).to_string(),
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        TopologyError::InvalidRetryPolicy(format!("{} '{}' is not a duration: {}", field, value, e))
    })
}

fn default_max_attempts() -> u32 {
    1
}

fn default_min_backoff() -> String {
    "5s".to_string()
}

fn default_max_backoff() -> String {
    "1h".to_string()
}

fn default_deadline() -> String {
    "180s".to_string()
}

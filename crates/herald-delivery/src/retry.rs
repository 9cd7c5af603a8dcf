//! Retry scheduling for failed webhook deliveries.
//!
//! [`RetryPolicy`] decides how long to wait after each failed attempt and when
//! to give up. [`RetrySchedule`] is the per-(event, endpoint) state machine
//! that applies the policy:
//!
//! ```text
//! Pending ──▶ Attempting ──▶ Delivered
//!                 │  ▲
//!          failure│  │backoff elapsed
//!                 ▼  │
//!           AwaitingBackoff
//!                 │
//!                 ▼ (attempts exhausted)
//!               Failed
//! ```
//!
//! Any non-terminal state may also move to `Cancelled`.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, Result};

/// Retry policy configuration for webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts (including initial attempt).
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,

    /// Strategy for calculating backoff delays.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    /// Four attempts spaced 1s, 2s and 4s apart, without jitter.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: delay doubles each attempt.
    Exponential,
    /// Linear backoff: delay grows by the base amount each attempt.
    Linear,
}

impl RetryPolicy {
    /// Checks that the policy can schedule at least one attempt.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(DeliveryError::configuration("max_attempts must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(DeliveryError::configuration("jitter_factor must be between 0.0 and 1.0"));
        }

        if self.base_delay > self.max_delay {
            return Err(DeliveryError::configuration("base_delay cannot exceed max_delay"));
        }

        Ok(())
    }

    /// Backoff after failed attempt `attempt_number` (1-based), before jitter.
    ///
    /// With the exponential strategy this is `base_delay * 2^(attempt - 1)`,
    /// capped at `max_delay`.
    pub fn backoff_for(&self, attempt_number: u32) -> Duration {
        let attempt = attempt_number.max(1);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let exponent = (attempt - 1).min(20);
                self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
            },
        };

        std::cmp::min(delay, self.max_delay)
    }

    /// Backoff after failed attempt `attempt_number` with jitter applied.
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        let jittered = apply_jitter(self.backoff_for(attempt_number), self.jitter_factor);
        std::cmp::min(jittered, self.max_delay)
    }
}

/// Retry decision context for a failed delivery attempt.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Attempt that failed (1-based).
    pub attempt_number: u32,
    /// Error that caused the delivery failure.
    pub error: &'a DeliveryError,
    /// Timestamp of the failed attempt.
    pub failed_at: DateTime<Utc>,
    /// Retry policy to apply.
    pub policy: &'a RetryPolicy,
}

/// Result of retry decision calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the delivery after `delay`.
    Retry {
        /// How long to wait before the next attempt
        delay: Duration,
        /// When the next delivery attempt becomes eligible
        next_attempt_at: DateTime<Utc>,
    },
    /// Do not retry - delivery permanently failed.
    GiveUp {
        /// Reason why the delivery should not be retried
        reason: String,
    },
}

impl<'a> RetryContext<'a> {
    /// Creates a new retry context for a failed delivery.
    pub fn new(
        attempt_number: u32,
        error: &'a DeliveryError,
        failed_at: DateTime<Utc>,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self { attempt_number, error, failed_at, policy }
    }

    /// Determines if and when to retry based on the failure context.
    pub fn decide_retry(&self) -> RetryDecision {
        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exhausted", self.policy.max_attempts),
            };
        }

        if !self.error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {}", self.error),
            };
        }

        let delay = self.policy.delay_for(self.attempt_number);
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { delay, next_attempt_at: self.failed_at + chrono_delay }
    }
}

/// Applies jitter to a duration to spread retries from many pipelines.
///
/// Randomizes the delay by ±jitter_factor. With jitter_factor=0.25 a 10s
/// delay becomes 7.5s to 12.5s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

/// State of one (event, endpoint) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Created, no attempt made yet.
    Pending,
    /// An HTTP attempt is in flight.
    Attempting,
    /// Last attempt failed; waiting for the backoff to elapse.
    AwaitingBackoff,
    /// An attempt succeeded.
    Delivered,
    /// Attempts exhausted.
    Failed,
    /// Stopped early by deregistration or shutdown.
    Cancelled,
}

impl DeliveryState {
    /// Returns whether the schedule has finished.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Attempting => write!(f, "attempting"),
            Self::AwaitingBackoff => write!(f, "awaiting_backoff"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-(event, endpoint) retry state machine.
///
/// Attempts are strictly sequential: a new attempt can only begin from
/// `Pending` or `AwaitingBackoff`, so at most one is ever in flight.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    state: DeliveryState,
    attempt_count: u32,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<DeliveryError>,
}

impl RetrySchedule {
    /// Creates a pending schedule with no attempts.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: DeliveryState::Pending,
            attempt_count: 0,
            next_attempt_at: None,
            last_error: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Attempts started so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// When the next attempt becomes eligible, while awaiting backoff.
    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    /// Error from the most recent failed attempt.
    pub fn last_error(&self) -> Option<&DeliveryError> {
        self.last_error.as_ref()
    }

    /// Policy applied by this schedule.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns whether no further attempts will be made.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves to `Attempting` and returns the new attempt number (1-based).
    pub fn begin_attempt(&mut self) -> Result<u32> {
        match self.state {
            DeliveryState::Pending | DeliveryState::AwaitingBackoff => {
                self.attempt_count += 1;
                self.state = DeliveryState::Attempting;
                self.next_attempt_at = None;
                Ok(self.attempt_count)
            },
            from => Err(DeliveryError::InvalidTransition { from, operation: "begin_attempt" }),
        }
    }

    /// Records a successful attempt.
    pub fn record_success(&mut self) -> Result<()> {
        if self.state != DeliveryState::Attempting {
            return Err(DeliveryError::InvalidTransition {
                from: self.state,
                operation: "record_success",
            });
        }

        self.state = DeliveryState::Delivered;
        Ok(())
    }

    /// Records a failed attempt and decides what happens next.
    ///
    /// Moves to `AwaitingBackoff` when attempts remain, otherwise to `Failed`.
    pub fn record_failure(
        &mut self,
        error: DeliveryError,
        failed_at: DateTime<Utc>,
    ) -> Result<RetryDecision> {
        if self.state != DeliveryState::Attempting {
            return Err(DeliveryError::InvalidTransition {
                from: self.state,
                operation: "record_failure",
            });
        }

        let decision =
            RetryContext::new(self.attempt_count, &error, failed_at, &self.policy).decide_retry();

        match &decision {
            RetryDecision::Retry { next_attempt_at, .. } => {
                self.state = DeliveryState::AwaitingBackoff;
                self.next_attempt_at = Some(*next_attempt_at);
            },
            RetryDecision::GiveUp { .. } => {
                self.state = DeliveryState::Failed;
                self.next_attempt_at = None;
            },
        }

        self.last_error = Some(error);
        Ok(decision)
    }

    /// Stops the schedule. Returns false if it had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.state = DeliveryState::Cancelled;
        self.next_attempt_at = None;
        true
    }
}

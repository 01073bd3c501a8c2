//! Retry-or-fail decisions for finished attempts.

use std::{num::NonZeroU32, time::Duration};

use crate::config::DispatchSettings;

use super::dispatch::JobOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt produced an artifact.
    Done,
    /// Resubmit as a fresh job after `delay`.
    Retry { delay: Duration },
    /// Permanent failure; never retried.
    Reject,
    /// Transient failures used up every attempt.
    Exhausted,
}

impl RetryPolicy {
    pub fn new(max_attempts: NonZeroU32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Decide what follows attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, outcome: &JobOutcome) -> RetryDecision {
        match outcome {
            JobOutcome::Succeeded(_) => RetryDecision::Done,
            JobOutcome::FailedPermanent { .. } => RetryDecision::Reject,
            JobOutcome::FailedTransient { .. } if attempt >= self.max_attempts.get() => {
                RetryDecision::Exhausted
            }
            JobOutcome::FailedTransient { .. } => RetryDecision::Retry { delay: self.delay },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN.saturating_add(2),
            delay: Duration::from_millis(250),
        }
    }
}

impl From<&DispatchSettings> for RetryPolicy {
    fn from(settings: &DispatchSettings) -> Self {
        Self::new(settings.max_attempts, settings.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> JobOutcome {
        JobOutcome::FailedTransient {
            reason: "renderer timed out".to_string(),
        }
    }

    #[test]
    fn transient_failures_retry_until_attempts_run_out() {
        let policy = RetryPolicy::new(NonZeroU32::new(3).expect("non-zero"), Duration::ZERO);
        assert_eq!(
            policy.decide(1, &transient()),
            RetryDecision::Retry {
                delay: Duration::ZERO
            }
        );
        assert_eq!(
            policy.decide(2, &transient()),
            RetryDecision::Retry {
                delay: Duration::ZERO
            }
        );
        assert_eq!(policy.decide(3, &transient()), RetryDecision::Exhausted);
    }

    #[test]
    fn permanent_failure_is_never_retried() {
        let policy = RetryPolicy::default();
        let outcome = JobOutcome::FailedPermanent {
            reason: "shape cannot be built".to_string(),
        };
        assert_eq!(policy.decide(1, &outcome), RetryDecision::Reject);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn single_attempt_policy_exhausts_immediately() {
        let policy = RetryPolicy::new(NonZeroU32::MIN, Duration::from_millis(5));
        assert_eq!(policy.decide(1, &transient()), RetryDecision::Exhausted);
    }
}

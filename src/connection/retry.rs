//! Retry budget and exponential backoff.

use std::time::Duration;

/// Limits for reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed between successful frame reads.
    pub max_retries: u32,
    /// Wait after the first failure.
    pub min_wait: Duration,
    /// Optional ceiling for the doubled wait. `None` doubles without bound.
    pub max_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            min_wait: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps, for tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            min_wait: Duration::ZERO,
            max_wait: None,
        }
    }
}

/// Remaining retry budget and the next backoff wait.
///
/// Values are immutable: each transition returns a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    retries_left: u32,
    wait: Duration,
}

impl RetryState {
    /// Full budget at minimal wait.
    pub fn initial(policy: &RetryPolicy) -> Self {
        Self {
            retries_left: policy.max_retries,
            wait: policy.min_wait,
        }
    }

    /// Remaining attempts.
    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    /// Wait to apply before the next attempt.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Returns true when no attempts remain.
    pub fn is_exhausted(&self) -> bool {
        self.retries_left == 0
    }

    /// State after one failed attempt: wait doubled, one attempt spent.
    pub fn after_failure(self, policy: &RetryPolicy) -> Self {
        let doubled = self.wait.saturating_mul(2);
        let wait = match policy.max_wait {
            Some(ceiling) => doubled.min(ceiling),
            None => doubled,
        };

        Self {
            retries_left: self.retries_left.saturating_sub(1),
            wait,
        }
    }
}

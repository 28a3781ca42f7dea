use std::time::{Duration, Instant};

/// Delays applied between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after the first failed attempt, before any connection succeeded.
    pub initial: Duration,
    /// Wait after every further consecutive failure before the first success.
    pub subsequent: Duration,
    /// Fixed wait between attempts once an established link was lost.
    pub reconnect: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            subsequent: Duration::from_secs(30),
            reconnect: Duration::from_secs(20),
        }
    }
}

/// Tracks reconnect backoff timing and schedules the next retry window.
pub struct BackoffController {
    policy: RetryPolicy,
    failures: u32,
    ever_connected: bool,
    next_retry_at: Instant,
}

impl BackoffController {
    pub fn new(policy: RetryPolicy, now: Instant) -> Self {
        Self {
            policy,
            failures: 0,
            ever_connected: false,
            next_retry_at: now,
        }
    }

    /// Record a failed attempt and push the next retry into the future.
    /// Returns the delay that was scheduled.
    pub fn mark_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = if self.ever_connected {
            self.policy.reconnect
        } else if self.failures == 1 {
            self.policy.initial
        } else {
            self.policy.subsequent
        };
        self.next_retry_at = now + delay;
        delay
    }

    /// Reset counters after a successful connect.
    pub fn mark_success(&mut self, now: Instant) {
        self.failures = 0;
        self.ever_connected = true;
        self.next_retry_at = now;
    }

    /// An established link dropped: allow an immediate attempt.
    pub fn mark_lost(&mut self, now: Instant) {
        self.failures = 0;
        self.next_retry_at = now;
    }

    pub fn should_retry(&self, now: Instant) -> bool {
        now >= self.next_retry_at
    }

    pub fn next_retry_at(&self) -> Instant {
        self.next_retry_at
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

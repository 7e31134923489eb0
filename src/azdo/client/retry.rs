use std::time::Duration;

use tokio::time::Instant;

/// Exponential backoff settings for API requests.
///
/// Defaults: first retry after 500ms, growing by 1.5x per attempt, single
/// waits capped at 60s, and no new attempt once 30s have elapsed in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub(super) fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial_interval,
            started: Instant::now(),
        }
    }
}

/// Backoff state for one logical request.
pub(super) struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Delay before the next attempt, or `None` once the elapsed budget is spent.
    pub(super) fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_after(self.started.elapsed())
    }

    fn next_delay_after(&mut self, elapsed: Duration) -> Option<Duration> {
        if elapsed + self.current > self.policy.max_elapsed_time {
            return None;
        }

        let delay = self.current;
        self.current = self
            .current
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);
        Some(delay)
    }
}

use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(1);

/// Exponential reconnect delay: 1s, 2s, 4s ... capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self { attempt: 0, max }
    }

    /// Delay before the next attempt; each call doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        BASE_DELAY.saturating_mul(factor).min(self.max)
    }

    /// Called once a connection opens successfully.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

//! Retry policy as a plain value: base delay, multiplier, attempt cap,
//! optional delay ceiling. Keeping the schedule in data makes it testable
//! without driving any I/O.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Transport-level HTTP retries: short and few. Covers blips between the
    /// client and the provider, not job execution time.
    pub fn transport() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_attempts: 4,
            max_delay: Some(Duration::from_secs(2)),
        }
    }

    /// Job-status polling: 3 s base, doubling, 15 s ceiling, 30 attempts
    /// total. Roughly seven minutes of wall clock before giving up.
    pub fn job_polling() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            multiplier: 2.0,
            max_attempts: 30,
            max_delay: Some(Duration::from_secs(15)),
        }
    }

    /// Delay to sleep after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(63) as i32);
        let ms = (self.base_delay.as_millis() as f64 * factor).round();
        let mut delay = Duration::from_millis(ms.min(u64::MAX as f64) as u64);
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap);
        }
        delay
    }
}

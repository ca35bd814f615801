//! Client-side request pacing.

use crate::error::HttpError;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Gate passed by every request before it is sent.
///
/// Implementations are shared by all requests of a client and must be safe
/// to call from many threads at once.
pub trait RateLimiter: Send + Sync {
    /// Block until the caller may proceed; returns how long it waited
    fn acquire(&self) -> Duration;

    /// Permits per second, `f64::INFINITY` when unlimited
    fn rate(&self) -> f64 {
        f64::INFINITY
    }
}

/// Never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedRateLimiter;

impl RateLimiter for UnlimitedRateLimiter {
    fn acquire(&self) -> Duration {
        Duration::ZERO
    }
}

/// Spaces acquisitions at least `1s / rate` apart.
///
/// The first acquisition never waits. There is no burst allowance: idle time
/// does not accumulate credit beyond the next permit.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    rate: f64,
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl SimpleRateLimiter {
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidConfig`] unless `permits_per_second` is
    /// finite and greater than zero.
    pub fn new(permits_per_second: f64) -> Result<Self, HttpError> {
        if permits_per_second.is_nan() {
            return Err(HttpError::InvalidConfig("rate is NaN".to_owned()));
        }
        if permits_per_second <= 0.0 || permits_per_second.is_infinite() {
            return Err(HttpError::InvalidConfig(format!(
                "rate must be finite and > 0, got {permits_per_second}"
            )));
        }
        let interval = Duration::try_from_secs_f64(1.0 / permits_per_second).map_err(|e| {
            HttpError::InvalidConfig(format!("rate {permits_per_second} out of range: {e}"))
        })?;

        Ok(Self {
            rate: permits_per_second,
            interval,
            last: Mutex::new(None),
        })
    }

    /// Minimum spacing between two acquisitions
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl RateLimiter for SimpleRateLimiter {
    fn acquire(&self) -> Duration {
        // held across the sleep so concurrent callers queue up behind it
        let mut last = self.last.lock();
        let now = Instant::now();
        let wait = last.map_or(Duration::ZERO, |previous| {
            self.interval.saturating_sub(now.saturating_duration_since(previous))
        });

        if wait.is_zero() {
            *last = Some(now);
        } else {
            tracing::debug!(wait_ms = wait.as_millis(), "rate limiter delaying request");
            std::thread::sleep(wait);
            *last = Some(Instant::now());
        }
        wait
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

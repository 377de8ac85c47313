//! Subscriber Reconnect Backoff
//!
//! Exponential backoff with jitter between attempts to (re)connect the
//! subscribe socket. The subscriber worker never gives up, so there is no
//! attempt cap: only cancellation ends the loop.

use std::time::Duration;

use rand::Rng;

/// Backoff tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
    /// Fractional jitter (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Build from configured bounds with the default growth and jitter.
    #[must_use]
    pub fn with_bounds(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            ..Self::default()
        }
    }
}

/// Backoff state for one connection loop.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Fresh backoff.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            next: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let base = self.next;
        self.next = base
            .mul_f64(self.config.multiplier.max(1.0))
            .min(self.config.max_delay);
        jitter(base, self.config.jitter_factor)
    }

    /// Forget failures after a successful connect.
    pub const fn reset(&mut self) {
        self.next = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Failed attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn jitter(base: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base;
    }
    let spread = factor.min(1.0);
    let scale = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
    base.mul_f64(scale).max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn grows_exponentially_until_cap() {
        let mut backoff = Backoff::new(no_jitter(100, 500));
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn reset_restarts_from_initial() {
        let mut backoff = Backoff::new(no_jitter(100, 10_000));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut backoff = Backoff::new(BackoffConfig {
                initial_delay: Duration::from_millis(1000),
                ..BackoffConfig::default()
            });
            let millis = backoff.next_delay().as_millis();
            assert!((899..=1101).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn bounds_never_invert() {
        let config = BackoffConfig::with_bounds(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }
}

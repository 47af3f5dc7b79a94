//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff for transient remote failures.
///
/// `max_retries` counts retries, not calls: a policy with `max_retries = 4`
/// makes at most five calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialRetry {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    pub max_retries: u32,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Spread each delay over 80%-120% of its nominal value.
    pub jitter: bool,
}

impl ExponentialRetry {
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_retries,
            max_delay: Duration::from_secs(120),
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Nominal delay before retry number `retry` (1-indexed):
    /// `base_delay * multiplier^(retry - 1)`, capped at `max_delay`.
    ///
    /// Example with base_delay=3s, multiplier=2.0:
    /// - retry 1: 3s
    /// - retry 2: 6s
    /// - retry 3: 12s
    /// - retry 4: 24s
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(retry.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// The delay actually slept, with jitter applied when enabled.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.next_delay(retry);
        if !self.jitter {
            return nominal;
        }
        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        nominal.mul_f64(factor).min(self.max_delay)
    }
}

impl Default for ExponentialRetry {
    /// 3 seconds base delay, up to 4 retries.
    fn default() -> Self {
        Self::new(Duration::from_secs(3), 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = ExponentialRetry::default();
        assert_eq!(policy.base_delay, Duration::from_secs(3));
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = ExponentialRetry::default();

        let d1 = policy.next_delay(1);
        let d2 = policy.next_delay(2);
        let d3 = policy.next_delay(3);

        assert!(d2 > d1);
        assert!(d3 > d2);

        assert_eq!(d1, Duration::from_secs(3));
        assert_eq!(d2, Duration::from_secs(6));
        assert_eq!(d3, Duration::from_secs(12));
    }

    #[test]
    fn delays_are_capped() {
        let policy = ExponentialRetry {
            max_delay: Duration::from_secs(10),
            ..ExponentialRetry::default()
        };
        assert_eq!(policy.next_delay(10), Duration::from_secs(10));
        assert!(policy.delay_for(10) <= Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ExponentialRetry::default();
        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(4800));
            assert!(delay <= Duration::from_millis(7200));
        }
        assert_eq!(policy.without_jitter().delay_for(2), Duration::from_secs(6));
    }
}

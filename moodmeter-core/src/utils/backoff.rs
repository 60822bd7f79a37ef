// File: moodmeter-core/src/utils/backoff.rs

use std::time::Duration;
use rand::Rng;

/// Bounded exponential backoff with additive jitter.
///
/// The n-th delay is `min(base * 2^n, max)` plus up to `jitter_ratio` of that value.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter_ratio: 0.2,
            attempt: 0,
        }
    }

    /// Disables jitter; delays become exactly reproducible.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ratio = 0.0;
        self
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, without jitter and without advancing.
    pub fn current_delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(30)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay();
        self.attempt = self.attempt.saturating_add(1);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let jitter_max = delay.as_secs_f64() * self.jitter_ratio;
        let jitter = rand::rng().random_range(0.0..=jitter_max);
        delay + Duration::from_secs_f64(jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(500)).without_jitter();
        let delays: Vec<_> = (0..5).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..20 {
            let expected = b.current_delay();
            let got = b.next_delay();
            assert!(got >= expected);
            assert!(got <= expected + expected.mul_f64(0.2) + Duration::from_micros(1));
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60)).without_jitter();
        for _ in 0..100 {
            b.next_delay();
        }
        assert_eq!(b.next_delay(), Duration::from_secs(60));
    }
}

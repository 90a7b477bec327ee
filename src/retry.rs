//! Exponential backoff with jitter.
//!
//! Shared by the HTTP fetcher and the language-model client. The delay before
//! retry `n` (1-based) is:
//!
//! ```text
//! delay = min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=250ms)
//! ```

use rand::{Rng, rng};
use std::time::Duration;

/// Retry budget and delay curve.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Retries allowed after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles with each attempt.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// No retries at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: usize) -> bool {
        attempt <= self.max_retries
    }

    /// Exponential part of the delay before retry `attempt` (1-based).
    pub fn base_delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Full delay including jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms: u64 = rng().random_range(0..=250);
        self.base_delay_for(attempt) + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let b = Backoff::new(10, Duration::from_secs(1));
        assert_eq!(b.base_delay_for(1), Duration::from_secs(1));
        assert_eq!(b.base_delay_for(2), Duration::from_secs(2));
        assert_eq!(b.base_delay_for(4), Duration::from_secs(8));
        assert_eq!(b.base_delay_for(9), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let b = Backoff::new(3, Duration::from_millis(100));
        let d = b.delay_for(1);
        assert!(d >= Duration::from_millis(100));
        assert!(d <= Duration::from_millis(350));
    }

    #[test]
    fn test_allows() {
        let b = Backoff::new(2, Duration::from_secs(1));
        assert!(b.allows(1));
        assert!(b.allows(2));
        assert!(!b.allows(3));
        assert!(!Backoff::none().allows(1));
    }
}

//! Widening backoff used between status checks of one watch item.

use std::time::Duration;

/// Delay grows by one `base_interval` every ten checks, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBackoff {
    pub base_interval: Duration,
    pub max_backoff: Duration,
}

impl PollBackoff {
    #[must_use]
    pub fn new(base_interval: Duration, max_backoff: Duration) -> Self {
        Self {
            base_interval,
            max_backoff,
        }
    }

    /// Delay before the next check of an item that has been checked `retry_count` times.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let steps = retry_count / 10 + 1;
        self.base_interval
            .saturating_mul(steps)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> PollBackoff {
        PollBackoff::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    #[test]
    fn test_first_ten_checks_use_base_interval() {
        let b = backoff();
        for retry in 0..10 {
            assert_eq!(b.delay_for(retry), Duration::from_secs(60));
        }
        assert_eq!(b.delay_for(10), Duration::from_secs(120));
        assert_eq!(b.delay_for(25), Duration::from_secs(180));
    }

    #[test]
    fn test_delay_is_capped() {
        let b = backoff();
        assert_eq!(b.delay_for(95), Duration::from_secs(600));
        assert_eq!(b.delay_for(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn test_delay_never_decreases() {
        let b = backoff();
        let mut previous = Duration::ZERO;
        for retry in 0..500 {
            let delay = b.delay_for(retry);
            assert!(delay >= previous);
            previous = delay;
        }
    }
}

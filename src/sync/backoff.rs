use std::time::Duration;

/// Produces exponentially growing retry delays: `base`, `2 * base`, `4 * base`, ... capped at
/// `max`.
///
/// The counter only computes delays; waiting is up to the caller. Each worker owns its counter.
#[derive(Debug, Clone)]
pub struct BackoffCounter {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl BackoffCounter {
    /// Create a counter starting at `base` and never exceeding `max`.
    pub fn new(base: Duration, max: Duration) -> BackoffCounter {
        BackoffCounter {
            base,
            max,
            attempt: 0,
        }
    }

    /// Return the delay for the current attempt and move to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = 2u32
            .checked_pow(self.attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max));
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Start over from `base`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::BackoffCounter;

    #[test]
    fn doubles_then_resets() {
        let base = Duration::from_secs(1);
        let mut backoff = BackoffCounter::new(base, Duration::from_secs(1800));

        assert_eq!(backoff.next_delay(), base);
        assert_eq!(backoff.next_delay(), base * 2);
        assert_eq!(backoff.next_delay(), base * 4);
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.next_delay(), base);
    }

    #[test]
    fn capped_at_max() {
        let mut backoff = BackoffCounter::new(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn does_not_overflow() {
        let mut backoff = BackoffCounter::new(Duration::from_secs(1), Duration::from_secs(1800));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(1800));
        }
    }
}

//! Exponential backoff with jitter for source start retries.

use std::time::Duration;

/// Backoff schedule: initial 2s, multiplied by 2 per attempt, capped at
/// 60s, with ±20% jitter applied to each delay.
pub struct RetryBackoff {
    initial: Duration,
    cap: Duration,
    factor: u32,
    attempt: u32,
}

impl RetryBackoff {
    /// The schedule the bus uses for transiently unavailable sources.
    pub fn source_start() -> Self {
        Self {
            initial: Duration::from_secs(2),
            cap: Duration::from_secs(60),
            factor: 2,
            attempt: 0,
        }
    }

    /// The next delay, jittered. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt += 1;
        jitter(base)
    }

    /// How many delays have been handed out.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.factor.saturating_pow(attempt);
        let delay = self.initial.saturating_mul(factor);
        delay.min(self.cap)
    }
}

/// Apply ±20% jitter.
fn jitter(d: Duration) -> Duration {
    use rand::Rng;
    let millis = d.as_millis() as u64;
    if millis == 0 {
        return d;
    }
    let spread = millis / 5;
    let low = millis - spread;
    let high = millis + spread;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_doubles_and_caps() {
        let b = RetryBackoff::source_start();
        assert_eq!(b.base_delay(0), Duration::from_secs(2));
        assert_eq!(b.base_delay(1), Duration::from_secs(4));
        assert_eq!(b.base_delay(2), Duration::from_secs(8));
        assert_eq!(b.base_delay(5), Duration::from_secs(60));
        assert_eq!(b.base_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        for _ in 0..100 {
            let d = jitter(Duration::from_secs(10));
            assert!(d >= Duration::from_secs(8));
            assert!(d <= Duration::from_secs(12));
        }
    }

    #[test]
    fn next_delay_advances() {
        let mut b = RetryBackoff::source_start();
        let first = b.next_delay();
        let second = b.next_delay();
        assert!(first >= Duration::from_millis(1600));
        assert!(second >= Duration::from_millis(3200));
        assert_eq!(b.attempts(), 2);
    }
}

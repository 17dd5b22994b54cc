/// Exponential backoff with a ceiling and a fixed number of attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    max_attempts: u8,
    attempt: u8,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64, max_attempts: u8) -> Self {
        Self {
            base_ms,
            max_ms,
            max_attempts,
            attempt: 0,
        }
    }

    /// Records a failed attempt and returns how long to wait before the next
    /// one, or `None` once every attempt has been used.
    pub fn next_delay_ms(&mut self) -> Option<u64> {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(u32::from(self.attempt - 1)).unwrap_or(u64::MAX);
        Some(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }

    /// Number of attempts made so far, counting the one in flight.
    pub fn attempt(&self) -> u8 {
        self.attempt.saturating_add(1)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped_then_gives_up() {
        let mut backoff = Backoff::new(15_000, 40_000, 5);
        assert_eq!(backoff.attempt(), 1);
        assert_eq!(backoff.next_delay_ms(), Some(15_000));
        assert_eq!(backoff.next_delay_ms(), Some(30_000));
        assert_eq!(backoff.next_delay_ms(), Some(40_000));
        assert_eq!(backoff.next_delay_ms(), Some(40_000));
        assert_eq!(backoff.attempt(), 5);
        assert_eq!(backoff.next_delay_ms(), None);
        assert_eq!(backoff.next_delay_ms(), None);
    }

    #[test]
    fn attempt_counter_saturates_at_the_top() {
        let mut backoff = Backoff::new(1, 1, u8::MAX);
        for _ in 0..300 {
            backoff.next_delay_ms();
        }
        assert_eq!(backoff.attempt(), u8::MAX);
        assert_eq!(backoff.next_delay_ms(), None);
    }

    #[test]
    fn single_attempt_never_waits() {
        let mut backoff = Backoff::new(1_000, 1_000, 1);
        assert_eq!(backoff.next_delay_ms(), None);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(100, 1_000, 3);
        backoff.next_delay_ms();
        backoff.next_delay_ms();
        backoff.reset();
        assert_eq!(backoff.next_delay_ms(), Some(100));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let mut backoff = Backoff::new(u64::MAX / 2, u64::MAX, u8::MAX);
        for _ in 0..100 {
            assert!(backoff.next_delay_ms().is_some());
        }
    }
}

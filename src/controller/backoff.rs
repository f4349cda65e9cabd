//! # Fibonacci Backoff
//!
//! Per-resource retry intervals that grow along the Fibonacci sequence, scaled by
//! a minimum and capped at a maximum.
//!
//! With `min = 5s` and `max = 600s` the sequence is 5, 5, 10, 15, 25, 40, ... 600.

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: 1,
        }
    }

    /// Returns the next interval and advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let secs = self
            .current
            .saturating_mul(self.min_secs)
            .min(self.max_secs);
        if secs < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        secs
    }

    /// Restarts the sequence after a success
    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = 1;
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_scales_by_minimum() {
        let mut backoff = FibonacciBackoff::new(5, 600);
        let seq: Vec<u64> = (0..7).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(seq, vec![5, 5, 10, 15, 25, 40, 65]);
    }

    #[test]
    fn test_sequence_caps_at_maximum() {
        let mut backoff = FibonacciBackoff::new(5, 30);
        let seq: Vec<u64> = (0..8).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(seq, vec![5, 5, 10, 15, 25, 30, 30, 30]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 100);
        for _ in 0..5 {
            backoff.next_backoff_seconds();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff_seconds(), 1);
    }
}

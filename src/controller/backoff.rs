//! # Fibonacci Backoff
//!
//! Progressive delay between watch restarts. Grows more slowly than exponential
//! backoff so a flapping API server is retried promptly without being hammered.
//!
//! ```rust
//! use keycloak_realm_operator::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 60);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 2);
//! assert_eq!(backoff.next_backoff_seconds(), 3);
//! ```

use std::time::Duration;

/// Fibonacci sequence of delays in seconds, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Current delay, then advance the sequence.
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Start over after a healthy stream.
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

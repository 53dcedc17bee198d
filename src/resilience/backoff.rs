//! Exponential backoff for transient accept failures.

use std::time::Duration;

/// First delay after a transient failure.
pub const INITIAL_DELAY: Duration = Duration::from_millis(5);
/// Upper bound on any single delay.
pub const MAX_DELAY: Duration = Duration::from_secs(1);

/// Doubling delay sequence that resets on success.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    current: Option<Duration>,
    initial: Duration,
    max: Duration,
}

impl AcceptBackoff {
    pub fn new() -> Self {
        Self::with_bounds(INITIAL_DELAY, MAX_DELAY)
    }

    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        Self {
            current: None,
            initial,
            max,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(d) => d.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    /// Forget accumulated delay after a successful accept.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new()
    }
}

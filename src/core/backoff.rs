//! Inter-cycle backoff.

use std::time::Duration;

/// Doubling delay between failing delivery cycles.
///
/// The first failing cycle waits `initial`, each further failing cycle waits
/// twice as long as the previous one, and a fully successful cycle resets the
/// sequence. Growth is uncapped unless `max` is set; doubling saturates at
/// `Duration::MAX` instead of overflowing.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Create a policy starting at `initial`, optionally capped at `max`.
    #[must_use]
    pub const fn new(initial: Duration, max: Option<Duration>) -> Self {
        Self {
            initial,
            current: initial,
            max,
        }
    }

    /// Delay to wait after a failing cycle. Advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.capped(self.current);
        self.current = self.capped(self.current.saturating_mul(2));
        delay
    }

    /// Delay the next failing cycle would get, without advancing.
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.capped(self.current)
    }

    /// Return to the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.initial;
    }

    fn capped(&self, delay: Duration) -> Duration {
        self.max.map_or(delay, |max| delay.min(max))
    }
}

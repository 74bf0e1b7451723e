//! Spin-wait policy for the blocking queue operations.
//!
//! Blocking calls never park the thread on an OS primitive. They poll, and
//! between polls apply a [`Backoff`]. A [`Timeout`] bounds how long they may
//! poll before giving up.

use std::time::Duration;

use minstant::Instant;
use serde::{Deserialize, Serialize};

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    /// Wait indefinitely.
    #[default]
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// What a blocked caller does between two polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// Busy-spin with `spin_loop` hints. Lowest handoff latency.
    #[default]
    Spin,
    /// Yield the time slice on every poll.
    Yield,
    /// Busy-spin for `spins` polls, then yield on every following poll.
    SpinThenYield {
        /// Polls spent spinning before the first yield.
        spins: u32,
    },
}

/// Poll-loop state for one blocking call.
pub(crate) struct Spinner {
    backoff: Backoff,
    deadline: Option<Instant>,
    polls: u32,
}

impl Spinner {
    pub(crate) fn new(backoff: Backoff, timeout: Timeout) -> Self {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        Self {
            backoff,
            deadline,
            polls: 0,
        }
    }

    /// Backs off once. Returns `false` once the deadline has passed.
    #[inline]
    pub(crate) fn wait(&mut self) -> bool {
        if let Some(dl) = self.deadline
            && Instant::now() > dl
        {
            return false;
        }

        match self.backoff {
            Backoff::Spin => std::hint::spin_loop(),
            Backoff::Yield => std::thread::yield_now(),
            Backoff::SpinThenYield { spins } => {
                if self.polls < spins {
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
        self.polls = self.polls.saturating_add(1);
        true
    }

    /// Number of times this spinner has backed off.
    pub(crate) const fn polls(&self) -> u32 {
        self.polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_never_expires() {
        let mut spinner = Spinner::new(Backoff::Spin, Timeout::Infinite);
        for _ in 0..1000 {
            assert!(spinner.wait());
        }
        assert_eq!(spinner.polls(), 1000);
    }

    #[test]
    fn test_duration_expires() {
        let mut spinner = Spinner::new(Backoff::Yield, Duration::from_millis(5).into());
        let start = std::time::Instant::now();
        while spinner.wait() {}
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_zero_duration_expires_after_first_check() {
        let mut spinner = Spinner::new(Backoff::Spin, Timeout::Duration(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(1));
        assert!(!spinner.wait());
        assert_eq!(spinner.polls(), 0);
    }

    #[test]
    fn test_spin_then_yield_counts_polls() {
        let mut spinner = Spinner::new(Backoff::SpinThenYield { spins: 4 }, Timeout::Infinite);
        for _ in 0..10 {
            assert!(spinner.wait());
        }
        assert_eq!(spinner.polls(), 10);
    }
}

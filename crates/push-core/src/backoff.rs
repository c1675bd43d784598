//! Retry backoff policy
//!
//! A [`Backoff`] decides whether a transient registration failure may be
//! retried and how long to wait first. The attempt counter is touched from
//! provider callbacks and the retry scheduler without the orchestrator's
//! registration lock, so it is a plain atomic.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default maximum try count (effectively unbounded)
pub const DEFAULT_MAX_TRIES: u32 = u32::MAX;

/// Number of attempts after which the exponential delay starts over
pub const TRIES_BEFORE_DELAY_RESET: u32 = 16;

/// Retry policy for transient provider failures
pub trait Backoff: Send + Sync + fmt::Debug {
    /// Delay before the next attempt
    ///
    /// Callers check [`Backoff::has_tries`] first, which has already counted
    /// the attempt. The first delay after a reset is therefore the one for
    /// attempt 1, two seconds for [`ExponentialBackoff`].
    ///
    /// # Returns
    ///
    /// - `Ok(Duration)`: How long to wait
    /// - `Err(Error::BackoffExhausted)`: The maximum try count was exceeded
    fn try_delay(&self) -> Result<Duration>;

    /// Count one attempt and report whether it is permitted
    ///
    /// The counter moves before the check, so a refused attempt is counted too.
    fn has_tries(&self) -> bool;

    /// Start counting from zero again
    fn reset(&self);
}

/// Exponential backoff: attempt `n` waits `2^(n mod 16)` seconds
///
/// The delay therefore never exceeds 2^15 seconds; after 16 attempts the
/// sequence starts again at one second.
///
/// # Example
///
/// ```rust
/// use push_core::backoff::{Backoff, ExponentialBackoff};
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::with_max_tries(3).unwrap();
/// assert!(backoff.has_tries());
/// assert_eq!(backoff.try_delay().unwrap(), Duration::from_secs(2));
/// ```
#[derive(Debug)]
pub struct ExponentialBackoff {
    max_tries: u32,
    try_number: AtomicU32,
}

impl ExponentialBackoff {
    /// Create an effectively unbounded backoff
    pub fn new() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            try_number: AtomicU32::new(0),
        }
    }

    /// Create a backoff allowing at most `max_tries` retries
    ///
    /// Fails with a configuration error if `max_tries` is zero.
    pub fn with_max_tries(max_tries: u32) -> Result<Self> {
        if max_tries < 1 {
            return Err(Error::config("Backoff try count can't be less than 1"));
        }

        Ok(Self {
            max_tries,
            try_number: AtomicU32::new(0),
        })
    }

    /// Delay for a 0-indexed attempt number
    pub fn delay_for_attempt(attempt: u32) -> Duration {
        Duration::from_secs(1u64 << (attempt % TRIES_BEFORE_DELAY_RESET))
    }

    /// Configured maximum try count
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Attempts counted since the last reset
    pub fn attempt(&self) -> u32 {
        self.try_number.load(Ordering::SeqCst)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff for ExponentialBackoff {
    fn try_delay(&self) -> Result<Duration> {
        let attempt = self.try_number.load(Ordering::SeqCst);
        if attempt > self.max_tries {
            return Err(Error::BackoffExhausted {
                max_tries: self.max_tries,
            });
        }

        let delay = Self::delay_for_attempt(attempt);
        tracing::trace!("Backoff attempt {} -> delay {:?}", attempt, delay);
        Ok(delay)
    }

    fn has_tries(&self) -> bool {
        // Saturate so the unbounded default cannot wrap back to zero
        let previous = self
            .try_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or(u32::MAX);
        previous < self.max_tries
    }

    fn reset(&self) {
        self.try_number.store(0, Ordering::SeqCst);
    }
}

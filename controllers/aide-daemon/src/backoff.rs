//! # Exponential Backoff
//!
//! Provides an exponential backoff mechanism for retrying cluster API
//! writes and the transient AIDE I/O error.
//!
//! Sequence with the defaults: 500ms, 750ms, 1.125s, ... capped at 60s.
//! Retries stop after [`MAX_RETRIES`] attempts beyond the first.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries after the first attempt
pub const MAX_RETRIES: u32 = 5;

/// First delay of the default policy
const DEFAULT_INITIAL: Duration = Duration::from_millis(500);

/// Delay cap of the default policy
const DEFAULT_MAX: Duration = Duration::from_secs(60);

/// Growth factor, in percent
const MULTIPLIER_PERCENT: u32 = 150;

/// Exponential backoff calculator
///
/// Each delay is the previous one multiplied by 1.5, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial delay (for reset)
    initial: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Maximum delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff starting at `initial` and capped at `max`
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            current: initial,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current * MULTIPLIER_PERCENT / 100, self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL, DEFAULT_MAX)
    }
}

/// How a failed attempt should be treated
#[derive(Debug)]
pub enum Retry<E> {
    /// Worth another attempt
    Transient(E),
    /// Give up immediately
    Permanent(E),
}

/// Run `op` until it succeeds, fails permanently or exhausts `max_retries`.
///
/// `what` names the operation in the retry log lines.
pub async fn retry<T, E, F, Fut>(
    what: &str,
    mut backoff: ExponentialBackoff,
    max_retries: u32,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Retry<E>>>,
    E: Display,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Retry::Permanent(e)) => return Err(e),
            Err(Retry::Transient(e)) => {
                if retries >= max_retries {
                    return Err(e);
                }
                retries += 1;
                let delay = backoff.next_backoff();
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    retries,
                    max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

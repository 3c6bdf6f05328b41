//! # Retry Policy
//!
//! Bounded polling shared by upload verification and download stabilization.
//!
//! ## Overview
//!
//! A [`RetryPolicy`] runs an attempt function up to `max_attempts` times,
//! sleeping according to its [`Backoff`] between attempts, until a success
//! predicate accepts the attempt's value. Errors returned by the attempt
//! function are not retried; they propagate immediately so a network or
//! authentication failure during verification is classified by the caller.
//! Sleeps race the run's cancellation token.

use crate::{Result, SyncError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles from `base` per attempt, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Result of running a policy to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The predicate accepted a value on the given attempt.
    Accepted { value: T, attempt: u32 },
    /// Every attempt ran and none was accepted; carries the last value.
    Exhausted { attempts: u32, last: Option<T> },
}

impl<T> RetryOutcome<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RetryOutcome::Accepted { .. })
    }
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Upload visibility check: 10 attempts, 200 ms apart.
    pub const fn upload_verification() -> Self {
        Self::fixed(10, Duration::from_millis(200))
    }

    /// Download size stabilization: 20 polls, 50 ms apart.
    pub const fn download_stabilization() -> Self {
        Self::fixed(20, Duration::from_millis(50))
    }

    /// Run `attempt` until `accept` returns true or attempts run out.
    ///
    /// `attempt` receives the 1-based attempt number. No sleep follows the
    /// final attempt.
    pub async fn run_until<T, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
        mut accept: P,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(&T) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last = None;

        for n in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let value = attempt(n).await?;
            if accept(&value) {
                return Ok(RetryOutcome::Accepted { value, attempt: n });
            }
            trace!(attempt = n, max_attempts, "Retry predicate not yet satisfied");
            last = Some(value);

            if n < max_attempts {
                let delay = self.backoff.delay_after(n);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Ok(RetryOutcome::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

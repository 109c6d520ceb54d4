//! Bounded retry with backoff
//!
//! The single retry primitive of the crate. Applying manifests, waiting for
//! CRDs and downloading mods are all calls to [`retry`] with a different
//! [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{KubeError, Result};

/// When to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop after this many attempts in total
    Attempts(u32),
    /// Stop once a failure happens this long after the first attempt
    Elapsed(Duration),
    /// Never stop on retryable errors
    Never,
}

impl StopCondition {
    fn should_stop(&self, attempts: u32, elapsed: Duration) -> bool {
        match *self {
            StopCondition::Attempts(max) => attempts >= max,
            StopCondition::Elapsed(max) => elapsed >= max,
            StopCondition::Never => false,
        }
    }
}

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `min(cap, multiplier * 2^(attempt - 1))`
    Exponential { multiplier: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { multiplier, cap } => {
                let exponent = attempt.saturating_sub(1).min(31);
                multiplier.saturating_mul(1u32 << exponent).min(cap)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub stop: StopCondition,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Applying a batch: exponential backoff for up to 5 minutes
    pub fn apply() -> Self {
        Self {
            stop: StopCondition::Elapsed(Duration::from_secs(300)),
            backoff: Backoff::Exponential {
                multiplier: Duration::from_secs(2),
                cap: Duration::from_secs(10),
            },
        }
    }

    /// steamcmd segfaults a lot, so downloads get many quick attempts
    pub fn mod_download() -> Self {
        Self {
            stop: StopCondition::Attempts(128),
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }

    /// Polling for a CRD to be registered
    pub fn crd_poll() -> Self {
        Self {
            stop: StopCondition::Never,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }

    pub fn with_stop(mut self, stop: StopCondition) -> Self {
        self.stop = stop;
        self
    }
}

/// Run `operation` until it succeeds, fails fatally or the policy gives up.
///
/// Only transient and not-ready errors are retried. On exhaustion the last
/// failure is returned wrapped in [`KubeError::RetriesExhausted`].
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if policy.stop.should_stop(attempt, started.elapsed()) {
            return Err(KubeError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff.delay(attempt);
        if err.is_not_ready() {
            debug!(operation, attempt, ?delay, error = %err, "not ready yet, polling again");
        } else {
            warn!(operation, attempt, ?delay, error = %err, "attempt failed, retrying");
        }
        sleep(delay).await;
    }
}

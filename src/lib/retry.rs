use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Exponential backoff policy for collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Errors that distinguish "try again" from a definitive answer.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a retried call gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Non-transient failure, returned on the attempt it happened.
    Fatal(E),
    /// Every attempt failed transiently; carries the last cause.
    Exhausted { attempts: u32, last: E },
}

/// Run `call` until it succeeds, fails fatally, or the policy runs out of attempts.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => return Err(RetryError::Fatal(error)),
            Err(error) if attempt >= policy.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.backoff(attempt);
                warn!(operation, attempt, ?delay, %error, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Bound a collaborator call by `limit`, mapping an elapsed deadline to `on_timeout()`.
pub async fn with_deadline<T, E, Fut>(
    limit: Duration,
    call: Fut,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

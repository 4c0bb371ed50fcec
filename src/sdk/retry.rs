//! Retry logic with exponential backoff and random jitter.
//!
//! Two outcomes can trigger another attempt:
//!
//! - an error the caller classifies as transient (timeouts, connect errors),
//! - a successful round trip whose result is still retryable (502/503/504).
//!
//! When the attempt budget runs out, an exhausted error is returned as `Err`,
//! while an exhausted retryable *result* is handed back as `Ok`. Callers that
//! want a terminal error for it apply their own status check afterwards.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default number of attempts for a single logical call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for the exponential part of a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Statuses that mark a round trip as a transient server-side condition.
pub const RETRYABLE_STATUS_CODES: [u16; 3] = [502, 503, 504];

/// Anything carrying an HTTP status code.
pub trait StatusCode {
    fn status_code(&self) -> u16;
}

impl StatusCode for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

impl StatusCode for reqwest::blocking::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

/// Retry configuration, built once and reused per call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Base of the exponential schedule
    pub base_delay: Duration,
    /// Base of the random exponential jitter term
    pub jitter: Duration,
    /// Cap for each of the two delay terms
    pub max_delay: Duration,
    /// Statuses treated as retryable results
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retryable_status_codes: RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: base_delay,
            ..Self::default()
        }
    }

    /// Policy without any waiting, mostly useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Whether a status code is retryable under this policy.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Deterministic part of the delay after `attempt` (1-based) failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        scaled(self.base_delay, attempt, self.max_delay)
    }

    /// Random part of the delay: uniform in `[0, jitter * 2^(attempt-1)]`.
    pub fn random_jitter(&self, attempt: u32) -> Duration {
        let upper = scaled(self.jitter, attempt, self.max_delay).as_secs_f64();
        Duration::from_secs_f64(rand::rng().random_range(0.0..=upper))
    }

    /// Full wait between attempt `attempt` and the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + self.random_jitter(attempt)
    }

    /// Build a retryer for HTTP round trips under this policy.
    pub fn make_retryer(&self) -> Retryer {
        Retryer {
            policy: self.clone(),
        }
    }
}

fn scaled(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(62) as i32;
    let secs = base.as_secs_f64() * 2f64.powi(exp);
    if secs >= cap.as_secs_f64() {
        cap
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// What to do after one attempt.
enum Step<T, E> {
    Done(std::result::Result<T, E>),
    Retry(Duration),
}

fn next_step<T, E, R, Q>(
    policy: &RetryPolicy,
    attempt: u32,
    outcome: std::result::Result<T, E>,
    can_retry: &R,
    retry_result: &Q,
) -> Step<T, E>
where
    R: Fn(&E) -> bool,
    Q: Fn(&T) -> bool,
    E: std::fmt::Display,
{
    let exhausted = attempt >= policy.max_attempts;
    match outcome {
        Ok(value) if !retry_result(&value) => {
            if attempt > 1 {
                debug!("Operation succeeded after {} attempts", attempt);
            }
            Step::Done(Ok(value))
        }
        Ok(value) if exhausted => {
            debug!(
                "Retryable result after {} attempts, returning last result",
                attempt
            );
            Step::Done(Ok(value))
        }
        Err(e) if !can_retry(&e) => Step::Done(Err(e)),
        Err(e) if exhausted => {
            debug!("Giving up after {} attempts: {}", attempt, e);
            Step::Done(Err(e))
        }
        Ok(_) => {
            let delay = policy.delay_for(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                "Retryable result, retrying in {:?}",
                delay
            );
            Step::Retry(delay)
        }
        Err(e) => {
            let delay = policy.delay_for(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                "Operation failed with {}, retrying in {:?}",
                e,
                delay
            );
            Step::Retry(delay)
        }
    }
}

/// Retry a blocking operation.
///
/// # Arguments
///
/// * `f` - The operation to retry
/// * `can_retry` - Whether an error is transient
/// * `retry_result` - Whether a successful result should still be retried
/// * `policy` - Attempt budget and backoff schedule
pub fn retry_blocking<F, T, E, R, Q>(
    mut f: F,
    can_retry: R,
    retry_result: Q,
    policy: &RetryPolicy,
) -> std::result::Result<T, E>
where
    F: FnMut() -> std::result::Result<T, E>,
    R: Fn(&E) -> bool,
    Q: Fn(&T) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match next_step(policy, attempt, f(), &can_retry, &retry_result) {
            Step::Done(result) => return result,
            Step::Retry(delay) => std::thread::sleep(delay),
        }
    }
}

/// Retry an async operation; the backoff sleep suspends instead of blocking.
pub async fn retry_with_backoff<F, Fut, T, E, R, Q>(
    mut f: F,
    can_retry: R,
    retry_result: Q,
    policy: &RetryPolicy,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    R: Fn(&E) -> bool,
    Q: Fn(&T) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match next_step(policy, attempt, f().await, &can_retry, &retry_result) {
            Step::Done(result) => return result,
            Step::Retry(delay) => tokio::time::sleep(delay).await,
        }
    }
}

/// Retries HTTP round trips: transient transport errors and retryable
/// statuses trigger another attempt.
#[derive(Debug, Clone)]
pub struct Retryer {
    policy: RetryPolicy,
}

impl Retryer {
    /// The policy this retryer applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a blocking round trip under the policy.
    pub fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        T: StatusCode,
    {
        retry_blocking(
            f,
            Error::is_retriable,
            |r: &T| self.policy.is_retryable_status(r.status_code()),
            &self.policy,
        )
    }

    /// Run an async round trip under the policy.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: StatusCode,
    {
        retry_with_backoff(
            f,
            Error::is_retriable,
            |r: &T| self.policy.is_retryable_status(r.status_code()),
            &self.policy,
        )
        .await
    }
}

//! Retry logic with exponential backoff
//!
//! Transient report failures (rate limits, server errors, connection resets)
//! are retried with exponential backoff and optional jitter; permanent
//! failures (bad account, malformed definition) fail immediately.
//!
//! # Example
//!
//! ```no_run
//! use ads_report_dl::retry::{IsRetryable, with_retry};
//! use ads_report_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DatabaseError, Error, FetchError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (rate limit, server busy, connection reset) should
/// return `true`. Permanent failures (bad account, malformed definition,
/// constraint violation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Server-advised minimum wait before the next attempt, when the error
    /// carries one (e.g. a Retry-After header)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::Transient(_) => true,
            FetchError::Permanent(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl IsRetryable for DatabaseError {
    fn is_retryable(&self) -> bool {
        match self {
            // A busy or briefly locked database can succeed on retry
            DatabaseError::QueryFailed(msg) | DatabaseError::ConnectionFailed(msg) => {
                msg.contains("locked") || msg.contains("busy")
            }
            DatabaseError::MigrationFailed(_) => false,
            DatabaseError::ConstraintViolation(_) => false,
            DatabaseError::CorruptEntity { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Fetch(e) => e.retry_after(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            Error::Database(e) => e.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Mapping failures will reproduce on every attempt
            Error::Mapping(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::ExternalTool(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted. Non-retryable errors return immediately. A server-provided
/// Retry-After hint raises the next wait but never shortens it.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay();

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                let wait = next_wait(config, delay, &e);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    wait_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(wait).await;
                delay = next_delay(config, delay);
            }
            Err(e) => {
                log_final_failure(&e, attempt);
                return Err(e);
            }
        }
    }
}

/// Like [`with_retry`], but each attempt runs under a concurrency slot that is
/// given back for the duration of the backoff sleep
///
/// The caller hands in the permit covering the first attempt. On a retryable
/// failure the permit is dropped before sleeping and a fresh one is acquired
/// from `semaphore` for the next attempt, so a task waiting out a rate limit
/// never pins a slot that an unstarted task could use. On success the permit
/// held during the final attempt is returned so the caller keeps its slot for
/// follow-up work.
pub async fn with_retry_slotted<F, Fut, T, E>(
    config: &RetryConfig,
    semaphore: &Arc<Semaphore>,
    permit: OwnedSemaphorePermit,
    mut operation: F,
) -> Result<(T, OwnedSemaphorePermit), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay();
    let mut permit = permit;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok((result, permit));
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                let wait = next_wait(config, delay, &e);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    wait_ms = wait.as_millis(),
                    "Operation failed, yielding slot and retrying"
                );

                drop(permit);
                tokio::time::sleep(wait).await;
                delay = next_delay(config, delay);

                match Arc::clone(semaphore).acquire_owned().await {
                    Ok(fresh) => permit = fresh,
                    // Closed semaphore: the pool is tearing down
                    Err(_) => return Err(e),
                }
            }
            Err(e) => {
                log_final_failure(&e, attempt);
                return Err(e);
            }
        }
    }
}

/// The actual sleep before the next attempt: the backoff delay, jittered when
/// configured, raised to any server-provided Retry-After hint
fn next_wait<E: IsRetryable>(config: &RetryConfig, delay: Duration, error: &E) -> Duration {
    let wait = if config.jitter { add_jitter(delay) } else { delay };
    match error.retry_after() {
        Some(hint) => wait.max(hint),
        None => wait,
    }
}

/// The backoff delay for the attempt after this one, capped at max_delay
fn next_delay(config: &RetryConfig, delay: Duration) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay())
}

fn log_final_failure<E: IsRetryable + std::fmt::Display>(error: &E, attempt: u32) {
    if error.is_retryable() {
        tracing::error!(
            error = %error,
            attempts = attempt + 1,
            "Operation failed after all retry attempts exhausted"
        );
    } else {
        tracing::error!(
            error = %error,
            "Operation failed with non-retryable error"
        );
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}

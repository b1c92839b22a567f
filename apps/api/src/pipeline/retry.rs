//! Generic "retry with classifier and backoff", kept apart from business logic.
//!
//! Callers pass an operation, a predicate deciding which errors are worth
//! another attempt, and a backoff shape. The helper owns the attempt loop,
//! the sleeps, and the cancellation checks.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::cancel::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `attempt_number × unit` before retry number `attempt_number`.
    Linear(Duration),
}

impl Backoff {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Linear(unit) => unit * attempt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Why a retried operation ultimately did not produce a value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The cancellation token fired before or between attempts.
    Cancelled,
    /// The classifier rejected the error; no retry was attempted.
    Fatal(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "cancelled"),
            RetryError::Fatal(e) => write!(f, "{e}"),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
        }
    }
}

/// Runs `op` until it succeeds, the classifier rejects an error, attempts
/// run out, or `cancel` fires. `op` receives the 1-based attempt number.
///
/// `on_retry` is called with the attempt number, the delay about to be
/// slept, and the error that triggered the retry.
pub async fn retry_with_backoff<T, E, Op, Fut, C, R>(
    policy: RetryPolicy,
    cancel: &CancelToken,
    is_retryable: C,
    mut on_retry: R,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    R: FnMut(u32, Duration, &E),
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(RetryError::Fatal(err));
        }

        if attempt == max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.backoff.delay(attempt);
        warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %err, "attempt failed, backing off");
        on_retry(attempt, delay, &err);

        if !cancel.sleep(delay).await {
            return Err(RetryError::Cancelled);
        }
    }

    Err(RetryError::Cancelled)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    const POLICY: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff: Backoff::Fixed(Duration::from_secs(10)),
    };

    #[test]
    fn test_linear_backoff_scales_with_attempt() {
        let backoff = Backoff::Linear(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_secs(10));
        assert_eq!(backoff.delay(1), backoff.delay(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<&str, RetryError<String>> = retry_with_backoff(
            POLICY,
            &CancelToken::new(),
            |_| true,
            |_, _, _| {},
            |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("429 too many requests".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            POLICY,
            &CancelToken::new(),
            |e: &String| e.contains("429"),
            |_, _, _| {},
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid request".to_string()) }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(ref e)) if e == "invalid request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let started = tokio::time::Instant::now();
        let mut delays = Vec::new();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            POLICY,
            &CancelToken::new(),
            |_| true,
            |_, delay, _| delays.push(delay),
            |_| async { Err("quota exceeded".to_string()) },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "quota exceeded");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(delays, vec![Duration::from_secs(10), Duration::from_secs(10)]);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            POLICY,
            &cancel,
            |_| true,
            |_, _, _| {},
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            POLICY,
            &cancel,
            |_| true,
            move |_, _, _| trigger.cancel(),
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("rate limit".to_string()) }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

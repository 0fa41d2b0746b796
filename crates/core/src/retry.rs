//! Retry with exponential backoff and jitter
//!
//! Used by store adapters around single requests. The engine itself never
//! retries: a request that still fails after the policy is exhausted becomes a
//! per-item failure (or a fatal listing error).

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Service error codes that indicate a transient condition
const TRANSIENT_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "RequestTimeTooSkewed",
    "InternalError",
    "ServiceUnavailable",
];

/// Run `operation` until it succeeds, fails permanently or attempts run out
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient store error, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Delay before retry number `attempt` (1-based): capped exponential plus jitter
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_ms);
    Duration::from_millis(base + jitter(base))
}

/// Cheap jitter in `[0, max)` derived from the clock
fn jitter(max: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    nanos % max.max(1)
}

/// Whether an error is worth retrying
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Network(_) => true,
        Error::Service { code, .. } => TRANSIENT_CODES.contains(&code.as_str()),
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        ),
        Error::Config(_)
        | Error::InvalidPath(_)
        | Error::NotFound(_)
        | Error::Auth(_)
        | Error::TomlParse(_)
        | Error::General(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 8,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };

        let first = backoff_delay(&config, 1).as_millis();
        assert!((100..200).contains(&first));

        let third = backoff_delay(&config, 3).as_millis();
        assert!((400..800).contains(&third));

        // capped at max plus up to max of jitter
        let late = backoff_delay(&config, 30).as_millis();
        assert!((1000..2000).contains(&late));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_retryable_error(&Error::Network("reset".into())));
        assert!(is_retryable_error(&Error::Service {
            code: "SlowDown".into(),
            message: "slow down".into(),
        }));
        assert!(!is_retryable_error(&Error::Service {
            code: "InvalidObjectState".into(),
            message: "archived".into(),
        }));
        assert!(!is_retryable_error(&Error::NotFound("k".into())));
        assert!(!is_retryable_error(&Error::Auth("denied".into())));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = retry_with_backoff(
            &fast_config(4),
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Network("timeout".into()))
                    } else {
                        Ok("done")
                    }
                }
            },
            is_retryable_error,
        )
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry_with_backoff(
            &fast_config(3),
            || {
                calls += 1;
                async { Err(Error::Network("down".into())) }
            },
            is_retryable_error,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_with_backoff(
            &fast_config(5),
            || {
                calls += 1;
                async { Err(Error::NotFound("missing".into())) }
            },
            is_retryable_error,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls, 1);
    }
}

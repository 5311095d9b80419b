//! Retrying transient API failures
//!
//! Background jobs retry connection problems, rate limits, server errors and
//! timeouts, and give up at once on configuration, validation, authentication and
//! malformed-request errors. The helpers are public so callers can wrap their own
//! `send()` calls the same way.
//!
//! Two backoff shapes are supported:
//!
//! ```text
//! Fixed(d)        d, d, d, ...                  (background jobs)
//! Exponential     initial * multiplier^n, capped at max, +/- jitter
//! ```
//!
//! A rate-limit error carrying `retry_after` always waits at least that long.
//!
//! # Examples
//!
//! ```rust,no_run
//! use claude_conversation::retry::{retry_with_backoff, RetryConfig};
//! use claude_conversation::testing::FakeClient;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fake = Arc::new(FakeClient::new());
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_secs(1));
//!
//! let response = retry_with_backoff(config, || {
//!     let fake = fake.clone();
//!     async move {
//!         let mut conversation = fake.conversation();
//!         conversation.user("Hello");
//!         conversation.send().await
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{ApiErrorKind, Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// The same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^attempt`, capped at `max`, spread by `jitter` (0.0 to 1.0)
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let grown = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                let capped = grown.min(max.as_millis() as f64);

                // Centered on `capped`, so the average wait is unchanged
                let spread = capped * jitter;
                let offset = rand::random::<f64>() * spread - spread / 2.0;

                Duration::from_millis((capped + offset).max(0.0) as u64)
            }
        }
    }
}

/// Attempt count plus backoff shape
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(60),
                multiplier: 2.0,
                jitter: 0.1,
            },
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_attempts` tries with `delay` between each, no jitter
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// First delay of an exponential backoff.
    ///
    /// Switches a fixed backoff to the exponential defaults first.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        if let Backoff::Exponential { initial, .. } = self.exponential() {
            *initial = delay;
        }
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        if let Backoff::Exponential { max, .. } = self.exponential() {
            *max = delay;
        }
        self
    }

    pub fn with_backoff_multiplier(mut self, factor: f64) -> Self {
        if let Backoff::Exponential { multiplier, .. } = self.exponential() {
            *multiplier = factor;
        }
        self
    }

    /// Jitter factor, clamped to 0.0..=1.0
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        if let Backoff::Exponential { jitter, .. } = self.exponential() {
            *jitter = factor.clamp(0.0, 1.0);
        }
        self
    }

    fn exponential(&mut self) -> &mut Backoff {
        if matches!(self.backoff, Backoff::Fixed(_)) {
            self.backoff = RetryConfig::default().backoff;
        }
        &mut self.backoff
    }

    /// Wait before the retry that follows failed `attempt` (0-based)
    fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let delay = self.backoff.delay(attempt);
        match error {
            Error::Api {
                retry_after: Some(after),
                ..
            } => delay.max(*after),
            _ => delay,
        }
    }
}

/// Whether retrying `error` could succeed.
///
/// True for connection failures, rate limits, server errors, timeouts, and stream
/// failures caused by one of those.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Timeout => true,
        Error::Api { kind, .. } => matches!(
            kind,
            ApiErrorKind::Connection | ApiErrorKind::RateLimit | ApiErrorKind::Server
        ),
        Error::Streaming { source, .. } => is_retryable_error(source),
        _ => false,
    }
}

/// Retry `operation` on any error until it succeeds or attempts run out.
///
/// Returns the last error when every attempt fails.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(config, |_| true, operation).await
}

/// Like [`retry_with_backoff`], but fails at once on errors that
/// [`is_retryable_error`] rejects.
///
/// # Examples
///
/// ```rust,no_run
/// use claude_conversation::retry::{retry_with_backoff_conditional, RetryConfig};
/// use claude_conversation::{ConversationConfig, MessagesApi, PayloadBuilder};
/// use claude_conversation::testing::FakeClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fake = FakeClient::new();
/// let request = PayloadBuilder::from_config(ConversationConfig::new("claude-haiku-4-5")).build();
///
/// let response = retry_with_backoff_conditional(RetryConfig::default(), || {
///     fake.create_message(&request)
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff_conditional<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(config, is_retryable_error, operation).await
}

async fn retry_while<P, F, Fut, T>(config: RetryConfig, retryable: P, mut operation: F) -> Result<T>
where
    P: Fn(&Error) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable(&err) || attempt + 1 >= attempts {
            return Err(err);
        }

        let delay = config.delay_for(attempt, &err);
        log::warn!(
            "Attempt {}/{} failed, retrying in {:?}: {}",
            attempt + 1,
            attempts,
            delay,
            err
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Operation failing with `make_err` on the first `failures` calls, then returning 42
    fn flaky(
        failures: usize,
        make_err: fn() -> Error,
    ) -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<Result<i32>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let op = move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if call < failures { Err(make_err()) } else { Ok(42) })
        };
        (calls, op)
    }

    #[test]
    fn test_builder_switches_to_exponential() {
        let config = RetryConfig::fixed(2, Duration::from_millis(5))
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(4.0);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(
            config.backoff,
            Backoff::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(30),
                multiplier: 1.5,
                jitter: 1.0,
            }
        );
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: 0.0,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(350));
        assert_eq!(backoff.delay(9), Duration::from_millis(350));
    }

    #[test]
    fn test_fixed_delay() {
        let backoff = RetryConfig::fixed(3, Duration::from_millis(250)).backoff;
        assert_eq!(backoff.delay(0), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(250));
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let config = RetryConfig::fixed(3, Duration::from_millis(10));
        let err = Error::rate_limited(Some(Duration::from_secs(2)));
        assert_eq!(config.delay_for(0, &err), Duration::from_secs(2));
        assert_eq!(config.delay_for(0, &Error::timeout()), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let (calls, op) = flaky(2, Error::timeout);
        let result = retry_with_backoff(RetryConfig::fixed(3, Duration::from_millis(1)), op).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let (calls, op) = flaky(usize::MAX, Error::timeout);
        let result = retry_with_backoff(RetryConfig::fixed(2, Duration::from_millis(1)), op).await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let (calls, op) = flaky(0, Error::timeout);
        let result = retry_with_backoff(RetryConfig::fixed(0, Duration::ZERO), op).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conditional_stops_on_fatal_error() {
        let (calls, op) = flaky(usize::MAX, || {
            Error::api(ApiErrorKind::Authentication, "denied")
        });
        let result =
            retry_with_backoff_conditional(RetryConfig::fixed(3, Duration::from_millis(1)), op).await;

        assert_eq!(result.unwrap_err().api_kind(), Some(ApiErrorKind::Authentication));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::timeout()));
        assert!(is_retryable_error(&Error::api(ApiErrorKind::Server, "overloaded")));
        assert!(is_retryable_error(&Error::api(ApiErrorKind::Connection, "refused")));
        assert!(is_retryable_error(&Error::rate_limited(None)));

        assert!(!is_retryable_error(&Error::api(ApiErrorKind::Authentication, "invalid x-api-key")));
        assert!(!is_retryable_error(&Error::api(
            ApiErrorKind::InvalidRequest,
            "max_tokens: field required"
        )));
        assert!(!is_retryable_error(&Error::config("Invalid config")));
        assert!(!is_retryable_error(&Error::validation("topK", 0, "topK must be at least 1")));
    }

    #[test]
    fn test_streaming_errors_follow_their_cause() {
        let transient = Error::streaming(
            "Stream interrupted: reset",
            Error::api(ApiErrorKind::Connection, "reset"),
        );
        let fatal = Error::streaming(
            "Failed to create stream: bad key",
            Error::api(ApiErrorKind::Authentication, "bad key"),
        );
        assert!(is_retryable_error(&transient));
        assert!(!is_retryable_error(&fatal));
    }
}

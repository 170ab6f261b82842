//! Backend-independent retry policy for rate-limited calls.

use std::fmt::Display;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use super::SchedulerError;

/// Upper bound on a backend-suggested retry delay.
pub const MAX_SUGGESTED_DELAY: Duration = Duration::from_secs(300);

fn rate_limit_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)\b429\b|rate.?limit|quota|resource.?exhausted")
            .expect("rate limit regex must compile")
    })
}

/// Matches "Please retry in 12.5s" prose and `"retryDelay": "12s"` details.
fn retry_hint_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"(?i)retry in ([\d.]+)\s*s|"retryDelay"\s*:\s*"([\d.]+)s""#)
            .expect("retry hint regex must compile")
    })
}

/// Emitted before sleeping ahead of another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNotice {
    /// The attempt that just failed, 1-based.
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryNotice {
    /// Delay rounded up to whole seconds, as shown to users.
    pub fn delay_secs(&self) -> u64 {
        let secs = self.delay.as_secs();
        if self.delay.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first try included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Whether an error looks like a rate or quota rejection.
    pub fn is_retryable(&self, error_text: &str) -> bool {
        rate_limit_regex().is_match(error_text)
    }

    /// Delay the backend asked for, if the error text carries one. Hints
    /// that do not fit a `Duration` are ignored; larger ones are capped at
    /// [`MAX_SUGGESTED_DELAY`].
    pub fn suggested_delay(&self, error_text: &str) -> Option<Duration> {
        let caps = retry_hint_regex().captures(error_text)?;
        let secs: f64 = caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()?;
        if secs <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(secs)
            .ok()
            .map(|delay| delay.min(MAX_SUGGESTED_DELAY))
    }

    /// Delay before retrying after `attempt` (1-based) failed:
    /// the suggested delay, else `2^attempt * base_backoff`.
    pub fn delay_for(&self, attempt: u32, error_text: &str) -> Duration {
        self.suggested_delay(error_text).unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt.min(16));
            self.base_backoff.saturating_mul(factor)
        })
    }
}

/// Run `task` until it succeeds, fails with a non-rate error, or the policy
/// runs out of attempts.
///
/// `on_retry` fires once per retry, before the sleep. A rate error on the
/// final attempt yields [`SchedulerError::Exhausted`] without a notice.
pub async fn run_with_retry<T, E, F, Fut>(
    mut task: F,
    policy: &RetryPolicy,
    mut on_retry: impl FnMut(RetryNotice),
) -> Result<T, SchedulerError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match task().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let text = err.to_string();
        if !policy.is_retryable(&text) {
            return Err(SchedulerError::Task(err));
        }
        if attempt >= policy.max_attempts {
            return Err(SchedulerError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_for(attempt, &text);
        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "rate limited, retrying"
        );
        on_retry(RetryNotice {
            attempt,
            max_attempts: policy.max_attempts,
            delay,
        });
        tokio::time::sleep(delay).await;
    }
}

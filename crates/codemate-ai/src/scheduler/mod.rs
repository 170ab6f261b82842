//! Global rate scheduler for backend calls.
//!
//! Every session funnels its backend calls through one `RateScheduler`. A call
//! is admitted in submission order (a fair mutex is the queue), then needs a
//! concurrency slot and a token from a reservoir that is refilled to
//! `requests_per_window` once per window. Retries of rate-limited calls happen
//! while the slot is held.

mod retry;


pub use retry::{run_with_retry, RetryNotice, RetryPolicy, MAX_SUGGESTED_DELAY};

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codemate_config::RateLimitConfig;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError<E> {
    #[error("{0}")]
    Task(E),
    #[error("Failed after {attempts} attempts due to quota limits: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("rate scheduler is shut down")]
    Closed,
}

impl<E> SchedulerError<E> {
    /// Stable code for the `error` envelope sent to the client.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Task(_) => "backend_error",
            SchedulerError::Exhausted { .. } => "retries_exhausted",
            SchedulerError::Closed => "scheduler_closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 10,
            window: Duration::from_secs(60),
            max_concurrent: 1,
        }
    }
}

impl From<&RateLimitConfig> for SchedulerConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_window: config.requests_per_window,
            window: Duration::from_secs(config.window_secs),
            max_concurrent: config.max_concurrent as usize,
        }
    }
}

impl From<&RateLimitConfig> for RetryPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_secs(config.base_backoff_secs),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Calls submitted but not yet running.
    pub waiting: usize,
    pub running: usize,
    pub tokens_available: u32,
}

struct Reservoir {
    available: u32,
    refilled_at: Instant,
}

impl Reservoir {
    fn refill(&mut self, now: Instant, capacity: u32, window: Duration) {
        let elapsed = now.saturating_duration_since(self.refilled_at);
        if elapsed >= window {
            let windows = (elapsed.as_nanos() / window.as_nanos().max(1)) as u32;
            self.available = capacity;
            self.refilled_at += window * windows;
        }
    }
}

/// Decrements a counter when dropped, so abandoned callers do not skew stats.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let before = counter.fetch_add(1, Ordering::SeqCst);
        (Self(counter), before)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Held for the lifetime of an admitted call.
struct Admission<'a> {
    _permit: OwnedSemaphorePermit,
    _running: CountGuard<'a>,
}

pub struct RateScheduler {
    config: SchedulerConfig,
    queue: Mutex<()>,
    slots: Arc<Semaphore>,
    reservoir: Mutex<Reservoir>,
    waiting: AtomicUsize,
    running: AtomicUsize,
}

impl RateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            requests_per_window: config.requests_per_window.max(1),
            window: config.window.max(Duration::from_millis(1)),
            max_concurrent: config.max_concurrent.max(1),
        };
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            reservoir: Mutex::new(Reservoir {
                available: config.requests_per_window,
                refilled_at: Instant::now(),
            }),
            queue: Mutex::new(()),
            waiting: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `task` once admitted.
    ///
    /// `on_queued(position)` fires when at least one other call is already
    /// waiting, with `position` counting this call.
    pub async fn schedule<T, E, F, Fut>(
        &self,
        task: F,
        on_queued: impl FnOnce(usize),
    ) -> Result<T, SchedulerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _admission = self.admit(on_queued).await?;
        task().await.map_err(SchedulerError::Task)
    }

    /// [`schedule`](Self::schedule) and [`run_with_retry`] combined. Retries
    /// keep the concurrency slot but do not consume extra reservoir tokens.
    pub async fn schedule_with_retry<T, E, F, Fut>(
        &self,
        task: F,
        policy: &RetryPolicy,
        on_queued: impl FnOnce(usize),
        on_retry: impl FnMut(RetryNotice),
    ) -> Result<T, SchedulerError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _admission = self.admit(on_queued).await?;
        run_with_retry(task, policy, on_retry).await
    }

    pub async fn stats(&self) -> SchedulerStats {
        let tokens_available = {
            let mut reservoir = self.reservoir.lock().await;
            reservoir.refill(
                Instant::now(),
                self.config.requests_per_window,
                self.config.window,
            );
            reservoir.available
        };
        SchedulerStats {
            waiting: self.waiting.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            tokens_available,
        }
    }

    async fn admit<E>(&self, on_queued: impl FnOnce(usize)) -> Result<Admission<'_>, SchedulerError<E>> {
        let (waiting, ahead) = CountGuard::enter(&self.waiting);
        if ahead > 0 {
            info!(position = ahead + 1, "backend call queued");
            on_queued(ahead + 1);
        }

        let permit = {
            let _turn = self.queue.lock().await;
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::Closed)?;
            self.take_token().await;
            permit
        };

        drop(waiting);
        let (running, _) = CountGuard::enter(&self.running);
        debug!("backend call admitted");
        Ok(Admission {
            _permit: permit,
            _running: running,
        })
    }

    async fn take_token(&self) {
        loop {
            let wait = {
                let mut reservoir = self.reservoir.lock().await;
                let now = Instant::now();
                reservoir.refill(now, self.config.requests_per_window, self.config.window);
                if reservoir.available > 0 {
                    reservoir.available -= 1;
                    return;
                }
                (reservoir.refilled_at + self.config.window).saturating_duration_since(now)
            };
            info!(wait_ms = wait.as_millis() as u64, "reservoir empty, waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for RateScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

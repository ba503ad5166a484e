//! Bounded polling
//!
//! The single retry loop every wait is built on. A [`Probe`] is attempted
//! repeatedly until it is ready, it fails hard, or the overall deadline
//! passes. Each attempt is capped at the poll interval: an attempt that
//! outlives it is dropped at its current suspension point and the loop
//! re-attempts at once, so at most one attempt per probe is ever in flight.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::error::{Result, TimeoutDiagnostics, WaitError};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Intermediate state reported by a probe that is not ready yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub observed: Option<String>,
    pub converged: Option<usize>,
    pub required: Option<usize>,
}

impl Progress {
    pub fn observed(value: impl fmt::Display) -> Self {
        Self {
            observed: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn converged(converged: usize, required: usize) -> Self {
        Self {
            observed: None,
            converged: Some(converged),
            required: Some(required),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_none() && self.converged.is_none()
    }
}

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ready(T),
    /// Condition not true yet (includes "metric not registered yet")
    NotReady(Progress),
}

impl<T> Attempt<T> {
    pub fn pending() -> Self {
        Attempt::NotReady(Progress::default())
    }

    pub fn observed(value: impl fmt::Display) -> Self {
        Attempt::NotReady(Progress::observed(value))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Attempt::Ready(_))
    }
}

/// Overall budget and per-attempt interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Same interval, budget shrunk to what is left of an enclosing deadline.
    pub fn within(self, deadline: Instant) -> Self {
        let remaining = deadline.saturating_duration_since(Instant::now());
        Self {
            timeout: self.timeout.min(remaining),
            interval: self.interval,
        }
    }
}

/// A read-only, idempotent check of some cluster condition.
#[async_trait]
pub trait Probe: Send + Sync {
    type Output: Send;

    /// Name used in logs and timeout diagnostics.
    fn operation(&self) -> &str;

    async fn attempt(&self) -> Result<Attempt<Self::Output>>;
}

/// Attempt `probe` every `settings.interval` until it is ready.
///
/// Hard errors from the probe propagate immediately. When the budget runs
/// out the error is [`WaitError::Timeout`] carrying the most recent
/// non-empty [`Progress`] the probe reported.
pub async fn bounded_poll<P>(probe: &P, settings: PollSettings) -> Result<P::Output>
where
    P: Probe + ?Sized,
{
    let started = Instant::now();
    let deadline = started + settings.timeout;
    let interval = settings.interval.max(MIN_INTERVAL);
    let mut attempts = 0u32;
    let mut progress = Progress::default();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        attempts += 1;
        let attempt_deadline = (now + interval).min(deadline);

        match time::timeout_at(attempt_deadline, probe.attempt()).await {
            Ok(Ok(Attempt::Ready(value))) => {
                debug!(
                    operation = probe.operation(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "condition satisfied"
                );
                return Ok(value);
            }
            Ok(Ok(Attempt::NotReady(latest))) => {
                trace!(operation = probe.operation(), attempt = attempts, ?latest, "not ready");
                if !latest.is_empty() {
                    progress = latest;
                }
                time::sleep_until(attempt_deadline).await;
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                trace!(operation = probe.operation(), attempt = attempts, "attempt outlived interval, retrying");
            }
        }
    }

    let diagnostics = TimeoutDiagnostics {
        operation: probe.operation().to_string(),
        elapsed: started.elapsed(),
        attempts,
        last_observed: progress.observed,
        converged: progress.converged,
        required: progress.required,
    };
    warn!(%diagnostics, "wait timed out");
    Err(WaitError::timeout(diagnostics))
}

/// Probe backed by an async closure. The closure may borrow from its
/// environment; the returned futures live no longer than the probe.
pub struct FnProbe<F, Fut, T> {
    operation: String,
    f: F,
    _attempt: PhantomData<fn() -> (Fut, T)>,
}

pub fn probe_fn<F, Fut, T>(operation: impl Into<String>, f: F) -> FnProbe<F, Fut, T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Attempt<T>>> + Send,
    T: Send,
{
    FnProbe {
        operation: operation.into(),
        f,
        _attempt: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, T> Probe for FnProbe<F, Fut, T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Attempt<T>>> + Send,
    T: Send,
{
    type Output = T;

    fn operation(&self) -> &str {
        &self.operation
    }

    async fn attempt(&self) -> Result<Attempt<T>> {
        (self.f)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let probe = probe_fn("immediate", || async { Ok(Attempt::Ready(42u64)) });
        let value = bounded_poll(&probe, PollSettings::new(Duration::from_secs(1), Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = probe_fn("unreachable", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Attempt<()>, _>(WaitError::unreachable(3, "connection refused"))
            }
        });
        let err = bounded_poll(&probe, PollSettings::new(Duration::from_secs(5), Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::UnreachableMember { member: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_attempt_is_abandoned() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = probe_fn("stall-once", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    futures::future::pending::<()>().await;
                }
                Ok(Attempt::Ready("second"))
            }
        });
        let started = Instant::now();
        let value = bounded_poll(&probe, PollSettings::new(Duration::from_secs(5), Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(value, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_last_progress() {
        let probe = probe_fn("never", || async { Ok::<Attempt<()>, _>(Attempt::observed("view=3")) });
        let err = bounded_poll(&probe, PollSettings::new(Duration::from_secs(1), Duration::from_millis(250)))
            .await
            .unwrap_err();
        let diagnostics = err.diagnostics().unwrap();
        assert_eq!(diagnostics.operation, "never");
        assert_eq!(diagnostics.last_observed.as_deref(), Some("view=3"));
        assert_eq!(diagnostics.attempts, 4);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let settings = PollSettings::new(Duration::from_secs(1), Duration::ZERO);
        assert_eq!(settings.interval, MIN_INTERVAL);
    }
}

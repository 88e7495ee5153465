//! Status polling after a mutating call
//!
//! A [`ConvergenceWaiter`] re-reads a resource until it reports one of the
//! policy's target statuses. It gives up immediately on a status that is
//! neither pending nor target, on a failed read, on cancellation, and once
//! the policy's timeout has elapsed.

use crate::cancel::{self, CancelToken};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};

/// How long and how often to poll for one resource type.
///
/// Owned by the caller and never mutated while a wait is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePolicy<S: Eq + Hash = String> {
    /// Statuses that mean "still working"
    pub pending: HashSet<S>,

    /// Statuses that end the wait successfully
    pub target: HashSet<S>,

    /// Upper bound on the whole wait, initial delay included
    pub timeout: Duration,

    /// Delay between polls
    pub poll_interval: Duration,

    /// Delay before the first poll
    pub initial_delay: Duration,

    /// Growth factor of the poll interval (1.0 keeps it fixed)
    pub backoff_multiplier: f64,

    /// Cap on the poll interval when it grows
    pub max_poll_interval: Duration,
}

impl<S: Eq + Hash> ConvergencePolicy<S> {
    pub fn new(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            target: target.into_iter().collect(),
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_poll_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_poll_interval = max_poll_interval;
        self
    }

    /// Delay after the given poll (0-indexed)
    ///
    /// Never exceeds the larger of `poll_interval` and `max_poll_interval`,
    /// however many polls have run. A NaN multiplier polls at a fixed rate.
    pub fn delay_for_poll(&self, poll: u32) -> Duration {
        let multiplier = self.backoff_multiplier;
        if multiplier.is_nan() || multiplier <= 1.0 {
            return self.poll_interval;
        }
        let cap = self.max_poll_interval.max(self.poll_interval);
        let exponent = i32::try_from(poll).unwrap_or(i32::MAX);
        let delay = self.poll_interval.as_secs_f64() * multiplier.powi(exponent);
        if !delay.is_finite() || delay >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(delay)
    }
}

/// Terminal snapshot of a successful wait
#[derive(Debug, Clone)]
pub struct WaitResult<T, S = String> {
    /// The resource as returned by the last poll
    pub state: T,

    /// The target status that ended the wait
    pub status: S,

    /// Number of refresh calls issued
    pub polls: u32,

    pub elapsed: Duration,
}

/// Polls a resource until it converges on a target status
pub struct ConvergenceWaiter<'p, S: Eq + Hash = String> {
    policy: &'p ConvergencePolicy<S>,
    cancel: Option<CancelToken>,
}

impl<'p, S> ConvergenceWaiter<'p, S>
where
    S: Eq + Hash + Display,
{
    pub fn new(policy: &'p ConvergencePolicy<S>) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn expected(&self) -> String {
        let mut statuses: Vec<String> = self
            .policy
            .pending
            .iter()
            .chain(self.policy.target.iter())
            .map(|s| s.to_string())
            .collect();
        statuses.sort();
        statuses.join(", ")
    }

    async fn pause_until(&self, deadline: Instant, operation: &str) -> Result<()> {
        tokio::select! {
            _ = sleep_until(deadline) => Ok(()),
            _ = cancel::cancelled(self.cancel.as_ref()) => Err(EngineError::cancelled(operation)),
        }
    }

    /// Wait for `resource_id` to reach a target status.
    ///
    /// `refresh` performs exactly one read per call and returns the current
    /// snapshot with its status. A timeout or cancellation that does not
    /// already name a resource is tagged with `resource_id`.
    pub async fn wait<T, F, Fut>(&self, resource_id: &str, refresh: F) -> Result<WaitResult<T, S>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, S)>>,
    {
        self.poll(resource_id, refresh)
            .await
            .map_err(|e| e.for_resource(resource_id))
    }

    async fn poll<T, F, Fut>(&self, resource_id: &str, mut refresh: F) -> Result<WaitResult<T, S>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, S)>>,
    {
        let operation = format!("waiting for '{}'", resource_id);
        let start = Instant::now();
        let deadline = start + self.policy.timeout;

        if !self.policy.initial_delay.is_zero() {
            tracing::debug!(
                "Delaying first poll of {} by {:?}",
                resource_id,
                self.policy.initial_delay
            );
            self.pause_until((start + self.policy.initial_delay).min(deadline), &operation)
                .await?;
        }

        let mut polls: u32 = 0;
        loop {
            if Instant::now() >= deadline {
                return Err(EngineError::timeout(operation, start.elapsed()));
            }

            polls += 1;
            let refreshed = tokio::select! {
                r = timeout_at(deadline, refresh()) => r,
                _ = cancel::cancelled(self.cancel.as_ref()) => {
                    return Err(EngineError::cancelled(operation));
                }
            };
            let (state, status) = match refreshed {
                Ok(result) => result?,
                Err(_) => return Err(EngineError::timeout(operation, start.elapsed())),
            };

            tracing::debug!("{} poll {}: {}", resource_id, polls, status);

            if self.policy.target.contains(&status) {
                return Ok(WaitResult {
                    state,
                    status,
                    polls,
                    elapsed: start.elapsed(),
                });
            }

            if !self.policy.pending.contains(&status) {
                return Err(EngineError::UnexpectedStatus {
                    resource_id: resource_id.to_string(),
                    status: status.to_string(),
                    expected: self.expected(),
                });
            }

            let next = Instant::now() + self.policy.delay_for_poll(polls - 1);
            self.pause_until(next.min(deadline), &operation).await?;
        }
    }
}

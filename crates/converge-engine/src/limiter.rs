//! Bound on concurrent rate-sensitive provider operations
//!
//! Purchases and similar calls are throttled by the provider per account.
//! [`ConcurrencyLimiter`] keeps the number in flight under a fixed capacity;
//! callers spin-wait with jitter for a slot and give up after a ceiling.

use crate::cancel::{self, CancelToken};
use crate::error::{EngineError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Limiter tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Maximum operations in flight at once
    pub capacity: usize,

    /// Lower bound of the sleep between capacity checks
    pub jitter_min: Duration,

    /// Upper bound of the sleep between capacity checks
    pub jitter_max: Duration,

    /// Give up waiting for a slot after this long
    pub acquire_timeout: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            jitter_min: Duration::from_millis(200),
            jitter_max: Duration::from_millis(400),
            acquire_timeout: Duration::from_secs(300),
        }
    }
}

/// Counting semaphore with bounded, jittered acquisition
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    in_flight: Arc<Mutex<usize>>,
    settings: LimiterSettings,
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    in_flight: Arc<Mutex<usize>>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *in_flight = in_flight.saturating_sub(1);
    }
}

impl ConcurrencyLimiter {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(0)),
            settings,
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Operations currently holding a slot
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_acquire(&self) -> Option<LimiterPermit> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if *in_flight >= self.settings.capacity {
            return None;
        }
        *in_flight += 1;
        Some(LimiterPermit {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn jitter(&self) -> Duration {
        let min = self.settings.jitter_min.as_millis() as u64;
        let max = (self.settings.jitter_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    pub async fn acquire(&self) -> Result<LimiterPermit> {
        self.acquire_inner(None).await
    }

    pub async fn acquire_with_cancel(&self, token: &CancelToken) -> Result<LimiterPermit> {
        self.acquire_inner(Some(token)).await
    }

    async fn acquire_inner(&self, token: Option<&CancelToken>) -> Result<LimiterPermit> {
        let start = Instant::now();
        let deadline = start + self.settings.acquire_timeout;

        loop {
            if let Some(permit) = self.try_acquire() {
                return Ok(permit);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::timeout(
                    "acquiring a concurrency slot",
                    start.elapsed(),
                ));
            }

            let wake = (now + self.jitter()).min(deadline);
            tracing::debug!(
                "Concurrency limit of {} reached, retrying in {:?}",
                self.settings.capacity,
                wake - now
            );
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = cancel::cancelled(token) => {
                    return Err(EngineError::cancelled("acquiring a concurrency slot"));
                }
            }
        }
    }
}

// ABOUTME: Admission control for submit_sm: token bucket rate limit plus bounded outstanding window
// ABOUTME: Waiting is the backpressure; only cancellation turns a wait into an error

use crate::session::error::{SessionError, SessionResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Token bucket refilled continuously at `rate` tokens per second, holding
/// at most `capacity` tokens. Starts full.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    updated: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            rate,
            updated: Instant::now(),
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.updated = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.rate))
        }
    }
}

/// Proof of admission for one submission.
///
/// Holds an outstanding-window slot when enforcement is enabled; dropping
/// the permit frees the slot.
#[derive(Debug)]
pub struct SubmitPermit {
    slot: Option<OwnedSemaphorePermit>,
}

impl SubmitPermit {
    pub fn holds_slot(&self) -> bool {
        self.slot.is_some()
    }
}

/// Rate limiter and outstanding window in front of the engine.
#[derive(Debug)]
pub struct RateGate {
    bucket: Mutex<TokenBucket>,
    outstanding: Option<Arc<Semaphore>>,
    max_outstanding: usize,
    in_flight: Mutex<HashMap<u32, SubmitPermit>>,
}

impl RateGate {
    /// `max_outstanding` of `None` disables the outstanding window.
    pub fn new(rate_limit: f64, burst_limit: u32, max_outstanding: Option<usize>) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(rate_limit, burst_limit)),
            outstanding: max_outstanding.map(|max| Arc::new(Semaphore::new(max))),
            max_outstanding: max_outstanding.unwrap_or(0),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for a rate token, then for an outstanding slot if the window is
    /// enforced.
    pub async fn admit(&self, cancel: &CancellationToken) -> SessionResult<SubmitPermit> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        loop {
            let wait = match self.bucket.lock().try_take(Instant::now()) {
                Ok(()) => break,
                Err(wait) => wait,
            };
            trace!(wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let slot = match &self.outstanding {
            Some(semaphore) => {
                let acquire = Arc::clone(semaphore).acquire_owned();
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                    permit = acquire => permit.map_err(|_| SessionError::ShuttingDown)?,
                };
                Some(permit)
            }
            None => None,
        };

        Ok(SubmitPermit { slot })
    }

    /// Park `permit` until the submission with `sequence_number` resolves.
    pub fn hold(&self, sequence_number: u32, permit: SubmitPermit) {
        if permit.holds_slot() {
            self.in_flight.lock().insert(sequence_number, permit);
        }
    }

    /// Free the slot parked for `sequence_number`. Returns `false` when
    /// nothing was parked, so each submission releases at most once.
    pub fn release(&self, sequence_number: u32) -> bool {
        self.in_flight.lock().remove(&sequence_number).is_some()
    }

    /// Free every parked slot. Returns the released sequence numbers in
    /// ascending order.
    pub fn release_all(&self) -> Vec<u32> {
        let mut released: Vec<u32> = self
            .in_flight
            .lock()
            .drain()
            .map(|(sequence_number, _)| sequence_number)
            .collect();
        released.sort_unstable();
        released
    }

    /// Submissions currently holding a slot.
    pub fn outstanding(&self) -> usize {
        match &self.outstanding {
            Some(semaphore) => self.max_outstanding - semaphore.available_permits(),
            None => 0,
        }
    }

    /// Fail pending and future slot waits.
    pub fn close(&self) {
        if let Some(semaphore) = &self.outstanding {
            semaphore.close();
        }
    }
}

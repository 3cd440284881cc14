//! Fail-fast guard around the document-analysis backend.
//!
//! Consecutive failures past a threshold open the breaker. While open, calls
//! are refused without touching the backend. After the cooldown the next call
//! is let through as a probe, and enough successful probes close it again.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    Probing { successes: u32 },
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("circuit open, call refused")]
    CircuitOpen,
    #[error("{0}")]
    ServiceFailure(E),
}

#[derive(Debug)]
pub struct CircuitBreaker {
    trip_after: u32,
    cooldown: Duration,
    close_after: u32,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    /// `trip_after` consecutive failures open the breaker; `close_after`
    /// successful probes close it once `cooldown` has passed.
    pub fn new(trip_after: u32, cooldown: Duration, close_after: u32) -> Self {
        Self {
            trip_after: trip_after.max(1),
            cooldown,
            close_after: close_after.max(1),
            phase: Mutex::new(Phase::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::CircuitOpen);
        }
        let outcome = operation().await;
        self.record(outcome.is_ok());
        outcome.map_err(CircuitBreakerError::ServiceFailure)
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::Probing { .. } => CircuitState::HalfOpen,
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> bool {
        let mut phase = self.phase();
        match *phase {
            Phase::Open { opened_at } if opened_at.elapsed() >= self.cooldown => {
                *phase = Phase::Probing { successes: 0 };
                true
            }
            Phase::Open { .. } => false,
            _ => true,
        }
    }

    fn record(&self, succeeded: bool) {
        let mut phase = self.phase();
        *phase = match (*phase, succeeded) {
            (Phase::Probing { successes }, true) if successes + 1 >= self.close_after => {
                info!("analysis backend recovered, circuit closed");
                Phase::Closed {
                    consecutive_failures: 0,
                }
            }
            (Phase::Probing { successes }, true) => Phase::Probing {
                successes: successes + 1,
            },
            (_, true) => Phase::Closed {
                consecutive_failures: 0,
            },
            (Phase::Closed { consecutive_failures }, false)
                if consecutive_failures + 1 < self.trip_after =>
            {
                Phase::Closed {
                    consecutive_failures: consecutive_failures + 1,
                }
            }
            (_, false) => {
                warn!(cooldown_secs = self.cooldown.as_secs(), "circuit opened");
                Phase::Open {
                    opened_at: Instant::now(),
                }
            }
        };
    }
}

//! Per-key circuit breaker
//!
//! Fails fast for hosts that keep erroring instead of burning the rate
//! budget on them. The breaker table in the request manager creates these
//! lazily, keyed by normalized URL.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a request may proceed. Moving past the recovery timeout
    /// shifts an open breaker to HALF_OPEN and admits exactly that
    /// probing call.
    pub fn is_allowable(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => match self.last_failure {
                Some(at) if at.elapsed() > self.recovery_timeout => {
                    info!("circuit recovery timeout passed, shifting to HALF_OPEN");
                    self.state = CircuitState::HalfOpen;
                    true
                }
                _ => false,
            },
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!("circuit probe succeeded, closing");
            self.state = CircuitState::Closed;
            self.failure_count = 0;
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        match self.state {
            CircuitState::HalfOpen => {
                warn!("circuit probe failed, re-opening");
                self.state = CircuitState::Open;
            }
            CircuitState::Closed if self.failure_count >= self.failure_threshold => {
                warn!(
                    "failure threshold ({}) reached, opening circuit",
                    self.failure_threshold
                );
                self.state = CircuitState::Open;
            }
            _ => {}
        }
    }
}

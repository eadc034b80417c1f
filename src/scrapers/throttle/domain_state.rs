//! Per-domain throttling state.

use std::time::{Duration, Instant};

/// State for a single domain. Lives in memory for one process run and is
/// never persisted.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// While set and in the future, the circuit is open and no request
    /// may be made to this domain.
    pub circuit_open_until: Option<Instant>,
    /// Total requests made.
    pub total_requests: u64,
    /// Times the circuit breaker has tripped.
    pub circuit_trips: u64,
}

impl DomainState {
    pub fn new() -> Self {
        Self {
            last_request: None,
            consecutive_failures: 0,
            circuit_open_until: None,
            total_requests: 0,
            circuit_trips: 0,
        }
    }

    /// Time left on an open circuit, or None when the circuit is closed.
    pub fn circuit_remaining(&self) -> Option<Duration> {
        let until = self.circuit_open_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            None
        }
    }

    /// Portion of `required` not yet covered by time since the last request.
    pub fn remaining_delay(&self, required: Duration) -> Duration {
        match self.last_request {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= required {
                    Duration::ZERO
                } else {
                    required - elapsed
                }
            }
            None => Duration::ZERO,
        }
    }

    /// Open the circuit for `cooldown` and reset the failure counter.
    pub fn trip_circuit(&mut self, cooldown: Duration) {
        self.circuit_open_until = Some(Instant::now() + cooldown);
        self.consecutive_failures = 0;
        self.circuit_trips += 1;
    }
}

impl Default for DomainState {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-domain politeness gate: rate limiting plus a circuit breaker.
//!
//! Spaces requests to each domain by a randomized delay and refuses to
//! touch a domain at all while its circuit is open after repeated failures.

mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use domain_state::DomainState;

/// Failures before the circuit opens for a domain.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// How long a tripped circuit stays open.
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Throttle timing configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Lower bound of the randomized inter-request delay.
    pub min_delay: Duration,
    /// Upper bound of the randomized inter-request delay.
    pub max_delay: Duration,
    /// Failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cooldown applied when the circuit opens.
    pub circuit_cooldown: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            failure_threshold: CIRCUIT_FAILURE_THRESHOLD,
            circuit_cooldown: CIRCUIT_COOLDOWN,
        }
    }
}

/// Raised by [`Throttle::wait`] without any network action when the
/// domain's circuit is open. Callers must skip the domain until the
/// cooldown elapses.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit open for {domain}, retry in {retry_after:?}")]
pub struct CircuitOpen {
    pub domain: String,
    pub retry_after: Duration,
}

/// Per-domain rate limiter and circuit breaker.
///
/// Cloning shares the underlying state, so every session in a pipeline run
/// observes the same per-domain timing.
#[derive(Debug, Clone)]
pub struct Throttle {
    config: ThrottleConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::with_config(ThrottleConfig::default())
    }

    pub fn with_config(config: ThrottleConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain may be contacted, then stamp the request time.
    ///
    /// Fails with [`CircuitOpen`] before sleeping when the domain's circuit
    /// has not yet cooled down. Otherwise sleeps the unelapsed portion of a
    /// delay drawn uniformly from [min_delay, max_delay].
    pub async fn wait(&self, domain: &str) -> Result<(), CircuitOpen> {
        let required = self.draw_delay();

        let wait_time = {
            let domains = self.domains.read().await;
            match domains.get(domain) {
                Some(state) => {
                    if let Some(retry_after) = state.circuit_remaining() {
                        return Err(CircuitOpen {
                            domain: domain.to_string(),
                            retry_after,
                        });
                    }
                    state.remaining_delay(required)
                }
                None => Duration::ZERO,
            }
        };

        if wait_time > Duration::ZERO {
            debug!("Throttling {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        let mut domains = self.domains.write().await;
        let state = domains.entry(domain.to_string()).or_default();
        state.last_request = Some(Instant::now());
        state.total_requests += 1;
        Ok(())
    }

    /// Report a successful request - resets the failure counter.
    pub async fn record_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_failures = 0;
        }
    }

    /// Report a failed request. At the failure threshold the circuit opens
    /// for the configured cooldown and the counter resets.
    pub async fn record_failure(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        let state = domains.entry(domain.to_string()).or_default();
        state.consecutive_failures += 1;

        if state.consecutive_failures >= self.config.failure_threshold {
            state.trip_circuit(self.config.circuit_cooldown);
            warn!(
                "Circuit opened for {} after {} failures, cooling down {:?}",
                domain, self.config.failure_threshold, self.config.circuit_cooldown
            );
        }
    }

    /// Time left on the domain's circuit, or None when requests may proceed.
    pub async fn circuit_remaining(&self, domain: &str) -> Option<Duration> {
        let domains = self.domains.read().await;
        domains.get(domain).and_then(|s| s.circuit_remaining())
    }

    fn draw_delay(&self) -> Duration {
        let min = self.config.min_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        if max <= min {
            return self.config.min_delay;
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(cooldown: Duration) -> ThrottleConfig {
        ThrottleConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            failure_threshold: 5,
            circuit_cooldown: cooldown,
        }
    }

    #[tokio::test]
    async fn test_extract_domain() {
        assert_eq!(
            Throttle::extract_domain("https://www.pararius.com/apartments/amsterdam"),
            Some("www.pararius.com".to_string())
        );
        assert_eq!(Throttle::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_wait_succeeds_while_circuit_closed() {
        let throttle = Throttle::with_config(fast_config(Duration::from_secs(60)));
        assert!(throttle.wait("www.pararius.com").await.is_ok());
        assert!(throttle.wait("www.pararius.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_five_failures() {
        let throttle = Throttle::with_config(fast_config(Duration::from_secs(60)));
        throttle.wait("www.funda.nl").await.unwrap();

        for _ in 0..4 {
            throttle.record_failure("www.funda.nl").await;
        }
        assert!(throttle.wait("www.funda.nl").await.is_ok());

        throttle.record_failure("www.funda.nl").await;
        let err = throttle.wait("www.funda.nl").await.unwrap_err();
        assert_eq!(err.domain, "www.funda.nl");
    }

    #[tokio::test]
    async fn test_circuit_clears_only_after_cooldown() {
        let throttle = Throttle::with_config(fast_config(Duration::from_millis(80)));
        for _ in 0..5 {
            throttle.record_failure("www.funda.nl").await;
        }

        // Just before expiry the gate still refuses.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(throttle.wait("www.funda.nl").await.is_err());

        // After expiry it admits requests again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(throttle.wait("www.funda.nl").await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let throttle = Throttle::with_config(fast_config(Duration::from_secs(60)));
        for _ in 0..4 {
            throttle.record_failure("www.funda.nl").await;
        }
        throttle.record_success("www.funda.nl").await;
        for _ in 0..4 {
            throttle.record_failure("www.funda.nl").await;
        }
        // Nine failures total, but never five consecutive.
        assert!(throttle.wait("www.funda.nl").await.is_ok());
    }
}

//! Outbound route rotation.
//!
//! Routes are SOCKS5/HTTP proxy URLs cycled round-robin across sessions.
//! A route that fails three times in a row is retired for the rest of the
//! process; with no routes configured, traffic goes out directly.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

/// Consecutive failures before a route is permanently retired.
const ROUTE_FAILURE_LIMIT: u32 = 3;

#[derive(Debug, Default)]
struct EgressState {
    routes: Vec<String>,
    failures: HashMap<String, u32>,
    cursor: usize,
}

/// Round-robin rotation over configured outbound routes.
#[derive(Debug, Default)]
pub struct EgressRotator {
    state: Mutex<EgressState>,
}

impl EgressRotator {
    /// Build from configured routes, with the `PROXY_LIST` environment
    /// variable (comma-separated) taking precedence.
    pub fn from_config(configured: &[String]) -> Self {
        let routes: Vec<String> = match std::env::var("PROXY_LIST") {
            Ok(list) if !list.trim().is_empty() => list
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => configured.to_vec(),
        };

        if !routes.is_empty() {
            info!("Egress rotation over {} routes", routes.len());
        }

        Self {
            state: Mutex::new(EgressState {
                routes,
                failures: HashMap::new(),
                cursor: 0,
            }),
        }
    }

    /// Next route in rotation, or None when unconfigured or all retired.
    pub fn next_route(&self) -> Option<String> {
        let mut state = self.state.lock().expect("egress lock poisoned");
        if state.routes.is_empty() {
            return None;
        }
        let idx = state.cursor % state.routes.len();
        state.cursor = state.cursor.wrapping_add(1);
        Some(state.routes[idx].clone())
    }

    /// Record a failed request through `route`. Three consecutive failures
    /// retire the route permanently and rebuild the rotation.
    pub fn record_failure(&self, route: &str) {
        let mut state = self.state.lock().expect("egress lock poisoned");
        let count = state.failures.entry(route.to_string()).or_insert(0);
        *count += 1;

        if *count >= ROUTE_FAILURE_LIMIT {
            warn!("Retiring egress route {} after {} consecutive failures", route, ROUTE_FAILURE_LIMIT);
            state.routes.retain(|r| r != route);
            state.failures.remove(route);
            state.cursor = 0;
        }
    }

    /// Record a successful request through `route`, resetting its streak.
    pub fn record_success(&self, route: &str) {
        let mut state = self.state.lock().expect("egress lock poisoned");
        state.failures.remove(route);
    }

    /// Number of routes still in rotation.
    pub fn route_count(&self) -> usize {
        self.state.lock().expect("egress lock poisoned").routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(routes: &[&str]) -> EgressRotator {
        EgressRotator {
            state: Mutex::new(EgressState {
                routes: routes.iter().map(|s| s.to_string()).collect(),
                failures: HashMap::new(),
                cursor: 0,
            }),
        }
    }

    #[test]
    fn test_unconfigured_yields_none() {
        let egress = rotator(&[]);
        assert_eq!(egress.next_route(), None);
    }

    #[test]
    fn test_round_robin_cycles() {
        let egress = rotator(&["socks5://a:1080", "socks5://b:1080"]);
        assert_eq!(egress.next_route().as_deref(), Some("socks5://a:1080"));
        assert_eq!(egress.next_route().as_deref(), Some("socks5://b:1080"));
        assert_eq!(egress.next_route().as_deref(), Some("socks5://a:1080"));
    }

    #[test]
    fn test_three_consecutive_failures_retire_route() {
        let egress = rotator(&["socks5://a:1080", "socks5://b:1080"]);
        for _ in 0..3 {
            egress.record_failure("socks5://a:1080");
        }
        for _ in 0..10 {
            assert_eq!(egress.next_route().as_deref(), Some("socks5://b:1080"));
        }
    }

    #[test]
    fn test_success_breaks_the_streak() {
        let egress = rotator(&["socks5://a:1080"]);
        egress.record_failure("socks5://a:1080");
        egress.record_failure("socks5://a:1080");
        egress.record_success("socks5://a:1080");
        egress.record_failure("socks5://a:1080");
        assert_eq!(egress.route_count(), 1);
    }

    #[test]
    fn test_all_routes_retired_yields_none() {
        let egress = rotator(&["socks5://a:1080"]);
        for _ in 0..3 {
            egress.record_failure("socks5://a:1080");
        }
        assert_eq!(egress.next_route(), None);
    }
}

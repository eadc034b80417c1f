//! Outbound request identities.
//!
//! Each request presents a browser-like identity: a user agent, an accept
//! language, and a jittered set of optional headers. The rotator never hands
//! out the same user agent twice in a row for the same domain.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION,
    REFERER, USER_AGENT,
};

/// Browser user agents for rotation (current as of mid 2025).
pub const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:139.0) Gecko/20100101 Firefox/139.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:140.0) Gecko/20100101 Firefox/140.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:139.0) Gecko/20100101 Firefox/139.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Edg/138.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36 Edg/137.0.0.0",
];

/// Accept-Language values plausible for Dutch rental sites.
pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "nl-NL,nl;q=0.9,en;q=0.8",
    "nl,en-US;q=0.9,en;q=0.8",
    "en-US,en;q=0.8,nl;q=0.6",
];

/// Rotates outbound identities, avoiding an immediate repeat per domain.
#[derive(Debug, Default)]
pub struct IdentityRotator {
    last_used: Mutex<HashMap<String, &'static str>>,
}

impl IdentityRotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a user agent for the domain, never repeating the previous pick
    /// when the pool has more than one entry.
    pub fn user_agent(&self, domain: &str) -> &'static str {
        let mut last_used = self.last_used.lock().expect("identity lock poisoned");
        let previous = last_used.get(domain).copied();

        let mut rng = rand::thread_rng();
        let candidates: Vec<&'static str> = USER_AGENTS
            .iter()
            .copied()
            .filter(|ua| Some(*ua) != previous)
            .collect();
        let agent = candidates
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        last_used.insert(domain.to_string(), agent);
        agent
    }

    /// Build request headers for the domain, including jittered extras.
    pub fn headers_for(&self, domain: &str) -> HeaderMap {
        let mut rng = rand::thread_rng();
        let mut headers = HeaderMap::new();

        let agent = self.user_agent(domain);
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        let lang = ACCEPT_LANGUAGES
            .choose(&mut rng)
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0]);
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(lang));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
        headers.insert(
            HeaderName::from_static("upgrade-insecure-requests"),
            HeaderValue::from_static("1"),
        );

        // Occasionally look like a click-through from a search engine.
        if rng.gen_bool(0.3) {
            headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));
        }
        if rng.gen_bool(0.5) {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_headers_carry_core_fields() {
        let rotator = IdentityRotator::new();
        let headers = rotator.headers_for("www.pararius.com");
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_never_repeats_immediately() {
        let rotator = IdentityRotator::new();
        let mut previous = rotator.user_agent("www.funda.nl");
        for _ in 0..50 {
            let next = rotator.user_agent("www.funda.nl");
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_rotation_varies_across_calls() {
        let rotator = IdentityRotator::new();
        let agents: HashSet<&str> = (0..20).map(|_| rotator.user_agent("www.funda.nl")).collect();
        assert!(agents.len() > 1);
    }

    #[test]
    fn test_domains_tracked_independently() {
        let rotator = IdentityRotator::new();
        rotator.user_agent("www.funda.nl");
        // A different domain has no previous pick, so any agent is fine.
        let agent = rotator.user_agent("www.pararius.com");
        assert!(USER_AGENTS.contains(&agent));
    }
}

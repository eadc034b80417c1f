//! Generic fetch/parse/paginate orchestration for one (site, city).
//!
//! A session owns the HTTP client for a site, shares the process-wide
//! throttle and rotators, and drives the adapter's pure parsers. Expected
//! failure modes (429, 403, transient transport errors) are classified into
//! an explicit outcome and handled by the retry loop; errors are reserved
//! for exhaustion and the open circuit.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use super::egress::EgressRotator;
use super::identity::IdentityRotator;
use super::robots::RobotsPolicy;
use super::throttle::{CircuitOpen, Throttle};
use super::{SearchFilters, SiteAdapter};
use crate::models::NormalizedListing;

/// Agent token used when evaluating robots.txt rules.
const ROBOTS_AGENT: &str = "rentwatch";

/// Fetch failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The domain's circuit is open; no network action was taken.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    /// 429 responses outlasted every attempt.
    #[error("rate limited at {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// 403 responses outlasted every identity refresh.
    #[error("blocked (403) at {url}")]
    Blocked { url: String },

    /// Timeout or connection failure on the final attempt.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected terminal status code.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// robots.txt rules disallow the URL.
    #[error("robots rules disallow {url}")]
    RobotsDisallowed { url: String },
}

/// Retry schedule for one fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per URL, including the first.
    pub max_attempts: u32,
    /// Base for exponential backoff on transient failures.
    pub backoff_base: Duration,
    /// Base for the extended backoff after a 429.
    pub rate_limit_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            rate_limit_base: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`: base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }

    /// Extended backoff after a 429 on attempt `attempt`.
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        self.rate_limit_base * 2u32.saturating_pow(attempt)
    }
}

/// Session tuning; timing defaults come from [`crate::config::Settings`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub retry: RetryPolicy,
    /// Fixed per-request timeout so one hung remote cannot stall the run.
    pub timeout: Duration,
    /// Bounds of the randomized delay between detail fetches, in seconds.
    pub detail_delay_secs: (f64, f64),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            detail_delay_secs: (2.0, 5.0),
        }
    }
}

/// One attempt's classified result.
enum Outcome {
    Done(String),
    Retry { backoff: Duration, reason: &'static str },
    Fail(FetchError),
}

/// Fetch/parse orchestration for one site, generic over its adapter.
pub struct SiteSession {
    adapter: Arc<dyn SiteAdapter>,
    client: reqwest::Client,
    throttle: Throttle,
    identities: Arc<IdentityRotator>,
    egress: Arc<EgressRotator>,
    route: Option<String>,
    semaphore: Arc<Semaphore>,
    robots: OnceCell<RobotsPolicy>,
    config: SessionConfig,
}

impl SiteSession {
    /// Create a session sharing the run's throttle and rotators. Takes the
    /// next egress route, if any, for this session's client.
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        throttle: Throttle,
        identities: Arc<IdentityRotator>,
        egress: Arc<EgressRotator>,
        config: SessionConfig,
    ) -> anyhow::Result<Self> {
        let route = egress.next_route();
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true);
        if let Some(ref route) = route {
            builder = builder.proxy(reqwest::Proxy::all(route)?);
        }
        let client = builder.build()?;
        let semaphore = Arc::new(Semaphore::new(adapter.max_concurrent()));

        Ok(Self {
            adapter,
            client,
            throttle,
            identities,
            egress,
            route,
            semaphore,
            robots: OnceCell::new(),
            config,
        })
    }

    /// robots.txt rules, fetched once before the first page fetch.
    async fn robots(&self) -> &RobotsPolicy {
        self.robots
            .get_or_init(|| async {
                RobotsPolicy::fetch(&self.client, self.adapter.base_url(), ROBOTS_AGENT).await
            })
            .await
    }

    /// Fetch a page as text, bounded by the per-site concurrency ceiling.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("session semaphore closed");

        if !self.robots().await.allows(url) {
            return Err(FetchError::RobotsDisallowed { url: url.to_string() });
        }

        let domain = Throttle::extract_domain(url)
            .unwrap_or_else(|| self.adapter.site_name().to_string());

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            self.throttle.wait(&domain).await?;

            let last = attempt + 1 >= max_attempts;
            match self.attempt(url, &domain, attempt, last).await {
                Outcome::Done(body) => return Ok(body),
                Outcome::Fail(err) => return Err(err),
                Outcome::Retry { backoff, reason } => {
                    warn!(
                        "{} (attempt {}/{}) for {}, retrying in {:?}",
                        reason,
                        attempt + 1,
                        max_attempts,
                        url,
                        backoff
                    );
                    if backoff > Duration::ZERO {
                        tokio::time::sleep(backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One request, classified. A fresh identity is drawn per attempt, so a
    /// 429/403 retry automatically presents new headers.
    async fn attempt(&self, url: &str, domain: &str, attempt: u32, last: bool) -> Outcome {
        let headers = self.identities.headers_for(domain);

        let response = match self.client.get(url).headers(headers).send().await {
            Ok(r) => r,
            Err(e) => {
                self.throttle.record_failure(domain).await;
                self.record_route_failure();
                if last {
                    return Outcome::Fail(FetchError::Transport {
                        url: url.to_string(),
                        source: e,
                    });
                }
                return Outcome::Retry {
                    backoff: self.config.retry.backoff(attempt),
                    reason: "transport error",
                };
            }
        };

        let status = response.status();
        match status.as_u16() {
            429 => {
                self.throttle.record_failure(domain).await;
                if last {
                    Outcome::Fail(FetchError::RateLimited {
                        url: url.to_string(),
                        attempts: attempt + 1,
                    })
                } else {
                    Outcome::Retry {
                        backoff: self.config.retry.rate_limit_backoff(attempt),
                        reason: "rate limited (429)",
                    }
                }
            }
            403 => {
                self.throttle.record_failure(domain).await;
                if last {
                    Outcome::Fail(FetchError::Blocked { url: url.to_string() })
                } else {
                    Outcome::Retry {
                        backoff: Duration::ZERO,
                        reason: "blocked (403), rotating identity",
                    }
                }
            }
            _ if status.is_success() => {
                self.throttle.record_success(domain).await;
                self.record_route_success();
                match response.text().await {
                    Ok(body) => Outcome::Done(body),
                    Err(e) => {
                        if last {
                            Outcome::Fail(FetchError::Transport {
                                url: url.to_string(),
                                source: e,
                            })
                        } else {
                            Outcome::Retry {
                                backoff: self.config.retry.backoff(attempt),
                                reason: "body read failed",
                            }
                        }
                    }
                }
            }
            code => {
                self.throttle.record_failure(domain).await;
                if last {
                    Outcome::Fail(FetchError::Status {
                        status: code,
                        url: url.to_string(),
                    })
                } else {
                    Outcome::Retry {
                        backoff: self.config.retry.backoff(attempt),
                        reason: "unexpected status",
                    }
                }
            }
        }
    }

    /// Scrape up to `max_pages` of search results for a city.
    ///
    /// A page-level failure aborts the city and returns whatever has been
    /// accumulated; per-item failures are logged and skipped.
    pub async fn scrape_city(&self, city: &str, max_pages: u32) -> Vec<NormalizedListing> {
        let site = self.adapter.site_name();
        let filters = SearchFilters::default();
        let mut results = Vec::new();

        'pages: for page in 1..=max_pages.max(1) {
            let url = self.adapter.build_search_url(city, page, &filters);
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("{}: page {} of {} failed: {}", site, page, city, e);
                    break;
                }
            };

            let mut previews = match self.adapter.parse_search_results(&html) {
                Ok(p) => p,
                Err(e) => {
                    warn!("{}: could not parse page {} of {}: {}", site, page, city, e);
                    break;
                }
            };
            if previews.is_empty() {
                // End-of-results heuristic: sites render an empty page
                // rather than a 404 past the last page.
                debug!("{}: no previews on page {} of {}", site, page, city);
                break;
            }

            for preview in &mut previews {
                if preview.city.is_empty() {
                    preview.city = city.to_string();
                }
            }

            for preview in previews {
                self.detail_delay().await;
                match self.fetch(&preview.source_url).await {
                    Ok(detail_html) => match self.adapter.parse_listing_detail(&detail_html) {
                        Ok(Some(mut listing)) => {
                            listing.apply_preview(&preview);
                            results.push(listing);
                        }
                        Ok(None) => {
                            debug!("{}: no listing in {}", site, preview.source_url);
                        }
                        Err(e) => {
                            warn!("Failed to parse listing detail {}: {}", preview.source_url, e);
                        }
                    },
                    Err(FetchError::CircuitOpen(e)) => {
                        warn!("{}: circuit open mid-scrape of {}: {}", site, city, e);
                        break 'pages;
                    }
                    Err(e) => {
                        warn!("Failed to fetch listing detail {}: {}", preview.source_url, e);
                    }
                }
            }
        }

        info!("{}: scraped {} listings from {}", site, results.len(), city);
        results
    }

    /// Randomized pause between detail fetches.
    async fn detail_delay(&self) {
        let (min, max) = self.config.detail_delay_secs;
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    fn record_route_failure(&self) {
        if let Some(ref route) = self.route {
            self.egress.record_failure(route);
        }
    }

    fn record_route_success(&self) {
        if let Some(ref route) = self.route {
            self.egress.record_success(route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: Duration::from_secs(2),
            rate_limit_base: Duration::from_secs(30),
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.rate_limit_backoff(1), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_session_builds_without_routes() {
        let adapter = super::super::adapter_for("pararius").unwrap();
        let session = SiteSession::new(
            adapter,
            Throttle::new(),
            Arc::new(IdentityRotator::new()),
            Arc::new(EgressRotator::from_config(&[])),
            SessionConfig::default(),
        );
        assert!(session.is_ok());
        assert!(session.unwrap().route.is_none());
    }
}

//! Scraping core: site adapters, politeness, identity/egress rotation.

pub mod egress;
mod funda;
pub mod identity;
mod pararius;
pub mod robots;
pub mod session;
pub mod throttle;

pub use egress::EgressRotator;
pub use funda::FundaAdapter;
pub use identity::IdentityRotator;
pub use pararius::ParariusAdapter;
pub use robots::RobotsPolicy;
pub use session::{FetchError, RetryPolicy, SessionConfig, SiteSession};
pub use throttle::{CircuitOpen, Throttle, ThrottleConfig};

use std::sync::Arc;

use crate::models::{ListingPreview, NormalizedListing};

/// Error from an adapter's parsing functions. Always contained at item or
/// page granularity; a bad card never takes down a session.
#[derive(Debug, thiserror::Error)]
#[error("parse failure: {0}")]
pub struct ParseFailure(pub String);

/// Optional filters applied when building search URLs.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Lower price bound in whole euros.
    pub min_price_eur: Option<u32>,
    /// Upper price bound in whole euros.
    pub max_price_eur: Option<u32>,
}

/// Per-source capability: URL construction and markup parsing.
///
/// Implementations are pure - all network I/O lives in [`SiteSession`].
/// Parsers may leave `city` and identity fields blank; the session fills
/// them from the search context and the preview.
pub trait SiteAdapter: Send + Sync {
    /// Source identifier used in configuration and storage.
    fn site_name(&self) -> &'static str;

    /// Site root, also the origin for robots.txt.
    fn base_url(&self) -> &'static str;

    /// In-flight request ceiling for this site.
    fn max_concurrent(&self) -> usize {
        2
    }

    /// Build the search-results URL for a city and page.
    fn build_search_url(&self, city: &str, page: u32, filters: &SearchFilters) -> String;

    /// Parse listing cards from a search-results page.
    fn parse_search_results(&self, html: &str) -> Result<Vec<ListingPreview>, ParseFailure>;

    /// Parse a listing detail page into a full listing, or None when the
    /// page carries no listing (removed, redirected, consent wall).
    fn parse_listing_detail(&self, html: &str) -> Result<Option<NormalizedListing>, ParseFailure>;
}

/// Source names with a shipped adapter.
pub const KNOWN_SOURCES: &[&str] = &["funda", "pararius"];

/// Look up the adapter for a configured source name.
pub fn adapter_for(source: &str) -> Option<Arc<dyn SiteAdapter>> {
    match source {
        "funda" => Some(Arc::new(FundaAdapter)),
        "pararius" => Some(Arc::new(ParariusAdapter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_registry_covers_known_sources() {
        for source in KNOWN_SOURCES {
            let adapter = adapter_for(source).unwrap();
            assert_eq!(adapter.site_name(), *source);
        }
        assert!(adapter_for("craigslist").is_none());
    }
}

//! Listing models for rental listing storage and deduplication.
//!
//! Listings are stored keyed by (source_site, source_id), allowing
//! re-sightings of the same unit to refresh a single canonical record
//! instead of accumulating duplicates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A listing card as it appears on a search-results page.
///
/// Previews are ephemeral: they exist only to carry the identity and the
/// few fields visible on the results page to the detail fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingPreview {
    /// Source site identifier (e.g. "pararius").
    pub source_site: String,
    /// Listing identifier on the source site.
    pub source_id: String,
    /// Canonical URL of the listing detail page.
    pub source_url: String,
    /// Listing title as shown on the results page.
    pub title: String,
    /// Price in euro cents, if the results page shows one.
    pub price_eur_cents: Option<i64>,
    /// City the search was run for.
    pub city: String,
}

/// A fully parsed listing before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub source_site: String,
    pub source_id: String,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    /// Price in euro cents. `None` means the price could not be parsed,
    /// which is distinct from a price of zero.
    pub price_eur_cents: Option<i64>,
    pub price_type: String,
    pub rooms: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub size_sqm: Option<i64>,
    pub city: String,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pet_friendly: Option<bool>,
    pub furnished: Option<bool>,
    pub energy_label: Option<String>,
    pub available_from: Option<NaiveDate>,
    pub rental_agent: Option<String>,
    pub image_urls: Vec<String>,
    /// Raw extracted values, kept for reprocessing.
    pub raw_data: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

impl NormalizedListing {
    /// Create a listing with the required fields; everything else defaults.
    pub fn new(source_site: &str, source_id: &str, source_url: &str, title: &str, city: &str) -> Self {
        Self {
            source_site: source_site.to_string(),
            source_id: source_id.to_string(),
            source_url: source_url.to_string(),
            title: title.to_string(),
            description: None,
            price_eur_cents: None,
            price_type: "per_month".to_string(),
            rooms: None,
            bedrooms: None,
            bathrooms: None,
            size_sqm: None,
            city: city.to_string(),
            neighborhood: None,
            postal_code: None,
            country_code: "NL".to_string(),
            address: None,
            latitude: None,
            longitude: None,
            pet_friendly: None,
            furnished: None,
            energy_label: None,
            available_from: None,
            rental_agent: None,
            image_urls: Vec::new(),
            raw_data: serde_json::json!({}),
            scraped_at: Utc::now(),
        }
    }

    /// Overlay identity and results-page fields from a preview.
    ///
    /// Detail pages don't reliably expose the listing's own identifier, so
    /// the preview is authoritative for identity, and its title/price win
    /// over placeholders parsed from the detail markup.
    pub fn apply_preview(&mut self, preview: &ListingPreview) {
        self.source_site = preview.source_site.clone();
        self.source_id = preview.source_id.clone();
        self.source_url = preview.source_url.clone();
        if !preview.title.is_empty() {
            self.title = preview.title.clone();
        }
        if preview.price_eur_cents.is_some() {
            self.price_eur_cents = preview.price_eur_cents;
        }
        self.city = preview.city.clone();
    }

    /// SHA-256 over the raw payload, for change detection across sightings.
    pub fn payload_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.raw_data.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The stored, deduplicated representation of a rental unit.
///
/// Identity is UNIQUE(source_site, source_id). Mutable fields are refreshed
/// on every re-sighting; `delisted_at` is set by the staleness sweep and
/// cleared when the listing reappears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalListing {
    pub id: String,
    pub source_site: String,
    pub source_id: String,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub price_eur_cents: Option<i64>,
    pub price_type: String,
    pub rooms: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub size_sqm: Option<i64>,
    pub city: String,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pet_friendly: Option<bool>,
    pub furnished: Option<bool>,
    pub energy_label: Option<String>,
    pub available_from: Option<NaiveDate>,
    pub rental_agent: Option<String>,
    pub image_urls: Vec<String>,
    pub raw_data: serde_json::Value,
    /// When this unit was first stored.
    pub first_seen_at: DateTime<Utc>,
    /// When this unit was last observed on its source site.
    pub last_seen_at: DateTime<Utc>,
    /// Set by the staleness sweep when the unit vanishes from its site.
    pub delisted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CanonicalListing {
    /// Create a canonical record from a freshly scraped listing.
    pub fn from_normalized(listing: &NormalizedListing, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_site: listing.source_site.clone(),
            source_id: listing.source_id.clone(),
            source_url: listing.source_url.clone(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            price_eur_cents: listing.price_eur_cents,
            price_type: listing.price_type.clone(),
            rooms: listing.rooms,
            bedrooms: listing.bedrooms,
            bathrooms: listing.bathrooms,
            size_sqm: listing.size_sqm,
            city: listing.city.clone(),
            neighborhood: listing.neighborhood.clone(),
            postal_code: listing.postal_code.clone(),
            country_code: listing.country_code.clone(),
            address: listing.address.clone(),
            latitude: listing.latitude,
            longitude: listing.longitude,
            pet_friendly: listing.pet_friendly,
            furnished: listing.furnished,
            energy_label: listing.energy_label.clone(),
            available_from: listing.available_from,
            rental_agent: listing.rental_agent.clone(),
            image_urls: listing.image_urls.clone(),
            raw_data: listing.raw_data.clone(),
            first_seen_at: now,
            last_seen_at: now,
            delisted_at: None,
            created_at: now,
        }
    }

    pub fn is_delisted(&self) -> bool {
        self.delisted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_preview_overrides_identity() {
        let preview = ListingPreview {
            source_site: "pararius".to_string(),
            source_id: "apartment-123".to_string(),
            source_url: "https://www.pararius.com/apartment-for-rent/amsterdam/apartment-123".to_string(),
            title: "Apartment Keizersgracht".to_string(),
            price_eur_cents: Some(185_000),
            city: "amsterdam".to_string(),
        };

        let mut listing = NormalizedListing::new("pararius", "placeholder", "", "", "amsterdam");
        listing.apply_preview(&preview);

        assert_eq!(listing.source_id, "apartment-123");
        assert_eq!(listing.title, "Apartment Keizersgracht");
        assert_eq!(listing.price_eur_cents, Some(185_000));
    }

    #[test]
    fn test_apply_preview_keeps_detail_price_when_preview_lacks_one() {
        let preview = ListingPreview {
            source_site: "funda".to_string(),
            source_id: "huis-42".to_string(),
            source_url: "https://www.funda.nl/huur/amsterdam/huis-42".to_string(),
            title: String::new(),
            price_eur_cents: None,
            city: "amsterdam".to_string(),
        };

        let mut listing = NormalizedListing::new("funda", "x", "x", "Detail title", "amsterdam");
        listing.price_eur_cents = Some(120_000);
        listing.apply_preview(&preview);

        assert_eq!(listing.title, "Detail title");
        assert_eq!(listing.price_eur_cents, Some(120_000));
    }

    #[test]
    fn test_payload_hash_is_stable() {
        let mut listing = NormalizedListing::new("pararius", "a", "u", "t", "amsterdam");
        listing.raw_data = serde_json::json!({"price_text": "€ 1.500 /maand"});
        let first = listing.payload_hash();
        assert_eq!(first.len(), 64);
        assert_eq!(first, listing.payload_hash());
    }
}

//! Canonical listing storage: idempotent upsert and the staleness sweep.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{format_datetime, parse_datetime, parse_datetime_opt, with_retry, Result};
use crate::models::{CanonicalListing, NormalizedListing};

/// Repository over the `listings` table. Sole writer of identity and
/// staleness fields (first_seen_at, last_seen_at, delisted_at).
#[derive(Debug, Clone)]
pub struct ListingRepository {
    db_path: PathBuf,
}

impl ListingRepository {
    /// Open the repository, creating the schema if needed.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let repo = Self {
            db_path: db_path.into(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                source_site TEXT NOT NULL,
                source_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                price_eur_cents INTEGER,
                price_type TEXT NOT NULL DEFAULT 'per_month',
                rooms REAL,
                bedrooms INTEGER,
                bathrooms INTEGER,
                size_sqm INTEGER,
                city TEXT NOT NULL,
                neighborhood TEXT,
                postal_code TEXT,
                country_code TEXT NOT NULL DEFAULT 'NL',
                address TEXT,
                latitude REAL,
                longitude REAL,
                pet_friendly INTEGER,
                furnished INTEGER,
                energy_label TEXT,
                available_from TEXT,
                rental_agent TEXT,
                image_urls TEXT NOT NULL,
                raw_data TEXT NOT NULL,
                raw_hash TEXT,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                delisted_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(source_site, source_id)
            );

            CREATE INDEX IF NOT EXISTS idx_listings_site
                ON listings(source_site);
            CREATE INDEX IF NOT EXISTS idx_listings_city
                ON listings(city);
            CREATE INDEX IF NOT EXISTS idx_listings_last_seen
                ON listings(source_site, last_seen_at);
            CREATE INDEX IF NOT EXISTS idx_listings_active
                ON listings(source_site) WHERE delisted_at IS NULL;
        "#,
        )?;
        Ok(())
    }

    /// Merge a scraped listing into the store.
    ///
    /// Returns (is_new, was_updated). Safe to call repeatedly with identical
    /// input: a re-sighting refreshes last_seen_at and the mutable fields,
    /// overwrites title/price only with non-empty incoming values, and
    /// clears delisted_at.
    pub fn upsert(&self, listing: &NormalizedListing) -> Result<(bool, bool)> {
        with_retry(|| {
            let conn = self.connect()?;
            let now = format_datetime(Utc::now());

            let existing: Option<(String, String, Option<i64>, Option<String>)> = conn
                .query_row(
                    "SELECT id, title, price_eur_cents, raw_hash FROM listings
                     WHERE source_site = ?1 AND source_id = ?2",
                    params![listing.source_site, listing.source_id],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    },
                )
                .optional()?;

            match existing {
                Some((id, stored_title, stored_price, stored_hash)) => {
                    let title = if listing.title.is_empty() {
                        stored_title
                    } else {
                        listing.title.clone()
                    };
                    let price = listing.price_eur_cents.or(stored_price);
                    let raw_hash = listing.payload_hash();
                    if stored_hash.as_deref() != Some(raw_hash.as_str()) {
                        debug!(
                            "{}:{} payload changed since last sighting",
                            listing.source_site, listing.source_id
                        );
                    }

                    conn.execute(
                        r#"
                        UPDATE listings SET
                            source_url = ?1, title = ?2, description = ?3,
                            price_eur_cents = ?4, price_type = ?5, rooms = ?6,
                            bedrooms = ?7, bathrooms = ?8, size_sqm = ?9,
                            city = ?10, neighborhood = ?11, postal_code = ?12,
                            country_code = ?13, address = ?14, latitude = ?15,
                            longitude = ?16, pet_friendly = ?17, furnished = ?18,
                            energy_label = ?19, available_from = ?20,
                            rental_agent = ?21, image_urls = ?22, raw_data = ?23,
                            raw_hash = ?24, last_seen_at = ?25, delisted_at = NULL
                        WHERE id = ?26
                        "#,
                        params![
                            listing.source_url,
                            title,
                            listing.description,
                            price,
                            listing.price_type,
                            listing.rooms,
                            listing.bedrooms,
                            listing.bathrooms,
                            listing.size_sqm,
                            listing.city,
                            listing.neighborhood,
                            listing.postal_code,
                            listing.country_code,
                            listing.address,
                            listing.latitude,
                            listing.longitude,
                            listing.pet_friendly,
                            listing.furnished,
                            listing.energy_label,
                            listing.available_from.map(|d| d.to_string()),
                            listing.rental_agent,
                            serde_json::to_string(&listing.image_urls)?,
                            listing.raw_data.to_string(),
                            raw_hash,
                            now,
                            id,
                        ],
                    )?;
                    Ok((false, true))
                }
                None => {
                    let canonical = CanonicalListing::from_normalized(listing, Utc::now());
                    conn.execute(
                        r#"
                        INSERT INTO listings (
                            id, source_site, source_id, source_url, title,
                            description, price_eur_cents, price_type, rooms,
                            bedrooms, bathrooms, size_sqm, city, neighborhood,
                            postal_code, country_code, address, latitude,
                            longitude, pet_friendly, furnished, energy_label,
                            available_from, rental_agent, image_urls, raw_data,
                            raw_hash, first_seen_at, last_seen_at, delisted_at,
                            created_at
                        ) VALUES (
                            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                            ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22,
                            ?23, ?24, ?25, ?26, ?27, ?28, ?29, NULL, ?30
                        )
                        "#,
                        params![
                            canonical.id,
                            canonical.source_site,
                            canonical.source_id,
                            canonical.source_url,
                            canonical.title,
                            canonical.description,
                            canonical.price_eur_cents,
                            canonical.price_type,
                            canonical.rooms,
                            canonical.bedrooms,
                            canonical.bathrooms,
                            canonical.size_sqm,
                            canonical.city,
                            canonical.neighborhood,
                            canonical.postal_code,
                            canonical.country_code,
                            canonical.address,
                            canonical.latitude,
                            canonical.longitude,
                            canonical.pet_friendly,
                            canonical.furnished,
                            canonical.energy_label,
                            canonical.available_from.map(|d| d.to_string()),
                            canonical.rental_agent,
                            serde_json::to_string(&canonical.image_urls)?,
                            canonical.raw_data.to_string(),
                            listing.payload_hash(),
                            format_datetime(canonical.first_seen_at),
                            format_datetime(canonical.last_seen_at),
                            format_datetime(canonical.created_at),
                        ],
                    )?;
                    Ok((true, false))
                }
            }
        })
    }

    /// Get a listing by its storage id.
    pub fn get(&self, id: &str) -> Result<Option<CanonicalListing>> {
        let conn = self.connect()?;
        let listing = conn
            .query_row(
                "SELECT * FROM listings WHERE id = ?1",
                params![id],
                row_to_listing,
            )
            .optional()?;
        Ok(listing)
    }

    /// Get a listing by its source identity.
    pub fn get_by_source_key(&self, site: &str, source_id: &str) -> Result<Option<CanonicalListing>> {
        let conn = self.connect()?;
        let listing = conn
            .query_row(
                "SELECT * FROM listings WHERE source_site = ?1 AND source_id = ?2",
                params![site, source_id],
                row_to_listing,
            )
            .optional()?;
        Ok(listing)
    }

    /// Total stored listings.
    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Mark vanished listings of a site as delisted.
    ///
    /// A listing is delisted when it has not been seen for `threshold_days`
    /// AND its external id is absent from `active_ids`. Ids present in
    /// `active_ids` are never touched regardless of age.
    pub fn sweep_delisted(
        &self,
        site: &str,
        active_ids: &HashSet<String>,
        threshold_days: i64,
    ) -> Result<usize> {
        with_retry(|| {
            let conn = self.connect()?;
            let cutoff = format_datetime(Utc::now() - chrono::Duration::days(threshold_days));

            let stale: Vec<(String, String)> = {
                let mut stmt = conn.prepare(
                    "SELECT id, source_id FROM listings
                     WHERE source_site = ?1 AND delisted_at IS NULL AND last_seen_at < ?2",
                )?;
                let rows = stmt.query_map(params![site, cutoff], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            };

            let now = format_datetime(Utc::now());
            let mut count = 0;
            for (id, source_id) in stale {
                if active_ids.contains(&source_id) {
                    continue;
                }
                conn.execute(
                    "UPDATE listings SET delisted_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                count += 1;
            }

            if count > 0 {
                info!("{}: delisted {} vanished listings", site, count);
            }
            Ok(count)
        })
    }
}

fn row_to_listing(row: &Row) -> rusqlite::Result<CanonicalListing> {
    let image_urls: Vec<String> = row
        .get::<_, String>("image_urls")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let raw_data: serde_json::Value = row
        .get::<_, String>("raw_data")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    Ok(CanonicalListing {
        id: row.get("id")?,
        source_site: row.get("source_site")?,
        source_id: row.get("source_id")?,
        source_url: row.get("source_url")?,
        title: row.get("title")?,
        description: row.get("description")?,
        price_eur_cents: row.get("price_eur_cents")?,
        price_type: row.get("price_type")?,
        rooms: row.get("rooms")?,
        bedrooms: row.get("bedrooms")?,
        bathrooms: row.get("bathrooms")?,
        size_sqm: row.get("size_sqm")?,
        city: row.get("city")?,
        neighborhood: row.get("neighborhood")?,
        postal_code: row.get("postal_code")?,
        country_code: row.get("country_code")?,
        address: row.get("address")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        pet_friendly: row.get("pet_friendly")?,
        furnished: row.get("furnished")?,
        energy_label: row.get("energy_label")?,
        available_from: row
            .get::<_, Option<String>>("available_from")?
            .and_then(|s| s.parse().ok()),
        rental_agent: row.get("rental_agent")?,
        image_urls,
        raw_data,
        first_seen_at: parse_datetime(&row.get::<_, String>("first_seen_at")?),
        last_seen_at: parse_datetime(&row.get::<_, String>("last_seen_at")?),
        delisted_at: parse_datetime_opt(row.get::<_, Option<String>>("delisted_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedListing;

    fn temp_repo() -> (tempfile::TempDir, ListingRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = ListingRepository::open(dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    fn sample(source_id: &str) -> NormalizedListing {
        let mut listing = NormalizedListing::new(
            "pararius",
            source_id,
            &format!("https://www.pararius.com/apartment/{source_id}"),
            "Apartment Keizersgracht",
            "amsterdam",
        );
        listing.price_eur_cents = Some(150_000);
        listing.rooms = Some(2.0);
        listing.size_sqm = Some(60);
        listing
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, repo) = temp_repo();
        let listing = sample("ap1");

        assert_eq!(repo.upsert(&listing).unwrap(), (true, false));
        assert_eq!(repo.upsert(&listing).unwrap(), (false, true));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_retains_stored_values_over_empty_incoming() {
        let (_dir, repo) = temp_repo();
        repo.upsert(&sample("ap1")).unwrap();

        let mut resighting = sample("ap1");
        resighting.title = String::new();
        resighting.price_eur_cents = None;
        repo.upsert(&resighting).unwrap();

        let stored = repo.get_by_source_key("pararius", "ap1").unwrap().unwrap();
        assert_eq!(stored.title, "Apartment Keizersgracht");
        assert_eq!(stored.price_eur_cents, Some(150_000));
    }

    #[test]
    fn test_upsert_refreshes_mutable_fields() {
        let (_dir, repo) = temp_repo();
        repo.upsert(&sample("ap1")).unwrap();

        let mut resighting = sample("ap1");
        resighting.price_eur_cents = Some(160_000);
        resighting.size_sqm = Some(65);
        repo.upsert(&resighting).unwrap();

        let stored = repo.get_by_source_key("pararius", "ap1").unwrap().unwrap();
        assert_eq!(stored.price_eur_cents, Some(160_000));
        assert_eq!(stored.size_sqm, Some(65));
    }

    #[test]
    fn test_sweep_delists_stale_absent_listings() {
        let (_dir, repo) = temp_repo();
        repo.upsert(&sample("old")).unwrap();
        repo.upsert(&sample("kept")).unwrap();

        // Age both listings past the threshold.
        let conn = repo.connect().unwrap();
        let eight_days_ago = format_datetime(Utc::now() - chrono::Duration::days(8));
        conn.execute(
            "UPDATE listings SET last_seen_at = ?1",
            params![eight_days_ago],
        )
        .unwrap();

        let active: HashSet<String> = ["kept".to_string()].into_iter().collect();
        let swept = repo.sweep_delisted("pararius", &active, 7).unwrap();
        assert_eq!(swept, 1);

        let old = repo.get_by_source_key("pararius", "old").unwrap().unwrap();
        assert!(old.is_delisted());
        // Present in the active set: never touched regardless of age.
        let kept = repo.get_by_source_key("pararius", "kept").unwrap().unwrap();
        assert!(!kept.is_delisted());
    }

    #[test]
    fn test_sweep_spares_recent_listings() {
        let (_dir, repo) = temp_repo();
        repo.upsert(&sample("fresh")).unwrap();
        let swept = repo.sweep_delisted("pararius", &HashSet::new(), 7).unwrap();
        assert_eq!(swept, 0);
    }

    #[test]
    fn test_relisting_clears_delisted_at() {
        let (_dir, repo) = temp_repo();
        repo.upsert(&sample("ap1")).unwrap();

        let conn = repo.connect().unwrap();
        let eight_days_ago = format_datetime(Utc::now() - chrono::Duration::days(8));
        conn.execute(
            "UPDATE listings SET last_seen_at = ?1",
            params![eight_days_ago],
        )
        .unwrap();
        repo.sweep_delisted("pararius", &HashSet::new(), 7).unwrap();
        assert!(repo
            .get_by_source_key("pararius", "ap1")
            .unwrap()
            .unwrap()
            .is_delisted());

        repo.upsert(&sample("ap1")).unwrap();
        let stored = repo.get_by_source_key("pararius", "ap1").unwrap().unwrap();
        assert!(!stored.is_delisted());
    }
}

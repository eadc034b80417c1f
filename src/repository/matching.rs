//! Preference and match storage.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, parse_datetime_opt, with_retry, Result};
use crate::models::{Match, Preference};

/// Repository over the `preferences` table.
#[derive(Debug, Clone)]
pub struct PreferenceRepository {
    db_path: PathBuf,
}

impl PreferenceRepository {
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
            CREATE TABLE IF NOT EXISTS preferences (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                city TEXT NOT NULL,
                country_code TEXT NOT NULL DEFAULT 'NL',
                min_price INTEGER,
                max_price INTEGER NOT NULL,
                min_rooms REAL,
                max_rooms REAL,
                min_size_sqm INTEGER,
                max_size_sqm INTEGER,
                pet_friendly INTEGER NOT NULL DEFAULT 0,
                furnished INTEGER,
                keywords TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_preferences_user
                ON preferences(user_id);
            CREATE INDEX IF NOT EXISTS idx_preferences_city
                ON preferences(city) WHERE is_active = 1;
        "#,
        )?;
        Ok(())
    }

    /// Insert or replace a preference.
    pub fn save(&self, pref: &Preference) -> Result<()> {
        let keywords = serde_json::to_string(&pref.keywords)?;
        with_retry(|| {
            let conn = self.connect()?;
            conn.execute(
                r#"
                INSERT INTO preferences (
                    id, user_id, city, country_code, min_price, max_price,
                    min_rooms, max_rooms, min_size_sqm, max_size_sqm,
                    pet_friendly, furnished, keywords, is_active,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(id) DO UPDATE SET
                    city = excluded.city,
                    country_code = excluded.country_code,
                    min_price = excluded.min_price,
                    max_price = excluded.max_price,
                    min_rooms = excluded.min_rooms,
                    max_rooms = excluded.max_rooms,
                    min_size_sqm = excluded.min_size_sqm,
                    max_size_sqm = excluded.max_size_sqm,
                    pet_friendly = excluded.pet_friendly,
                    furnished = excluded.furnished,
                    keywords = excluded.keywords,
                    is_active = excluded.is_active,
                    updated_at = excluded.updated_at
                "#,
                params![
                    pref.id,
                    pref.user_id,
                    pref.city,
                    pref.country_code,
                    pref.min_price,
                    pref.max_price,
                    pref.min_rooms,
                    pref.max_rooms,
                    pref.min_size_sqm,
                    pref.max_size_sqm,
                    pref.pet_friendly,
                    pref.furnished,
                    keywords,
                    pref.is_active,
                    format_datetime(pref.created_at),
                    format_datetime(pref.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Active preferences whose city matches, case-insensitively.
    pub fn active_for_city(&self, city: &str) -> Result<Vec<Preference>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM preferences WHERE is_active = 1 AND LOWER(city) = LOWER(?1)",
        )?;
        let prefs = stmt
            .query_map(params![city], row_to_preference)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prefs)
    }

    /// All preferences, active or not.
    pub fn list(&self) -> Result<Vec<Preference>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM preferences ORDER BY created_at")?;
        let prefs = stmt
            .query_map([], row_to_preference)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prefs)
    }
}

fn row_to_preference(row: &Row) -> rusqlite::Result<Preference> {
    let keywords: Vec<String> = row
        .get::<_, String>("keywords")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(Preference {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        city: row.get("city")?,
        country_code: row.get("country_code")?,
        min_price: row.get("min_price")?,
        max_price: row.get("max_price")?,
        min_rooms: row.get("min_rooms")?,
        max_rooms: row.get("max_rooms")?,
        min_size_sqm: row.get("min_size_sqm")?,
        max_size_sqm: row.get("max_size_sqm")?,
        pet_friendly: row.get("pet_friendly")?,
        furnished: row.get("furnished")?,
        keywords,
        is_active: row.get("is_active")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

/// Repository over the `matches` table.
#[derive(Debug, Clone)]
pub struct MatchRepository {
    db_path: PathBuf,
}

impl MatchRepository {
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
            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                listing_id TEXT NOT NULL,
                preference_id TEXT NOT NULL,
                score REAL NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0,
                notified_at TEXT,
                notification_channel TEXT NOT NULL DEFAULT 'none',
                created_at TEXT NOT NULL,
                UNIQUE(user_id, listing_id)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_user
                ON matches(user_id);
            CREATE INDEX IF NOT EXISTS idx_matches_listing
                ON matches(listing_id);
            CREATE INDEX IF NOT EXISTS idx_matches_unnotified
                ON matches(created_at) WHERE notified = 0;
        "#,
        )?;
        Ok(())
    }

    /// Whether a match already exists for this (user, listing) pair.
    pub fn exists(&self, user_id: &str, listing_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM matches WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a match unless the (user, listing) pair already has one.
    /// Returns whether a row was actually written.
    pub fn insert(&self, m: &Match) -> Result<bool> {
        with_retry(|| {
            let conn = self.connect()?;
            let changed = conn.execute(
                r#"
                INSERT OR IGNORE INTO matches (
                    id, user_id, listing_id, preference_id, score,
                    notified, notified_at, notification_channel, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    m.id,
                    m.user_id,
                    m.listing_id,
                    m.preference_id,
                    m.score,
                    m.notified,
                    m.notified_at.map(format_datetime),
                    m.notification_channel,
                    format_datetime(m.created_at),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// All matches for a listing.
    pub fn for_listing(&self, listing_id: &str) -> Result<Vec<Match>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM matches WHERE listing_id = ?1")?;
        let matches = stmt
            .query_map(params![listing_id], row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Total stored matches.
    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_match(row: &Row) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        listing_id: row.get("listing_id")?,
        preference_id: row.get("preference_id")?,
        score: row.get("score")?,
        notified: row.get("notified")?,
        notified_at: parse_datetime_opt(row.get::<_, Option<String>>("notified_at")?),
        notification_channel: row.get("notification_channel")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_repos() -> (tempfile::TempDir, PreferenceRepository, MatchRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        let prefs = PreferenceRepository::open(&db).unwrap();
        let matches = MatchRepository::open(&db).unwrap();
        (dir, prefs, matches)
    }

    #[test]
    fn test_active_for_city_is_case_insensitive() {
        let (_dir, prefs, _matches) = temp_repos();
        let mut pref = Preference::new("user-1", "Amsterdam", 200_000);
        prefs.save(&pref).unwrap();

        assert_eq!(prefs.active_for_city("amsterdam").unwrap().len(), 1);
        assert_eq!(prefs.active_for_city("AMSTERDAM").unwrap().len(), 1);
        assert!(prefs.active_for_city("rotterdam").unwrap().is_empty());

        pref.is_active = false;
        prefs.save(&pref).unwrap();
        assert!(prefs.active_for_city("amsterdam").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_match_is_ignored() {
        let (_dir, _prefs, matches) = temp_repos();
        let first = Match::new("user-1", "listing-1", "pref-1", 0.75);
        assert!(matches.insert(&first).unwrap());

        // Same pair from a different preference: unique on (user, listing).
        let dupe = Match::new("user-1", "listing-1", "pref-2", 0.9);
        assert!(!matches.insert(&dupe).unwrap());
        assert_eq!(matches.count().unwrap(), 1);
        assert!(matches.exists("user-1", "listing-1").unwrap());
    }
}

//! Listing-to-preference scoring and match emission.
//!
//! `score` is pure and deterministic; the emission policy around it decides
//! which preferences are evaluated and when a Match row is written.

use tracing::{info, warn};

use crate::models::{CanonicalListing, Match, Preference};
use crate::repository::{MatchRepository, PreferenceRepository, Result};

const WEIGHT_CITY: f64 = 0.30;
const WEIGHT_PRICE: f64 = 0.30;
const WEIGHT_ROOMS: f64 = 0.15;
const WEIGHT_SIZE: f64 = 0.15;
const WEIGHT_EXTRAS: f64 = 0.10;

/// Minimum score for a match to be emitted.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Score a listing against a preference. Always in [0, 1], rounded to
/// 3 decimals.
pub fn score(listing: &CanonicalListing, pref: &Preference) -> f64 {
    let mut score = 0.0;

    let city_matches = listing.city.eq_ignore_ascii_case(&pref.city);
    if city_matches {
        score += WEIGHT_CITY;

        // Price credit needs a known price within bounds, in the city the
        // preference targets. An unknown price earns nothing; it is not
        // zero. Cross-city scores top out at 0.40, under the threshold.
        if let Some(price) = listing.price_eur_cents {
            let above_min = pref.min_price.map(|min| price >= min).unwrap_or(true);
            if above_min && price <= pref.max_price {
                score += WEIGHT_PRICE;
            }
        }
    }

    score += range_credit(listing.rooms, pref.min_rooms, pref.max_rooms, WEIGHT_ROOMS);
    score += range_credit(
        listing.size_sqm.map(|s| s as f64),
        pref.min_size_sqm.map(|s| s as f64),
        pref.max_size_sqm.map(|s| s as f64),
        WEIGHT_SIZE,
    );

    // Extras weight is spread over the extras where the preference expresses
    // interest and the listing reports a known value.
    let mut extras_hits = 0u32;
    let mut extras_applicable = 0u32;
    if pref.pet_friendly {
        if let Some(pet_friendly) = listing.pet_friendly {
            extras_applicable += 1;
            if pet_friendly {
                extras_hits += 1;
            }
        }
    }
    if let Some(wanted) = pref.furnished {
        if let Some(furnished) = listing.furnished {
            extras_applicable += 1;
            if furnished == wanted {
                extras_hits += 1;
            }
        }
    }
    if extras_applicable > 0 {
        score += WEIGHT_EXTRAS * f64::from(extras_hits) / f64::from(extras_applicable);
    }

    (score * 1000.0).round() / 1000.0
}

/// Credit a bounded numeric factor.
///
/// Both bounds specified: full credit iff the listing value lies within.
/// No bounds: credit by default when the listing has a value. Bounds without
/// a listing value: no credit.
fn range_credit(value: Option<f64>, min: Option<f64>, max: Option<f64>, weight: f64) -> f64 {
    match (min, max) {
        (Some(min), Some(max)) => match value {
            Some(v) if v >= min && v <= max => weight,
            _ => 0.0,
        },
        _ => {
            if value.is_some() {
                weight
            } else {
                0.0
            }
        }
    }
}

/// Evaluate one newly-inserted-or-updated listing against the active
/// preferences for its city and persist the resulting matches.
///
/// The city restriction is a performance pre-filter, not part of the score.
/// Existing (user, listing) pairs are never duplicated. Returns the number
/// of matches created.
pub fn run_matching(
    listing: &CanonicalListing,
    prefs: &PreferenceRepository,
    matches: &MatchRepository,
) -> Result<usize> {
    let candidates = prefs.active_for_city(&listing.city)?;
    let mut created = 0;

    for pref in candidates {
        let s = score(listing, &pref);
        if s < MATCH_THRESHOLD {
            continue;
        }
        if matches.exists(&pref.user_id, &listing.id)? {
            continue;
        }

        let m = Match::new(&pref.user_id, &listing.id, &pref.id, s);
        if matches.insert(&m)? {
            info!(
                "match created: user={} listing={} score={:.3}",
                pref.user_id, listing.id, s
            );
            created += 1;
        } else {
            // Lost a race with a concurrent pair; the stored row wins.
            warn!(
                "match for user={} listing={} already present",
                pref.user_id, listing.id
            );
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedListing;
    use chrono::Utc;

    fn listing(city: &str, price: Option<i64>, rooms: Option<f64>, size: Option<i64>) -> CanonicalListing {
        let mut normalized = NormalizedListing::new("pararius", "ap1", "url", "Apartment", city);
        normalized.price_eur_cents = price;
        normalized.rooms = rooms;
        normalized.size_sqm = size;
        CanonicalListing::from_normalized(&normalized, Utc::now())
    }

    fn pref(city: &str) -> Preference {
        let mut pref = Preference::new("user-1", city, 200_000);
        pref.min_price = Some(100_000);
        pref.min_rooms = Some(1.0);
        pref.max_rooms = Some(3.0);
        pref.min_size_sqm = Some(40);
        pref.max_size_sqm = Some(100);
        pref
    }

    #[test]
    fn test_full_featured_match_scores_high() {
        // city + price + rooms + size all credited, no applicable extras.
        let listing = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        let s = score(&listing, &pref("amsterdam"));
        assert!(s >= 0.8, "expected >= 0.8, got {s}");
        assert!(s <= 1.0);
    }

    #[test]
    fn test_wrong_city_falls_below_threshold() {
        let listing = listing("rotterdam", Some(150_000), Some(2.0), Some(60));
        let s = score(&listing, &pref("amsterdam"));
        assert!(s < MATCH_THRESHOLD, "expected < 0.5, got {s}");
    }

    #[test]
    fn test_partial_match_lands_mid_range() {
        // Right city and price, too many rooms for the preference.
        let listing = listing("amsterdam", Some(150_000), Some(5.0), Some(60));
        let s = score(&listing, &pref("amsterdam"));
        assert!((0.5..=0.8).contains(&s), "expected mid-range, got {s}");
    }

    #[test]
    fn test_city_comparison_is_case_insensitive() {
        let listing = listing("Amsterdam", Some(150_000), Some(2.0), Some(60));
        assert!(score(&listing, &pref("amsterdam")) >= 0.8);
    }

    #[test]
    fn test_unknown_price_earns_no_price_credit() {
        let known = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        let unknown = listing("amsterdam", None, Some(2.0), Some(60));
        let p = pref("amsterdam");
        assert!(score(&known, &p) - score(&unknown, &p) >= 0.299);
    }

    #[test]
    fn test_price_below_min_earns_no_credit() {
        let cheap = listing("amsterdam", Some(50_000), Some(2.0), Some(60));
        let p = pref("amsterdam");
        let s = score(&cheap, &p);
        assert!((s - 0.6).abs() < 1e-9, "expected 0.6, got {s}");
    }

    #[test]
    fn test_unbounded_factor_credits_by_default() {
        let mut p = pref("amsterdam");
        p.min_rooms = None;
        p.max_rooms = None;
        let with_rooms = listing("amsterdam", Some(150_000), Some(7.0), Some(60));
        let without_rooms = listing("amsterdam", Some(150_000), None, Some(60));
        assert!(score(&with_rooms, &p) > score(&without_rooms, &p));
    }

    #[test]
    fn test_extras_distributed_by_agreement_ratio() {
        let mut p = pref("amsterdam");
        p.pet_friendly = true;
        p.furnished = Some(true);

        let mut full = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        full.pet_friendly = Some(true);
        full.furnished = Some(true);
        assert!((score(&full, &p) - 1.0).abs() < 1e-9);

        let mut half = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        half.pet_friendly = Some(false);
        half.furnished = Some(true);
        assert!((score(&half, &p) - 0.95).abs() < 1e-9);

        // Listing reports nothing: extras not applicable, no penalty either.
        let silent = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        assert!((score(&silent, &p) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds_and_rounding() {
        let listings = [
            listing("amsterdam", Some(150_000), Some(2.0), Some(60)),
            listing("rotterdam", None, None, None),
            listing("", Some(1), Some(0.0), Some(0)),
        ];
        let p = pref("amsterdam");
        for l in &listings {
            let s = score(l, &p);
            assert!((0.0..=1.0).contains(&s));
            assert!(((s * 1000.0).round() - s * 1000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_run_matching_never_duplicates_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        let prefs = PreferenceRepository::open(&db).unwrap();
        let matches = MatchRepository::open(&db).unwrap();

        prefs.save(&pref("amsterdam")).unwrap();
        let listing = listing("amsterdam", Some(150_000), Some(2.0), Some(60));

        assert_eq!(run_matching(&listing, &prefs, &matches).unwrap(), 1);
        // Re-running over the same listing/preference set creates nothing.
        assert_eq!(run_matching(&listing, &prefs, &matches).unwrap(), 0);
        assert_eq!(matches.count().unwrap(), 1);
    }

    #[test]
    fn test_inactive_preferences_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        let prefs = PreferenceRepository::open(&db).unwrap();
        let matches = MatchRepository::open(&db).unwrap();

        let mut p = pref("amsterdam");
        p.is_active = false;
        prefs.save(&p).unwrap();

        let listing = listing("amsterdam", Some(150_000), Some(2.0), Some(60));
        assert_eq!(run_matching(&listing, &prefs, &matches).unwrap(), 0);
    }
}

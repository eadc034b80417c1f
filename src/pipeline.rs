//! Pipeline driver: fans (source, city) pairs out over site sessions and
//! wires their output through the upserter and the match scorer.
//!
//! Rotation and throttle state is constructed once per run and injected
//! into every session; nothing survives the run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::matcher;
use crate::models::NormalizedListing;
use crate::repository::{ListingRepository, MatchRepository, PreferenceRepository};
use crate::scrapers::{
    adapter_for, EgressRotator, IdentityRotator, RetryPolicy, SessionConfig, SiteAdapter,
    SiteSession, Throttle, ThrottleConfig,
};

/// Result of one (source, city) pair.
#[derive(Debug)]
pub struct PairReport {
    pub source: String,
    pub city: String,
    pub listings: usize,
    pub new_or_updated: usize,
    pub matches_created: usize,
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub pairs: Vec<PairReport>,
    pub failures: Vec<String>,
    pub total_listings: usize,
    pub total_matches: usize,
    pub swept: usize,
    pub artifact_path: PathBuf,
}

/// Run the pipeline over every configured (source, city) pair.
///
/// A pair's failure is logged and isolated; the run always produces a
/// (possibly partial) batch artifact and a total count.
pub async fn run(settings: &Settings) -> anyhow::Result<RunReport> {
    settings.ensure_directories()?;

    let db_path = settings.database_path();
    let listings_repo = ListingRepository::open(&db_path)?;
    let prefs_repo = PreferenceRepository::open(&db_path)?;
    let match_repo = MatchRepository::open(&db_path)?;

    let throttle = Throttle::with_config(ThrottleConfig {
        min_delay: Duration::from_secs_f64(settings.min_delay_secs),
        max_delay: Duration::from_secs_f64(settings.max_delay_secs),
        ..Default::default()
    });
    let identities = Arc::new(IdentityRotator::new());
    let egress = Arc::new(EgressRotator::from_config(&settings.egress_routes));

    let session_config = SessionConfig {
        retry: RetryPolicy {
            max_attempts: settings.max_attempts,
            ..Default::default()
        },
        timeout: Duration::from_secs(settings.request_timeout),
        detail_delay_secs: (settings.min_delay_secs, settings.max_delay_secs),
    };

    let mut handles = Vec::new();
    for source in &settings.sources {
        let Some(adapter) = adapter_for(source) else {
            warn!("Unknown source: {}", source);
            continue;
        };

        // One session per site, shared by its city tasks, so the per-site
        // concurrency ceiling holds across cities and robots rules are
        // fetched once.
        let session = if settings.live {
            Some(Arc::new(SiteSession::new(
                adapter.clone(),
                throttle.clone(),
                identities.clone(),
                egress.clone(),
                session_config.clone(),
            )?))
        } else {
            None
        };

        for city in &settings.cities {
            let adapter = adapter.clone();
            let session = session.clone();
            let city = city.clone();
            let source = source.clone();
            let listings_repo = listings_repo.clone();
            let prefs_repo = prefs_repo.clone();
            let match_repo = match_repo.clone();
            let max_pages = settings.max_pages;
            let fixtures_dir = settings.fixtures_dir.clone();
            let source_label = source.clone();
            let city_label = city.clone();

            let handle = tokio::spawn(async move {
                let listings = match session {
                    Some(session) => session.scrape_city(&city, max_pages).await,
                    None => fixture_listings(&fixtures_dir, adapter.as_ref(), &city)?,
                };

                let mut new_or_updated = 0;
                let mut matches_created = 0;
                let mut active_ids: HashSet<String> = HashSet::new();

                for listing in &listings {
                    active_ids.insert(listing.source_id.clone());
                    let (is_new, was_updated) = listings_repo.upsert(listing)?;
                    if !(is_new || was_updated) {
                        continue;
                    }
                    new_or_updated += 1;

                    match listings_repo
                        .get_by_source_key(&listing.source_site, &listing.source_id)?
                    {
                        Some(stored) => {
                            matches_created +=
                                matcher::run_matching(&stored, &prefs_repo, &match_repo)?;
                        }
                        None => {
                            warn!(
                                "{}:{} vanished between upsert and matching",
                                listing.source_site, listing.source_id
                            );
                        }
                    }
                }

                info!("{}@{}: {} listings", source, city, listings.len());
                Ok::<_, anyhow::Error>((listings, new_or_updated, matches_created, active_ids))
            });
            handles.push((source_label, city_label, handle));
        }
    }

    let mut pairs = Vec::new();
    let mut failures = Vec::new();
    let mut artifact: BTreeMap<String, Vec<NormalizedListing>> = BTreeMap::new();
    let mut active_by_source: HashMap<String, HashSet<String>> = HashMap::new();

    for (source, city, handle) in handles {
        let key = format!("{}:{}", source, city);
        match handle.await {
            Ok(Ok((listings, new_or_updated, matches_created, active_ids))) => {
                active_by_source
                    .entry(source.clone())
                    .or_default()
                    .extend(active_ids);
                pairs.push(PairReport {
                    source,
                    city,
                    listings: listings.len(),
                    new_or_updated,
                    matches_created,
                });
                artifact.insert(key, listings);
            }
            Ok(Err(e)) => {
                error!("{} failed: {:#}", key, e);
                failures.push(format!("{}: {:#}", key, e));
                artifact.insert(key, Vec::new());
            }
            Err(e) => {
                error!("{} panicked: {}", key, e);
                failures.push(format!("{}: task panicked: {}", key, e));
                artifact.insert(key, Vec::new());
            }
        }
    }

    // Live runs may age out listings that vanished from their site; the
    // ids collected this run are exempt no matter how old they look.
    let mut swept = 0;
    if settings.live {
        if let Some(threshold_days) = settings.sweep_threshold_days {
            for (source, active_ids) in &active_by_source {
                match listings_repo.sweep_delisted(source, active_ids, threshold_days) {
                    Ok(count) => swept += count,
                    Err(e) => warn!("Sweep failed for {}: {}", source, e),
                }
            }
        }
    }

    let artifact_path = write_artifact(settings, &artifact)?;

    let total_listings = pairs.iter().map(|p| p.listings).sum();
    let total_matches = pairs.iter().map(|p| p.matches_created).sum();
    info!(
        "Scrape complete: {} total listings across {} source/city pairs, {} matches",
        total_listings,
        artifact.len(),
        total_matches
    );

    Ok(RunReport {
        pairs,
        failures,
        total_listings,
        total_matches,
        swept,
        artifact_path,
    })
}

/// Obtain listings for one pair from the source's HTML fixture instead of
/// the network. The fixture serves as both the search-results page and
/// every detail page, with preview fields overriding the parsed detail.
fn fixture_listings(
    fixtures_dir: &std::path::Path,
    adapter: &dyn SiteAdapter,
    city: &str,
) -> anyhow::Result<Vec<NormalizedListing>> {
    let fixture_file = fixtures_dir.join(format!("{}_search_results.html", adapter.site_name()));
    if !fixture_file.exists() {
        warn!(
            "No fixture for {}: {}",
            adapter.site_name(),
            fixture_file.display()
        );
        return Ok(Vec::new());
    }

    let html = std::fs::read_to_string(&fixture_file)?;
    let mut previews = adapter
        .parse_search_results(&html)
        .map_err(|e| anyhow::anyhow!("{}: {}", adapter.site_name(), e))?;

    for preview in &mut previews {
        if preview.city.is_empty() {
            preview.city = city.to_string();
        }
    }

    let mut listings = Vec::new();
    for preview in previews {
        match adapter.parse_listing_detail(&html) {
            Ok(Some(mut listing)) => {
                listing.apply_preview(&preview);
                listings.push(listing);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to parse fixture detail for {}: {}", preview.source_url, e);
            }
        }
    }
    Ok(listings)
}

/// Write the timestamped batch artifact mapping "{source}:{city}" to the
/// pair's normalized listings.
fn write_artifact(
    settings: &Settings,
    artifact: &BTreeMap<String, Vec<NormalizedListing>>,
) -> anyhow::Result<PathBuf> {
    let path = settings
        .output_dir
        .join(format!("scrape_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
    std::fs::write(&path, serde_json::to_string_pretty(artifact)?)?;
    info!("Output written to {}", path.display());
    Ok(path)
}

//! Sweep command: age out listings that vanished from a site.
//!
//! Run standalone there is no scrape to supply active ids, so the sweep
//! relies purely on the staleness threshold.

use std::collections::HashSet;

use console::style;

use crate::config::Settings;
use crate::repository::ListingRepository;

pub fn cmd_sweep(settings: &Settings, site: &str, threshold_days: i64) -> anyhow::Result<()> {
    let repo = ListingRepository::open(settings.database_path())?;
    let count = repo.sweep_delisted(site, &HashSet::new(), threshold_days)?;

    println!(
        "{} {}: {} listings not seen in {} days marked delisted",
        style("✓").green(),
        site,
        count,
        threshold_days
    );
    Ok(())
}

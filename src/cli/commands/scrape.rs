//! Scrape command: run the pipeline and report per-pair results.

use console::style;

use crate::config::Settings;
use crate::pipeline;

pub async fn cmd_scrape(settings: &Settings) -> anyhow::Result<()> {
    let mode = if settings.live { "live" } else { "fixture" };
    println!(
        "{} Scraping {} source(s) x {} city(ies) [{} mode]",
        style("→").cyan(),
        settings.sources.len(),
        settings.cities.len(),
        mode
    );

    let report = pipeline::run(settings).await?;

    for pair in &report.pairs {
        println!(
            "  {} {}@{}: {} listings, {} new/updated, {} matches",
            style("✓").green(),
            pair.source,
            pair.city,
            pair.listings,
            pair.new_or_updated,
            pair.matches_created
        );
    }
    for failure in &report.failures {
        println!("  {} {}", style("✗").red(), failure);
    }
    if report.swept > 0 {
        println!("  {} {} listings delisted", style("→").dim(), report.swept);
    }

    println!(
        "{} {} listings, {} matches | artifact: {}",
        style("✓").green(),
        report.total_listings,
        report.total_matches,
        report.artifact_path.display()
    );
    Ok(())
}

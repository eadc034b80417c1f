//! Init command: create directories and the database schema.

use console::style;

use crate::config::Settings;
use crate::repository::{ListingRepository, MatchRepository, PreferenceRepository};

pub fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let db_path = settings.database_path();
    ListingRepository::open(&db_path)?;
    PreferenceRepository::open(&db_path)?;
    MatchRepository::open(&db_path)?;

    println!(
        "{} Initialized data directory at {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  database: {}", db_path.display());
    println!("  fixtures: {}", settings.fixtures_dir.display());
    println!("  output:   {}", settings.output_dir.display());
    Ok(())
}

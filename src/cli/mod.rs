//! CLI parser and command dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

#[derive(Parser)]
#[command(name = "rentwatch")]
#[command(about = "Rental listing acquisition and matching system")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file and default location)
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Scrape configured sources and generate matches
    Scrape {
        /// Sources to scrape (comma-separated, overrides config)
        #[arg(long)]
        sources: Option<String>,
        /// Cities to scrape (comma-separated, overrides config)
        #[arg(long)]
        cities: Option<String>,
        /// Scrape live sites instead of local fixtures
        #[arg(long, env = "RENTWATCH_LIVE")]
        live: bool,
        /// Pages per (source, city) pair
        #[arg(long)]
        max_pages: Option<u32>,
        /// Sweep vanished listings after a live scrape (days)
        #[arg(long)]
        sweep_after_days: Option<i64>,
    },

    /// Mark stale listings of a site as delisted
    Sweep {
        /// Source site to sweep
        site: String,
        /// Age in days after which an unseen listing is delisted
        #[arg(long, default_value = "7")]
        threshold_days: i64,
    },

    /// Manage saved search preferences
    Pref {
        #[command(subcommand)]
        command: PrefCommands,
    },
}

#[derive(Subcommand)]
enum PrefCommands {
    /// Add a preference
    Add {
        /// Owning user id (generated when omitted)
        #[arg(long)]
        user: Option<String>,
        /// City to match listings in
        #[arg(long)]
        city: String,
        /// Maximum monthly price in whole euros
        #[arg(long)]
        max_price: i64,
        /// Minimum monthly price in whole euros
        #[arg(long)]
        min_price: Option<i64>,
        #[arg(long)]
        min_rooms: Option<f64>,
        #[arg(long)]
        max_rooms: Option<f64>,
        #[arg(long)]
        min_size: Option<i64>,
        #[arg(long)]
        max_size: Option<i64>,
        /// Require a pet-friendly unit
        #[arg(long)]
        pets: bool,
        /// Require furnished (true) or unfurnished (false)
        #[arg(long)]
        furnished: Option<bool>,
    },
    /// List stored preferences
    List,
}

/// Parse arguments, load settings, and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref(), cli.data.as_deref()).await;

    match cli.command {
        Commands::Init => commands::init::cmd_init(&settings),
        Commands::Scrape {
            sources,
            cities,
            live,
            max_pages,
            sweep_after_days,
        } => {
            if let Some(sources) = sources {
                settings.sources = sources.split(',').map(|s| s.trim().to_string()).collect();
            }
            if let Some(cities) = cities {
                settings.cities = cities.split(',').map(|s| s.trim().to_string()).collect();
            }
            if live {
                settings.live = true;
            }
            if let Some(pages) = max_pages {
                settings.max_pages = pages;
            }
            if sweep_after_days.is_some() {
                settings.sweep_threshold_days = sweep_after_days;
            }
            commands::scrape::cmd_scrape(&settings).await
        }
        Commands::Sweep {
            site,
            threshold_days,
        } => commands::sweep::cmd_sweep(&settings, &site, threshold_days),
        Commands::Pref { command } => match command {
            PrefCommands::Add {
                user,
                city,
                max_price,
                min_price,
                min_rooms,
                max_rooms,
                min_size,
                max_size,
                pets,
                furnished,
            } => commands::pref::cmd_pref_add(
                &settings,
                commands::pref::PrefAddArgs {
                    user,
                    city,
                    max_price_eur: max_price,
                    min_price_eur: min_price,
                    min_rooms,
                    max_rooms,
                    min_size,
                    max_size,
                    pets,
                    furnished,
                },
            ),
            PrefCommands::List => commands::pref::cmd_pref_list(&settings),
        },
    }
}

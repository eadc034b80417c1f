//! Preference commands: seed and inspect saved searches.

use console::style;
use uuid::Uuid;

use crate::config::Settings;
use crate::models::Preference;
use crate::repository::PreferenceRepository;

pub struct PrefAddArgs {
    pub user: Option<String>,
    pub city: String,
    pub max_price_eur: i64,
    pub min_price_eur: Option<i64>,
    pub min_rooms: Option<f64>,
    pub max_rooms: Option<f64>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub pets: bool,
    pub furnished: Option<bool>,
}

pub fn cmd_pref_add(settings: &Settings, args: PrefAddArgs) -> anyhow::Result<()> {
    let repo = PreferenceRepository::open(settings.database_path())?;

    let user_id = args
        .user
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut pref = Preference::new(&user_id, &args.city, args.max_price_eur * 100);
    pref.min_price = args.min_price_eur.map(|p| p * 100);
    pref.min_rooms = args.min_rooms;
    pref.max_rooms = args.max_rooms;
    pref.min_size_sqm = args.min_size;
    pref.max_size_sqm = args.max_size;
    pref.pet_friendly = args.pets;
    pref.furnished = args.furnished;
    repo.save(&pref)?;

    println!(
        "{} Preference {} for user {} ({}, up to €{}/month)",
        style("✓").green(),
        pref.id,
        user_id,
        pref.city,
        args.max_price_eur
    );
    Ok(())
}

pub fn cmd_pref_list(settings: &Settings) -> anyhow::Result<()> {
    let repo = PreferenceRepository::open(settings.database_path())?;
    let prefs = repo.list()?;

    if prefs.is_empty() {
        println!("No preferences stored.");
        return Ok(());
    }
    for pref in prefs {
        let status = if pref.is_active {
            style("active").green()
        } else {
            style("inactive").dim()
        };
        println!(
            "{} [{}] user={} city={} price={}..{} euros",
            pref.id,
            status,
            pref.user_id,
            pref.city,
            pref.min_price.map(|p| p / 100).unwrap_or(0),
            pref.max_price / 100
        );
    }
    Ok(())
}

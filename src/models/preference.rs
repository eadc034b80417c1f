//! Saved search criteria owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's saved search. Listings are scored against active preferences
/// whose city matches the listing's city.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub id: String,
    pub user_id: String,
    pub city: String,
    pub country_code: String,
    /// Lower price bound in euro cents, optional.
    pub min_price: Option<i64>,
    /// Upper price bound in euro cents, required.
    pub max_price: i64,
    pub min_rooms: Option<f64>,
    pub max_rooms: Option<f64>,
    pub min_size_sqm: Option<i64>,
    pub max_size_sqm: Option<i64>,
    /// True when the user needs a pet-friendly unit.
    pub pet_friendly: bool,
    /// Some(true)/Some(false) when the user cares either way, None otherwise.
    pub furnished: Option<bool>,
    pub keywords: Vec<String>,
    /// Soft-deactivation flag; inactive preferences never produce matches.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preference {
    /// Create an active preference with only the required bounds set.
    pub fn new(user_id: &str, city: &str, max_price: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            city: city.to_string(),
            country_code: "NL".to_string(),
            min_price: None,
            max_price,
            min_rooms: None,
            max_rooms: None,
            min_size_sqm: None,
            max_size_sqm: None,
            pet_friendly: false,
            furnished: None,
            keywords: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

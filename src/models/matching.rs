//! A scored linkage between a user's preference and a canonical listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One match, unique per (user_id, listing_id).
///
/// rentwatch only guarantees the row is committed; delivery is handled by a
/// downstream consumer that reads matches and flips the notified fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub user_id: String,
    pub listing_id: String,
    pub preference_id: String,
    /// Score in [0, 1], rounded to 3 decimals.
    pub score: f64,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub notification_channel: String,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(user_id: &str, listing_id: &str, preference_id: &str, score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
            preference_id: preference_id.to_string(),
            score,
            notified: false,
            notified_at: None,
            notification_channel: "none".to_string(),
            created_at: Utc::now(),
        }
    }
}

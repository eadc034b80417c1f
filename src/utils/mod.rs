//! Shared utility functions.
//!
//! - `price`: locale-tolerant rental price parsing

mod price;

pub use price::parse_price_eur_cents;

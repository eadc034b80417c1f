//! Data models for rentwatch.

mod listing;
mod matching;
mod preference;

pub use listing::{CanonicalListing, ListingPreview, NormalizedListing};
pub use matching::Match;
pub use preference::Preference;

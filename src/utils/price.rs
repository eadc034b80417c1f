//! Rental price parsing.
//!
//! Dutch listing sites format prices as "€ 1.500 /maand", "€1,500 per month",
//! or similar; the separators are locale noise rather than decimals, so the
//! digits alone carry the whole-euro amount. Malformed or absent prices parse
//! to `None` ("unknown"), never to zero.

/// Parse a price string to euro cents.
///
/// Returns `None` when the text carries no digits or the amount is
/// implausibly large (a sign the digits weren't a price at all).
pub fn parse_price_eur_cents(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 7 {
        return None;
    }
    digits.parse::<i64>().ok().map(|euros| euros * 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dutch_format() {
        assert_eq!(parse_price_eur_cents("€ 1.500 /maand"), Some(150_000));
        assert_eq!(parse_price_eur_cents("€1.250,- per maand"), Some(125_000));
    }

    #[test]
    fn test_parse_english_format() {
        assert_eq!(parse_price_eur_cents("€1,500 per month"), Some(150_000));
        assert_eq!(parse_price_eur_cents("2000"), Some(200_000));
    }

    #[test]
    fn test_malformed_is_unknown_not_zero() {
        assert_eq!(parse_price_eur_cents("Price on request"), None);
        assert_eq!(parse_price_eur_cents(""), None);
        assert_eq!(parse_price_eur_cents("€ -"), None);
    }

    #[test]
    fn test_implausible_amount_rejected() {
        assert_eq!(parse_price_eur_cents("31-12-20251500"), None);
    }
}

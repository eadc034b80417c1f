//! Funda site adapter.
//!
//! Funda renders listing cards with data-test-id attributes on current
//! markup and falls back to older class-based cards; both are tried.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{ParseFailure, SearchFilters, SiteAdapter};
use crate::models::{ListingPreview, NormalizedListing};
use crate::utils::parse_price_eur_cents;

const SITE: &str = "funda";
const BASE_URL: &str = "https://www.funda.nl";

pub struct FundaAdapter;

impl SiteAdapter for FundaAdapter {
    fn site_name(&self) -> &'static str {
        SITE
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    // Funda is the most aggressive bot detector of the shipped sources;
    // keep its sessions strictly sequential.
    fn max_concurrent(&self) -> usize {
        1
    }

    fn build_search_url(&self, city: &str, page: u32, _filters: &SearchFilters) -> String {
        let city_slug = city.to_lowercase().replace(' ', "-").replace('\'', "");
        let mut url = format!("{}/huur/{}/beschikbaar/", BASE_URL, city_slug);
        if page > 1 {
            url.push_str(&format!("p{}/", page));
        }
        url
    }

    fn parse_search_results(&self, html: &str) -> Result<Vec<ListingPreview>, ParseFailure> {
        let document = Html::parse_document(html);
        let modern_cards = selector(r#"[data-test-id="search-result-item"]"#)?;
        let legacy_cards = selector("li.search-result")?;
        let link_selector = selector("a[href]")?;
        let title_selector = selector("h2, h3")?;
        let price_selector = selector(r#"[class*="price"]"#)?;

        let cards: Vec<ElementRef> = {
            let modern: Vec<ElementRef> = document.select(&modern_cards).collect();
            if modern.is_empty() {
                document.select(&legacy_cards).collect()
            } else {
                modern
            }
        };

        let mut results = Vec::new();
        for card in cards {
            let link = match card
                .select(&link_selector)
                .find(|l| l.value().attr("href").is_some_and(|h| h.contains("/huur/")))
            {
                Some(l) => l,
                None => continue,
            };
            let href = link.value().attr("href").unwrap_or_default();
            let source_url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", BASE_URL, href)
            };
            let source_id = match href.trim_end_matches('/').rsplit('/').next() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };

            let title = card
                .select(&title_selector)
                .next()
                .map(|e| element_text(&e))
                .unwrap_or_else(|| element_text(&link));
            let price_text = card
                .select(&price_selector)
                .next()
                .map(|e| element_text(&e))
                .unwrap_or_default();

            results.push(ListingPreview {
                source_site: SITE.to_string(),
                source_id,
                source_url,
                title,
                price_eur_cents: parse_price_eur_cents(&price_text),
                // Search pages don't repeat the city per card; the session
                // fills it from the search context.
                city: String::new(),
            });
        }
        Ok(results)
    }

    fn parse_listing_detail(&self, html: &str) -> Result<Option<NormalizedListing>, ParseFailure> {
        let document = Html::parse_document(html);

        let title = first_text(&document, "h1 .object-header__title")
            .or_else(|| first_text(&document, "h1"));
        let title = match title {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };

        let price_text = first_text(&document, r#"[class*="price"]"#).unwrap_or_default();
        let text: String = document.root_element().text().collect();

        let mut listing = NormalizedListing::new(SITE, "", "", &title, "");
        listing.price_eur_cents = parse_price_eur_cents(&price_text);
        listing.size_sqm = extract_i64(&text, r"(\d+)\s*m²");
        listing.rooms = extract_f64(&text, r"(?i)(\d+)\s+kamers?");
        listing.energy_label = extract_energy_label(&text);
        listing.raw_data = serde_json::json!({
            "price_text": price_text,
        });
        Ok(Some(listing))
    }
}

fn selector(css: &str) -> Result<Selector, ParseFailure> {
    Selector::parse(css).map_err(|e| ParseFailure(format!("bad selector {css}: {e}")))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    document.select(&sel).next().map(|e| element_text(&e))
}

fn extract_i64(text: &str, pattern: &str) -> Option<i64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn extract_f64(text: &str, pattern: &str) -> Option<f64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn extract_energy_label(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)energielabel\s+([A-G]\+*)").ok()?;
    Some(re.captures(text)?.get(1)?.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
        <html><body>
        <div data-test-id="search-result-item">
          <a href="/huur/amsterdam/appartement-42193366-prinsengracht-100/">
            <h2>Prinsengracht 100</h2>
          </a>
          <span class="search-result-price">€ 2.100 per maand</span>
        </div>
        <div data-test-id="search-result-item">
          <a href="/huur/amsterdam/appartement-42193367-herengracht-8/">
            <h2>Herengracht 8</h2>
          </a>
          <span class="search-result-price">€ 1.400 per maand</span>
        </div>
        </body></html>
    "#;

    const DETAIL_FIXTURE: &str = r#"
        <html><body>
        <h1><span class="object-header__title">Prinsengracht 100</span></h1>
        <strong class="object-header__price">€ 2.100 per maand</strong>
        <dl>Woonoppervlakte 85 m² - 4 kamers - Energielabel B</dl>
        </body></html>
    "#;

    #[test]
    fn test_build_search_url() {
        let adapter = FundaAdapter;
        assert_eq!(
            adapter.build_search_url("Amsterdam", 1, &SearchFilters::default()),
            "https://www.funda.nl/huur/amsterdam/beschikbaar/"
        );
        assert_eq!(
            adapter.build_search_url("s-Hertogenbosch", 2, &SearchFilters::default()),
            "https://www.funda.nl/huur/s-hertogenbosch/beschikbaar/p2/"
        );
    }

    #[test]
    fn test_parse_search_results() {
        let adapter = FundaAdapter;
        let previews = adapter.parse_search_results(SEARCH_FIXTURE).unwrap();
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].source_id, "appartement-42193366-prinsengracht-100");
        assert_eq!(previews[0].title, "Prinsengracht 100");
        assert_eq!(previews[0].price_eur_cents, Some(210_000));
        assert!(previews[0].source_url.starts_with("https://www.funda.nl/huur/"));
    }

    #[test]
    fn test_parse_listing_detail() {
        let adapter = FundaAdapter;
        let listing = adapter.parse_listing_detail(DETAIL_FIXTURE).unwrap().unwrap();
        assert_eq!(listing.title, "Prinsengracht 100");
        assert_eq!(listing.price_eur_cents, Some(210_000));
        assert_eq!(listing.size_sqm, Some(85));
        assert_eq!(listing.rooms, Some(4.0));
        assert_eq!(listing.energy_label.as_deref(), Some("B"));
    }

    #[test]
    fn test_detail_without_title_is_none() {
        let adapter = FundaAdapter;
        let listing = adapter
            .parse_listing_detail("<html><body><p>consent wall</p></body></html>")
            .unwrap();
        assert!(listing.is_none());
    }
}

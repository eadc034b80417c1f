//! Pararius site adapter.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{ParseFailure, SearchFilters, SiteAdapter};
use crate::models::{ListingPreview, NormalizedListing};
use crate::utils::parse_price_eur_cents;

const SITE: &str = "pararius";
const BASE_URL: &str = "https://www.pararius.com";

/// Adapter for pararius.com search and detail pages.
pub struct ParariusAdapter;

impl SiteAdapter for ParariusAdapter {
    fn site_name(&self) -> &'static str {
        SITE
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn build_search_url(&self, city: &str, page: u32, filters: &SearchFilters) -> String {
        let city_slug = city.to_lowercase().replace(' ', "-");
        let mut url = format!("{}/apartments/{}", BASE_URL, city_slug);
        if filters.min_price_eur.is_some() || filters.max_price_eur.is_some() {
            url.push_str(&format!(
                "/{}-{}",
                filters.min_price_eur.map(|p| p.to_string()).unwrap_or_default(),
                filters.max_price_eur.map(|p| p.to_string()).unwrap_or_default()
            ));
        }
        if page > 1 {
            url.push_str(&format!("/page-{}", page));
        }
        url
    }

    fn parse_search_results(&self, html: &str) -> Result<Vec<ListingPreview>, ParseFailure> {
        let document = Html::parse_document(html);
        let card_selector = selector("section.listing-search-item")?;
        let title_link_selector = selector("a.listing-search-item__link--title")?;
        let any_link_selector = selector("a")?;
        let price_selector = selector(".listing-search-item__price")?;
        let location_selector = selector(".listing-search-item__sub-title")?;

        let mut results = Vec::new();
        for card in document.select(&card_selector) {
            let link = match card
                .select(&title_link_selector)
                .next()
                .or_else(|| card.select(&any_link_selector).next())
            {
                Some(l) => l,
                None => continue,
            };
            let href = link.value().attr("href").unwrap_or_default();
            if href.is_empty() {
                continue;
            }
            let source_url = absolute_url(href);
            let source_id = match href.trim_end_matches('/').rsplit('/').next() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };

            let title = element_text(&link);
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
                city: card
                    .select(&location_selector)
                    .next()
                    .map(|e| city_from_location(&element_text(&e)))
                    .unwrap_or_default(),
            });
        }
        Ok(results)
    }

    fn parse_listing_detail(&self, html: &str) -> Result<Option<NormalizedListing>, ParseFailure> {
        let document = Html::parse_document(html);

        let title = first_text(&document, "h1.listing-detail-summary__title")
            .or_else(|| first_text(&document, "h1"));
        let price_text =
            first_text(&document, ".listing-detail-summary__price").unwrap_or_default();

        let title = match title {
            Some(t) => t,
            None => return Ok(None),
        };

        let text: String = document.root_element().text().collect();
        let size_sqm = extract_i64(&text, r"(\d+)\s*m²");
        let rooms = extract_f64(&text, r"(?i)(\d+)\s+rooms?");

        let mut listing = NormalizedListing::new(SITE, "", "", &title, "");
        listing.price_eur_cents = parse_price_eur_cents(&price_text);
        listing.size_sqm = size_sqm;
        listing.rooms = rooms;
        listing.furnished = detect_flag(&text, &["furnished", "gemeubileerd"]);
        listing.raw_data = serde_json::json!({
            "price_text": price_text,
        });
        Ok(Some(listing))
    }
}

fn selector(css: &str) -> Result<Selector, ParseFailure> {
    Selector::parse(css).map_err(|e| ParseFailure(format!("bad selector {css}: {e}")))
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", BASE_URL, href)
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    document.select(&sel).next().map(|e| element_text(&e))
}

/// "1017 AB Amsterdam (Centrum)" -> "amsterdam"
fn city_from_location(location: &str) -> String {
    location
        .split_whitespace()
        .nth(2)
        .map(|c| c.trim_matches(|ch: char| !ch.is_alphabetic()).to_lowercase())
        .unwrap_or_default()
}

fn extract_i64(text: &str, pattern: &str) -> Option<i64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn extract_f64(text: &str, pattern: &str) -> Option<f64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn detect_flag(text: &str, markers: &[&str]) -> Option<bool> {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m)).then_some(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
        <html><body>
        <section class="listing-search-item">
          <h2><a class="listing-search-item__link--title" href="/apartment-for-rent/amsterdam/ap123/keizersgracht">Apartment Keizersgracht</a></h2>
          <div class="listing-search-item__price">€ 1.850 /maand</div>
          <div class="listing-search-item__sub-title">1015 AB Amsterdam (Grachtengordel)</div>
        </section>
        <section class="listing-search-item">
          <h2><a class="listing-search-item__link--title" href="/apartment-for-rent/amsterdam/ap456/jordaan">Apartment Jordaan</a></h2>
          <div class="listing-search-item__price">Price on request</div>
        </section>
        </body></html>
    "#;

    const DETAIL_FIXTURE: &str = r#"
        <html><body>
        <h1 class="listing-detail-summary__title">Apartment Keizersgracht 12</h1>
        <div class="listing-detail-summary__price">€ 1.850 /maand</div>
        <p>Bright furnished apartment, 72 m², 3 rooms, available now.</p>
        </body></html>
    "#;

    #[test]
    fn test_build_search_url() {
        let adapter = ParariusAdapter;
        assert_eq!(
            adapter.build_search_url("Amsterdam", 1, &SearchFilters::default()),
            "https://www.pararius.com/apartments/amsterdam"
        );
        assert_eq!(
            adapter.build_search_url("Den Haag", 3, &SearchFilters::default()),
            "https://www.pararius.com/apartments/den-haag/page-3"
        );
        let filters = SearchFilters {
            min_price_eur: Some(1000),
            max_price_eur: Some(2000),
        };
        assert_eq!(
            adapter.build_search_url("amsterdam", 1, &filters),
            "https://www.pararius.com/apartments/amsterdam/1000-2000"
        );
    }

    #[test]
    fn test_parse_search_results() {
        let adapter = ParariusAdapter;
        let previews = adapter.parse_search_results(SEARCH_FIXTURE).unwrap();
        assert_eq!(previews.len(), 2);

        assert_eq!(previews[0].source_id, "keizersgracht");
        assert_eq!(previews[0].title, "Apartment Keizersgracht");
        assert_eq!(previews[0].price_eur_cents, Some(185_000));
        assert_eq!(previews[0].city, "amsterdam");
        assert!(previews[0].source_url.starts_with("https://www.pararius.com/"));

        // Unparseable price is unknown, not zero.
        assert_eq!(previews[1].price_eur_cents, None);
    }

    #[test]
    fn test_parse_listing_detail() {
        let adapter = ParariusAdapter;
        let listing = adapter.parse_listing_detail(DETAIL_FIXTURE).unwrap().unwrap();
        assert_eq!(listing.title, "Apartment Keizersgracht 12");
        assert_eq!(listing.price_eur_cents, Some(185_000));
        assert_eq!(listing.size_sqm, Some(72));
        assert_eq!(listing.rooms, Some(3.0));
        assert_eq!(listing.furnished, Some(true));
    }

    #[test]
    fn test_parse_empty_page_yields_no_previews() {
        let adapter = ParariusAdapter;
        let previews = adapter.parse_search_results("<html><body></body></html>").unwrap();
        assert!(previews.is_empty());
    }
}

//! Heuristic markdown extractor.
//!
//! Pulls truck details out of fetched markdown with regexes and simple
//! structure rules. Serves as the zero-cost stand-in for the LLM
//! collaborator: cooperative pages with plain contact info extract fine,
//! anything harder comes back sparse and scores accordingly.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PipelineError;
use crate::traits::{Extraction, Extractor};
use crate::types::{ContactInfo, ExtractedTruck, PriceRange, SocialMedia};

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"(?m)^#{1,2}\s+(.+)$").expect("valid heading regex");
    static ref EMAIL: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex");
    static ref PHONE: Regex =
        Regex::new(r"\+?1?[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").expect("valid phone regex");
    static ref INSTAGRAM: Regex =
        Regex::new(r"instagram\.com/([A-Za-z0-9_.]+)").expect("valid instagram regex");
    static ref FACEBOOK: Regex =
        Regex::new(r"facebook\.com/([A-Za-z0-9_.]+)").expect("valid facebook regex");
    static ref TWITTER: Regex =
        Regex::new(r"(?:twitter|x)\.com/([A-Za-z0-9_]+)").expect("valid twitter regex");
}

/// Cuisine keywords worth tagging, keyword → label.
const CUISINE_KEYWORDS: &[(&str, &str)] = &[
    ("mexican", "Mexican"),
    ("taco", "Mexican"),
    ("bbq", "BBQ"),
    ("barbecue", "BBQ"),
    ("burger", "American"),
    ("pizza", "Pizza"),
    ("thai", "Thai"),
    ("vietnamese", "Vietnamese"),
    ("korean", "Korean"),
    ("chinese", "Chinese"),
    ("indian", "Indian"),
    ("mediterranean", "Mediterranean"),
    ("ice cream", "Dessert"),
    ("dessert", "Dessert"),
    ("coffee", "Coffee"),
    ("vegan", "Vegan"),
];

/// Regex-based [`Extractor`] over markdown content.
#[derive(Debug, Default, Clone)]
pub struct MarkdownExtractor;

impl MarkdownExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for MarkdownExtractor {
    async fn extract(&self, markdown: &str, source_url: &str) -> Result<Extraction, PipelineError> {
        let name = HEADING
            .captures(markdown)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let description = first_paragraph(markdown);
        let lowercase = markdown.to_lowercase();

        let mut cuisine_type = Vec::new();
        for (keyword, label) in CUISINE_KEYWORDS {
            if lowercase.contains(keyword) && !cuisine_type.iter().any(|c| c == label) {
                cuisine_type.push((*label).to_string());
            }
        }

        let truck = ExtractedTruck {
            name,
            description,
            cuisine_type,
            price_range: detect_price_range(markdown),
            contact_info: ContactInfo {
                website: Some(source_url.to_string()),
                phone: PHONE.find(markdown).map(|m| m.as_str().trim().to_string()),
                email: EMAIL.find(markdown).map(|m| m.as_str().to_string()),
            },
            social_media: SocialMedia {
                instagram: capture_handle(&INSTAGRAM, markdown),
                facebook: capture_handle(&FACEBOOK, markdown),
                twitter: capture_handle(&TWITTER, markdown),
            },
            ..Default::default()
        };

        tracing::debug!(
            source_url = %source_url,
            name = %truck.name,
            cuisines = truck.cuisine_type.len(),
            "heuristic extraction complete"
        );

        Ok(Extraction {
            truck,
            tokens_used: None,
        })
    }
}

fn capture_handle(pattern: &Regex, markdown: &str) -> Option<String> {
    pattern
        .captures(markdown)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|handle| handle != "p" && handle != "share" && handle != "intent")
}

/// First non-heading, non-link-only paragraph line.
fn first_paragraph(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with('[')
                && !line.starts_with('!')
                && line.len() >= 20
        })
        .map(|line| line.to_string())
}

fn detect_price_range(markdown: &str) -> Option<PriceRange> {
    for (token, range) in [
        ("$$$$", PriceRange::Luxury),
        ("$$$", PriceRange::Premium),
        ("$$", PriceRange::Moderate),
    ] {
        if markdown.contains(token) {
            return Some(range);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Taco Supreme

The best street tacos in the Twin Cities, made fresh daily.

Call us: (612) 555-0100 or email hello@tacosupreme.example

Price range: $$

Follow us on [Instagram](https://instagram.com/tacosupreme) and
[Facebook](https://facebook.com/tacosupremempls).
";

    #[tokio::test]
    async fn extracts_name_contact_and_socials() {
        let extraction = MarkdownExtractor::new()
            .extract(SAMPLE, "https://tacosupreme.example")
            .await
            .unwrap();
        let truck = extraction.truck;

        assert_eq!(truck.name, "Taco Supreme");
        assert_eq!(
            truck.description.as_deref(),
            Some("The best street tacos in the Twin Cities, made fresh daily.")
        );
        assert_eq!(truck.cuisine_type, vec!["Mexican"]);
        assert_eq!(truck.price_range, Some(PriceRange::Moderate));
        assert_eq!(truck.contact_info.phone.as_deref(), Some("(612) 555-0100"));
        assert_eq!(
            truck.contact_info.email.as_deref(),
            Some("hello@tacosupreme.example")
        );
        assert_eq!(truck.social_media.instagram.as_deref(), Some("tacosupreme"));
        assert_eq!(
            truck.social_media.facebook.as_deref(),
            Some("tacosupremempls")
        );
        assert!(truck.social_media.twitter.is_none());
    }

    #[tokio::test]
    async fn contentless_markdown_yields_unusable_name() {
        let extraction = MarkdownExtractor::new()
            .extract("just some text with no heading", "https://example.com")
            .await
            .unwrap();
        assert!(!extraction.truck.has_usable_name());
    }

    #[tokio::test]
    async fn website_defaults_to_source_url() {
        let extraction = MarkdownExtractor::new()
            .extract("# A Truck", "https://a-truck.example")
            .await
            .unwrap();
        assert_eq!(
            extraction.truck.contact_info.website.as_deref(),
            Some("https://a-truck.example")
        );
    }
}

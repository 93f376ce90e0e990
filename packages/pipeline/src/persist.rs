//! Persist stage: dedup-merge extracted candidates into the truck store.
//!
//! Idempotent by design: the same extraction persisted twice converges to a
//! single record whose `source_urls` contain each URL once. This is what
//! makes job-level retry safe without cross-stage transactions.

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::quality::calculate_quality_score_at;
use crate::traits::TruckStore;
use crate::types::{ExtractedTruck, FoodTruck};

/// Persist an extracted candidate: merge into a matching record, or insert a
/// new one with a freshly computed quality score.
pub async fn persist_extracted(
    store: &dyn TruckStore,
    extracted: ExtractedTruck,
    source_url: &str,
) -> StoreResult<FoodTruck> {
    let now = Utc::now();
    let candidates = store
        .find_by_name_or_url(&extracted.name, source_url)
        .await?;

    if let Some(existing) = best_match(&candidates, &extracted.name, source_url) {
        tracing::info!(
            truck_id = %existing.id,
            name = %existing.name,
            source_url = %source_url,
            "merging extraction into existing record"
        );
        let merged = merge_into(existing.clone(), extracted, source_url, now);
        return store.update_truck(&merged).await;
    }

    let mut truck = FoodTruck::from_extracted(extracted, source_url);
    truck.data_quality_score = calculate_quality_score_at(&truck, now).score;

    tracing::info!(
        truck_id = %truck.id,
        name = %truck.name,
        quality_score = truck.data_quality_score,
        "creating new record"
    );
    store.create_truck(&truck).await
}

/// Pick the strongest dedup candidate: exact source-url overlap first, then
/// name similarity.
fn best_match<'a>(
    candidates: &'a [FoodTruck],
    name: &str,
    source_url: &str,
) -> Option<&'a FoodTruck> {
    candidates
        .iter()
        .find(|truck| !source_url.is_empty() && truck.source_urls.iter().any(|u| u == source_url))
        .or_else(|| candidates.iter().find(|truck| names_match(&truck.name, name)))
}

/// Name similarity: normalized equality, or one name containing the other
/// ("Taco Supreme" vs "Taco Supreme MPLS").
fn names_match(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Union source URLs and refresh mutable fields from the newer extraction.
/// Fields the extractor did not produce keep their stored values.
fn merge_into(
    mut existing: FoodTruck,
    extracted: ExtractedTruck,
    source_url: &str,
    now: DateTime<Utc>,
) -> FoodTruck {
    if let Some(description) = extracted.description {
        existing.description = Some(description);
    }
    if !extracted.cuisine_type.is_empty() {
        existing.cuisine_type = extracted.cuisine_type;
    }
    if let Some(price_range) = extracted.price_range {
        existing.price_range = Some(price_range);
    }
    if let Some(rating) = extracted.average_rating {
        existing.average_rating = Some(rating);
    }
    if let Some(review_count) = extracted.review_count {
        existing.review_count = Some(review_count);
    }
    if extracted.contact_info.website.is_some() {
        existing.contact_info.website = extracted.contact_info.website;
    }
    if extracted.contact_info.phone.is_some() {
        existing.contact_info.phone = extracted.contact_info.phone;
    }
    if extracted.contact_info.email.is_some() {
        existing.contact_info.email = extracted.contact_info.email;
    }
    if extracted.social_media.instagram.is_some() {
        existing.social_media.instagram = extracted.social_media.instagram;
    }
    if extracted.social_media.facebook.is_some() {
        existing.social_media.facebook = extracted.social_media.facebook;
    }
    if extracted.social_media.twitter.is_some() {
        existing.social_media.twitter = extracted.social_media.twitter;
    }
    if extracted.current_location.is_some() {
        existing.current_location = extracted.current_location;
    }
    if !extracted.scheduled_locations.is_empty() {
        existing.scheduled_locations = extracted.scheduled_locations;
    }
    if extracted.operating_hours.is_some() {
        existing.operating_hours = extracted.operating_hours;
    }
    if !extracted.menu.is_empty() {
        existing.menu = extracted.menu;
    }
    if !extracted.specialties.is_empty() {
        existing.specialties = extracted.specialties;
    }

    existing.add_source_url(source_url);
    existing.last_scraped_at = now;
    existing.updated_at = now;
    existing.data_quality_score = calculate_quality_score_at(&existing, now).score;
    existing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::ContactInfo;

    fn extracted(name: &str) -> ExtractedTruck {
        ExtractedTruck {
            name: name.to_string(),
            cuisine_type: vec!["Mexican".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creates_new_record_with_computed_score() {
        let store = MemoryStore::new();
        let truck = persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();

        assert_eq!(truck.source_urls, vec!["https://a.example"]);
        assert!(truck.data_quality_score > 0.0);
        assert_eq!(store.truck_count(), 1);
    }

    #[tokio::test]
    async fn persisting_twice_converges_to_one_record() {
        let store = MemoryStore::new();
        persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();
        let merged = persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();

        assert_eq!(store.truck_count(), 1);
        assert_eq!(merged.source_urls, vec!["https://a.example"]);
    }

    #[tokio::test]
    async fn merge_unions_source_urls_and_updates_fields() {
        let store = MemoryStore::new();
        let original = persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();
        let before_score = original.data_quality_score;

        let mut update = extracted("Taco Supreme");
        update.description = Some("Street tacos".to_string());
        update.contact_info = ContactInfo {
            website: Some("https://tacosupreme.example".to_string()),
            phone: None,
            email: None,
        };

        let merged = persist_extracted(&store, update, "https://b.example")
            .await
            .unwrap();

        assert_eq!(store.truck_count(), 1);
        assert_eq!(merged.id, original.id);
        assert_eq!(
            merged.source_urls,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(merged.description.as_deref(), Some("Street tacos"));
        assert!(
            merged.data_quality_score > before_score,
            "added fields must raise the recomputed score"
        );
    }

    #[tokio::test]
    async fn merge_keeps_stored_fields_the_extractor_omitted() {
        let store = MemoryStore::new();
        let mut first = extracted("Taco Supreme");
        first.description = Some("Street tacos".to_string());
        persist_extracted(&store, first, "https://a.example")
            .await
            .unwrap();

        // Second extraction has no description; the stored one survives.
        let merged = persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();
        assert_eq!(merged.description.as_deref(), Some("Street tacos"));
    }

    #[tokio::test]
    async fn different_trucks_stay_separate() {
        let store = MemoryStore::new();
        persist_extracted(&store, extracted("Taco Supreme"), "https://a.example")
            .await
            .unwrap();
        persist_extracted(&store, extracted("Burger Barge"), "https://b.example")
            .await
            .unwrap();

        assert_eq!(store.truck_count(), 2);
    }

    #[test]
    fn name_similarity_ignores_case_and_spacing() {
        assert!(names_match("Taco  Supreme", "taco supreme"));
        assert!(names_match("Taco Supreme", "Taco Supreme MPLS"));
        assert!(!names_match("Taco Supreme", "Burger Barge"));
        assert!(!names_match("", ""));
    }
}

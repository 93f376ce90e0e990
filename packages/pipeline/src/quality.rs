//! Deterministic data-quality scoring for persisted records.
//!
//! The score measures completeness and freshness, not factual correctness.
//! Deductions are evaluated in a fixed order (basic info, contact, location,
//! schedule) so the issue list is reproducible.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreResult;
use crate::traits::TruckStore;
use crate::types::FoodTruck;

/// Location observations older than this are considered stale.
const STALE_LOCATION_DAYS: i64 = 7;

/// Score plus every triggered deduction, in evaluation order.
#[derive(Debug, Clone, Serialize)]
pub struct QualityAssessment {
    pub score: f64,
    pub issues: Vec<String>,
}

/// Triage bucket for a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityCategory {
    High,
    Medium,
    Low,
}

impl QualityCategory {
    /// High ≥ 0.8, Medium ≥ 0.6, Low below. The 0.6 Medium floor is the
    /// canonical boundary (see DESIGN.md).
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            QualityCategory::High
        } else if score >= 0.6 {
            QualityCategory::Medium
        } else {
            QualityCategory::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityCategory::High => "High",
            QualityCategory::Medium => "Medium",
            QualityCategory::Low => "Low",
        }
    }
}

/// Score a record against the deduction table. Pure and I/O-free.
pub fn calculate_quality_score(truck: &FoodTruck) -> QualityAssessment {
    calculate_quality_score_at(truck, Utc::now())
}

/// Deterministic variant taking an explicit `now` for staleness checks.
pub fn calculate_quality_score_at(truck: &FoodTruck, now: DateTime<Utc>) -> QualityAssessment {
    let mut score = 1.0_f64;
    let mut issues = Vec::new();
    let mut deduct = |amount: f64, issue: &str, issues: &mut Vec<String>| {
        score -= amount;
        issues.push(issue.to_string());
    };

    // Basic info
    if truck.name.trim().is_empty() {
        deduct(0.2, "Missing name", &mut issues);
    }
    if truck.description.as_deref().unwrap_or("").is_empty() {
        deduct(0.1, "Missing description", &mut issues);
    }
    if truck.cuisine_type.is_empty() {
        deduct(0.1, "Missing cuisine type", &mut issues);
    }
    if truck.price_range.is_none() {
        deduct(0.05, "Missing price range", &mut issues);
    }
    if truck.average_rating.is_none() {
        deduct(0.05, "Missing average rating", &mut issues);
    }
    if truck.review_count.is_none() {
        deduct(0.05, "Missing review count", &mut issues);
    }

    // Contact
    if truck.contact_info.website.as_deref().unwrap_or("").is_empty() {
        deduct(0.05, "Missing website", &mut issues);
    }
    if truck.contact_info.phone.as_deref().unwrap_or("").is_empty() {
        deduct(0.05, "Missing phone number", &mut issues);
    }
    if truck.contact_info.email.as_deref().unwrap_or("").is_empty() {
        deduct(0.05, "Missing email", &mut issues);
    }
    if truck.social_media.instagram.as_deref().unwrap_or("").is_empty() {
        deduct(0.02, "Missing Instagram handle", &mut issues);
    }
    if truck.social_media.facebook.as_deref().unwrap_or("").is_empty() {
        deduct(0.02, "Missing Facebook handle", &mut issues);
    }
    if truck.social_media.twitter.as_deref().unwrap_or("").is_empty() {
        deduct(0.02, "Missing Twitter handle", &mut issues);
    }

    // Location
    match &truck.current_location {
        Some(location) if !location.lat.is_nan() && !location.lng.is_nan() => {
            match location.timestamp {
                Some(timestamp) => {
                    if (now - timestamp).num_days() > STALE_LOCATION_DAYS {
                        deduct(0.10, "Stale location data", &mut issues);
                    }
                }
                None => deduct(0.05, "Missing location timestamp", &mut issues),
            }
        }
        _ => deduct(0.15, "Missing current location data", &mut issues),
    }

    // Schedule
    if truck.scheduled_locations.is_empty() {
        deduct(0.10, "Missing schedule data", &mut issues);
    }

    QualityAssessment {
        score: score.clamp(0.0, 1.0),
        issues,
    }
}

/// Recompute and persist quality scores across the whole store.
///
/// Returns the number of records whose score changed.
pub async fn rescore_all(store: &dyn TruckStore) -> StoreResult<u64> {
    let trucks = store.list_trucks().await?;
    let mut updated = 0;

    for mut truck in trucks {
        let assessment = calculate_quality_score(&truck);
        if (assessment.score - truck.data_quality_score).abs() > f64::EPSILON {
            truck.data_quality_score = assessment.score;
            store.update_truck(&truck).await?;
            updated += 1;
        }
    }

    tracing::info!(updated, "quality rescore pass complete");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactInfo, ExtractedTruck, Location, PriceRange, ScheduledStop, SocialMedia};
    use chrono::Duration as ChronoDuration;

    fn bare_truck(name: &str) -> FoodTruck {
        FoodTruck::from_extracted(
            ExtractedTruck {
                name: name.to_string(),
                ..Default::default()
            },
            "https://example.com",
        )
    }

    fn complete_truck() -> FoodTruck {
        let now = Utc::now();
        let mut truck = bare_truck("Taco Supreme");
        truck.description = Some("Street tacos".to_string());
        truck.cuisine_type = vec!["Mexican".to_string()];
        truck.price_range = Some(PriceRange::Moderate);
        truck.average_rating = Some(4.6);
        truck.review_count = Some(120);
        truck.contact_info = ContactInfo {
            website: Some("https://tacosupreme.example".to_string()),
            phone: Some("+1 555 0100".to_string()),
            email: Some("hello@tacosupreme.example".to_string()),
        };
        truck.social_media = SocialMedia {
            instagram: Some("tacosupreme".to_string()),
            facebook: Some("tacosupreme".to_string()),
            twitter: Some("tacosupreme".to_string()),
        };
        truck.current_location = Some(Location {
            lat: 44.9778,
            lng: -93.265,
            address: Some("100 Main St".to_string()),
            timestamp: Some(now),
        });
        truck.scheduled_locations = vec![ScheduledStop {
            lat: 44.9778,
            lng: -93.265,
            address: None,
            start_time: Some("11:00".to_string()),
            end_time: Some("14:00".to_string()),
            timestamp: now,
        }];
        truck
    }

    #[test]
    fn complete_record_scores_one() {
        let assessment = calculate_quality_score(&complete_truck());
        assert!((assessment.score - 1.0).abs() < 1e-9);
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn empty_record_clamps_at_zero_with_full_issue_list() {
        let mut truck = bare_truck("");
        truck.source_urls.clear();
        let assessment = calculate_quality_score(&truck);
        // Raw deductions sum to 1.01; the score floors at 0.
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.issues.len(), 14);
        assert_eq!(assessment.issues[0], "Missing name");
        assert_eq!(assessment.issues.last().unwrap(), "Missing schedule data");
    }

    #[test]
    fn score_is_always_within_bounds() {
        for truck in [bare_truck(""), bare_truck("Taco Supreme"), complete_truck()] {
            let assessment = calculate_quality_score(&truck);
            assert!((0.0..=1.0).contains(&assessment.score));
        }
    }

    #[test]
    fn name_and_cuisine_only_scores_by_the_deduction_table() {
        let mut truck = bare_truck("Taco Supreme");
        truck.cuisine_type = vec!["Mexican".to_string()];
        let assessment = calculate_quality_score(&truck);
        // All deductions except name (0.2) and cuisine (0.1): 1.01 - 0.3.
        assert!((assessment.score - (1.0 - 0.71)).abs() < 1e-9);
        assert!(!assessment.issues.contains(&"Missing name".to_string()));
        assert!(!assessment.issues.contains(&"Missing cuisine type".to_string()));
    }

    #[test]
    fn nan_coordinates_count_as_missing_location() {
        let mut truck = complete_truck();
        truck.current_location = Some(Location {
            lat: f64::NAN,
            lng: -93.0,
            address: None,
            timestamp: Some(Utc::now()),
        });
        let assessment = calculate_quality_score(&truck);
        assert!(assessment
            .issues
            .contains(&"Missing current location data".to_string()));
    }

    #[test]
    fn stale_location_is_penalized_less_than_missing() {
        let now = Utc::now();
        let mut fresh = complete_truck();
        let mut stale = complete_truck();
        if let Some(location) = stale.current_location.as_mut() {
            location.timestamp = Some(now - ChronoDuration::days(10));
        }

        let fresh_score = calculate_quality_score_at(&fresh, now).score;
        let stale_assessment = calculate_quality_score_at(&stale, now);
        assert!((fresh_score - stale_assessment.score - 0.10).abs() < 1e-9);
        assert!(stale_assessment
            .issues
            .contains(&"Stale location data".to_string()));

        fresh.current_location.as_mut().unwrap().timestamp = None;
        let no_stamp = calculate_quality_score_at(&fresh, now);
        assert!(no_stamp
            .issues
            .contains(&"Missing location timestamp".to_string()));
    }

    #[test]
    fn issues_follow_evaluation_order() {
        let mut truck = complete_truck();
        truck.description = None;
        truck.contact_info.email = None;
        truck.scheduled_locations.clear();

        let assessment = calculate_quality_score(&truck);
        assert_eq!(
            assessment.issues,
            vec!["Missing description", "Missing email", "Missing schedule data"]
        );
    }

    #[test]
    fn categorization_uses_the_canonical_boundaries() {
        assert_eq!(QualityCategory::from_score(0.85), QualityCategory::High);
        assert_eq!(QualityCategory::from_score(0.8), QualityCategory::High);
        assert_eq!(QualityCategory::from_score(0.7), QualityCategory::Medium);
        assert_eq!(QualityCategory::from_score(0.6), QualityCategory::Medium);
        assert_eq!(QualityCategory::from_score(0.59), QualityCategory::Low);
        assert_eq!(QualityCategory::from_score(0.5), QualityCategory::Low);
    }
}

//! Food truck entities: the extracted candidate and the persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Price band as displayed to diners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceRange {
    #[serde(rename = "$")]
    Budget,
    #[serde(rename = "$$")]
    Moderate,
    #[serde(rename = "$$$")]
    Premium,
    #[serde(rename = "$$$$")]
    Luxury,
}

/// A geographic position with optional address and freshness stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    /// When the position was last observed; drives staleness scoring
    pub timestamp: Option<DateTime<Utc>>,
}

/// A planned stop on the truck's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledStop {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialMedia {
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub twitter: Option<String>,
}

/// Opening hours for one day; absent times with `closed = false` mean unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyHours {
    pub open: Option<String>,
    pub close: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

impl DailyHours {
    pub fn closed() -> Self {
        Self {
            open: None,
            close: None,
            closed: true,
        }
    }
}

/// Weekly operating hours. Days the extractor did not report default to closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub monday: DailyHours,
    pub tuesday: DailyHours,
    pub wednesday: DailyHours,
    pub thursday: DailyHours,
    pub friday: DailyHours,
    pub saturday: DailyHours,
    pub sunday: DailyHours,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            monday: DailyHours::closed(),
            tuesday: DailyHours::closed(),
            wednesday: DailyHours::closed(),
            thursday: DailyHours::closed(),
            friday: DailyHours::closed(),
            saturday: DailyHours::closed(),
            sunday: DailyHours::closed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuItem>,
}

/// Review/verification state of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

/// Normalized candidate entity produced by the Extract stage.
///
/// Immutable once produced; the Persist stage turns it into a [`FoodTruck`]
/// or merges it into an existing one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTruck {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub cuisine_type: Vec<String>,
    pub price_range: Option<PriceRange>,
    pub average_rating: Option<f64>,
    pub review_count: Option<u32>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub social_media: SocialMedia,
    pub current_location: Option<Location>,
    #[serde(default)]
    pub scheduled_locations: Vec<ScheduledStop>,
    pub operating_hours: Option<OperatingHours>,
    #[serde(default)]
    pub menu: Vec<MenuCategory>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

impl ExtractedTruck {
    /// Whether the extracted name is usable. Blank names and the extractor's
    /// "unknown" placeholder are discarded rather than persisted.
    pub fn has_usable_name(&self) -> bool {
        let name = self.name.trim();
        !name.is_empty() && !name.eq_ignore_ascii_case("unknown food truck")
    }
}

/// Persisted food truck record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodTruck {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cuisine_type: Vec<String>,
    pub price_range: Option<PriceRange>,
    pub average_rating: Option<f64>,
    pub review_count: Option<u32>,
    pub contact_info: ContactInfo,
    pub social_media: SocialMedia,
    pub current_location: Option<Location>,
    pub scheduled_locations: Vec<ScheduledStop>,
    pub operating_hours: Option<OperatingHours>,
    pub menu: Vec<MenuCategory>,
    pub specialties: Vec<String>,
    pub verification_status: VerificationStatus,
    pub data_quality_score: f64,
    /// Set semantics; union-merged on dedup
    pub source_urls: Vec<String>,
    pub last_scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FoodTruck {
    /// Build a new record from an extracted candidate. The quality score is
    /// left at zero; the persist stage computes it before writing.
    pub fn from_extracted(extracted: ExtractedTruck, source_url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: extracted.name,
            description: extracted.description,
            cuisine_type: extracted.cuisine_type,
            price_range: extracted.price_range,
            average_rating: extracted.average_rating,
            review_count: extracted.review_count,
            contact_info: extracted.contact_info,
            social_media: extracted.social_media,
            current_location: extracted.current_location,
            scheduled_locations: extracted.scheduled_locations,
            operating_hours: extracted.operating_hours,
            menu: extracted.menu,
            specialties: extracted.specialties,
            verification_status: VerificationStatus::Pending,
            data_quality_score: 0.0,
            source_urls: if source_url.is_empty() {
                Vec::new()
            } else {
                vec![source_url.to_string()]
            },
            last_scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a source URL, preserving set semantics.
    pub fn add_source_url(&mut self, url: &str) {
        if !url.is_empty() && !self.source_urls.iter().any(|u| u == url) {
            self.source_urls.push(url.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_placeholder_names_are_unusable() {
        let mut truck = ExtractedTruck::default();
        assert!(!truck.has_usable_name());

        truck.name = "   ".to_string();
        assert!(!truck.has_usable_name());

        truck.name = "Unknown Food Truck".to_string();
        assert!(!truck.has_usable_name());

        truck.name = "Taco Supreme".to_string();
        assert!(truck.has_usable_name());
    }

    #[test]
    fn from_extracted_starts_pending_with_single_source_url() {
        let extracted = ExtractedTruck {
            name: "Taco Supreme".to_string(),
            ..Default::default()
        };
        let truck = FoodTruck::from_extracted(extracted, "https://example-truck.com");
        assert_eq!(truck.verification_status, VerificationStatus::Pending);
        assert_eq!(truck.source_urls, vec!["https://example-truck.com"]);
    }

    #[test]
    fn add_source_url_is_idempotent() {
        let extracted = ExtractedTruck {
            name: "Taco Supreme".to_string(),
            ..Default::default()
        };
        let mut truck = FoodTruck::from_extracted(extracted, "https://example-truck.com");
        truck.add_source_url("https://example-truck.com");
        truck.add_source_url("https://instagram.com/tacosupreme");
        assert_eq!(truck.source_urls.len(), 2);
    }

    #[test]
    fn price_range_serializes_as_dollar_signs() {
        let json = serde_json::to_string(&PriceRange::Moderate).unwrap();
        assert_eq!(json, "\"$$\"");
    }
}

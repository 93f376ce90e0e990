//! Core data types shared across the pipeline.

pub mod job;
pub mod truck;
pub mod usage;

pub use job::{JobStatus, ScrapingJob};
pub use truck::{
    ContactInfo, DailyHours, ExtractedTruck, FoodTruck, Location, MenuCategory, MenuItem,
    OperatingHours, PriceRange, ScheduledStop, SocialMedia, VerificationStatus,
};
pub use usage::{
    AlertLevel, MetricUsage, ServiceUsage, ServiceUsageSnapshot, UsageAlert, UsageLimits,
};

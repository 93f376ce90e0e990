//! Food truck record endpoints for review dashboards.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use pipeline::{calculate_quality_score, FoodTruck, QualityCategory};

use crate::app::AppState;
use crate::routes::ApiError;

#[derive(Serialize)]
pub struct TruckSummary {
    pub id: Uuid,
    pub name: String,
    pub data_quality_score: f64,
    pub quality_category: &'static str,
    pub verification_status: pipeline::VerificationStatus,
    pub source_urls: Vec<String>,
}

impl From<FoodTruck> for TruckSummary {
    fn from(truck: FoodTruck) -> Self {
        Self {
            id: truck.id,
            name: truck.name,
            data_quality_score: truck.data_quality_score,
            quality_category: QualityCategory::from_score(truck.data_quality_score).label(),
            verification_status: truck.verification_status,
            source_urls: truck.source_urls,
        }
    }
}

/// `GET /trucks` — summaries of every persisted record.
pub async fn list_trucks_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<TruckSummary>>, ApiError> {
    let trucks = state.trucks.list_trucks().await?;
    Ok(Json(trucks.into_iter().map(TruckSummary::from).collect()))
}

/// `GET /trucks/{id}` — full record plus a fresh quality assessment.
#[derive(Serialize)]
pub struct TruckDetailResponse {
    #[serde(flatten)]
    pub truck: FoodTruck,
    pub quality: pipeline::QualityAssessment,
}

pub async fn get_truck_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TruckDetailResponse>, ApiError> {
    let truck = state
        .trucks
        .get_truck(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("truck not found: {id}")))?;

    // Quality is derived fresh, never served from a stale cache.
    let quality = calculate_quality_score(&truck);
    Ok(Json(TruckDetailResponse { truck, quality }))
}

#[derive(Serialize)]
pub struct RescoreResponse {
    pub updated: u64,
}

/// `POST /trucks/rescore` — recompute quality scores across the store.
pub async fn rescore_handler(
    State(state): State<AppState>,
) -> Result<Json<RescoreResponse>, ApiError> {
    let updated = pipeline::rescore_all(state.trucks.as_ref()).await?;
    Ok(Json(RescoreResponse { updated }))
}

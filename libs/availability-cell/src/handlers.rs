use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::AppError;

use crate::models::{AvailabilityEntryRequest, SlotQuery};
use crate::services::AvailabilityService;

#[axum::debug_handler]
pub async fn get_available_slots(
    State(service): State<Arc<AvailabilityService>>,
    Path(therapist_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let listing = service.slot_listing(therapist_id, query.lookahead_days).await?;

    let slots: Vec<_> = listing.days.iter().flat_map(|day| day.slots.iter()).collect();

    Ok(Json(json!({
        "therapist_id": therapist_id,
        "lookahead_days": listing.lookahead_days,
        "total": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(service): State<Arc<AvailabilityService>>,
    Path(therapist_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    service.create_schedule(therapist_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "therapist_id": therapist_id,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_availability(
    State(service): State<Arc<AvailabilityService>>,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let entries = service.get_template(therapist_id).await?;

    Ok(Json(json!({
        "therapist_id": therapist_id,
        "entries": entries,
    })))
}

#[axum::debug_handler]
pub async fn add_availability(
    State(service): State<Arc<AvailabilityService>>,
    Path(therapist_id): Path<Uuid>,
    Json(request): Json<AvailabilityEntryRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let entry = service.add_availability(therapist_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(entry))))
}

#[axum::debug_handler]
pub async fn remove_availability(
    State(service): State<Arc<AvailabilityService>>,
    Path(therapist_id): Path<Uuid>,
    Json(request): Json<AvailabilityEntryRequest>,
) -> Result<Json<Value>, AppError> {
    service.remove_availability(therapist_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Availability entry removed",
    })))
}

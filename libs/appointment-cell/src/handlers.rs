use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::AppError;

use crate::models::{BookAppointmentRequest, CancelAppointmentRequest, RescheduleAppointmentRequest};
use crate::services::BookingCoordinator;

#[axum::debug_handler]
pub async fn book_appointment(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = coordinator.book(request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = coordinator.get_appointment(appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = coordinator.cancel(appointment_id, request.acting_user_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = coordinator.reschedule(appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_client_appointments(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = coordinator.list_for_client(client_id).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_therapist_appointments(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = coordinator.list_for_therapist(therapist_id).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn check_consistency(
    State(coordinator): State<Arc<BookingCoordinator>>,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let report = coordinator.check_consistency(therapist_id).await?;

    Ok(Json(json!(report)))
}

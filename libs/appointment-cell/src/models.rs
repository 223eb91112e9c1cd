use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::{AppError, Modality, SlotKey};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub therapist_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub modality: Modality,
}

impl BookAppointmentRequest {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.therapist_id, self.date, self.time, self.modality)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub acting_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub modality: Modality,
}

// ==============================================================================
// CONSISTENCY MODELS
// ==============================================================================

/// Result of comparing a therapist's reservations with their appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub therapist_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub reservation_count: usize,
    pub active_appointment_count: usize,
    /// Reservations whose owner is missing, cancelled, or booked elsewhere.
    pub orphaned_reservations: Vec<SlotKey>,
    /// Active appointments that do not hold their own reservation.
    pub unreserved_appointments: Vec<Uuid>,
    pub is_consistent: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppointmentError {
    pub fn slot_unavailable() -> Self {
        AppointmentError::Conflict("slot no longer available".to_string())
    }

    pub fn appointment_not_found(appointment_id: Uuid) -> Self {
        AppointmentError::NotFound(format!("Appointment not found: {}", appointment_id))
    }

    pub fn therapist_not_found(therapist_id: Uuid) -> Self {
        AppointmentError::NotFound(format!("Therapist not found: {}", therapist_id))
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::NotFound(msg) => AppError::NotFound(msg),
            AppointmentError::InvalidState(msg) => AppError::InvalidState(msg),
            AppointmentError::Store(e) => AppError::Store(e.to_string()),
        }
    }
}

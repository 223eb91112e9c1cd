use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::{AppError, Modality, RecurringAvailability};

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A bookable opportunity computed on demand. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub therapist_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub modalities: BTreeSet<Modality>,
}

/// Surviving slots of one calendar date, ordered by time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

/// Slots grouped by date, with the lookahead window they were generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotListing {
    pub lookahead_days: u32,
    pub days: Vec<DaySlots>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotQuery {
    pub lookahead_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEntryRequest {
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub modality: Modality,
}

impl AvailabilityEntryRequest {
    pub fn into_entry(self, therapist_id: Uuid) -> RecurringAvailability {
        RecurringAvailability::new(therapist_id, self.day_of_week, self.start_time, self.modality)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Therapist not found: {0}")]
    TherapistNotFound(Uuid),

    #[error("Availability entry not found")]
    EntryNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::TherapistNotFound(_) | AvailabilityError::EntryNotFound => {
                AppError::NotFound(err.to_string())
            }
            AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
            AvailabilityError::Store(e) => AppError::Store(e.to_string()),
        }
    }
}

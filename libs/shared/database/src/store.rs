use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use shared_models::{Appointment, RecurringAvailability, ReservationState, SlotKey};

use crate::supabase::DatabaseError;

/// Unexpected failure of the backing store. Never retried by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Schedule store unavailable: {0}")]
    Unavailable(String),

    #[error("Schedule store returned invalid data: {0}")]
    InvalidData(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Recurring templates and per-date reservation state for every therapist.
///
/// `reserve`, `release` and `transfer` are compare-and-set operations: they report
/// whether they took effect instead of failing, so callers can turn a lost race into
/// a conflict.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Registers an empty schedule. Idempotent.
    async fn create_schedule(&self, therapist_id: Uuid) -> Result<(), StoreError>;

    /// `None` when the therapist has no schedule in this store.
    async fn recurring_availability(
        &self,
        therapist_id: Uuid,
    ) -> Result<Option<Vec<RecurringAvailability>>, StoreError>;

    /// Returns false when the (day, time, modality) triple already exists.
    async fn add_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError>;

    async fn remove_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError>;

    /// Reservations held on dates in `from..=to`.
    async fn reservations(
        &self,
        therapist_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReservationState, StoreError>;

    /// Returns false when the key is already held.
    async fn reserve(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError>;

    /// Returns false unless the key was held by `owner`.
    async fn release(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError>;

    /// Moves `owner`'s reservation from one key to another. Returns false, leaving
    /// `from` untouched, when `to` is already held.
    async fn transfer(&self, from: &SlotKey, to: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        if !self.reserve(to, owner).await? {
            return Ok(false);
        }

        if !self.release(from, owner).await? {
            warn!("Reservation {} was not held by {}, undoing transfer", from, owner);
            self.release(to, owner).await?;
            return Err(StoreError::InvalidData(format!(
                "reservation {} is not held by appointment {}",
                from, owner
            )));
        }

        Ok(true)
    }

    /// Every reservation of the therapist together with the appointment holding it.
    async fn reservation_owners(&self, therapist_id: Uuid) -> Result<Vec<(SlotKey, Uuid)>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn appointments_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    /// Scheduled appointments dated on or before `date`.
    async fn scheduled_on_or_before(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;
}

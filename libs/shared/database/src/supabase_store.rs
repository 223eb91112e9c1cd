use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Appointment, Modality, RecurringAvailability, ReservationState, SlotKey};

use crate::store::{AppointmentStore, ScheduleStore, StoreError};
use crate::supabase::{DatabaseError, SupabaseClient};

const SCHEDULES: &str = "/rest/v1/therapist_schedules";
const AVAILABILITY: &str = "/rest/v1/recurring_availability";
const RESERVATIONS: &str = "/rest/v1/slot_reservations";
const APPOINTMENTS: &str = "/rest/v1/appointments";

/// Row of `slot_reservations`. The table carries a unique constraint on
/// (therapist_id, slot_date, slot_time, modality), which is what makes `reserve` a
/// compare-and-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReservationRow {
    therapist_id: Uuid,
    slot_date: NaiveDate,
    slot_time: NaiveTime,
    modality: Modality,
    appointment_id: Uuid,
}

impl ReservationRow {
    fn new(key: &SlotKey, owner: Uuid) -> Self {
        Self {
            therapist_id: key.therapist_id,
            slot_date: key.date,
            slot_time: key.time,
            modality: key.modality,
            appointment_id: owner,
        }
    }

    fn key(&self) -> SlotKey {
        SlotKey::new(self.therapist_id, self.slot_date, self.slot_time, self.modality)
    }
}

/// Schedule and appointment store backed by Supabase's PostgREST API.
pub struct SupabaseStore {
    supabase: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn slot_filter(key: &SlotKey) -> String {
        format!(
            "therapist_id=eq.{}&slot_date=eq.{}&slot_time=eq.{}&modality=eq.{}",
            key.therapist_id,
            key.date,
            key.time.format("%H:%M:%S"),
            key.modality
        )
    }

    fn entry_filter(entry: &RecurringAvailability) -> String {
        format!(
            "therapist_id=eq.{}&day_of_week=eq.{}&start_time=eq.{}&modality=eq.{}",
            entry.therapist_id,
            entry.day_of_week,
            entry.start_time.format("%H:%M:%S"),
            entry.modality
        )
    }

    async fn fetch<T>(&self, path: &str) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, None).await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(StoreError::from)
    }

    /// Runs a write that returns the affected rows. A unique-constraint violation
    /// comes back as `Ok(None)`.
    async fn write_rows(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Vec<Value>>, StoreError> {
        match self
            .supabase
            .request_with_headers::<Vec<Value>>(method, path, body, Some(SupabaseClient::representation_headers()))
            .await
        {
            Ok(rows) => Ok(Some(rows)),
            Err(DatabaseError::Conflict(detail)) => {
                debug!("Write to {} rejected by unique constraint: {}", path, detail);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ScheduleStore for SupabaseStore {
    async fn create_schedule(&self, therapist_id: Uuid) -> Result<(), StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=ignore-duplicates,return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                SCHEDULES,
                Some(json!({ "therapist_id": therapist_id })),
                Some(headers),
            )
            .await?;

        Ok(())
    }

    async fn recurring_availability(
        &self,
        therapist_id: Uuid,
    ) -> Result<Option<Vec<RecurringAvailability>>, StoreError> {
        let schedule: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("{}?therapist_id=eq.{}&select=therapist_id", SCHEDULES, therapist_id),
                None,
            )
            .await?;

        if schedule.is_empty() {
            return Ok(None);
        }

        let entries = self
            .fetch(&format!(
                "{}?therapist_id=eq.{}&order=day_of_week.asc,start_time.asc,modality.asc",
                AVAILABILITY, therapist_id
            ))
            .await?;

        Ok(Some(entries))
    }

    async fn add_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError> {
        let inserted = self
            .write_rows(Method::POST, AVAILABILITY, Some(serde_json::to_value(entry)?))
            .await?;

        Ok(inserted.is_some())
    }

    async fn remove_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError> {
        let path = format!("{}?{}", AVAILABILITY, Self::entry_filter(entry));
        let removed = self.write_rows(Method::DELETE, &path, None).await?;

        Ok(removed.is_some_and(|rows| !rows.is_empty()))
    }

    async fn reservations(
        &self,
        therapist_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReservationState, StoreError> {
        let rows: Vec<ReservationRow> = self
            .fetch(&format!(
                "{}?therapist_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}",
                RESERVATIONS, therapist_id, from, to
            ))
            .await?;

        Ok(rows.iter().map(ReservationRow::key).collect())
    }

    async fn reserve(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        let body = serde_json::to_value(ReservationRow::new(key, owner))?;
        let inserted = self.write_rows(Method::POST, RESERVATIONS, Some(body)).await?;

        Ok(inserted.is_some())
    }

    async fn release(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        let path = format!("{}?{}&appointment_id=eq.{}", RESERVATIONS, Self::slot_filter(key), owner);
        let removed = self.write_rows(Method::DELETE, &path, None).await?;

        Ok(removed.is_some_and(|rows| !rows.is_empty()))
    }

    async fn transfer(&self, from: &SlotKey, to: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        // Single-row PATCH: the unique constraint rejects it if `to` is held.
        let path = format!("{}?{}&appointment_id=eq.{}", RESERVATIONS, Self::slot_filter(from), owner);
        let body = json!({
            "slot_date": to.date,
            "slot_time": to.time.format("%H:%M:%S").to_string(),
            "modality": to.modality,
        });

        match self.write_rows(Method::PATCH, &path, Some(body)).await? {
            None => Ok(false),
            Some(rows) if rows.is_empty() => {
                warn!("Transfer found no reservation {} held by {}", from, owner);
                Err(StoreError::InvalidData(format!(
                    "reservation {} is not held by appointment {}",
                    from, owner
                )))
            }
            Some(_) => Ok(true),
        }
    }

    async fn reservation_owners(&self, therapist_id: Uuid) -> Result<Vec<(SlotKey, Uuid)>, StoreError> {
        let rows: Vec<ReservationRow> = self
            .fetch(&format!("{}?therapist_id=eq.{}", RESERVATIONS, therapist_id))
            .await?;

        let mut owners: Vec<(SlotKey, Uuid)> = rows.iter().map(|row| (row.key(), row.appointment_id)).collect();
        owners.sort();
        Ok(owners)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseStore {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                APPOINTMENTS,
                Some(serde_json::to_value(appointment)?),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::InvalidData(format!("appointment {} was not created", appointment.id)));
        }

        Ok(())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let mut rows: Vec<Appointment> = self
            .fetch(&format!("{}?id=eq.{}", APPOINTMENTS, appointment_id))
            .await?;

        Ok(rows.pop())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("{}?id=eq.{}", APPOINTMENTS, appointment.id),
                Some(serde_json::to_value(appointment)?),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::InvalidData(format!("appointment {} does not exist", appointment.id)));
        }

        Ok(())
    }

    async fn appointments_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(&format!(
            "{}?therapist_id=eq.{}&order=date.asc,time.asc",
            APPOINTMENTS, therapist_id
        ))
        .await
    }

    async fn appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(&format!("{}?client_id=eq.{}&order=date.asc,time.asc", APPOINTMENTS, client_id))
            .await
    }

    async fn scheduled_on_or_before(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(&format!(
            "{}?status=eq.scheduled&date=lte.{}&order=date.asc,time.asc",
            APPOINTMENTS, date
        ))
        .await
    }
}

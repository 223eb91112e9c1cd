use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, RecurringAvailability, ReservationState, SlotKey};

use crate::store::{AppointmentStore, ScheduleStore, StoreError};

#[derive(Default)]
struct StoreData {
    schedules: HashMap<Uuid, BTreeSet<RecurringAvailability>>,
    reservations: HashMap<SlotKey, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

/// Process-local store. Each operation runs under a single lock, so every call is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreData>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreData>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn create_schedule(&self, therapist_id: Uuid) -> Result<(), StoreError> {
        self.write()?.schedules.entry(therapist_id).or_default();
        Ok(())
    }

    async fn recurring_availability(
        &self,
        therapist_id: Uuid,
    ) -> Result<Option<Vec<RecurringAvailability>>, StoreError> {
        Ok(self
            .read()?
            .schedules
            .get(&therapist_id)
            .map(|entries| entries.iter().cloned().collect()))
    }

    async fn add_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError> {
        let mut data = self.write()?;
        let entries = data.schedules.get_mut(&entry.therapist_id).ok_or_else(|| {
            StoreError::InvalidData(format!("no schedule for therapist {}", entry.therapist_id))
        })?;

        Ok(entries.insert(entry.clone()))
    }

    async fn remove_availability(&self, entry: &RecurringAvailability) -> Result<bool, StoreError> {
        Ok(self
            .write()?
            .schedules
            .get_mut(&entry.therapist_id)
            .is_some_and(|entries| entries.remove(entry)))
    }

    async fn reservations(
        &self,
        therapist_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReservationState, StoreError> {
        let data = self.read()?;

        Ok(data
            .reservations
            .keys()
            .filter(|key| key.therapist_id == therapist_id && key.date >= from && key.date <= to)
            .copied()
            .collect())
    }

    async fn reserve(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        let mut data = self.write()?;

        if data.reservations.contains_key(key) {
            debug!("Reservation {} already held", key);
            return Ok(false);
        }

        data.reservations.insert(*key, owner);
        Ok(true)
    }

    async fn release(&self, key: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        let mut data = self.write()?;

        match data.reservations.get(key) {
            Some(holder) if *holder == owner => {
                data.reservations.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transfer(&self, from: &SlotKey, to: &SlotKey, owner: Uuid) -> Result<bool, StoreError> {
        let mut data = self.write()?;

        if data.reservations.get(from) != Some(&owner) {
            return Err(StoreError::InvalidData(format!(
                "reservation {} is not held by appointment {}",
                from, owner
            )));
        }

        if data.reservations.contains_key(to) {
            return Ok(false);
        }

        data.reservations.remove(from);
        data.reservations.insert(*to, owner);
        Ok(true)
    }

    async fn reservation_owners(&self, therapist_id: Uuid) -> Result<Vec<(SlotKey, Uuid)>, StoreError> {
        let mut owners: Vec<(SlotKey, Uuid)> = self
            .read()?
            .reservations
            .iter()
            .filter(|(key, _)| key.therapist_id == therapist_id)
            .map(|(key, owner)| (*key, *owner))
            .collect();

        owners.sort();
        Ok(owners)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut data = self.write()?;

        if data.appointments.contains_key(&appointment.id) {
            return Err(StoreError::InvalidData(format!("appointment {} already exists", appointment.id)));
        }

        data.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.read()?.appointments.get(&appointment_id).cloned())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut data = self.write()?;

        match data.appointments.get_mut(&appointment.id) {
            Some(existing) => {
                *existing = appointment.clone();
                Ok(())
            }
            None => Err(StoreError::InvalidData(format!("appointment {} does not exist", appointment.id))),
        }
    }

    async fn appointments_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let data = self.read()?;
        Ok(sorted(data.appointments.values().filter(|a| a.therapist_id == therapist_id)))
    }

    async fn appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let data = self.read()?;
        Ok(sorted(data.appointments.values().filter(|a| a.client_id == client_id)))
    }

    async fn scheduled_on_or_before(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let data = self.read()?;
        Ok(sorted(
            data.appointments
                .values()
                .filter(|a| a.status == AppointmentStatus::Scheduled && a.date <= date),
        ))
    }
}

fn sorted<'a>(appointments: impl Iterator<Item = &'a Appointment>) -> Vec<Appointment> {
    let mut result: Vec<Appointment> = appointments.cloned().collect();
    result.sort_by(|a, b| (a.date, a.time, a.created_at).cmp(&(b.date, b.time, b.created_at)));
    result
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_database::{AppointmentStore, ScheduleStore};
use shared_models::{Appointment, SlotKey};

use crate::models::{AppointmentError, ConsistencyReport};

/// Cross-checks the reservation table against appointment records.
///
/// Every active appointment must hold the reservation for its own key, and every
/// reservation must belong to exactly one such appointment.
pub struct SchedulingConsistencyService {
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl SchedulingConsistencyService {
    pub fn new(schedules: Arc<dyn ScheduleStore>, appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { schedules, appointments }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, therapist_id: Uuid, now: DateTime<Utc>) -> Result<ConsistencyReport, AppointmentError> {
        if self.schedules.recurring_availability(therapist_id).await?.is_none() {
            return Err(AppointmentError::therapist_not_found(therapist_id));
        }

        let owners = self.schedules.reservation_owners(therapist_id).await?;
        let appointments = self.appointments.appointments_for_therapist(therapist_id).await?;

        let report = build_report(therapist_id, now, &owners, &appointments);

        if report.is_consistent {
            info!("Therapist {} schedule is consistent ({} reservations)", therapist_id, report.reservation_count);
        } else {
            warn!(
                "Therapist {} schedule is inconsistent: {} orphaned reservations, {} unreserved appointments",
                therapist_id,
                report.orphaned_reservations.len(),
                report.unreserved_appointments.len()
            );
        }

        Ok(report)
    }
}

fn build_report(
    therapist_id: Uuid,
    now: DateTime<Utc>,
    owners: &[(SlotKey, Uuid)],
    appointments: &[Appointment],
) -> ConsistencyReport {
    let active: HashMap<Uuid, SlotKey> = appointments
        .iter()
        .filter(|appointment| appointment.holds_reservation())
        .map(|appointment| (appointment.id, appointment.slot_key()))
        .collect();

    let held: HashSet<(SlotKey, Uuid)> = owners.iter().copied().collect();

    let orphaned_reservations: Vec<SlotKey> = owners
        .iter()
        .filter(|(key, owner)| active.get(owner) != Some(key))
        .map(|(key, _)| *key)
        .collect();

    let mut unreserved_appointments: Vec<Uuid> = active
        .iter()
        .filter(|(id, key)| !held.contains(&(**key, **id)))
        .map(|(id, _)| *id)
        .collect();
    unreserved_appointments.sort();

    ConsistencyReport {
        therapist_id,
        checked_at: now,
        reservation_count: owners.len(),
        active_appointment_count: active.len(),
        is_consistent: orphaned_reservations.is_empty() && unreserved_appointments.is_empty(),
        orphaned_reservations,
        unreserved_appointments,
    }
}

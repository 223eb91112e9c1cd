use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::{AppointmentStore, ScheduleStore};
use shared_models::{local_instant, Appointment, AppointmentStatus, Modality, SlotKey};
use shared_utils::Clock;

use crate::models::{
    AppointmentError, BookAppointmentRequest, ConsistencyReport, RescheduleAppointmentRequest,
};
use crate::services::consistency::SchedulingConsistencyService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locking::{lock_key, LockKey, SlotGuard, SlotLockManager};

/// How often a mutation re-locks when its appointment moves while it waits.
const MAX_RELOCK_ATTEMPTS: u32 = 3;

/// Sole writer of reservations and appointments.
///
/// Every mutation runs under the slot locks of the keys it touches and re-reads the
/// store once the locks are held. Reservations are compare-and-set in the store as
/// well, so a second process sharing the store still cannot double-book.
pub struct BookingCoordinator {
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
    locks: SlotLockManager,
    lifecycle: AppointmentLifecycleService,
    consistency: SchedulingConsistencyService,
}

impl BookingCoordinator {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
        rules: SchedulingRules,
    ) -> Self {
        let consistency = SchedulingConsistencyService::new(schedules.clone(), appointments.clone());
        let rules = rules.sanitized();

        Self {
            locks: SlotLockManager::new(rules.lock_timeout()),
            lifecycle: AppointmentLifecycleService::new(),
            consistency,
            schedules,
            appointments,
            clock,
            rules,
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    pub fn slot_locks(&self) -> &SlotLockManager {
        &self.locks
    }

    // ==========================================================================
    // COMMANDS
    // ==========================================================================

    #[instrument(skip(self, request), fields(therapist_id = %request.therapist_id, client_id = %request.client_id))]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        let key = request.slot_key();

        self.validate_target(&key, now).await?;

        let _guard = self.locks.acquire(&[lock_key(&key)]).await?;

        // The caller's slot list may be stale.
        if self.is_reserved(&key).await? {
            debug!("Slot {} was taken before the lock was acquired", key);
            return Err(AppointmentError::slot_unavailable());
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            therapist_id: request.therapist_id,
            client_id: request.client_id,
            date: request.date,
            time: request.time,
            modality: request.modality,
            status: AppointmentStatus::Scheduled,
            cancelled_by: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        if !self.schedules.reserve(&key, appointment.id).await? {
            warn!("Store rejected reservation of {}", key);
            return Err(AppointmentError::slot_unavailable());
        }

        if let Err(e) = self.appointments.insert_appointment(&appointment).await {
            error!("Failed to record appointment {}: {}", appointment.id, e);
            self.undo_reserve(&key, appointment.id).await;
            return Err(e.into());
        }

        info!("Booked appointment {} at {}", appointment.id, key);
        Ok(appointment)
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: Uuid, acting_user_id: Uuid) -> Result<Appointment, AppointmentError> {
        let (mut appointment, _guard) = self.lock_appointment(appointment_id, None).await?;

        self.lifecycle
            .validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let key = appointment.slot_key();
        let released = self.schedules.release(&key, appointment.id).await?;
        if !released {
            warn!("Appointment {} held no reservation at {}", appointment.id, key);
        }

        let now = self.clock.now();
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancelled_by = Some(acting_user_id);
        appointment.cancelled_at = Some(now);
        appointment.updated_at = now;

        if let Err(e) = self.appointments.update_appointment(&appointment).await {
            error!("Failed to record cancellation of {}: {}", appointment.id, e);
            if released {
                self.undo_release(&key, appointment.id).await;
            }
            return Err(e.into());
        }

        info!("Cancelled appointment {} (by {})", appointment.id, acting_user_id);
        Ok(appointment)
    }

    /// Moves a scheduled appointment to another slot in one step. On any failure the
    /// appointment keeps its original reservation.
    #[instrument(skip(self, request), fields(date = %request.date, time = %request.time, modality = %request.modality))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        let current = self.fetch(appointment_id).await?;

        self.lifecycle
            .validate_transition(current.status, AppointmentStatus::Scheduled)?;

        let target = SlotKey::new(current.therapist_id, request.date, request.time, request.modality);
        if target == current.slot_key() {
            return Err(AppointmentError::Validation(format!(
                "appointment {} is already booked for that slot",
                appointment_id
            )));
        }

        self.validate_target(&target, now).await?;

        let (mut appointment, _guard) = self.lock_appointment(appointment_id, Some(lock_key(&target))).await?;

        self.lifecycle
            .validate_transition(appointment.status, AppointmentStatus::Scheduled)?;

        let source = appointment.slot_key();
        if source == target {
            return Err(AppointmentError::Validation(format!(
                "appointment {} is already booked for that slot",
                appointment_id
            )));
        }

        if self.is_reserved(&target).await? {
            debug!("Target slot {} was taken before the lock was acquired", target);
            return Err(AppointmentError::slot_unavailable());
        }

        if !self.schedules.transfer(&source, &target, appointment.id).await? {
            warn!("Store rejected transfer of {} to {}", source, target);
            return Err(AppointmentError::slot_unavailable());
        }

        appointment.date = target.date;
        appointment.time = target.time;
        appointment.modality = target.modality;
        appointment.updated_at = self.clock.now();

        if let Err(e) = self.appointments.update_appointment(&appointment).await {
            error!("Failed to record reschedule of {}: {}", appointment.id, e);
            self.undo_transfer(&target, &source, appointment.id).await;
            return Err(e.into());
        }

        info!("Rescheduled appointment {} from {} to {}", appointment.id, source, target);
        Ok(appointment)
    }

    /// Marks every scheduled appointment whose session ended by `now` as completed.
    /// Completed appointments keep their reservation.
    #[instrument(skip(self))]
    pub async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        let session_length = self.rules.session_length();
        let utc_offset = self.rules.utc_offset();
        let today = now.with_timezone(&utc_offset).date_naive();

        let candidates = self.appointments.scheduled_on_or_before(today).await?;
        let mut completed = Vec::new();

        for candidate in candidates {
            if !self
                .lifecycle
                .should_complete(&candidate, session_length, utc_offset, now)
            {
                continue;
            }

            let (mut appointment, _guard) = match self.lock_appointment(candidate.id, None).await {
                Ok(locked) => locked,
                Err(AppointmentError::Conflict(msg)) => {
                    debug!("Skipping appointment {} this sweep: {}", candidate.id, msg);
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Re-check under the lock: it may have been cancelled or moved.
            if !self
                .lifecycle
                .should_complete(&appointment, session_length, utc_offset, now)
            {
                continue;
            }

            self.lifecycle
                .validate_transition(appointment.status, AppointmentStatus::Completed)?;

            appointment.status = AppointmentStatus::Completed;
            appointment.updated_at = now;
            self.appointments.update_appointment(&appointment).await?;

            debug!("Appointment {} completed", appointment.id);
            completed.push(appointment);
        }

        if !completed.is_empty() {
            info!("Marked {} appointment(s) as completed", completed.len());
        }

        Ok(completed)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.fetch(appointment_id).await
    }

    pub async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.appointments.appointments_for_client(client_id).await?)
    }

    pub async fn list_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        if self.schedules.recurring_availability(therapist_id).await?.is_none() {
            return Err(AppointmentError::therapist_not_found(therapist_id));
        }

        Ok(self.appointments.appointments_for_therapist(therapist_id).await?)
    }

    pub async fn check_consistency(&self, therapist_id: Uuid) -> Result<ConsistencyReport, AppointmentError> {
        self.consistency.check(therapist_id, self.clock.now()).await
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn fetch(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::appointment_not_found(appointment_id))
    }

    async fn is_reserved(&self, key: &SlotKey) -> Result<bool, AppointmentError> {
        let state = self.schedules.reservations(key.therapist_id, key.date, key.date).await?;
        Ok(state.is_reserved(key.date, key.time, key.modality))
    }

    /// Locks the appointment's current slot (plus `extra`) and returns the appointment as
    /// read under those locks. Re-locks if it was moved by a concurrent reschedule.
    async fn lock_appointment(
        &self,
        appointment_id: Uuid,
        extra: Option<LockKey>,
    ) -> Result<(Appointment, SlotGuard), AppointmentError> {
        let mut current = self.fetch(appointment_id).await?;

        for attempt in 1..=MAX_RELOCK_ATTEMPTS {
            let mut keys = vec![lock_key(&current.slot_key())];
            keys.extend(extra);

            let guard = self.locks.acquire(&keys).await?;
            let fresh = self.fetch(appointment_id).await?;

            if lock_key(&fresh.slot_key()) == lock_key(&current.slot_key()) {
                return Ok((fresh, guard));
            }

            debug!(
                "Appointment {} moved while waiting for its lock (attempt {}/{})",
                appointment_id, attempt, MAX_RELOCK_ATTEMPTS
            );
            current = fresh;
        }

        Err(AppointmentError::Conflict(format!(
            "appointment {} is being modified concurrently, please retry",
            appointment_id
        )))
    }

    /// Checks a target slot against policy and the therapist's template.
    async fn validate_target(&self, key: &SlotKey, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        let template = self
            .schedules
            .recurring_availability(key.therapist_id)
            .await?
            .ok_or_else(|| AppointmentError::therapist_not_found(key.therapist_id))?;

        let utc_offset = self.rules.utc_offset();
        let starts_at = local_instant(key.date, key.time, utc_offset).ok_or_else(|| {
            AppointmentError::Validation(format!("{} {} is not a valid local time", key.date, key.time))
        })?;

        if starts_at < now + self.rules.min_lead() {
            return Err(AppointmentError::Validation(format!(
                "appointments must start at least {} minutes from now",
                self.rules.min_lead_minutes
            )));
        }

        let today = now.with_timezone(&utc_offset).date_naive();
        if let Some(latest) = latest_bookable_date(today, self.rules.max_advance_booking_days) {
            if key.date > latest {
                return Err(AppointmentError::Validation(format!(
                    "appointments cannot be booked more than {} days in advance",
                    self.rules.max_advance_booking_days
                )));
            }
        }

        if !template
            .iter()
            .any(|entry| entry.offers(key.date, key.time, key.modality))
        {
            return Err(not_offered(key.date, key.time, key.modality));
        }

        Ok(())
    }

    async fn undo_reserve(&self, key: &SlotKey, owner: Uuid) {
        match self.schedules.release(key, owner).await {
            Ok(true) => debug!("Released reservation {} after failed booking", key),
            Ok(false) => warn!("Reservation {} was already gone during rollback", key),
            Err(e) => error!("Could not release reservation {} during rollback: {}", key, e),
        }
    }

    async fn undo_release(&self, key: &SlotKey, owner: Uuid) {
        match self.schedules.reserve(key, owner).await {
            Ok(true) => debug!("Restored reservation {} after failed cancellation", key),
            Ok(false) => warn!("Reservation {} was taken during rollback", key),
            Err(e) => error!("Could not restore reservation {} during rollback: {}", key, e),
        }
    }

    async fn undo_transfer(&self, from: &SlotKey, to: &SlotKey, owner: Uuid) {
        match self.schedules.transfer(from, to, owner).await {
            Ok(true) => debug!("Moved reservation back to {} after failed reschedule", to),
            Ok(false) => warn!("Original reservation {} was taken during rollback", to),
            Err(e) => error!("Could not move reservation back to {} during rollback: {}", to, e),
        }
    }
}

fn latest_bookable_date(today: NaiveDate, max_advance_days: i64) -> Option<NaiveDate> {
    let days = u64::try_from(max_advance_days).ok()?;
    today.checked_add_days(Days::new(days))
}

fn not_offered(date: NaiveDate, time: NaiveTime, modality: Modality) -> AppointmentError {
    AppointmentError::Validation(format!(
        "therapist does not offer {} sessions on {} at {}",
        modality,
        date.format("%A %Y-%m-%d"),
        time.format("%H:%M")
    ))
}

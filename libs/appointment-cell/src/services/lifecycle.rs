use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, warn};

use shared_models::{local_instant, Appointment, AppointmentStatus};

use crate::models::AppointmentError;

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState(format!(
                "appointment is {} and cannot become {}",
                current_status, new_status
            )));
        }

        Ok(())
    }

    /// Statuses reachable from `current_status`. Scheduled -> Scheduled is a reschedule.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// When the session ends, at the practice's offset.
    pub fn session_end(
        &self,
        appointment: &Appointment,
        session_length: Duration,
        utc_offset: FixedOffset,
    ) -> Option<DateTime<Utc>> {
        local_instant(appointment.date, appointment.time, utc_offset).map(|start| start + session_length)
    }

    /// A scheduled appointment completes once its session is over.
    pub fn should_complete(
        &self,
        appointment: &Appointment,
        session_length: Duration,
        utc_offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> bool {
        appointment.status == AppointmentStatus::Scheduled
            && self
                .session_end(appointment, session_length, utc_offset)
                .is_some_and(|end| end <= now)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

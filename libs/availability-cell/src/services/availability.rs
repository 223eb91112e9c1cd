use std::sync::Arc;

use chrono::{DateTime, Days, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::ScheduleStore;
use shared_models::RecurringAvailability;
use shared_utils::Clock;

use crate::models::{AvailabilityEntryRequest, AvailabilityError, DaySlots, SlotListing};
use crate::services::slots::{generate_slots, SlotWindow};

/// Read side of the schedule: slot generation plus management of the weekly template.
/// Never touches reservations.
pub struct AvailabilityService {
    store: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn ScheduleStore>, clock: Arc<dyn Clock>, rules: SchedulingRules) -> Self {
        Self {
            store,
            clock,
            rules: rules.sanitized(),
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Open slots for the coming days, using the configured lead time and the
    /// default window when `lookahead_days` is not given.
    pub async fn available_slots(
        &self,
        therapist_id: Uuid,
        lookahead_days: Option<u32>,
    ) -> Result<Vec<DaySlots>, AvailabilityError> {
        Ok(self.slot_listing(therapist_id, lookahead_days).await?.days)
    }

    /// Same as `available_slots`, along with the window that was applied.
    pub async fn slot_listing(
        &self,
        therapist_id: Uuid,
        lookahead_days: Option<u32>,
    ) -> Result<SlotListing, AvailabilityError> {
        let lookahead_days = lookahead_days.unwrap_or(self.rules.default_lookahead_days);

        if lookahead_days > self.rules.max_lookahead_days {
            return Err(AvailabilityError::Validation(format!(
                "lookahead_days cannot exceed {}",
                self.rules.max_lookahead_days
            )));
        }

        let days = self
            .generate_slots(therapist_id, self.clock.now(), lookahead_days, self.rules.min_lead())
            .await?;

        Ok(SlotListing { lookahead_days, days })
    }

    /// Computes slots from a snapshot of the therapist's template and reservations.
    pub async fn generate_slots(
        &self,
        therapist_id: Uuid,
        now: DateTime<Utc>,
        lookahead_days: u32,
        min_lead: Duration,
    ) -> Result<Vec<DaySlots>, AvailabilityError> {
        if lookahead_days == 0 {
            return Err(AvailabilityError::Validation("lookahead_days must be positive".to_string()));
        }

        if min_lead < Duration::zero() {
            return Err(AvailabilityError::Validation("minimum lead time cannot be negative".to_string()));
        }

        debug!("Generating {} days of slots for therapist {}", lookahead_days, therapist_id);

        let template = self
            .store
            .recurring_availability(therapist_id)
            .await?
            .ok_or(AvailabilityError::TherapistNotFound(therapist_id))?;

        if template.is_empty() {
            return Ok(vec![]);
        }

        let window = SlotWindow {
            lookahead_days,
            min_lead,
            utc_offset: self.rules.utc_offset(),
        };

        let first_day = now.with_timezone(&window.utc_offset).date_naive();
        let last_day = first_day
            .checked_add_days(Days::new(u64::from(lookahead_days - 1)))
            .unwrap_or(first_day);

        let reserved = self.store.reservations(therapist_id, first_day, last_day).await?;

        let days = generate_slots(therapist_id, &template, &reserved, now, &window);

        debug!(
            "Therapist {} has {} open slots over {} days",
            therapist_id,
            days.iter().map(|day| day.slots.len()).sum::<usize>(),
            days.len()
        );

        Ok(days)
    }

    pub async fn create_schedule(&self, therapist_id: Uuid) -> Result<(), AvailabilityError> {
        self.store.create_schedule(therapist_id).await?;
        info!("Schedule ready for therapist {}", therapist_id);
        Ok(())
    }

    pub async fn get_template(&self, therapist_id: Uuid) -> Result<Vec<RecurringAvailability>, AvailabilityError> {
        let mut entries = self
            .store
            .recurring_availability(therapist_id)
            .await?
            .ok_or(AvailabilityError::TherapistNotFound(therapist_id))?;

        entries.sort();
        Ok(entries)
    }

    pub async fn add_availability(
        &self,
        therapist_id: Uuid,
        request: AvailabilityEntryRequest,
    ) -> Result<RecurringAvailability, AvailabilityError> {
        // Validate day of week (0-6)
        if request.day_of_week > 6 {
            return Err(AvailabilityError::Validation(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        let entry = request.into_entry(therapist_id);

        // Unknown therapist is NotFound
        self.get_template(therapist_id).await?;

        if !self.store.add_availability(&entry).await? {
            return Err(AvailabilityError::Validation(format!(
                "therapist already offers {} at {} on day {}",
                entry.modality,
                entry.start_time.format("%H:%M"),
                entry.day_of_week
            )));
        }

        info!(
            "Therapist {} now offers {} on day {} at {}",
            therapist_id, entry.modality, entry.day_of_week, entry.start_time
        );
        Ok(entry)
    }

    pub async fn remove_availability(
        &self,
        therapist_id: Uuid,
        request: AvailabilityEntryRequest,
    ) -> Result<(), AvailabilityError> {
        let entry = request.into_entry(therapist_id);

        self.get_template(therapist_id).await?;

        if !self.store.remove_availability(&entry).await? {
            return Err(AvailabilityError::EntryNotFound);
        }

        info!(
            "Therapist {} no longer offers {} on day {} at {}",
            therapist_id, entry.modality, entry.day_of_week, entry.start_time
        );
        Ok(())
    }
}

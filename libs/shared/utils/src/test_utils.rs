use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::{InMemoryStore, ScheduleStore};
use shared_models::{Modality, RecurringAvailability};

use crate::clock::FixedClock;

pub const SUNDAY: u8 = 0;
pub const MONDAY: u8 = 1;
pub const TUESDAY: u8 = 2;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid test time")
}

/// Monday 2026-10-19, the anchor day for fixtures.
pub fn reference_monday() -> NaiveDate {
    date(2026, 10, 19)
}

/// 08:00 UTC on the reference Monday.
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

pub fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    day.and_time(time(hour, minute)).and_utc()
}

pub fn test_rules() -> SchedulingRules {
    SchedulingRules::default()
}

/// A therapist with an empty schedule in a fresh in-memory store, and a clock
/// pinned to `reference_now()`.
pub struct TestSchedule {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub therapist_id: Uuid,
}

impl TestSchedule {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let therapist_id = Uuid::new_v4();

        store
            .create_schedule(therapist_id)
            .await
            .expect("in-memory store accepts schedules");

        Self {
            store,
            clock: Arc::new(FixedClock::new(reference_now())),
            therapist_id,
        }
    }

    pub async fn offer(&self, day_of_week: u8, hour: u32, minute: u32, modality: Modality) -> &Self {
        let entry = RecurringAvailability::new(self.therapist_id, day_of_week, time(hour, minute), modality);
        self.store
            .add_availability(&entry)
            .await
            .expect("in-memory store accepts availability");
        self
    }

    pub async fn offer_both(&self, day_of_week: u8, hour: u32, minute: u32) -> &Self {
        for modality in Modality::ALL {
            self.offer(day_of_week, hour, minute, modality).await;
        }
        self
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// MODALITY
// ==============================================================================

/// Delivery mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Online,
    InPerson,
}

impl Modality {
    pub const ALL: [Modality; 2] = [Modality::Online, Modality::InPerson];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Online => "online",
            Modality::InPerson => "in_person",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "online" => Ok(Modality::Online),
            "in_person" => Ok(Modality::InPerson),
            other => Err(format!("Invalid modality: '{}'. Must be one of: online, in_person", other)),
        }
    }
}

/// Day-of-week index used by recurring templates: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// The UTC instant of a wall-clock date and time at the practice's offset.
pub fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|local| local.with_timezone(&Utc))
}

// ==============================================================================
// RECURRING AVAILABILITY
// ==============================================================================

/// One weekly recurring entry of a therapist's template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecurringAvailability {
    pub therapist_id: Uuid,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub modality: Modality,
}

impl RecurringAvailability {
    pub fn new(therapist_id: Uuid, day_of_week: u8, start_time: NaiveTime, modality: Modality) -> Self {
        Self { therapist_id, day_of_week, start_time, modality }
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.day_of_week == day_of_week(date)
    }

    pub fn offers(&self, date: NaiveDate, time: NaiveTime, modality: Modality) -> bool {
        self.applies_to(date) && self.start_time == time && self.modality == modality
    }
}

// ==============================================================================
// RESERVATIONS
// ==============================================================================

/// Identity of one reservable unit: therapist, calendar date, time-of-day and modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub therapist_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub modality: Modality,
}

impl SlotKey {
    pub fn new(therapist_id: Uuid, date: NaiveDate, time: NaiveTime, modality: Modality) -> Self {
        Self { therapist_id, date, time, modality }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}T{}/{}", self.therapist_id, self.date, self.time.format("%H:%M"), self.modality)
    }
}

/// Snapshot of reserved (date, time, modality) triples for one therapist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationState {
    days: BTreeMap<NaiveDate, BTreeMap<NaiveTime, BTreeSet<Modality>>>,
}

impl ReservationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_reserved(&mut self, date: NaiveDate, time: NaiveTime, modality: Modality) {
        self.days
            .entry(date)
            .or_default()
            .entry(time)
            .or_default()
            .insert(modality);
    }

    pub fn is_reserved(&self, date: NaiveDate, time: NaiveTime, modality: Modality) -> bool {
        self.days
            .get(&date)
            .and_then(|times| times.get(&time))
            .is_some_and(|modalities| modalities.contains(&modality))
    }

    pub fn reserved_modalities(&self, date: NaiveDate, time: NaiveTime) -> Option<&BTreeSet<Modality>> {
        self.days.get(&date).and_then(|times| times.get(&time))
    }

    pub fn len(&self) -> usize {
        self.days
            .values()
            .flat_map(|times| times.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<SlotKey> for ReservationState {
    fn from_iter<I: IntoIterator<Item = SlotKey>>(iter: I) -> Self {
        let mut state = ReservationState::new();
        for key in iter {
            state.mark_reserved(key.date, key.time, key.modality);
        }
        state
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub modality: Modality,
    pub status: AppointmentStatus,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.therapist_id, self.date, self.time, self.modality)
    }

    /// Active appointments hold their reservation; only cancellation gives it back.
    pub fn holds_reservation(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

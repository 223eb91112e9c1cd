use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveTime, Utc};
use uuid::Uuid;

use shared_models::{local_instant, Modality, RecurringAvailability, ReservationState};

use crate::models::{DaySlots, Slot};

/// Bounds of one slot computation.
#[derive(Debug, Clone, Copy)]
pub struct SlotWindow {
    pub lookahead_days: u32,
    pub min_lead: Duration,
    pub utc_offset: FixedOffset,
}

/// Expands a weekly template into concrete slots for `window.lookahead_days` calendar
/// dates starting with today (at the practice's offset).
///
/// A (date, time, modality) candidate survives when it is not reserved and starts at
/// least `min_lead` after `now`. Each modality stands on its own: a time offered only
/// online is still a slot. Dates without survivors are left out.
pub fn generate_slots(
    therapist_id: Uuid,
    template: &[RecurringAvailability],
    reserved: &ReservationState,
    now: DateTime<Utc>,
    window: &SlotWindow,
) -> Vec<DaySlots> {
    let today = now.with_timezone(&window.utc_offset).date_naive();
    let earliest = now + window.min_lead;

    let mut days = Vec::new();

    for offset in 0..window.lookahead_days {
        let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };

        let mut by_time: BTreeMap<NaiveTime, BTreeSet<Modality>> = BTreeMap::new();

        for entry in template.iter().filter(|entry| entry.applies_to(date)) {
            if reserved.is_reserved(date, entry.start_time, entry.modality) {
                continue;
            }

            match local_instant(date, entry.start_time, window.utc_offset) {
                Some(starts_at) if starts_at >= earliest => {}
                _ => continue,
            }

            by_time.entry(entry.start_time).or_default().insert(entry.modality);
        }

        if by_time.is_empty() {
            continue;
        }

        let slots = by_time
            .into_iter()
            .map(|(time, modalities)| Slot {
                therapist_id,
                date,
                time,
                modalities,
            })
            .collect();

        days.push(DaySlots { date, slots });
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::{at, reference_monday, time, MONDAY, SUNDAY};

    fn window(days: u32) -> SlotWindow {
        SlotWindow {
            lookahead_days: days,
            min_lead: Duration::minutes(30),
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    #[test]
    fn test_single_modality_time_is_still_a_slot() {
        let therapist = Uuid::new_v4();
        let template = vec![RecurringAvailability::new(therapist, MONDAY, time(10, 0), Modality::Online)];

        let days = generate_slots(
            therapist,
            &template,
            &ReservationState::new(),
            at(reference_monday(), 8, 0),
            &window(1),
        );

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].slots[0].modalities, BTreeSet::from([Modality::Online]));
    }

    #[test]
    fn test_lookahead_includes_today_and_stops_at_window() {
        let therapist = Uuid::new_v4();
        // Sunday 2026-10-25 is the seventh day counted from Monday 2026-10-19.
        let template = vec![
            RecurringAvailability::new(therapist, SUNDAY, time(9, 0), Modality::Online),
            RecurringAvailability::new(therapist, MONDAY, time(9, 0), Modality::Online),
        ];
        let now = at(reference_monday(), 7, 0);

        let six = generate_slots(therapist, &template, &ReservationState::new(), now, &window(6));
        let seven = generate_slots(therapist, &template, &ReservationState::new(), now, &window(7));
        let eight = generate_slots(therapist, &template, &ReservationState::new(), now, &window(8));

        assert_eq!(six.len(), 1);
        assert_eq!(seven.len(), 2);
        // The following Monday only enters with an eighth day.
        assert_eq!(eight.len(), 3);
    }

    #[test]
    fn test_offset_shifts_today() {
        let therapist = Uuid::new_v4();
        let template = vec![RecurringAvailability::new(therapist, MONDAY, time(10, 0), Modality::Online)];
        // 23:00 UTC on Sunday is already Monday 01:00 at UTC+2.
        let now = at(reference_monday().pred_opt().unwrap(), 23, 0);
        let window = SlotWindow {
            lookahead_days: 1,
            min_lead: Duration::minutes(30),
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };

        let days = generate_slots(therapist, &template, &ReservationState::new(), now, &window);

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, reference_monday());
    }
}

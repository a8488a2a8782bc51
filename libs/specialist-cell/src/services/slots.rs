// libs/specialist-cell/src/services/slots.rs
//
// Pure interval and slot arithmetic over value types. Nothing here touches
// the store, so the scheduling rules can be tested directly.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::OpenSlot;

/// Candidate slot starts advance in fixed increments from the window start.
pub const SLOT_STRIDE_MINUTES: i64 = 15;

/// Half-open overlap: [a1, a2) and [b1, b2) overlap iff a1 < b2 && b1 < a2.
/// Touching endpoints do not overlap.
pub fn times_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Same predicate over absolute timestamps.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Materialize bookable slots for one availability window on one date.
///
/// Walks forward from the window start in `SLOT_STRIDE_MINUTES` steps and
/// keeps every candidate [t, t+duration) that fits inside the window and does
/// not overlap a booked interval.
pub fn slots_in_window(
    date: NaiveDate,
    window_start: NaiveTime,
    window_end: NaiveTime,
    duration_minutes: i32,
    booked: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<OpenSlot> {
    let duration = Duration::minutes(duration_minutes as i64);
    let window_start_at = date.and_time(window_start).and_utc();
    let window_end_at = date.and_time(window_end).and_utc();

    let mut slots = Vec::new();
    let mut current = window_start_at;

    while current + duration <= window_end_at {
        let slot_end = current + duration;

        let has_conflict = booked
            .iter()
            .any(|&(booked_start, booked_end)| {
                intervals_overlap(current, slot_end, booked_start, booked_end)
            });

        if !has_conflict {
            slots.push(OpenSlot {
                start_time: current,
                end_time: slot_end,
                duration_minutes,
            });
        }

        current += Duration::minutes(SLOT_STRIDE_MINUTES);
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        // 2025-06-02 is a Monday
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        date.and_time(t(h, m)).and_utc()
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        assert!(!times_overlap(t(9, 0), t(12, 0), t(12, 0), t(13, 0)));
        assert!(!times_overlap(t(12, 0), t(13, 0), t(9, 0), t(12, 0)));
    }

    #[test]
    fn one_minute_intrusion_overlaps() {
        assert!(times_overlap(t(9, 0), t(12, 0), t(11, 59), t(12, 1)));
    }

    #[test]
    fn containment_overlaps() {
        assert!(times_overlap(t(9, 0), t(17, 0), t(10, 0), t(11, 0)));
        assert!(times_overlap(t(10, 0), t(11, 0), t(9, 0), t(17, 0)));
    }

    #[test]
    fn two_hour_window_yields_five_hour_long_slots() {
        let slots = slots_in_window(monday(), t(9, 0), t(11, 0), 60, &[]);

        let starts: Vec<_> = slots.iter().map(|s| s.start_time.time()).collect();
        assert_eq!(
            starts,
            vec![t(9, 0), t(9, 15), t(9, 30), t(9, 45), t(10, 0)]
        );
        assert_eq!(slots[0].end_time.time(), t(10, 0));
        assert_eq!(slots[0].duration_minutes, 60);
    }

    #[test]
    fn mid_window_booking_blocks_every_hour_long_candidate() {
        // A 09:30-10:30 booking leaves no room for a 60 minute slot inside
        // a 09:00-11:00 window: every candidate start collides.
        let booked = vec![(at(monday(), 9, 30), at(monday(), 10, 30))];
        let slots = slots_in_window(monday(), t(9, 0), t(11, 0), 60, &booked);
        assert!(slots.is_empty());
    }

    #[test]
    fn mid_window_booking_leaves_shorter_slots_around_it() {
        let booked = vec![(at(monday(), 9, 30), at(monday(), 10, 30))];
        let slots = slots_in_window(monday(), t(9, 0), t(11, 0), 30, &booked);

        let starts: Vec<_> = slots.iter().map(|s| s.start_time.time()).collect();
        assert_eq!(starts, vec![t(9, 0), t(10, 30)]);
    }

    #[test]
    fn booking_touching_candidate_end_does_not_block_it() {
        // Booking starts exactly where the candidate ends.
        let booked = vec![(at(monday(), 10, 0), at(monday(), 11, 0))];
        let slots = slots_in_window(monday(), t(9, 0), t(11, 0), 60, &booked);

        let starts: Vec<_> = slots.iter().map(|s| s.start_time.time()).collect();
        assert_eq!(starts, vec![t(9, 0)]);
    }

    #[test]
    fn window_shorter_than_duration_yields_nothing() {
        let slots = slots_in_window(monday(), t(9, 0), t(9, 45), 60, &[]);
        assert!(slots.is_empty());
    }

    #[test]
    fn no_slot_ever_overlaps_a_booked_interval() {
        let booked = vec![
            (at(monday(), 9, 0), at(monday(), 10, 0)),
            (at(monday(), 13, 15), at(monday(), 14, 0)),
        ];
        let slots = slots_in_window(monday(), t(8, 0), t(17, 0), 45, &booked);

        assert!(!slots.is_empty());
        for slot in &slots {
            for &(booked_start, booked_end) in &booked {
                assert!(!intervals_overlap(
                    slot.start_time,
                    slot.end_time,
                    booked_start,
                    booked_end
                ));
            }
        }
    }
}

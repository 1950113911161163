//! Pure slot arithmetic: working windows, candidate slot generation and
//! interval overlap. Everything here is a function of its inputs; the
//! database-facing glue lives in `booking.rs`.

use chrono::{Datelike, NaiveDate};

use crate::models::WeeklySchedule;

/// Candidate slot spacing in minutes.
pub const SLOT_INTERVAL_MIN: i64 = 30;

/// Parse "HH:MM" into minutes since midnight.
pub fn parse_time(time: &str) -> Option<i64> {
    let (h, m) = time.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: i64 = h.parse().ok()?;
    let min: i64 = m.parse().ok()?;
    if hour > 23 || min > 59 {
        return None;
    }
    Some(hour * 60 + min)
}

/// Minutes since midnight back to zero-padded "HH:MM".
pub fn format_time(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Day-of-week index for a date, 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i64 {
    date.weekday().num_days_from_sunday() as i64
}

/// A staff member's working window for one day, in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start_min: i64,
    pub end_min: i64,
}

/// Resolve the working window for `date` from the weekly template rows.
/// No row for the weekday, a day off, or an unparseable time all mean no
/// availability.
pub fn working_window(rows: &[WeeklySchedule], date: NaiveDate) -> Option<WorkingWindow> {
    let dow = day_of_week(date);
    let row = rows.iter().find(|r| r.day_of_week == dow)?;
    if row.is_off {
        return None;
    }
    Some(WorkingWindow {
        start_min: parse_time(&row.start_time)?,
        end_min: parse_time(&row.end_time)?,
    })
}

/// Every `interval`-minute tick t with start <= t < end, as "HH:MM".
/// An inverted or empty window yields an empty list, never an error.
pub fn generate_slots(start_time: &str, end_time: &str, interval: i64) -> Vec<String> {
    let (Some(start), Some(end)) = (parse_time(start_time), parse_time(end_time)) else {
        return vec![];
    };
    let mut slots = Vec::new();
    let mut t = start;
    while t < end {
        slots.push(format_time(t));
        t += interval;
    }
    slots
}

/// Half-open interval overlap: [s1, e1) and [s2, e2) overlap iff
/// s1 < e2 and s2 < e1. Back-to-back intervals do not overlap.
pub fn overlaps(s1: i64, e1: i64, s2: i64, e2: i64) -> bool {
    s1 < e2 && s2 < e1
}

/// Whether a candidate start time falls inside any busy interval
/// (point-in-[start, end) test, used for slot listing).
pub fn slot_is_taken(slot_min: i64, busy: &[(i64, i64)]) -> bool {
    busy.iter().any(|&(s, e)| s <= slot_min && slot_min < e)
}

/// Whether [start, end) collides with any busy interval (used at
/// booking creation).
pub fn interval_conflicts(start_min: i64, end_min: i64, busy: &[(i64, i64)]) -> bool {
    busy.iter().any(|&(s, e)| overlaps(start_min, end_min, s, e))
}

/// Candidate start times for a working window: slots at the fixed
/// interval, minus starts whose service would run past the window end,
/// minus starts inside a busy interval.
pub fn available_starts(window: WorkingWindow, duration_min: i64, busy: &[(i64, i64)]) -> Vec<String> {
    let mut out = Vec::new();
    let mut t = window.start_min;
    while t < window.end_min {
        if t + duration_min <= window.end_min && !slot_is_taken(t, busy) {
            out.push(format_time(t));
        }
        t += SLOT_INTERVAL_MIN;
    }
    out
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule_row(dow: i64, start: &str, end: &str, off: bool) -> WeeklySchedule {
        WeeklySchedule {
            id: dow + 1,
            staff_id: 1,
            day_of_week: dow,
            start_time: start.to_string(),
            end_time: end.to_string(),
            is_off: off,
        }
    }

    // ── parse_time / format_time ──

    #[test]
    fn test_parse_time_basic() {
        assert_eq!(parse_time("08:30"), Some(510));
    }

    #[test]
    fn test_parse_time_midnight() {
        assert_eq!(parse_time("00:00"), Some(0));
    }

    #[test]
    fn test_parse_time_last_minute() {
        assert_eq!(parse_time("23:59"), Some(1439));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert_eq!(parse_time("garbage"), None);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("10:60"), None);
        assert_eq!(parse_time("9:00"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_format_time_zero_pads() {
        assert_eq!(format_time(510), "08:30");
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(1439), "23:59");
    }

    // ── day_of_week ──

    #[test]
    fn test_day_of_week_sunday_is_zero() {
        // 2026-03-01 is a Sunday
        let d = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(day_of_week(d), 0);
    }

    #[test]
    fn test_day_of_week_saturday_is_six() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(day_of_week(d), 6);
    }

    // ── working_window ──

    #[test]
    fn test_window_matches_weekday_row() {
        let rows = vec![
            schedule_row(0, "09:00", "18:00", true),
            schedule_row(1, "10:00", "19:00", false),
        ];
        // 2026-03-02 is a Monday
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let w = working_window(&rows, d).unwrap();
        assert_eq!(w.start_min, 600);
        assert_eq!(w.end_min, 1140);
    }

    #[test]
    fn test_window_day_off_is_none() {
        let rows = vec![schedule_row(0, "09:00", "18:00", true)];
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(working_window(&rows, sunday).is_none());
    }

    #[test]
    fn test_window_missing_row_is_none() {
        let rows = vec![schedule_row(1, "09:00", "18:00", false)];
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(working_window(&rows, sunday).is_none());
    }

    #[test]
    fn test_window_bad_time_is_none() {
        let rows = vec![schedule_row(0, "nope", "18:00", false)];
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(working_window(&rows, sunday).is_none());
    }

    // ── generate_slots ──

    #[test]
    fn test_slots_half_open_upper_bound() {
        assert_eq!(generate_slots("08:00", "09:00", 30), vec!["08:00", "08:30"]);
    }

    #[test]
    fn test_slots_full_day() {
        let slots = generate_slots("09:00", "18:00", 30);
        assert_eq!(slots.len(), 18);
        assert_eq!(slots[0], "09:00");
        assert_eq!(slots[17], "17:30");
    }

    #[test]
    fn test_slots_inverted_window_is_empty() {
        assert!(generate_slots("18:00", "09:00", 30).is_empty());
    }

    #[test]
    fn test_slots_equal_bounds_is_empty() {
        assert!(generate_slots("09:00", "09:00", 30).is_empty());
    }

    #[test]
    fn test_slots_invalid_time_is_empty() {
        assert!(generate_slots("bad", "09:00", 30).is_empty());
    }

    #[test]
    fn test_slots_custom_interval() {
        assert_eq!(generate_slots("08:00", "09:00", 15).len(), 4);
        assert_eq!(generate_slots("08:00", "09:00", 60), vec!["08:00"]);
    }

    // ── overlaps ──

    #[test]
    fn test_overlap_back_to_back_is_free() {
        // 09:30–10:00 vs 10:00–10:30: touching endpoints do not overlap
        assert!(!overlaps(570, 600, 600, 630));
    }

    #[test]
    fn test_overlap_partial() {
        // 10:00–10:15 vs 10:00–10:30
        assert!(overlaps(600, 615, 600, 630));
    }

    #[test]
    fn test_overlap_contained() {
        assert!(overlaps(610, 620, 600, 630));
    }

    #[test]
    fn test_overlap_surrounding() {
        assert!(overlaps(540, 720, 600, 630));
    }

    #[test]
    fn test_overlap_disjoint() {
        assert!(!overlaps(540, 570, 600, 630));
    }

    // ── slot_is_taken ──

    #[test]
    fn test_point_inside_interval() {
        assert!(slot_is_taken(600, &[(600, 630)]));
        assert!(slot_is_taken(615, &[(600, 630)]));
    }

    #[test]
    fn test_point_at_interval_end_is_free() {
        assert!(!slot_is_taken(630, &[(600, 630)]));
    }

    #[test]
    fn test_point_no_intervals() {
        assert!(!slot_is_taken(600, &[]));
    }

    // ── interval_conflicts ──

    #[test]
    fn test_conflict_boundary_cases() {
        let busy = [(600, 630)]; // 10:00–10:30
        assert!(!interval_conflicts(570, 600, &busy)); // 09:30–10:00
        assert!(interval_conflicts(600, 615, &busy)); // 10:00–10:15
        assert!(!interval_conflicts(630, 660, &busy)); // 10:30–11:00
    }

    #[test]
    fn test_conflict_any_of_many() {
        let busy = [(540, 570), (720, 780)];
        assert!(interval_conflicts(750, 810, &busy));
        assert!(!interval_conflicts(570, 720, &busy));
    }

    // ── available_starts ──

    #[test]
    fn test_available_all_free() {
        let w = WorkingWindow {
            start_min: 540,
            end_min: 660,
        }; // 09:00–11:00
        let starts = available_starts(w, 30, &[]);
        assert_eq!(starts, vec!["09:00", "09:30", "10:00", "10:30"]);
    }

    #[test]
    fn test_available_trims_tail_for_duration() {
        let w = WorkingWindow {
            start_min: 540,
            end_min: 660,
        };
        // 60-minute service cannot start at 10:30 (would run past 11:00)
        let starts = available_starts(w, 60, &[]);
        assert_eq!(starts, vec!["09:00", "09:30", "10:00"]);
    }

    #[test]
    fn test_available_skips_busy_points() {
        let w = WorkingWindow {
            start_min: 540,
            end_min: 660,
        };
        // Booking 09:30–10:30 swallows the 09:30 and 10:00 starts
        let starts = available_starts(w, 30, &[(570, 630)]);
        assert_eq!(starts, vec!["09:00", "10:30"]);
    }

    #[test]
    fn test_available_duration_longer_than_window() {
        let w = WorkingWindow {
            start_min: 540,
            end_min: 600,
        };
        assert!(available_starts(w, 120, &[]).is_empty());
    }
}

//! Working-day calendar arithmetic.
//!
//! Weekends and stand-down periods are non-working. Every operation that
//! walks the calendar is bounded, so a calendar with no working days in
//! reach yields `None` instead of looping forever.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serializer};

use crate::domain::Period;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Upper bound on how far a single walk may travel looking for a working day.
const MAX_SCAN_DAYS: u32 = 3_660;

#[derive(Debug, Clone, Default)]
pub struct Calendar {
    standdowns: Vec<(NaiveDate, NaiveDate)>,
}

impl Calendar {
    pub fn new(standdowns: &[Period]) -> Self {
        let standdowns = standdowns
            .iter()
            .filter_map(|period| {
                let (start, end) = (period.start?, period.end?);
                (start <= end).then_some((start, end))
            })
            .collect();
        Self { standdowns }
    }

    pub fn is_weekend(day: NaiveDate) -> bool {
        matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_standdown(&self, day: NaiveDate) -> bool {
        self.standdowns
            .iter()
            .any(|(start, end)| *start <= day && day <= *end)
    }

    pub fn is_working_day(&self, day: NaiveDate) -> bool {
        !Self::is_weekend(day) && !self.is_standdown(day)
    }

    /// Returns `day` when it is a working day, otherwise the nearest working
    /// day walking in `direction` (`>= 0` forward, `< 0` backward).
    pub fn ensure_working_day(&self, day: NaiveDate, direction: i32) -> Option<NaiveDate> {
        let mut cursor = day;
        for _ in 0..MAX_SCAN_DAYS {
            if self.is_working_day(cursor) {
                return Some(cursor);
            }
            cursor = step(cursor, direction)?;
        }
        None
    }

    /// Moves `day` by `n` working days. The start is first snapped onto a
    /// working day in the direction of travel.
    pub fn shift_working_days(&self, day: NaiveDate, n: i64) -> Option<NaiveDate> {
        let direction = if n < 0 { -1 } else { 1 };
        let mut cursor = self.ensure_working_day(day, direction)?;
        let mut remaining = n.unsigned_abs();
        while remaining > 0 {
            cursor = step(cursor, direction)?;
            cursor = self.ensure_working_day(cursor, direction)?;
            remaining -= 1;
        }
        Some(cursor)
    }

    /// Inclusive count of working days in `a..=b`; `0` when `a > b`.
    pub fn working_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        if a > b {
            return 0;
        }
        a.iter_days()
            .take_while(|day| *day <= b)
            .filter(|day| self.is_working_day(*day))
            .count() as i64
    }
}

fn step(day: NaiveDate, direction: i32) -> Option<NaiveDate> {
    if direction < 0 {
        day.pred_opt()
    } else {
        day.succ_opt()
    }
}

/// Parses a `YYYY-MM-DD` day. Anything else is the invalid marker `None`.
pub fn parse_day(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).ok()
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

pub fn format_display_day(day: NaiveDate) -> String {
    day.format("%d %b %Y").to_string()
}

/// Monday of the ISO week containing `day`.
pub fn week_monday(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday().into())
}

/// Serde adapter for optional dates that maps unparseable strings to `None`
/// instead of rejecting the whole document.
pub mod lenient_date {
    use super::*;

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(day) => serializer.serialize_str(&format_day(*day)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn closure(name: &str, start: NaiveDate, end: NaiveDate) -> Period {
        Period {
            name: name.to_string(),
            start: Some(start),
            end: Some(end),
        }
    }

    #[test]
    fn weekends_are_not_working_days() {
        let calendar = Calendar::default();
        assert!(calendar.is_working_day(day(2024, 1, 5)));
        assert!(!calendar.is_working_day(day(2024, 1, 6)));
        assert!(!calendar.is_working_day(day(2024, 1, 7)));
    }

    #[test]
    fn standdowns_are_not_working_days() {
        let calendar = Calendar::new(&[closure("Closure", day(2024, 1, 2), day(2024, 1, 3))]);
        assert!(!calendar.is_working_day(day(2024, 1, 2)));
        assert!(!calendar.is_working_day(day(2024, 1, 3)));
        assert!(calendar.is_working_day(day(2024, 1, 4)));
    }

    #[test]
    fn shift_skips_weekends_in_both_directions() {
        let calendar = Calendar::default();
        assert_eq!(calendar.shift_working_days(day(2024, 1, 5), 1), Some(day(2024, 1, 8)));
        assert_eq!(calendar.shift_working_days(day(2024, 1, 8), -1), Some(day(2024, 1, 5)));
        assert_eq!(calendar.shift_working_days(day(2024, 1, 1), 4), Some(day(2024, 1, 5)));
    }

    #[test]
    fn shift_by_zero_snaps_forward() {
        let calendar = Calendar::default();
        assert_eq!(calendar.shift_working_days(day(2024, 1, 6), 0), Some(day(2024, 1, 8)));
        assert_eq!(
            calendar.shift_working_days(day(2024, 1, 6), 0),
            calendar.ensure_working_day(day(2024, 1, 6), 1)
        );
    }

    #[test]
    fn ensure_working_day_walks_in_direction() {
        let calendar = Calendar::default();
        assert_eq!(calendar.ensure_working_day(day(2024, 1, 6), -1), Some(day(2024, 1, 5)));
        assert_eq!(calendar.ensure_working_day(day(2024, 1, 6), 1), Some(day(2024, 1, 8)));
    }

    #[test]
    fn counts_working_days_inclusively() {
        let calendar = Calendar::default();
        assert_eq!(calendar.working_days_between(day(2024, 1, 1), day(2024, 1, 5)), 5);
        assert_eq!(calendar.working_days_between(day(2024, 1, 1), day(2024, 1, 10)), 8);
        assert_eq!(calendar.working_days_between(day(2024, 1, 3), day(2024, 1, 3)), 1);
        assert_eq!(calendar.working_days_between(day(2024, 1, 5), day(2024, 1, 1)), 0);
    }

    #[test]
    fn endless_standdown_yields_invalid_marker() {
        let calendar = Calendar::new(&[closure("Forever", day(2000, 1, 1), day(2100, 1, 1))]);
        assert_eq!(calendar.ensure_working_day(day(2024, 1, 1), 1), None);
        assert_eq!(calendar.shift_working_days(day(2024, 1, 1), 3), None);
    }

    #[test]
    fn parse_day_rejects_garbage() {
        assert_eq!(parse_day("2024-02-29"), Some(day(2024, 2, 29)));
        assert_eq!(parse_day("2023-02-29"), None);
        assert_eq!(parse_day("not a date"), None);
    }

    #[test]
    fn week_monday_anchors_mid_week_days() {
        assert_eq!(week_monday(day(2024, 1, 10)), day(2024, 1, 8));
        assert_eq!(week_monday(day(2024, 1, 7)), day(2024, 1, 1));
    }
}

//! Visible date range, the day axis, and its year/month/week groupings.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::calendar::week_monday;
use crate::domain::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Days,
    Weeks,
}

impl ViewMode {
    /// Width of a single day cell for this mode; the weeks view squeezes a
    /// working week into one day's width.
    pub fn day_width(self, base_width: f64) -> f64 {
        match self {
            ViewMode::Days => base_width.max(1.0),
            ViewMode::Weeks => (base_width / 5.0).max(1.0),
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Days => ViewMode::Weeks,
            ViewMode::Weeks => ViewMode::Days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayGroup<K> {
    pub key: K,
    pub label: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl<K> DayGroup<K> {
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// A Monday divider and how many days it spans until the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MondayBoundary {
    pub index: usize,
    pub monday: NaiveDate,
    pub length: usize,
}

/// Earliest valid start to latest valid end, widened forward to at least
/// `min_span_days`. `None` when no task carries a usable date.
pub fn compute_range(tasks: &[Task], min_span_days: i64) -> Option<TimelineRange> {
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    for task in tasks {
        let task_end = if task.single_event {
            task.start_date
        } else {
            task.end_date
        };
        for day in [task.start_date, task_end].into_iter().flatten() {
            start = Some(start.map_or(day, |current| current.min(day)));
            end = Some(end.map_or(day, |current| current.max(day)));
        }
    }

    let (start, end) = (start?, end?);
    let min_end = start
        .checked_add_signed(Duration::days(min_span_days.max(1) - 1))
        .unwrap_or(end);
    Some(TimelineRange {
        start,
        end: end.max(min_end),
    })
}

pub fn build_days(range: Option<TimelineRange>) -> Vec<NaiveDate> {
    let Some(range) = range else {
        return Vec::new();
    };
    range
        .start
        .iter_days()
        .take_while(|day| *day <= range.end)
        .collect()
}

pub fn group_by_year(days: &[NaiveDate]) -> Vec<DayGroup<i32>> {
    group_runs(days, |day| day.year(), |day| day.year().to_string())
}

pub fn group_by_month(days: &[NaiveDate]) -> Vec<DayGroup<(i32, u32)>> {
    group_runs(
        days,
        |day| (day.year(), day.month()),
        |day| day.format("%B %Y").to_string(),
    )
}

/// Weeks are keyed by their Monday even when the first group starts mid-week.
pub fn group_by_week(days: &[NaiveDate]) -> Vec<DayGroup<NaiveDate>> {
    group_runs(
        days,
        |day| week_monday(*day),
        |day| week_monday(*day).format("%d/%m").to_string(),
    )
}

/// Indices of every Monday; a range without one falls back to index 0.
pub fn monday_boundaries(days: &[NaiveDate]) -> Vec<MondayBoundary> {
    let mut mondays = days
        .iter()
        .enumerate()
        .filter(|(_, day)| day.weekday() == chrono::Weekday::Mon)
        .map(|(index, day)| (index, *day))
        .collect::<Vec<_>>();
    if mondays.is_empty() {
        if let Some(first) = days.first() {
            mondays.push((0, week_monday(*first)));
        }
    }

    mondays
        .iter()
        .enumerate()
        .map(|(position, (index, monday))| {
            let next = mondays
                .get(position + 1)
                .map(|(next_index, _)| *next_index)
                .unwrap_or(days.len());
            MondayBoundary {
                index: *index,
                monday: *monday,
                length: next.saturating_sub(*index).max(1),
            }
        })
        .collect()
}

fn group_runs<K, F, L>(days: &[NaiveDate], key_of: F, label_of: L) -> Vec<DayGroup<K>>
where
    K: PartialEq,
    F: Fn(&NaiveDate) -> K,
    L: Fn(&NaiveDate) -> String,
{
    let mut groups: Vec<DayGroup<K>> = Vec::new();
    for (index, day) in days.iter().enumerate() {
        let key = key_of(day);
        match groups.last_mut() {
            Some(group) if group.key == key => group.end_index = index,
            _ => groups.push(DayGroup {
                key,
                label: label_of(day),
                start_index: index,
                end_index: index,
            }),
        }
    }
    groups
}

/// The materialised day axis with a date lookup.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub range: Option<TimelineRange>,
    pub days: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl Timeline {
    pub fn build(tasks: &[Task], min_span_days: i64) -> Self {
        Self::from_range(compute_range(tasks, min_span_days))
    }

    pub fn from_range(range: Option<TimelineRange>) -> Self {
        let days = build_days(range);
        let index = days
            .iter()
            .enumerate()
            .map(|(position, day)| (*day, position))
            .collect();
        Self { range, days, index }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day_index_of(&self, day: NaiveDate) -> Option<usize> {
        self.index.get(&day).copied()
    }

    pub fn day(&self, index: usize) -> Option<NaiveDate> {
        self.days.get(index).copied()
    }

    /// Signed offset of `day` from the first visible day, for dates that may
    /// fall outside the axis.
    pub fn offset_of(&self, day: NaiveDate) -> Option<i64> {
        let first = self.days.first()?;
        Some((day - *first).num_days())
    }
}

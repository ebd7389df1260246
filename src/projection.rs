//! Renderer-agnostic view of a schedule.
//!
//! Everything is expressed in day indices into `days`; there are no pixel,
//! cell or page units here. The interactive view and the document export both
//! draw from this one structure and hold no derived duration state of their
//! own.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::Calendar;
use crate::config::Settings;
use crate::domain::{EntryType, Schedule, Task};
use crate::highlight::{DayHighlights, HighlightKind, HighlightSegment, Highlights};
use crate::ledger::{self, SegmentSpan};
use crate::timeline::{self, DayGroup, MondayBoundary, Timeline};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedDay {
    pub date: NaiveDate,
    pub working_day: bool,
}

/// Contiguous run of completed working days. `fill` is the completed share of
/// the run's last day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRun {
    pub start_index: usize,
    pub end_index: usize,
    pub fill: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedRow {
    pub task_id: String,
    pub identifier: String,
    pub name: String,
    pub depth: usize,
    pub entry_type: EntryType,
    pub single_event: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration: i64,
    pub progress: u8,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub segments: Vec<SegmentSpan>,
    pub progress_overlay: Vec<ProgressRun>,
}

impl ProjectedRow {
    pub fn is_stage(&self) -> bool {
        self.entry_type == EntryType::Stage
    }

    /// Span at a day index, if the bar covers it.
    pub fn segment_at(&self, index: usize) -> Option<&SegmentSpan> {
        self.segments
            .iter()
            .find(|span| span.start_index <= index && index <= span.end_index)
    }

    pub fn covers(&self, index: usize) -> bool {
        matches!((self.start_index, self.end_index), (Some(start), Some(end)) if start <= index && index <= end)
    }

    /// `1.0` for a completed day, a fraction for the partially completed one.
    pub fn progress_fill_at(&self, index: usize) -> Option<f64> {
        self.progress_overlay
            .iter()
            .find(|run| run.start_index <= index && index <= run.end_index)
            .map(|run| if index == run.end_index { run.fill } else { 1.0 })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleProjection {
    pub name: String,
    pub today: Option<NaiveDate>,
    pub days: Vec<ProjectedDay>,
    pub groups_by_year: Vec<DayGroup<i32>>,
    pub groups_by_month: Vec<DayGroup<(i32, u32)>>,
    pub groups_by_week: Vec<DayGroup<NaiveDate>>,
    pub monday_boundaries: Vec<MondayBoundary>,
    pub highlights_by_day_index: Vec<DayHighlights>,
    pub boundary_types: Vec<Option<HighlightKind>>,
    pub highlight_segments: Vec<HighlightSegment>,
    pub standdown_segments: Vec<HighlightSegment>,
    pub rows: Vec<ProjectedRow>,
}

impl ScheduleProjection {
    pub fn day_index_of(&self, date: NaiveDate) -> Option<usize> {
        self.days.binary_search_by_key(&date, |day| day.date).ok()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn highlight(&self, index: usize) -> Option<&DayHighlights> {
        self.highlights_by_day_index.get(index)
    }

    pub fn row(&self, task_id: &str) -> Option<&ProjectedRow> {
        self.rows.iter().find(|row| row.task_id == task_id)
    }
}

/// Builds the projection. Stage summaries are recomputed on a copy, so the
/// caller's schedule is left as is.
pub fn build(schedule: &Schedule, today: Option<NaiveDate>, settings: &Settings) -> ScheduleProjection {
    let mut schedule = schedule.clone();
    schedule.update_stage_summaries();
    let calendar = schedule.calendar();
    let timeline = Timeline::build(&schedule.tasks, settings.min_span_days);
    let highlights = Highlights::resolve(
        &timeline,
        today,
        &schedule.header.deadlines,
        &schedule.header.standdowns,
    );

    let identifiers = schedule.task_identifiers();
    let rows = schedule
        .ordered_tasks()
        .into_iter()
        .map(|entry| {
            let task = &schedule.tasks[entry.index];
            let identifier = identifiers.get(&task.id).cloned().unwrap_or_else(|| "-".to_string());
            project_row(task, identifier, entry.depth, &timeline, &calendar)
        })
        .collect();

    let days = timeline
        .days
        .iter()
        .map(|date| ProjectedDay {
            date: *date,
            working_day: calendar.is_working_day(*date),
        })
        .collect();

    ScheduleProjection {
        name: schedule.header.name.clone(),
        today,
        days,
        groups_by_year: timeline::group_by_year(&timeline.days),
        groups_by_month: timeline::group_by_month(&timeline.days),
        groups_by_week: timeline::group_by_week(&timeline.days),
        monday_boundaries: timeline::monday_boundaries(&timeline.days),
        standdown_segments: highlights.standdown_segments(),
        highlights_by_day_index: highlights.by_day,
        boundary_types: highlights.boundary_kinds,
        highlight_segments: highlights.segments,
        rows,
    }
}

fn project_row(task: &Task, identifier: String, depth: usize, timeline: &Timeline, calendar: &Calendar) -> ProjectedRow {
    let end_date = if task.single_event {
        task.start_date
    } else {
        task.end_date
    };
    let start_index = task.start_date.and_then(|day| timeline.day_index_of(day));
    let end_index = end_date.and_then(|day| timeline.day_index_of(day));
    let (segments, progress_overlay) = if task.is_stage() {
        (Vec::new(), Vec::new())
    } else {
        let overlay = match (start_index, end_index) {
            (Some(start), Some(end)) if start <= end => progress_runs(task.progress, start, end, timeline, calendar),
            _ => Vec::new(),
        };
        (ledger::collect(task, timeline, calendar), overlay)
    };

    ProjectedRow {
        task_id: task.id.clone(),
        identifier,
        name: task.display_name(),
        depth,
        entry_type: task.entry_type,
        single_event: task.single_event,
        start_date: task.start_date,
        end_date,
        duration: task.duration(calendar),
        progress: task.progress.min(100),
        start_index,
        end_index,
        segments,
        progress_overlay,
    }
}

/// Lays `progress` percent of the bar's working days out from its start,
/// split into runs wherever non-working days interrupt.
fn progress_runs(progress: u8, start: usize, end: usize, timeline: &Timeline, calendar: &Calendar) -> Vec<ProgressRun> {
    let working = (start..=end)
        .filter(|index| timeline.day(*index).is_some_and(|day| calendar.is_working_day(day)))
        .collect::<Vec<_>>();
    let mut remaining = f64::from(progress.min(100)) / 100.0 * working.len() as f64;
    let mut runs: Vec<ProgressRun> = Vec::new();

    for index in working {
        if remaining <= 1e-6 {
            break;
        }
        let portion = remaining.min(1.0);
        match runs.last_mut() {
            Some(run) if run.end_index + 1 == index && run.fill >= 1.0 => {
                run.end_index = index;
                run.fill = portion;
            }
            _ => runs.push(ProgressRun {
                start_index: index,
                end_index: index,
                fill: portion,
            }),
        }
        remaining -= portion;
    }
    runs
}

//! Mini-task duration ledger.
//!
//! A task's working-day duration is split across its enabled mini-task
//! segments plus an unallocated pool (`undefined_duration`). Every operation
//! here keeps `sum(enabled durations) + undefined_duration` equal to the
//! task's working-day length once it completes, and never changes a locked
//! segment.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::calendar::Calendar;
use crate::config::SequenceStep;
use crate::domain::{MiniTaskSegment, Task, UNDEFINED_SEGMENT_NAME, generate_id};
use crate::error::ScheduleError;
use crate::timeline::Timeline;

/// Largest single adjustment, in working days, a caller may request.
pub const MAX_ADJUST_DAYS: i64 = 3660;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Grow,
    Shrink,
}

impl Direction {
    fn of(delta: i64) -> Option<Self> {
        match delta.signum() {
            1 => Some(Direction::Grow),
            -1 => Some(Direction::Shrink),
            _ => None,
        }
    }

    fn sign(self) -> i64 {
        match self {
            Direction::Grow => 1,
            Direction::Shrink => -1,
        }
    }
}

/// What a grow step may do once no neighbour can donate and the pool is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolPolicy {
    /// Refuse: the task total must not change.
    #[default]
    Fixed,
    /// Grow the task total by one day.
    Extend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A neighbouring segment donated or received the day.
    Transferred { counterpart: String },
    FromPool,
    ToPool,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StepRefusal {
    #[error("no enabled segment with that id")]
    UnknownSegment,
    #[error("segment is locked")]
    Locked,
    #[error("segment is already one day long")]
    AtMinimum,
    #[error("no neighbour or unallocated day can supply another day")]
    NoCapacity,
}

/// Which end of the task stays put while its total changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationUnit {
    #[default]
    Days,
    Weeks,
}

impl DurationUnit {
    pub fn to_days(self, amount: i64, working_days_per_week: i64) -> i64 {
        let days = match self {
            DurationUnit::Days => amount,
            DurationUnit::Weeks => amount.saturating_mul(working_days_per_week),
        };
        days.max(1)
    }
}

/// Detached copy of a task's segments and pool, edited during previews.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub segments: Vec<MiniTaskSegment>,
    pub undefined_duration: i64,
}

impl LedgerState {
    pub fn of(task: &Task) -> Self {
        Self {
            segments: task.mini_tasks.clone(),
            undefined_duration: task.undefined_duration.max(0),
        }
    }

    pub fn total(&self) -> i64 {
        enabled_sum(&self.segments) + self.undefined_duration.max(0)
    }

    pub fn apply_to(self, task: &mut Task) {
        task.mini_tasks = self.segments;
        task.undefined_duration = self.undefined_duration.max(0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustReport {
    /// Net days actually applied, signed like the request.
    pub achieved: i64,
    /// Why the batch stopped short, if it did.
    pub refusal: Option<StepRefusal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Segment,
    Undefined,
    /// The whole bar of a task without enabled segments.
    Whole,
}

/// A segment placed on the day axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSpan {
    pub kind: SpanKind,
    pub segment_id: Option<String>,
    pub name: String,
    pub duration: i64,
    pub locked: bool,
    pub start_index: usize,
    pub end_index: usize,
}

fn enabled_sum(segments: &[MiniTaskSegment]) -> i64 {
    segments
        .iter()
        .filter(|segment| segment.enabled)
        .map(|segment| segment.duration.max(1))
        .sum()
}

/// Visits positions outward from `target`: right neighbour, left neighbour,
/// then the next pair, and so on.
fn nearest_outward(len: usize, target: usize, mut eligible: impl FnMut(usize) -> bool) -> Option<usize> {
    for offset in 1..len {
        let right = target + offset;
        if right < len && eligible(right) {
            return Some(right);
        }
        if let Some(left) = target.checked_sub(offset) {
            if eligible(left) {
                return Some(left);
            }
        }
    }
    None
}

/// Nearest unlocked segment that can give up a day.
pub fn find_nearest_donor(enabled: &[&MiniTaskSegment], target: usize) -> Option<usize> {
    nearest_outward(enabled.len(), target, |position| {
        let candidate = enabled[position];
        !candidate.locked && candidate.duration > 1
    })
}

/// Nearest unlocked segment that can take a day.
pub fn find_nearest_recipient(enabled: &[&MiniTaskSegment], target: usize) -> Option<usize> {
    nearest_outward(enabled.len(), target, |position| !enabled[position].locked)
}

/// Moves one day into or out of `segment_id`.
pub fn adjust_step(
    state: &mut LedgerState,
    segment_id: &str,
    direction: Direction,
    policy: PoolPolicy,
) -> Result<StepOutcome, StepRefusal> {
    let enabled = state
        .segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.enabled)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let target = enabled
        .iter()
        .position(|index| state.segments[*index].id == segment_id)
        .ok_or(StepRefusal::UnknownSegment)?;
    let target_index = enabled[target];
    if state.segments[target_index].locked {
        return Err(StepRefusal::Locked);
    }

    let view = enabled
        .iter()
        .map(|index| &state.segments[*index])
        .collect::<Vec<_>>();
    let target_duration = state.segments[target_index].duration.max(1);

    let outcome = match direction {
        Direction::Grow => {
            let donor = find_nearest_donor(&view, target).map(|position| enabled[position]);
            if let Some(donor) = donor {
                let donor_segment = &mut state.segments[donor];
                donor_segment.duration = donor_segment.duration.max(1) - 1;
                StepOutcome::Transferred {
                    counterpart: donor_segment.id.clone(),
                }
            } else if state.undefined_duration > 0 {
                state.undefined_duration -= 1;
                StepOutcome::FromPool
            } else if policy == PoolPolicy::Extend {
                StepOutcome::Extended
            } else {
                return Err(StepRefusal::NoCapacity);
            }
        }
        Direction::Shrink => {
            if target_duration <= 1 {
                return Err(StepRefusal::AtMinimum);
            }
            let recipient = find_nearest_recipient(&view, target).map(|position| enabled[position]);
            if let Some(recipient) = recipient {
                let recipient_segment = &mut state.segments[recipient];
                recipient_segment.duration = recipient_segment.duration.max(1) + 1;
                StepOutcome::Transferred {
                    counterpart: recipient_segment.id.clone(),
                }
            } else {
                state.undefined_duration = state.undefined_duration.max(0) + 1;
                StepOutcome::ToPool
            }
        }
    };

    state.segments[target_index].duration = target_duration + direction.sign();
    tracing::debug!(segment = segment_id, ?direction, ?outcome, "ledger step");
    Ok(outcome)
}

/// Applies single-day steps until `delta` is reached or a step is refused.
pub fn adjust_by(state: &mut LedgerState, segment_id: &str, delta: i64, policy: PoolPolicy) -> AdjustReport {
    let Some(direction) = Direction::of(delta) else {
        return AdjustReport {
            achieved: 0,
            refusal: None,
        };
    };

    let mut achieved = 0;
    while achieved != delta {
        if let Err(refusal) = adjust_step(state, segment_id, direction, policy) {
            return AdjustReport {
                achieved,
                refusal: Some(refusal),
            };
        }
        achieved += direction.sign();
    }
    AdjustReport {
        achieved,
        refusal: None,
    }
}

/// Adjusts a live task and moves its end date to fit the new total.
pub fn adjust_task(
    task: &mut Task,
    segment_id: &str,
    delta: i64,
    policy: PoolPolicy,
    calendar: &Calendar,
) -> Result<AdjustReport, ScheduleError> {
    ensure_editable(task)?;
    if !(-MAX_ADJUST_DAYS..=MAX_ADJUST_DAYS).contains(&delta) {
        return Err(ScheduleError::DeltaOutOfRange {
            delta,
            limit: MAX_ADJUST_DAYS,
        });
    }
    if task.mini_task(segment_id).is_none() {
        return Err(ScheduleError::MiniTaskNotFound(segment_id.to_string()));
    }
    let mut state = LedgerState::of(task);
    let report = adjust_by(&mut state, segment_id, delta, policy);
    if report.achieved != 0 {
        let start = task
            .start_date
            .ok_or_else(|| ScheduleError::UndatedTask(task.id.clone()))?;
        let end = end_for_total(calendar, start, state.total())
            .ok_or_else(|| ScheduleError::UndatedTask(task.id.clone()))?;
        state.apply_to(task);
        task.end_date = Some(end);
    }
    Ok(report)
}

fn minimum_of(segments: &[MiniTaskSegment]) -> i64 {
    let floor = segments
        .iter()
        .filter(|segment| segment.enabled)
        .map(|segment| if segment.locked { segment.duration.max(1) } else { 1 })
        .sum::<i64>();
    floor.max(1)
}

/// Shortest total the task can take: locked segments at full length, every
/// other enabled segment at one day.
pub fn minimum_duration(task: &Task) -> i64 {
    minimum_of(&task.mini_tasks)
}

fn end_for_total(calendar: &Calendar, start: NaiveDate, total: i64) -> Option<NaiveDate> {
    calendar.shift_working_days(start, total.max(1) - 1)
}

fn start_for_total(calendar: &Calendar, end: NaiveDate, total: i64) -> Option<NaiveDate> {
    if total <= 1 {
        calendar.ensure_working_day(end, -1)
    } else {
        calendar.shift_working_days(end, -(total - 1))
    }
}

/// Fits the ledger to `new_total` working days and recomputes the date
/// opposite `anchor` from `reference_date`. Returns the applied total, which
/// is never below [`minimum_duration`]. `None` leaves the task untouched.
pub fn reconcile(
    task: &mut Task,
    new_total: i64,
    anchor: Anchor,
    reference_date: NaiveDate,
    calendar: &Calendar,
) -> Option<i64> {
    let mut state = LedgerState::of(task);
    let total = reconcile_state(&mut state, new_total, anchor);
    let (start, end) = match anchor {
        Anchor::Start => (reference_date, end_for_total(calendar, reference_date, total)?),
        Anchor::End => (start_for_total(calendar, reference_date, total)?, reference_date),
    };

    state.apply_to(task);
    task.start_date = Some(start);
    task.end_date = Some(end);
    tracing::debug!(task = %task.id, total, ?anchor, "reconciled task duration");
    Some(total)
}

/// Ledger half of [`reconcile`], usable on a detached snapshot.
pub fn reconcile_state(state: &mut LedgerState, new_total: i64, anchor: Anchor) -> i64 {
    let target = new_total.max(minimum_of(&state.segments));
    let mut current = state.total();
    state.undefined_duration = state.undefined_duration.max(0);

    if target > current {
        state.undefined_duration += target - current;
        return target;
    }

    let from_pool = (current - target).min(state.undefined_duration);
    state.undefined_duration -= from_pool;
    current -= from_pool;

    while current > target {
        let Some(index) = shrink_candidate(&state.segments, anchor) else {
            break;
        };
        state.segments[index].duration -= 1;
        current -= 1;
    }
    current
}

/// Largest unlocked enabled segment; ties go to the one nearest the moving
/// edge.
fn shrink_candidate(segments: &[MiniTaskSegment], anchor: Anchor) -> Option<usize> {
    let candidates = segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.enabled && !segment.locked && segment.duration > 1);
    match anchor {
        Anchor::Start => candidates
            .max_by_key(|(index, segment)| (segment.duration, *index))
            .map(|(index, _)| index),
        Anchor::End => candidates
            .max_by_key(|(index, segment)| (segment.duration, std::cmp::Reverse(*index)))
            .map(|(index, _)| index),
    }
}

/// Realigns a task's pool with its dates, e.g. after loading or a date edit.
/// Stages, single events and undated tasks are left alone.
pub fn sync_total(task: &mut Task, calendar: &Calendar) -> Option<i64> {
    if task.is_stage() || task.single_event {
        return None;
    }
    let (Some(start), Some(_)) = (task.start_date, task.end_date) else {
        return None;
    };
    let duration = task.duration(calendar);
    if duration == 0 {
        return None;
    }
    for segment in &mut task.mini_tasks {
        segment.sanitize();
    }
    reconcile(task, duration, Anchor::Start, start, calendar)
}

/// Moves the start edge to `new_start` while `fixed_end` stays put. The start
/// snaps forward onto a working day and the task never drops below its
/// minimum duration.
pub fn apply_new_start(task: &mut Task, new_start: NaiveDate, fixed_end: NaiveDate, calendar: &Calendar) -> Option<i64> {
    if task.single_event {
        return place_single_event(task, new_start, calendar);
    }
    let start = calendar.ensure_working_day(new_start, 1)?;
    let mut end = calendar.ensure_working_day(fixed_end, -1)?;
    let minimum = minimum_duration(task);
    if end < start {
        end = end_for_total(calendar, start, minimum)?;
    }
    let total = minimum.max(calendar.working_days_between(start, end));
    reconcile(task, total, Anchor::End, end, calendar)
}

/// Moves the end edge to `new_end` while `fixed_start` stays put.
pub fn apply_new_end(task: &mut Task, fixed_start: NaiveDate, new_end: NaiveDate, calendar: &Calendar) -> Option<i64> {
    if task.single_event {
        return place_single_event(task, task.start_date.unwrap_or(fixed_start), calendar);
    }
    let start = calendar.ensure_working_day(fixed_start, 1)?;
    let end = calendar.ensure_working_day(new_end, -1)?;
    let minimum = minimum_duration(task);
    let total = if end < start {
        minimum
    } else {
        minimum.max(calendar.working_days_between(start, end))
    };
    reconcile(task, total, Anchor::Start, start, calendar)
}

fn place_single_event(task: &mut Task, day: NaiveDate, calendar: &Calendar) -> Option<i64> {
    let day = calendar.ensure_working_day(day, 1)?;
    task.start_date = Some(day);
    task.end_date = Some(day);
    Some(1)
}

/// Places the enabled segments, then the unallocated tail, onto consecutive
/// working days of the task's bar.
pub fn collect(task: &Task, timeline: &Timeline, calendar: &Calendar) -> Vec<SegmentSpan> {
    let Some(start) = task.start_date else {
        return Vec::new();
    };
    let end = if task.single_event {
        start
    } else {
        match task.end_date {
            Some(end) if end >= start => end,
            _ => return Vec::new(),
        }
    };

    let enabled = task
        .mini_tasks
        .iter()
        .filter(|segment| segment.enabled)
        .collect::<Vec<_>>();
    if enabled.is_empty() || task.single_event {
        let (Some(start_index), Some(end_index)) = (timeline.day_index_of(start), timeline.day_index_of(end)) else {
            return Vec::new();
        };
        return vec![SegmentSpan {
            kind: SpanKind::Whole,
            segment_id: None,
            name: task.display_name(),
            duration: task.duration(calendar),
            locked: false,
            start_index,
            end_index,
        }];
    }

    let working_days = start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| calendar.is_working_day(*day))
        .collect::<Vec<_>>();

    let mut parts = enabled
        .iter()
        .map(|segment| {
            (
                SpanKind::Segment,
                Some(segment.id.clone()),
                segment.name.clone(),
                segment.duration.max(1),
                segment.locked,
            )
        })
        .collect::<Vec<_>>();
    if task.undefined_duration > 0 {
        parts.push((
            SpanKind::Undefined,
            None,
            UNDEFINED_SEGMENT_NAME.to_string(),
            task.undefined_duration,
            false,
        ));
    }

    let mut spans = Vec::with_capacity(parts.len());
    let mut cursor = 0usize;
    for (kind, segment_id, name, duration, locked) in parts {
        if cursor >= working_days.len() {
            tracing::warn!(task = %task.id, "segments run past the task's working days");
            break;
        }
        let last = (cursor + duration as usize).min(working_days.len()) - 1;
        let first_day = working_days[cursor];
        let last_day = working_days[last];
        cursor = last + 1;
        if let (Some(start_index), Some(end_index)) =
            (timeline.day_index_of(first_day), timeline.day_index_of(last_day))
        {
            spans.push(SegmentSpan {
                kind,
                segment_id,
                name,
                duration,
                locked,
                start_index,
                end_index,
            });
        }
    }
    spans
}

fn ensure_editable(task: &Task) -> Result<(), ScheduleError> {
    if task.is_stage() {
        return Err(ScheduleError::StageNotEditable(task.id.clone()));
    }
    if task.single_event {
        return Err(ScheduleError::SingleEventNotEditable(task.id.clone()));
    }
    Ok(())
}

fn segment_mut<'a>(task: &'a mut Task, segment_id: &str) -> Result<&'a mut MiniTaskSegment, ScheduleError> {
    task.mini_tasks
        .iter_mut()
        .find(|segment| segment.id == segment_id)
        .ok_or_else(|| ScheduleError::MiniTaskNotFound(segment_id.to_string()))
}

/// Moves the end date so the task spans exactly its allocated total.
pub fn recompute_end(task: &mut Task, calendar: &Calendar) -> Result<(), ScheduleError> {
    let start = task
        .start_date
        .ok_or_else(|| ScheduleError::UndatedTask(task.id.clone()))?;
    let end = end_for_total(calendar, start, task.allocated_total())
        .ok_or_else(|| ScheduleError::InvalidDate(format!("no working day after {start}")))?;
    task.end_date = Some(end);
    Ok(())
}

pub fn add_segment(task: &mut Task, name: &str, days: i64, calendar: &Calendar) -> Result<String, ScheduleError> {
    ensure_editable(task)?;
    let mut segment = MiniTaskSegment::new(generate_id(), name, days);
    segment.sanitize();
    let id = segment.id.clone();
    task.mini_tasks.push(segment);
    recompute_end(task, calendar)?;
    Ok(id)
}

pub fn remove_last_segment(task: &mut Task, calendar: &Calendar) -> Result<Option<MiniTaskSegment>, ScheduleError> {
    ensure_editable(task)?;
    let removed = task.mini_tasks.pop();
    if removed.is_some() {
        recompute_end(task, calendar)?;
    }
    Ok(removed)
}

/// Swaps a row with its neighbour; `false` when it is already at that end.
pub fn move_segment(task: &mut Task, segment_id: &str, offset: isize) -> Result<bool, ScheduleError> {
    ensure_editable(task)?;
    let index = task
        .mini_tasks
        .iter()
        .position(|segment| segment.id == segment_id)
        .ok_or_else(|| ScheduleError::MiniTaskNotFound(segment_id.to_string()))?;
    let Some(target) = index.checked_add_signed(offset).filter(|target| *target < task.mini_tasks.len()) else {
        return Ok(false);
    };
    let segment = task.mini_tasks.remove(index);
    task.mini_tasks.insert(target, segment);
    Ok(true)
}

pub fn rename_segment(task: &mut Task, segment_id: &str, name: &str) -> Result<(), ScheduleError> {
    ensure_editable(task)?;
    let segment = segment_mut(task, segment_id)?;
    segment.name = name.to_string();
    segment.sanitize();
    Ok(())
}

/// Disabling clears the row back to a blank one-day segment.
pub fn set_segment_enabled(
    task: &mut Task,
    segment_id: &str,
    enabled: bool,
    calendar: &Calendar,
) -> Result<(), ScheduleError> {
    ensure_editable(task)?;
    let segment = segment_mut(task, segment_id)?;
    if enabled {
        segment.enabled = true;
    } else {
        let id = std::mem::take(&mut segment.id);
        *segment = MiniTaskSegment::new(id, "", 1);
        segment.enabled = false;
    }
    segment.sanitize();
    recompute_end(task, calendar)
}

/// Returns the new lock state. Disabled rows stay unlocked.
pub fn toggle_lock(task: &mut Task, segment_id: &str) -> Result<bool, ScheduleError> {
    ensure_editable(task)?;
    let segment = segment_mut(task, segment_id)?;
    segment.locked = segment.enabled && !segment.locked;
    Ok(segment.locked)
}

pub fn set_segment_duration(
    task: &mut Task,
    segment_id: &str,
    days: i64,
    calendar: &Calendar,
) -> Result<(), ScheduleError> {
    ensure_editable(task)?;
    segment_mut(task, segment_id)?.duration = days.max(1);
    recompute_end(task, calendar)
}

/// Splits `total` in proportion to the step weights. Every step gets at least
/// one day and rounding drift is settled on the heaviest steps first.
pub fn default_durations(total: i64, steps: &[SequenceStep]) -> Vec<i64> {
    if steps.is_empty() {
        return Vec::new();
    }
    let total = total.max(steps.len() as i64);
    let weight_sum = steps.iter().map(|step| step.weight).sum::<f64>();
    let share = |step: &SequenceStep| {
        if weight_sum > 0.0 {
            step.weight / weight_sum
        } else {
            1.0 / steps.len() as f64
        }
    };
    let mut durations = steps
        .iter()
        .map(|step| (share(step) * total as f64).round().max(1.0) as i64)
        .collect::<Vec<_>>();

    let mut by_weight = (0..steps.len()).collect::<Vec<_>>();
    by_weight.sort_by(|a, b| steps[*b].weight.total_cmp(&steps[*a].weight));

    let mut drift = total - durations.iter().sum::<i64>();
    if drift > 0 {
        let count = steps.len() as i64;
        for duration in &mut durations {
            *duration += drift / count;
        }
        for index in by_weight.iter().take((drift % count) as usize) {
            durations[*index] += 1;
        }
        drift = 0;
    }
    // total >= steps.len(), so there is always a row above one day to take from.
    while drift < 0 {
        for index in &by_weight {
            if drift < 0 && durations[*index] > 1 {
                durations[*index] -= 1;
                drift += 1;
            }
        }
    }
    durations
}

pub fn default_sequence(task_id: &str, total: i64, steps: &[SequenceStep]) -> Vec<MiniTaskSegment> {
    steps
        .iter()
        .zip(default_durations(total, steps))
        .enumerate()
        .map(|(index, (step, duration))| {
            MiniTaskSegment::new(format!("{task_id}-mini-{}", index + 1), step.name.clone(), duration)
        })
        .collect()
}

/// Replaces a task's rows with the weighted default sequence over its current
/// working-day length.
pub fn apply_default_sequence(task: &mut Task, steps: &[SequenceStep], calendar: &Calendar) -> Result<(), ScheduleError> {
    ensure_editable(task)?;
    let total = task.duration(calendar).max(1);
    task.mini_tasks = default_sequence(&task.id, total, steps);
    task.undefined_duration = 0;
    recompute_end(task, calendar)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;
    use crate::domain::EntryType;
    use crate::timeline::TimelineRange;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn segment(id: &str, duration: i64, locked: bool) -> MiniTaskSegment {
        let mut segment = MiniTaskSegment::new(id, id, duration);
        segment.locked = locked;
        segment
    }

    fn state(segments: Vec<MiniTaskSegment>, undefined: i64) -> LedgerState {
        LedgerState {
            segments,
            undefined_duration: undefined,
        }
    }

    fn durations(state: &LedgerState) -> Vec<i64> {
        state.segments.iter().map(|segment| segment.duration).collect()
    }

    fn task_with(start: NaiveDate, end: NaiveDate, segments: Vec<MiniTaskSegment>, undefined: i64) -> Task {
        let mut task = Task::new("Design package", EntryType::Task);
        task.start_date = Some(start);
        task.end_date = Some(end);
        task.mini_tasks = segments;
        task.undefined_duration = undefined;
        task
    }

    #[test]
    fn grow_skips_locked_neighbour_for_nearest_donor() {
        let mut ledger = state(vec![segment("A", 3, false), segment("B", 2, true), segment("C", 4, false)], 0);
        let outcome = adjust_step(&mut ledger, "A", Direction::Grow, PoolPolicy::Fixed);
        assert_eq!(
            outcome,
            Ok(StepOutcome::Transferred {
                counterpart: "C".to_string()
            })
        );
        assert_eq!(durations(&ledger), vec![4, 2, 3]);
    }

    #[test]
    fn search_alternates_right_then_left() {
        let mut ledger = state(
            vec![segment("A", 5, false), segment("B", 2, false), segment("C", 1, false), segment("D", 5, false)],
            0,
        );
        adjust_step(&mut ledger, "C", Direction::Grow, PoolPolicy::Fixed).expect("step");
        assert_eq!(durations(&ledger), vec![5, 2, 2, 4]);

        let mut ledger = state(
            vec![segment("A", 5, false), segment("B", 2, false), segment("C", 1, false), segment("D", 1, false)],
            0,
        );
        adjust_step(&mut ledger, "C", Direction::Grow, PoolPolicy::Fixed).expect("step");
        assert_eq!(durations(&ledger), vec![5, 1, 2, 1]);
    }

    #[test]
    fn shrinking_a_one_day_segment_is_refused() {
        let mut ledger = state(vec![segment("A", 1, false), segment("B", 4, false)], 0);
        let before = ledger.clone();
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Shrink, PoolPolicy::Extend),
            Err(StepRefusal::AtMinimum)
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn locked_and_unknown_targets_are_refused() {
        let mut ledger = state(vec![segment("A", 3, true), segment("B", 2, false)], 0);
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Grow, PoolPolicy::Fixed),
            Err(StepRefusal::Locked)
        );
        assert_eq!(
            adjust_step(&mut ledger, "missing", Direction::Grow, PoolPolicy::Fixed),
            Err(StepRefusal::UnknownSegment)
        );

        let mut disabled = segment("C", 2, false);
        disabled.enabled = false;
        ledger.segments.push(disabled);
        assert_eq!(
            adjust_step(&mut ledger, "C", Direction::Grow, PoolPolicy::Fixed),
            Err(StepRefusal::UnknownSegment)
        );
    }

    #[test]
    fn shrink_then_regrow_restores_split() {
        let mut ledger = state(vec![segment("Design", 3, false), segment("Review", 2, false)], 0);
        adjust_step(&mut ledger, "Design", Direction::Shrink, PoolPolicy::Fixed).expect("shrink");
        assert_eq!(durations(&ledger), vec![2, 3]);
        adjust_step(&mut ledger, "Design", Direction::Grow, PoolPolicy::Fixed).expect("grow");
        assert_eq!(durations(&ledger), vec![3, 2]);
        assert_eq!(ledger.total(), 5);
    }

    #[test]
    fn pool_absorbs_and_supplies_days() {
        let mut ledger = state(vec![segment("A", 3, false), segment("B", 2, true)], 0);
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Shrink, PoolPolicy::Fixed),
            Ok(StepOutcome::ToPool)
        );
        assert_eq!(ledger.undefined_duration, 1);
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Grow, PoolPolicy::Fixed),
            Ok(StepOutcome::FromPool)
        );
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Grow, PoolPolicy::Fixed),
            Err(StepRefusal::NoCapacity)
        );
        assert_eq!(
            adjust_step(&mut ledger, "A", Direction::Grow, PoolPolicy::Extend),
            Ok(StepOutcome::Extended)
        );
        assert_eq!(durations(&ledger), vec![4, 2]);
        assert_eq!(ledger.total(), 6);
    }

    #[test]
    fn batch_reports_partial_progress() {
        let mut ledger = state(vec![segment("A", 2, false), segment("B", 3, false)], 0);
        let report = adjust_by(&mut ledger, "A", 5, PoolPolicy::Fixed);
        assert_eq!(report.achieved, 2);
        assert_eq!(report.refusal, Some(StepRefusal::NoCapacity));
        assert_eq!(durations(&ledger), vec![4, 1]);
        assert_eq!(adjust_by(&mut ledger, "A", 0, PoolPolicy::Fixed).achieved, 0);
    }

    #[test]
    fn minimum_counts_locked_days_and_one_per_unlocked_row() {
        let task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 10),
            vec![segment("A", 3, true), segment("B", 4, false), segment("C", 2, false)],
            0,
        );
        assert_eq!(minimum_duration(&task), 5);
        let bare = task_with(day(2024, 1, 1), day(2024, 1, 1), Vec::new(), 1);
        assert_eq!(minimum_duration(&bare), 1);
    }

    #[test]
    fn reconcile_with_current_total_changes_nothing() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 5),
            vec![segment("Design", 3, false), segment("Review", 2, false)],
            0,
        );
        let before = task.mini_tasks.clone();
        let total = reconcile(&mut task, 5, Anchor::Start, day(2024, 1, 1), &calendar);
        assert_eq!(total, Some(5));
        assert_eq!(task.mini_tasks, before);
        assert_eq!(task.undefined_duration, 0);
        assert_eq!(task.end_date, Some(day(2024, 1, 5)));
    }

    #[test]
    fn reconcile_clamps_to_locked_sum() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 9),
            vec![segment("A", 3, true), segment("B", 2, true)],
            2,
        );
        let total = reconcile(&mut task, 2, Anchor::Start, day(2024, 1, 1), &calendar);
        assert_eq!(total, Some(5));
        assert_eq!(task.undefined_duration, 0);
        assert_eq!(task.mini_tasks.iter().map(|s| s.duration).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(task.end_date, Some(day(2024, 1, 5)));
    }

    #[test]
    fn reconcile_shrinks_pool_then_largest_near_moving_edge() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 15),
            vec![segment("A", 2, false), segment("B", 4, false), segment("C", 4, false)],
            1,
        );
        assert_eq!(task.duration(&calendar), 11);
        let total = reconcile(&mut task, 7, Anchor::Start, day(2024, 1, 1), &calendar);
        assert_eq!(total, Some(7));
        assert_eq!(task.mini_tasks.iter().map(|s| s.duration).collect::<Vec<_>>(), vec![2, 3, 2]);
        assert_eq!(task.undefined_duration, 0);
        assert_eq!(task.end_date, Some(day(2024, 1, 9)));
    }

    #[test]
    fn reconcile_from_end_anchor_moves_start() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 8),
            day(2024, 1, 12),
            vec![segment("A", 3, false), segment("B", 2, false)],
            0,
        );
        let total = reconcile(&mut task, 7, Anchor::End, day(2024, 1, 12), &calendar);
        assert_eq!(total, Some(7));
        assert_eq!(task.undefined_duration, 2);
        assert_eq!(task.start_date, Some(day(2024, 1, 4)));
        assert_eq!(task.end_date, Some(day(2024, 1, 12)));
        assert_eq!(task.allocated_total(), task.duration(&calendar));
    }

    #[test]
    fn start_dragged_past_end_keeps_minimum_duration() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 5),
            vec![segment("A", 3, true), segment("B", 2, false)],
            0,
        );
        let total = apply_new_start(&mut task, day(2024, 1, 8), day(2024, 1, 5), &calendar);
        assert_eq!(total, Some(4));
        assert_eq!(task.start_date, Some(day(2024, 1, 8)));
        assert_eq!(task.end_date, Some(day(2024, 1, 11)));
        assert_eq!(task.mini_tasks.iter().map(|s| s.duration).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[test]
    fn end_edge_snaps_back_off_weekends() {
        let calendar = Calendar::default();
        let mut task = task_with(day(2024, 1, 1), day(2024, 1, 3), Vec::new(), 3);
        apply_new_end(&mut task, day(2024, 1, 1), day(2024, 1, 7), &calendar).expect("dates");
        assert_eq!(task.end_date, Some(day(2024, 1, 5)));
        assert_eq!(task.undefined_duration, 5);
    }

    #[test]
    fn sync_total_fills_pool_from_dates() {
        let calendar = Calendar::default();
        let mut task = task_with(day(2024, 1, 1), day(2024, 1, 10), vec![segment("A", 3, false)], 0);
        assert_eq!(sync_total(&mut task, &calendar), Some(8));
        assert_eq!(task.undefined_duration, 5);
        assert_eq!(task.end_date, Some(day(2024, 1, 10)));
    }

    #[test]
    fn collect_maps_segments_onto_working_days() {
        let calendar = Calendar::default();
        let task = task_with(
            day(2024, 1, 4),
            day(2024, 1, 10),
            vec![segment("A", 2, false), segment("B", 2, true)],
            1,
        );
        let timeline = Timeline::from_range(Some(TimelineRange {
            start: day(2024, 1, 1),
            end: day(2024, 1, 14),
        }));
        let spans = collect(&task, &timeline, &calendar);
        let placed = spans
            .iter()
            .map(|span| (span.kind, span.start_index, span.end_index))
            .collect::<Vec<_>>();
        assert_eq!(
            placed,
            vec![
                (SpanKind::Segment, 3, 4),
                (SpanKind::Segment, 7, 8),
                (SpanKind::Undefined, 9, 9),
            ]
        );
        assert!(spans[1].locked);
        assert_eq!(spans[2].name, UNDEFINED_SEGMENT_NAME);
    }

    #[test]
    fn collect_without_segments_yields_whole_bar() {
        let calendar = Calendar::default();
        let task = task_with(day(2024, 1, 2), day(2024, 1, 3), Vec::new(), 2);
        let timeline = Timeline::from_range(Some(TimelineRange {
            start: day(2024, 1, 1),
            end: day(2024, 1, 7),
        }));
        let spans = collect(&task, &timeline, &calendar);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Whole);
        assert_eq!((spans[0].start_index, spans[0].end_index), (1, 2));
    }

    #[test]
    fn direct_edits_move_the_end_date() {
        let calendar = Calendar::default();
        let mut task = task_with(day(2024, 1, 1), day(2024, 1, 3), vec![segment("A", 3, false)], 0);

        let id = add_segment(&mut task, "Design review", DurationUnit::Weeks.to_days(1, 5), &calendar)
            .expect("add");
        assert_eq!(task.end_date, Some(day(2024, 1, 10)));

        set_segment_duration(&mut task, &id, 2, &calendar).expect("duration");
        assert_eq!(task.end_date, Some(day(2024, 1, 5)));

        set_segment_enabled(&mut task, "A", false, &calendar).expect("disable");
        assert_eq!(task.mini_tasks[0].name, "");
        assert_eq!(task.end_date, Some(day(2024, 1, 2)));
        assert!(!toggle_lock(&mut task, "A").expect("lock"));

        assert!(move_segment(&mut task, &id, -1).expect("move"));
        assert!(!move_segment(&mut task, &id, -1).expect("move"));
        assert_eq!(task.mini_tasks[0].id, id);
        rename_segment(&mut task, &id, "CDP").expect("rename");
        assert_eq!(task.mini_tasks[0].name, "CDP");

        let removed = remove_last_segment(&mut task, &calendar).expect("remove");
        assert_eq!(removed.map(|segment| segment.id), Some("A".to_string()));
        assert_eq!(task.allocated_total(), task.duration(&calendar));
    }

    #[test]
    fn stages_refuse_ledger_edits() {
        let calendar = Calendar::default();
        let mut stage = Task::new("Stage", EntryType::Stage);
        stage.start_date = Some(day(2024, 1, 1));
        assert!(matches!(
            add_segment(&mut stage, "Design", 1, &calendar),
            Err(ScheduleError::StageNotEditable(_))
        ));
    }

    #[test]
    fn single_events_refuse_ledger_edits() {
        let calendar = Calendar::default();
        let mut event = task_with(day(2024, 1, 3), day(2024, 1, 3), Vec::new(), 0);
        event.single_event = true;
        assert!(matches!(
            add_segment(&mut event, "Design", 3, &calendar),
            Err(ScheduleError::SingleEventNotEditable(_))
        ));
        assert!(event.mini_tasks.is_empty());
        assert_eq!(event.end_date, Some(day(2024, 1, 3)));
        assert!(matches!(
            adjust_task(&mut event, "missing", 2, PoolPolicy::Extend, &calendar),
            Err(ScheduleError::SingleEventNotEditable(_))
        ));
    }

    #[test]
    fn oversized_adjustments_are_rejected_before_stepping() {
        let calendar = Calendar::default();
        let mut task = task_with(
            day(2024, 1, 1),
            day(2024, 1, 5),
            vec![segment("A", 3, false), segment("B", 2, false)],
            0,
        );
        let before = task.clone();
        assert!(matches!(
            adjust_task(&mut task, "A", MAX_ADJUST_DAYS + 1, PoolPolicy::Extend, &calendar),
            Err(ScheduleError::DeltaOutOfRange { limit: MAX_ADJUST_DAYS, .. })
        ));
        assert!(matches!(
            adjust_task(&mut task, "A", i64::MIN, PoolPolicy::Fixed, &calendar),
            Err(ScheduleError::DeltaOutOfRange { .. })
        ));
        assert_eq!(task.mini_tasks, before.mini_tasks);
        assert_eq!(task.end_date, before.end_date);

        let report = adjust_task(&mut task, "A", 20, PoolPolicy::Extend, &calendar).expect("adjust");
        assert_eq!(report.achieved, 20);
        assert_eq!(task.allocated_total(), task.duration(&calendar));
    }

    #[test]
    fn default_durations_normalise_weights_that_miss_one_hundred() {
        let step = |name: &str, weight: f64| SequenceStep {
            name: name.to_string(),
            weight,
        };
        let light = vec![step("Design", 1.0), step("Review", 1.0), step("Issue", 1.0)];
        let durations = default_durations(1000, &light);
        assert_eq!(durations.iter().sum::<i64>(), 1000);
        assert_eq!(durations, vec![334, 333, 333]);

        let heavy = vec![step("Design", 100.0), step("Review", 60.0), step("Issue", 40.0)];
        assert_eq!(default_durations(10, &heavy), vec![5, 3, 2]);

        let weightless = vec![step("Design", 0.0), step("Review", 0.0)];
        assert_eq!(default_durations(5, &weightless).iter().sum::<i64>(), 5);
        assert!(default_durations(5, &[]).is_empty());
    }

    #[test]
    fn default_sequence_fills_a_long_task_without_moving_its_end() {
        let calendar = Calendar::default();
        let mut task = task_with(day(2024, 1, 1), day(2027, 12, 31), Vec::new(), 0);
        let steps = ["Design", "Review", "Issue"]
            .iter()
            .map(|name| SequenceStep {
                name: name.to_string(),
                weight: 1.0,
            })
            .collect::<Vec<_>>();
        let duration = task.duration(&calendar);
        apply_default_sequence(&mut task, &steps, &calendar).expect("sequence");
        assert_eq!(task.end_date, Some(day(2027, 12, 31)));
        assert_eq!(task.allocated_total(), duration);
        assert_eq!(task.undefined_duration, 0);
    }

    #[test]
    fn default_durations_follow_weights_and_sum_to_total() {
        let steps = vec![
            SequenceStep {
                name: "Design".to_string(),
                weight: 50.0,
            },
            SequenceStep {
                name: "Design review".to_string(),
                weight: 20.0,
            },
            SequenceStep {
                name: "Client comments".to_string(),
                weight: 30.0,
            },
        ];
        assert_eq!(default_durations(10, &steps), vec![5, 2, 3]);
        assert_eq!(default_durations(7, &steps).iter().sum::<i64>(), 7);
        assert_eq!(default_durations(1, &steps), vec![1, 1, 1]);

        let rows = default_sequence("t1", 10, &steps);
        assert_eq!(rows[2].id, "t1-mini-3");
        assert_eq!(rows[2].name, "Client comments");
    }

    proptest! {
        #[test]
        fn steps_keep_total_and_never_touch_locked_rows(
            rows in proptest::collection::vec((1i64..6, any::<bool>(), any::<bool>()), 1..6),
            undefined in 0i64..4,
            ops in proptest::collection::vec((0usize..6, any::<bool>()), 0..40),
        ) {
            let segments = rows
                .iter()
                .enumerate()
                .map(|(index, (duration, locked, enabled))| {
                    let mut segment = segment(&format!("s{index}"), *duration, *locked && *enabled);
                    segment.enabled = *enabled;
                    segment
                })
                .collect::<Vec<_>>();
            let mut ledger = state(segments, undefined);
            let total = ledger.total();
            let locked = ledger
                .segments
                .iter()
                .filter(|segment| segment.locked)
                .map(|segment| (segment.id.clone(), segment.duration))
                .collect::<Vec<_>>();

            for (index, grow) in ops {
                let id = format!("s{index}");
                let direction = if grow { Direction::Grow } else { Direction::Shrink };
                let _ = adjust_step(&mut ledger, &id, direction, PoolPolicy::Fixed);
                prop_assert_eq!(ledger.total(), total);
                prop_assert!(ledger.undefined_duration >= 0);
                prop_assert!(ledger.segments.iter().all(|segment| segment.duration >= 1));
            }

            for (id, duration) in locked {
                let current = ledger.segments.iter().find(|segment| segment.id == id).map(|segment| segment.duration);
                prop_assert_eq!(current, Some(duration));
            }
        }

        #[test]
        fn committed_edits_keep_dates_and_ledger_in_step(
            rows in proptest::collection::vec((1i64..6, any::<bool>(), any::<bool>()), 1..6),
            undefined in 0i64..4,
            ops in proptest::collection::vec((0u8..3, 0usize..6, -12i64..12, any::<bool>()), 0..30),
        ) {
            let calendar = Calendar::default();
            let segments = rows
                .iter()
                .enumerate()
                .map(|(index, (duration, locked, enabled))| {
                    let mut segment = segment(&format!("s{index}"), *duration, *locked && *enabled);
                    segment.enabled = *enabled;
                    segment
                })
                .collect::<Vec<_>>();
            let start = day(2024, 1, 1);
            let mut task = task_with(start, start, segments, undefined);
            task.end_date = end_for_total(&calendar, start, task.allocated_total());
            sync_total(&mut task, &calendar);
            prop_assert_eq!(task.allocated_total(), task.duration(&calendar));

            for (kind, index, amount, extend) in ops {
                let current_start = task.start_date.expect("start");
                let current_end = task.end_date.expect("end");
                match kind {
                    0 => {
                        let policy = if extend { PoolPolicy::Extend } else { PoolPolicy::Fixed };
                        let _ = adjust_task(&mut task, &format!("s{index}"), amount, policy, &calendar);
                    }
                    1 => {
                        let moved = current_start + chrono::Duration::days(amount);
                        prop_assert!(apply_new_start(&mut task, moved, current_end, &calendar).is_some());
                    }
                    _ => {
                        let moved = current_end + chrono::Duration::days(amount);
                        prop_assert!(apply_new_end(&mut task, current_start, moved, &calendar).is_some());
                    }
                }
                prop_assert!(task.undefined_duration >= 0);
                prop_assert!(task.duration(&calendar) >= minimum_duration(&task));
                prop_assert_eq!(task.allocated_total(), task.duration(&calendar));
            }
        }
    }
}

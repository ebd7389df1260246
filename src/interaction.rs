//! Pointer gestures on task bars.
//!
//! Each gesture is a small state machine: it starts `Previewing`, turns
//! pointer travel into whole-day deltas against a private snapshot, and ends
//! either `Committed` (written back to the live task) or `Cancelled` (live
//! task untouched). Renderers draw the [`Preview`] while the gesture runs.

use chrono::{Duration, NaiveDate};

use crate::calendar::Calendar;
use crate::config::Settings;
use crate::domain::{MiniTaskSegment, Task};
use crate::error::GestureError;
use crate::ledger::{self, Direction, LedgerState, PoolPolicy};
use crate::timeline::ViewMode;

/// Share of a day cell the pointer must travel before a bar drag starts.
const DRAG_ACTIVATION_RATIO: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Previewing,
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureMetrics {
    pub day_width: f64,
    pub drag_activation_px: f64,
}

impl GestureMetrics {
    pub fn new(settings: &Settings, view_mode: ViewMode) -> Self {
        Self {
            day_width: view_mode.day_width(settings.day_width_px),
            drag_activation_px: settings.drag_activation_px,
        }
    }

    fn days_for(&self, pixel_delta: f64) -> i64 {
        (pixel_delta / self.day_width).round() as i64
    }

    fn drag_threshold(&self) -> f64 {
        self.drag_activation_px.max(self.day_width * DRAG_ACTIVATION_RATIO)
    }
}

/// What the task would look like if the gesture ended now.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub mini_tasks: Vec<MiniTaskSegment>,
    pub undefined_duration: i64,
    pub progress: u8,
    pub day_delta: i64,
}

impl Preview {
    fn of(task: &Task) -> Self {
        Self {
            start_date: task.start_date,
            end_date: task.end_date,
            mini_tasks: task.mini_tasks.clone(),
            undefined_duration: task.undefined_duration,
            progress: task.progress,
            day_delta: 0,
        }
    }

    /// Overlays the preview on a copy of the task for rendering.
    pub fn apply_to(&self, task: &mut Task) {
        task.start_date = self.start_date;
        task.end_date = self.end_date;
        task.mini_tasks = self.mini_tasks.clone();
        task.undefined_duration = self.undefined_duration;
        task.progress = self.progress;
    }
}

#[derive(Debug, Clone)]
enum GestureKind {
    Drag {
        start: NaiveDate,
        end: NaiveDate,
        active: bool,
    },
    Resize {
        edge: Edge,
        start: NaiveDate,
        end: NaiveDate,
        snapshot: Task,
        candidate: Option<NaiveDate>,
    },
    MiniSegment {
        segment_id: String,
        start: NaiveDate,
        snapshot: LedgerState,
    },
    Progress {
        bar_width: f64,
        initial_offset: f64,
        initial_progress: u8,
    },
}

#[derive(Debug, Clone)]
pub struct GestureController {
    task_id: String,
    phase: GesturePhase,
    metrics: GestureMetrics,
    calendar: Calendar,
    preview: Preview,
    kind: GestureKind,
}

fn editable_dates(task: &Task) -> Result<(NaiveDate, NaiveDate), GestureError> {
    if task.is_stage() {
        return Err(GestureError::StageNotEditable(task.id.clone()));
    }
    let start = task
        .start_date
        .ok_or_else(|| GestureError::UndatedTask(task.id.clone()))?;
    let end = if task.single_event {
        start
    } else {
        task.end_date
            .filter(|end| *end >= start)
            .ok_or_else(|| GestureError::UndatedTask(task.id.clone()))?
    };
    Ok((start, end))
}

/// Whole-bar drag: both dates shift by the same number of working days.
pub fn begin_drag(task: &Task, metrics: GestureMetrics, calendar: &Calendar) -> Result<GestureController, GestureError> {
    let (start, end) = editable_dates(task)?;
    Ok(GestureController::new(
        task,
        metrics,
        calendar,
        GestureKind::Drag {
            start,
            end,
            active: false,
        },
    ))
}

/// Start or end handle: moves one edge and refits the ledger.
pub fn begin_resize(
    task: &Task,
    edge: Edge,
    metrics: GestureMetrics,
    calendar: &Calendar,
) -> Result<GestureController, GestureError> {
    let (start, end) = editable_dates(task)?;
    Ok(GestureController::new(
        task,
        metrics,
        calendar,
        GestureKind::Resize {
            edge,
            start,
            end,
            snapshot: task.clone(),
            candidate: None,
        },
    ))
}

/// Handle on a mini-task boundary. The right edge of `segment_id` resizes that
/// segment; its left edge resizes the previous enabled segment.
pub fn begin_mini_segment_resize(
    task: &Task,
    segment_id: &str,
    edge: Edge,
    metrics: GestureMetrics,
    calendar: &Calendar,
) -> Result<GestureController, GestureError> {
    let (start, _) = editable_dates(task)?;
    let enabled = task
        .mini_tasks
        .iter()
        .filter(|segment| segment.enabled)
        .collect::<Vec<_>>();
    let not_resizable = || GestureError::SegmentNotResizable(segment_id.to_string());
    let position = enabled
        .iter()
        .position(|segment| segment.id == segment_id)
        .ok_or_else(not_resizable)?;
    if enabled[position].locked {
        return Err(not_resizable());
    }
    let active = match edge {
        Edge::End => enabled[position],
        Edge::Start => position
            .checked_sub(1)
            .map(|previous| enabled[previous])
            .filter(|previous| !previous.locked)
            .ok_or_else(not_resizable)?,
    };

    Ok(GestureController::new(
        task,
        metrics,
        calendar,
        GestureKind::MiniSegment {
            segment_id: active.id.clone(),
            start,
            snapshot: LedgerState::of(task),
        },
    ))
}

/// Progress handle. `bar_width` is the rendered bar width in the same units
/// as the pointer deltas.
pub fn begin_progress(
    task: &Task,
    bar_width: f64,
    metrics: GestureMetrics,
    calendar: &Calendar,
) -> Result<GestureController, GestureError> {
    if task.is_stage() {
        return Err(GestureError::StageNotEditable(task.id.clone()));
    }
    let bar_width = bar_width.max(1.0);
    let initial_progress = task.progress.min(100);
    Ok(GestureController::new(
        task,
        metrics,
        calendar,
        GestureKind::Progress {
            bar_width,
            initial_offset: bar_width * f64::from(initial_progress) / 100.0,
            initial_progress,
        },
    ))
}

impl GestureController {
    fn new(task: &Task, metrics: GestureMetrics, calendar: &Calendar, kind: GestureKind) -> Self {
        Self {
            task_id: task.id.clone(),
            phase: GesturePhase::Previewing,
            metrics,
            calendar: calendar.clone(),
            preview: Preview::of(task),
            kind,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    fn ensure_previewing(&self) -> Result<(), GestureError> {
        if self.phase == GesturePhase::Previewing {
            Ok(())
        } else {
            Err(GestureError::Finished)
        }
    }

    /// `pixel_delta` is the total pointer travel since the gesture began.
    pub fn on_move(&mut self, pixel_delta: f64) -> Result<&Preview, GestureError> {
        self.ensure_previewing()?;
        let metrics = self.metrics;
        let calendar = &self.calendar;
        let preview = &mut self.preview;

        match &mut self.kind {
            GestureKind::Drag { start, end, active } => {
                if !*active && pixel_delta.abs() >= metrics.drag_threshold() {
                    *active = true;
                }
                let shift = metrics.days_for(pixel_delta);
                if *active && shift != preview.day_delta {
                    if let Some((new_start, new_end)) = shifted(calendar, *start, *end, shift) {
                        preview.start_date = Some(new_start);
                        preview.end_date = Some(new_end);
                        preview.day_delta = shift;
                    }
                }
            }
            GestureKind::Resize {
                edge,
                start,
                end,
                snapshot,
                candidate,
            } => {
                let delta = metrics.days_for(pixel_delta);
                let origin = match edge {
                    Edge::Start => *start,
                    Edge::End => *end,
                };
                if let Some(moved) = origin.checked_add_signed(Duration::days(delta)) {
                    let mut draft = snapshot.clone();
                    let fitted = match edge {
                        Edge::Start => ledger::apply_new_start(&mut draft, moved, *end, calendar),
                        Edge::End => ledger::apply_new_end(&mut draft, *start, moved, calendar),
                    };
                    if fitted.is_some() {
                        *candidate = Some(moved);
                        *preview = Preview::of(&draft);
                        preview.day_delta = delta;
                    }
                }
            }
            GestureKind::MiniSegment {
                segment_id,
                start,
                snapshot,
            } => {
                let desired = metrics.days_for(pixel_delta);
                let mut applied = preview.day_delta;
                while applied != desired {
                    let direction = if desired > applied {
                        Direction::Grow
                    } else {
                        Direction::Shrink
                    };
                    if ledger::adjust_step(snapshot, segment_id, direction, PoolPolicy::Extend).is_err() {
                        break;
                    }
                    applied += if direction == Direction::Grow { 1 } else { -1 };
                }
                preview.day_delta = applied;
                preview.mini_tasks = snapshot.segments.clone();
                preview.undefined_duration = snapshot.undefined_duration;
                preview.start_date = Some(*start);
                if let Some(end) = calendar.shift_working_days(*start, snapshot.total().max(1) - 1) {
                    preview.end_date = Some(end);
                }
            }
            GestureKind::Progress {
                bar_width,
                initial_offset,
                ..
            } => {
                let offset = (*initial_offset + pixel_delta).clamp(0.0, *bar_width);
                preview.progress = ((offset / *bar_width) * 100.0).round().clamp(0.0, 100.0) as u8;
            }
        }
        Ok(&self.preview)
    }

    /// Writes the gesture back to `task`. Returns whether anything changed; a
    /// gesture that never moved a whole day is a no-op.
    pub fn on_end(&mut self, task: &mut Task) -> Result<bool, GestureError> {
        self.ensure_previewing()?;
        if task.id != self.task_id {
            return Err(GestureError::WrongTask {
                expected: self.task_id.clone(),
                actual: task.id.clone(),
            });
        }

        let changed = match &self.kind {
            GestureKind::Drag { active, .. } => {
                if *active && self.preview.day_delta != 0 {
                    task.start_date = self.preview.start_date;
                    task.end_date = self.preview.end_date;
                    true
                } else {
                    false
                }
            }
            GestureKind::Resize {
                edge,
                start,
                end,
                candidate,
                ..
            } => match candidate {
                Some(moved) if self.preview.day_delta != 0 => {
                    let fitted = match edge {
                        Edge::Start => ledger::apply_new_start(task, *moved, *end, &self.calendar),
                        Edge::End => ledger::apply_new_end(task, *start, *moved, &self.calendar),
                    };
                    fitted.is_some()
                }
                _ => false,
            },
            GestureKind::MiniSegment { start, snapshot, .. } => {
                if self.preview.day_delta == 0 {
                    false
                } else {
                    let end = self
                        .calendar
                        .shift_working_days(*start, snapshot.total().max(1) - 1)
                        .ok_or_else(|| GestureError::UndatedTask(task.id.clone()))?;
                    snapshot.clone().apply_to(task);
                    task.start_date = Some(*start);
                    task.end_date = Some(end);
                    true
                }
            }
            GestureKind::Progress { initial_progress, .. } => {
                if self.preview.progress != *initial_progress {
                    task.progress = self.preview.progress;
                    true
                } else {
                    false
                }
            }
        };

        self.phase = GesturePhase::Committed;
        if changed {
            tracing::info!(task = %task.id, day_delta = self.preview.day_delta, "gesture committed");
        }
        Ok(changed)
    }

    /// Drops the snapshot. The live task is never touched.
    pub fn on_cancel(&mut self) -> Result<(), GestureError> {
        self.ensure_previewing()?;
        self.phase = GesturePhase::Cancelled;
        tracing::debug!(task = %self.task_id, "gesture cancelled");
        Ok(())
    }
}

fn shifted(calendar: &Calendar, start: NaiveDate, end: NaiveDate, shift: i64) -> Option<(NaiveDate, NaiveDate)> {
    let new_start = calendar.shift_working_days(start, shift)?;
    if start == end {
        return Some((new_start, new_start));
    }
    Some((new_start, calendar.shift_working_days(end, shift)?))
}

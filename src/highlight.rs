//! Today / deadline / stand-down highlighting over the day axis.
//!
//! Every day keeps the full set of kinds that apply to it. A single
//! "boundary kind" per divider position is only resolved for renderers that
//! draw one line at a segment edge.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::Period;
use crate::timeline::Timeline;

/// Declaration order is the boundary priority: later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Standdown,
    Deadline,
    Today,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSegment {
    pub kind: HighlightKind,
    pub name: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayHighlights {
    pub kinds: BTreeSet<HighlightKind>,
    pub standdown_start: bool,
    pub standdown_end: bool,
}

impl DayHighlights {
    pub fn has(&self, kind: HighlightKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Highlights {
    pub segments: Vec<HighlightSegment>,
    pub by_day: Vec<DayHighlights>,
    /// One entry per divider position `0..=day_count`.
    pub boundary_kinds: Vec<Option<HighlightKind>>,
}

impl Highlights {
    pub fn resolve(
        timeline: &Timeline,
        today: Option<NaiveDate>,
        deadlines: &[Period],
        standdowns: &[Period],
    ) -> Self {
        let day_count = timeline.len();
        if day_count == 0 {
            return Self::default();
        }

        let mut segments = Vec::new();
        if let Some(index) = today.and_then(|day| timeline.day_index_of(day)) {
            segments.push(HighlightSegment {
                kind: HighlightKind::Today,
                name: None,
                start_index: index,
                end_index: index,
            });
        }
        segments.extend(
            deadlines
                .iter()
                .filter_map(|period| clamp_period(timeline, period, HighlightKind::Deadline)),
        );
        segments.extend(
            standdowns
                .iter()
                .filter_map(|period| clamp_period(timeline, period, HighlightKind::Standdown)),
        );

        let mut by_day = vec![DayHighlights::default(); day_count];
        for segment in &segments {
            for day in &mut by_day[segment.start_index..=segment.end_index] {
                day.kinds.insert(segment.kind);
            }
            if segment.kind == HighlightKind::Standdown {
                by_day[segment.start_index].standdown_start = true;
                by_day[segment.end_index].standdown_end = true;
            }
        }

        let mut boundary_kinds = vec![None; day_count + 1];
        for segment in &segments {
            for position in [segment.start_index, segment.end_index + 1] {
                let slot = &mut boundary_kinds[position];
                if slot.is_none_or(|existing| segment.kind >= existing) {
                    *slot = Some(segment.kind);
                }
            }
        }

        Self {
            segments,
            by_day,
            boundary_kinds,
        }
    }

    pub fn day(&self, index: usize) -> Option<&DayHighlights> {
        self.by_day.get(index)
    }

    pub fn boundary_kind(&self, position: usize) -> Option<HighlightKind> {
        self.boundary_kinds.get(position).copied().flatten()
    }

    /// Union of the kinds found anywhere in `start..=end`, e.g. for a week
    /// header cell.
    pub fn combined(&self, start: usize, end: usize) -> BTreeSet<HighlightKind> {
        self.by_day
            .iter()
            .skip(start)
            .take(end.saturating_sub(start) + 1)
            .flat_map(|day| day.kinds.iter().copied())
            .collect()
    }

    pub fn standdown_segments(&self) -> Vec<HighlightSegment> {
        self.segments
            .iter()
            .filter(|segment| segment.kind == HighlightKind::Standdown)
            .cloned()
            .collect()
    }
}

/// Maps a dated period onto clamped day indices. Periods with invalid or
/// inverted dates, or lying wholly outside the axis, are dropped.
fn clamp_period(timeline: &Timeline, period: &Period, kind: HighlightKind) -> Option<HighlightSegment> {
    let (start, end) = (period.start?, period.end?);
    if start > end {
        tracing::warn!(name = %period.name, "dropping inverted {kind:?} period");
        return None;
    }
    let last = timeline.len().checked_sub(1)? as i64;
    let start_offset = timeline.offset_of(start)?;
    let end_offset = timeline.offset_of(end)?;
    if end_offset < 0 || start_offset > last {
        return None;
    }

    let start_index = start_offset.clamp(0, last) as usize;
    let end_index = end_offset.clamp(0, last) as usize;
    (start_index <= end_index).then(|| HighlightSegment {
        kind,
        name: (!period.name.trim().is_empty()).then(|| period.name.clone()),
        start_index,
        end_index,
    })
}

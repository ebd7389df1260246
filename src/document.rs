//! Paginated plain-text export of a schedule projection.
//!
//! Every page repeats the column and timeline headers. Bars use one glyph per
//! day cell: the first letter of the mini-task, upper case once that day is
//! complete.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::calendar::format_display_day;
use crate::config::DocumentSettings;
use crate::highlight::HighlightKind;
use crate::ledger::SpanKind;
use crate::projection::{ProjectedRow, ScheduleProjection};

const ID_WIDTH: usize = 6;
const DATE_WIDTH: usize = 11;
const DAYS_WIDTH: usize = 5;
const PROGRESS_WIDTH: usize = 5;
const ELLIPSIS: &str = "...";
pub const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    /// Pages joined by form feeds.
    pub fn to_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.lines.join("\n"))
            .collect::<Vec<_>>()
            .join(&format!("\n{PAGE_BREAK}\n"))
    }
}

pub fn render(projection: &ScheduleProjection, settings: &DocumentSettings) -> Document {
    let layout = Layout::new(settings);
    let title = if projection.name.trim().is_empty() {
        "Schedule".to_string()
    } else {
        projection.name.trim().to_string()
    };

    if projection.rows.is_empty() || projection.days.is_empty() {
        return Document {
            pages: vec![Page {
                number: 1,
                lines: vec![format!("{title} - page 1/1"), String::new(), "Nothing to schedule.".to_string()],
            }],
        };
    }

    let header = layout.header(projection);
    let chunks = projection.rows.chunks(settings.rows_per_page.max(1)).collect::<Vec<_>>();
    let page_count = chunks.len();
    let pages = chunks
        .into_iter()
        .enumerate()
        .map(|(position, rows)| {
            let number = position + 1;
            let mut lines = vec![format!("{title} - page {number}/{page_count}"), String::new()];
            lines.extend(header.iter().cloned());
            lines.extend(rows.iter().map(|row| layout.row(projection, row)));
            lines.push(String::new());
            lines.push(LEGEND.to_string());
            Page { number, lines }
        })
        .collect();
    tracing::debug!(pages = page_count, rows = projection.rows.len(), "rendered document");
    Document { pages }
}

const LEGEND: &str =
    "a-z remaining  A-Z complete  ? unallocated  = stage  * event  . non-working  | today  ! deadline  ~ stand-down";

struct Layout {
    name_width: usize,
    day_width: usize,
}

impl Layout {
    fn new(settings: &DocumentSettings) -> Self {
        Self {
            name_width: settings.name_column_width.max(ELLIPSIS.len() + 1),
            day_width: settings.day_column_width.max(1),
        }
    }

    fn left_width(&self) -> usize {
        ID_WIDTH + self.name_width + DATE_WIDTH * 2 + DAYS_WIDTH + PROGRESS_WIDTH + 6
    }

    fn header(&self, projection: &ScheduleProjection) -> Vec<String> {
        let blank = " ".repeat(self.left_width());
        let day_count = projection.day_count();

        let mut months = vec![' '; day_count * self.day_width];
        for group in &projection.groups_by_month {
            self.place_label(&mut months, &group.label, group.start_index, group.len());
        }

        let mut weeks = vec![' '; day_count * self.day_width];
        for boundary in &projection.monday_boundaries {
            let label = boundary.monday.format("%d/%m").to_string();
            self.place_label(&mut weeks, &label, boundary.index, boundary.length);
        }

        let weekdays = projection
            .days
            .iter()
            .map(|day| self.cell(weekday_initial(day.date)))
            .collect::<String>();
        let markers = (0..day_count)
            .map(|index| {
                let kind = projection
                    .highlight(index)
                    .and_then(|highlights| highlights.kinds.iter().max().copied());
                self.cell(kind.map_or(' ', highlight_glyph))
            })
            .collect::<String>();

        let columns = format!(
            "{:<id$} {:<name$} {:<date$} {:<date$} {:>days$} {:>pct$} ",
            "ID",
            "Task",
            "Start",
            "End",
            "Days",
            "%",
            id = ID_WIDTH,
            name = self.name_width,
            date = DATE_WIDTH,
            days = DAYS_WIDTH,
            pct = PROGRESS_WIDTH,
        );

        vec![
            format!("{blank}{}", months.into_iter().collect::<String>()),
            format!("{blank}{}", weeks.into_iter().collect::<String>()),
            format!("{columns}{weekdays}"),
            format!("{blank}{markers}"),
            "-".repeat(self.left_width() + day_count * self.day_width),
        ]
    }

    fn place_label(&self, line: &mut [char], label: &str, start_index: usize, days: usize) {
        let offset = start_index * self.day_width;
        let room = (days * self.day_width).min(line.len().saturating_sub(offset));
        for (slot, ch) in line[offset..offset + room].iter_mut().zip(label.chars()) {
            *slot = ch;
        }
    }

    fn cell(&self, glyph: char) -> String {
        std::iter::repeat_n(glyph, self.day_width).collect()
    }

    fn row(&self, projection: &ScheduleProjection, row: &ProjectedRow) -> String {
        let name = format!("{}{}", "  ".repeat(row.depth), row.name);
        let left = format!(
            "{:<id$} {:<name$} {:<date$} {:<date$} {:>days$} {:>pct$} ",
            fit(&row.identifier, ID_WIDTH),
            fit(&name, self.name_width),
            date_cell(row.start_date),
            date_cell(row.end_date),
            row.duration,
            format!("{}%", row.progress),
            id = ID_WIDTH,
            name = self.name_width,
            date = DATE_WIDTH,
            days = DAYS_WIDTH,
            pct = PROGRESS_WIDTH,
        );
        let bar = (0..projection.day_count())
            .map(|index| self.cell(bar_glyph(projection, row, index)))
            .collect::<String>();
        format!("{left}{}", bar.trim_end())
    }
}

fn bar_glyph(projection: &ScheduleProjection, row: &ProjectedRow, index: usize) -> char {
    let background = || {
        projection
            .highlight(index)
            .and_then(|highlights| highlights.kinds.iter().max().copied())
            .map_or(' ', highlight_glyph)
    };
    if !row.covers(index) {
        return background();
    }
    if row.is_stage() {
        return '=';
    }
    if row.single_event {
        return '*';
    }
    if projection.days.get(index).is_some_and(|day| !day.working_day) {
        return '.';
    }

    let complete = row.progress_fill_at(index).is_some_and(|fill| fill >= 0.5);
    let glyph = match row.segment_at(index) {
        Some(span) if span.kind == SpanKind::Undefined => return '?',
        Some(span) if span.kind == SpanKind::Segment => span
            .name
            .chars()
            .find(|ch| ch.is_alphanumeric())
            .unwrap_or('x'),
        _ => 'x',
    };
    if complete {
        glyph.to_ascii_uppercase()
    } else {
        glyph.to_ascii_lowercase()
    }
}

fn highlight_glyph(kind: HighlightKind) -> char {
    match kind {
        HighlightKind::Today => '|',
        HighlightKind::Deadline => '!',
        HighlightKind::Standdown => '~',
    }
}

fn weekday_initial(day: NaiveDate) -> char {
    match day.weekday() {
        Weekday::Mon => 'M',
        Weekday::Tue | Weekday::Thu => 'T',
        Weekday::Wed => 'W',
        Weekday::Fri => 'F',
        Weekday::Sat | Weekday::Sun => 'S',
    }
}

fn date_cell(day: Option<NaiveDate>) -> String {
    day.map(format_display_day).unwrap_or_else(|| "-".to_string())
}

/// Truncates to `width` characters, marking the cut with an ellipsis.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept = text
        .chars()
        .take(width.saturating_sub(ELLIPSIS.len()))
        .collect::<String>();
    format!("{}{ELLIPSIS}", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::config::Settings;
    use crate::domain::{EntryType, MiniTaskSegment, Schedule, Task};
    use crate::projection;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule_with(count: usize) -> Schedule {
        let mut schedule = Schedule::new();
        schedule.header.name = "Depot".to_string();
        for index in 0..count {
            let mut task = Task::new(format!("Task {index}"), EntryType::Task);
            task.start_date = Some(day(2024, 1, 1));
            task.end_date = Some(day(2024, 1, 5));
            task.progress = 40;
            task.mini_tasks = vec![
                MiniTaskSegment::new("d", "Design", 3),
                MiniTaskSegment::new("r", "Review", 2),
            ];
            schedule.insert_task(task).expect("insert");
        }
        schedule
    }

    #[test]
    fn headers_repeat_on_every_page() {
        let schedule = schedule_with(5);
        let projection = projection::build(&schedule, None, &Settings::default());
        let settings = DocumentSettings {
            rows_per_page: 2,
            ..DocumentSettings::default()
        };
        let document = render(&projection, &settings);

        assert_eq!(document.pages.len(), 3);
        for page in &document.pages {
            assert!(page.lines[0].starts_with(&format!("Depot - page {}/3", page.number)));
            assert!(page.lines.iter().any(|line| line.starts_with("ID ") && line.contains("Task")));
        }
        let last_rows = document.pages[2]
            .lines
            .iter()
            .filter(|line| line.starts_with('5'))
            .count();
        assert_eq!(last_rows, 1);
        assert_eq!(document.to_text().matches(PAGE_BREAK).count(), 2);
    }

    #[test]
    fn bars_show_segments_and_completed_days() {
        let schedule = schedule_with(1);
        let projection = projection::build(&schedule, Some(day(2024, 1, 7)), &Settings::default());
        let document = render(&projection, &DocumentSettings::default());
        let row = document.pages[0]
            .lines
            .iter()
            .find(|line| line.starts_with('1'))
            .expect("task row");
        assert!(row.ends_with("DDdrr |"), "unexpected bar in {row:?}");
        assert!(row.contains("01 Jan 2024"));
    }

    #[test]
    fn long_names_are_truncated_with_ellipsis() {
        assert_eq!(fit("Structural design package", 10), "Structu...");
        assert_eq!(fit("Short", 10), "Short");
    }

    #[test]
    fn empty_schedule_renders_single_page() {
        let projection = projection::build(&Schedule::new(), None, &Settings::default());
        let document = render(&projection, &DocumentSettings::default());
        assert_eq!(document.pages.len(), 1);
        assert!(document.to_text().contains("Nothing to schedule."));
    }
}

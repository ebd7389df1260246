use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Serialize};

use crate::calendar::{Calendar, lenient_date};
use crate::error::ScheduleError;

const ID_LEN: usize = 8;
pub const DELAYS_SEGMENT_NAME: &str = "Delays";
pub const UNDEFINED_SEGMENT_NAME: &str = "Undefined";

/// A named date range: a deadline to highlight or a stand-down to skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub name: String,
    #[serde(default, with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl Period {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start: Some(start),
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[default]
    Task,
    Stage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniTaskSegment {
    pub id: String,
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    pub duration: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub delay_description: String,
    #[serde(default)]
    pub charge_to_client: bool,
}

impl MiniTaskSegment {
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration: i64) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            name: name.into(),
            duration: duration.max(1),
            locked: false,
            delay_description: String::new(),
            charge_to_client: false,
        }
    }

    pub fn is_delay(&self) -> bool {
        self.name == DELAYS_SEGMENT_NAME
    }

    /// Clamps the duration and drops fields that only apply to delays or to
    /// enabled rows.
    pub fn sanitize(&mut self) {
        self.duration = self.duration.max(1);
        self.delay_description = self.delay_description.trim().to_string();
        if !self.is_delay() {
            self.delay_description.clear();
            self.charge_to_client = false;
        }
        if !self.enabled {
            self.locked = false;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default, with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "lenient_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub entry_type: EntryType,
    #[serde(default)]
    pub single_event: bool,
    #[serde(default)]
    pub mini_tasks: Vec<MiniTaskSegment>,
    #[serde(default)]
    pub undefined_duration: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            start_date: None,
            end_date: None,
            progress: 0,
            entry_type,
            single_event: false,
            mini_tasks: Vec::new(),
            undefined_duration: 0,
            parent_id: None,
        }
    }

    pub fn is_stage(&self) -> bool {
        self.entry_type == EntryType::Stage
    }

    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        if self.is_stage() {
            "Stage".to_string()
        } else {
            "Untitled task".to_string()
        }
    }

    /// Working-day length of the task's date range. Single events count as one
    /// day; tasks with invalid dates count as zero.
    pub fn duration(&self, calendar: &Calendar) -> i64 {
        if self.single_event {
            return i64::from(self.start_date.is_some());
        }
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => calendar.working_days_between(start, end),
            _ => 0,
        }
    }

    pub fn enabled_sum(&self) -> i64 {
        self.mini_tasks
            .iter()
            .filter(|mini| mini.enabled)
            .map(|mini| mini.duration.max(1))
            .sum()
    }

    /// Enabled segment days plus the unallocated pool.
    pub fn allocated_total(&self) -> i64 {
        self.enabled_sum() + self.undefined_duration.max(0)
    }

    pub fn mini_task(&self, id: &str) -> Option<&MiniTaskSegment> {
        self.mini_tasks.iter().find(|mini| mini.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleHeader {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deadlines: Vec<Period>,
    #[serde(default)]
    pub standdowns: Vec<Period>,
}

impl ScheduleHeader {
    pub fn new() -> Self {
        Self {
            schema_version: 1,
            created_at: Utc::now(),
            name: String::new(),
            deadlines: Vec::new(),
            standdowns: Vec::new(),
        }
    }
}

/// A task paired with its nesting depth in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedEntry {
    pub index: usize,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub header: ScheduleHeader,
    pub tasks: Vec<Task>,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            header: ScheduleHeader::new(),
            tasks: Vec::new(),
        }
    }

    pub fn calendar(&self) -> Calendar {
        Calendar::new(&self.header.standdowns)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn require_task_mut(&mut self, id: &str) -> Result<&mut Task, ScheduleError> {
        self.task_mut(id)
            .ok_or_else(|| ScheduleError::TaskNotFound(id.to_string()))
    }

    pub fn insert_task(&mut self, task: Task) -> Result<String, ScheduleError> {
        if let Some(parent_id) = &task.parent_id {
            let parent = self
                .task(parent_id)
                .ok_or_else(|| ScheduleError::TaskNotFound(parent_id.clone()))?;
            if !parent.is_stage() {
                return Err(ScheduleError::ParentNotStage(parent_id.clone()));
            }
            if task.is_stage() {
                return Err(ScheduleError::NestedStage(task.name.clone()));
            }
        }

        let id = task.id.clone();
        self.tasks.push(task);
        Ok(id)
    }

    pub fn add_deadline(&mut self, period: Period) {
        self.header.deadlines.push(period);
    }

    pub fn add_standdown(&mut self, period: Period) {
        self.header.standdowns.push(period);
    }

    /// Stages in insertion order, each followed by its children; loose tasks
    /// keep their own position.
    pub fn ordered_tasks(&self) -> Vec<OrderedEntry> {
        let mut entries = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate() {
            if self.stage_parent(task).is_some() {
                continue;
            }
            entries.push(OrderedEntry { index, depth: 0 });
            if task.is_stage() {
                for (child_index, child) in self.tasks.iter().enumerate() {
                    if child.parent_id.as_deref() == Some(task.id.as_str()) {
                        entries.push(OrderedEntry {
                            index: child_index,
                            depth: 1,
                        });
                    }
                }
            }
        }
        entries
    }

    /// Outline numbering: `1`, `2`, `2.1`, `2.2`, ...
    pub fn task_identifiers(&self) -> HashMap<String, String> {
        let mut identifiers = HashMap::new();
        let mut top_level = 0;
        let mut child_counter = 0;
        let mut current_parent = String::new();
        for entry in self.ordered_tasks() {
            let task = &self.tasks[entry.index];
            if entry.depth == 0 {
                top_level += 1;
                child_counter = 0;
                current_parent = top_level.to_string();
                identifiers.insert(task.id.clone(), current_parent.clone());
            } else {
                child_counter += 1;
                identifiers.insert(task.id.clone(), format!("{current_parent}.{child_counter}"));
            }
        }
        identifiers
    }

    /// Rolls child dates and progress up into every stage. Progress is the
    /// working-day weighted mean of the children.
    pub fn update_stage_summaries(&mut self) {
        let calendar = self.calendar();
        let stage_ids = self
            .tasks
            .iter()
            .filter(|task| task.is_stage())
            .map(|task| task.id.clone())
            .collect::<Vec<_>>();

        for stage_id in stage_ids {
            let mut start: Option<NaiveDate> = None;
            let mut end: Option<NaiveDate> = None;
            let mut weighted_progress = 0i64;
            let mut weight = 0i64;
            for child in self
                .tasks
                .iter()
                .filter(|task| task.parent_id.as_deref() == Some(stage_id.as_str()))
            {
                let (Some(child_start), Some(child_end)) = (child.start_date, child.end_date) else {
                    continue;
                };
                start = Some(start.map_or(child_start, |current| current.min(child_start)));
                end = Some(end.map_or(child_end, |current| current.max(child_end)));
                let days = child.duration(&calendar).max(1);
                weighted_progress += days * i64::from(child.progress.min(100));
                weight += days;
            }

            if let (Some(start), Some(end), Some(stage)) = (start, end, self.task_mut(&stage_id)) {
                stage.start_date = Some(start);
                stage.end_date = Some(end);
                stage.progress = ((weighted_progress as f64 / weight as f64).round() as i64).clamp(0, 100) as u8;
            }
        }
    }

    fn stage_parent(&self, task: &Task) -> Option<&Task> {
        let parent_id = task.parent_id.as_deref()?;
        self.task(parent_id).filter(|parent| parent.is_stage())
    }
}

pub fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{EntryType, MiniTaskSegment, Schedule, Task};
    use crate::error::ScheduleError;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(name: &str, start: NaiveDate, end: NaiveDate) -> Task {
        let mut task = Task::new(name, EntryType::Task);
        task.start_date = Some(start);
        task.end_date = Some(end);
        task
    }

    #[test]
    fn orders_stage_children_under_their_stage() {
        let mut schedule = Schedule::new();
        let loose = schedule
            .insert_task(dated("Survey", day(2024, 1, 1), day(2024, 1, 2)))
            .expect("task should be inserted");
        let stage = schedule
            .insert_task(Task::new("Stage 2", EntryType::Stage))
            .expect("stage should be inserted");
        let mut child = dated("Design", day(2024, 1, 3), day(2024, 1, 5));
        child.parent_id = Some(stage.clone());
        let child = schedule.insert_task(child).expect("child should be inserted");

        let ordered = schedule
            .ordered_tasks()
            .into_iter()
            .map(|entry| (schedule.tasks[entry.index].id.clone(), entry.depth))
            .collect::<Vec<_>>();
        assert_eq!(ordered, vec![(loose.clone(), 0), (stage.clone(), 0), (child.clone(), 1)]);

        let identifiers = schedule.task_identifiers();
        assert_eq!(identifiers[&loose], "1");
        assert_eq!(identifiers[&stage], "2");
        assert_eq!(identifiers[&child], "2.1");
    }

    #[test]
    fn rejects_children_of_plain_tasks() {
        let mut schedule = Schedule::new();
        let parent = schedule
            .insert_task(Task::new("Plain", EntryType::Task))
            .expect("task should be inserted");
        let mut child = Task::new("Child", EntryType::Task);
        child.parent_id = Some(parent.clone());
        assert!(matches!(
            schedule.insert_task(child),
            Err(ScheduleError::ParentNotStage(id)) if id == parent
        ));
    }

    #[test]
    fn stage_summary_spans_children_and_weights_progress() {
        let mut schedule = Schedule::new();
        let stage = schedule
            .insert_task(Task::new("Stage", EntryType::Stage))
            .expect("stage should be inserted");
        let mut short = dated("Short", day(2024, 1, 1), day(2024, 1, 1));
        short.parent_id = Some(stage.clone());
        short.progress = 100;
        let mut long = dated("Long", day(2024, 1, 2), day(2024, 1, 4));
        long.parent_id = Some(stage.clone());
        long.progress = 0;
        schedule.insert_task(short).expect("insert");
        schedule.insert_task(long).expect("insert");

        schedule.update_stage_summaries();
        let stage = schedule.task(&stage).expect("stage");
        assert_eq!(stage.start_date, Some(day(2024, 1, 1)));
        assert_eq!(stage.end_date, Some(day(2024, 1, 4)));
        assert_eq!(stage.progress, 25);
    }

    #[test]
    fn sanitize_clears_delay_fields_for_other_names() {
        let mut segment = MiniTaskSegment::new("a", "Design", 0);
        segment.delay_description = "waiting on survey".to_string();
        segment.charge_to_client = true;
        segment.sanitize();
        assert_eq!(segment.duration, 1);
        assert!(segment.delay_description.is_empty());
        assert!(!segment.charge_to_client);

        let mut delay = MiniTaskSegment::new("b", "Delays", 2);
        delay.delay_description = "  waiting on survey ".to_string();
        delay.charge_to_client = true;
        delay.sanitize();
        assert_eq!(delay.delay_description, "waiting on survey");
        assert!(delay.charge_to_client);
    }

    #[test]
    fn lenient_dates_load_as_invalid_marker() {
        let task: Task = serde_json::from_str(
            r#"{"id":"t1","name":"Broken","start_date":"2024-13-40","end_date":"2024-01-05"}"#,
        )
        .expect("task should deserialize");
        assert_eq!(task.start_date, None);
        assert_eq!(task.end_date, Some(day(2024, 1, 5)));
    }
}

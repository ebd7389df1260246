use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::domain::{Schedule, ScheduleHeader};
use crate::error::StorageError;
use crate::ledger;

const TASKS_MARKER: &str = "\n=== TASKS ===\n";

/// Loads a schedule file. A missing or blank file is a new, empty schedule.
/// Loaded tasks are normalised: segment fields sanitised, pools realigned
/// with the dates, stage summaries recomputed.
pub fn load_schedule(path: &Path) -> Result<Schedule, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Schedule::new()),
        Err(err) => return Err(StorageError::Io(err)),
    };

    if raw.trim().is_empty() {
        return Ok(Schedule::new());
    }

    let (header_blob, tasks_blob) = if let Some((header, tasks)) = raw.split_once(TASKS_MARKER) {
        (header, tasks)
    } else {
        (raw.as_str(), "")
    };

    let header: ScheduleHeader = toml::from_str(header_blob)?;
    let mut tasks = Vec::new();
    for (index, line) in tasks_blob.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let task = serde_json::from_str(line).map_err(|source| StorageError::JsonDecode {
            line: index + 1,
            source,
        })?;
        tasks.push(task);
    }

    let mut schedule = Schedule { header, tasks };
    normalize(&mut schedule);
    tracing::debug!(path = %path.display(), tasks = schedule.tasks.len(), "loaded schedule");
    Ok(schedule)
}

pub fn save_schedule(path: &Path, schedule: &Schedule) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let header = toml::to_string_pretty(&schedule.header)?;
    let mut file = fs::File::create(path)?;
    file.write_all(header.trim_end().as_bytes())?;
    file.write_all(TASKS_MARKER.as_bytes())?;

    for task in &schedule.tasks {
        let line = serde_json::to_string(task).map_err(StorageError::JsonEncode)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }

    tracing::info!(path = %path.display(), tasks = schedule.tasks.len(), "saved schedule");
    Ok(())
}

fn normalize(schedule: &mut Schedule) {
    let calendar = schedule.calendar();
    for task in &mut schedule.tasks {
        task.progress = task.progress.min(100);
        task.undefined_duration = task.undefined_duration.max(0);
        for segment in &mut task.mini_tasks {
            segment.sanitize();
        }
        if task.start_date.is_some() && task.end_date.is_some() && ledger::sync_total(task, &calendar).is_none() {
            tracing::warn!(task = %task.id, "task dates could not be reconciled with its mini-tasks");
        }
    }
    schedule.update_stage_summaries();
}

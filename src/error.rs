//! Error types for the application layer.
//!
//! The scheduling engine itself reports failures as values (`Option`,
//! `StepRefusal`); these enums cover loading, saving, configuration and
//! gesture misuse.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML header: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to encode TOML header: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("failed to parse JSONL task on line {line}: {source}")]
    JsonDecode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode JSONL task: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("mini-task not found: {0}")]
    MiniTaskNotFound(String),
    #[error("parent is not a stage: {0}")]
    ParentNotStage(String),
    #[error("stages cannot be nested: {0}")]
    NestedStage(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("task has no valid dates: {0}")]
    UndatedTask(String),
    #[error("stages are summarised from their children and cannot be edited directly: {0}")]
    StageNotEditable(String),
    #[error("single events have no mini-tasks: {0}")]
    SingleEventNotEditable(String),
    #[error("adjustment of {delta} days is outside -{limit}..={limit}")]
    DeltaOutOfRange { delta: i64, limit: i64 },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to access recent schedules at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "no schedule selected: pass --schedule <path>, set CHRONOS_GANTT_SCHEDULE, or pick one from `schedules`"
    )]
    NoSchedule,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GestureError {
    #[error("gesture already finished")]
    Finished,
    #[error("task {0} has no valid dates")]
    UndatedTask(String),
    #[error("segment {0} cannot be resized")]
    SegmentNotResizable(String),
    #[error("stage {0} follows its children and cannot be edited directly")]
    StageNotEditable(String),
    #[error("gesture belongs to task {expected}, not {actual}")]
    WrongTask { expected: String, actual: String },
}

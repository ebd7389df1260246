//! Presentation and engine settings loaded from TOML.
//!
//! Resolution order for the settings file:
//! 1. `--config <path>` on the command line
//! 2. `CHRONOS_GANTT_CONFIG`
//! 3. `chronos-gantt.toml` in the working directory, if it exists
//! 4. built-in defaults

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "chronos-gantt.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub name: String,
    /// Percentage share of the task's total duration.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Timeline rows (tasks) per page, excluding the repeated header.
    pub rows_per_page: usize,
    pub name_column_width: usize,
    /// Character width of one day column.
    pub day_column_width: usize,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            rows_per_page: 40,
            name_column_width: 28,
            day_column_width: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The visible timeline is widened to at least this many calendar days.
    pub min_span_days: i64,
    /// Width of one day cell, in pointer units, in the days view.
    pub day_width_px: f64,
    /// Minimum pointer travel before a bar drag activates.
    pub drag_activation_px: f64,
    pub working_days_per_week: i64,
    pub mini_task_options: Vec<String>,
    pub default_sequence: Vec<SequenceStep>,
    pub document: DocumentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_span_days: 7,
            day_width_px: 28.0,
            drag_activation_px: 6.0,
            working_days_per_week: 5,
            mini_task_options: vec![
                "Design".to_string(),
                "Design review".to_string(),
                "CDP".to_string(),
                "Client comments".to_string(),
                "Delays".to_string(),
            ],
            default_sequence: vec![
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
            ],
            document: DocumentSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_span_days < 1 {
            return Err(ConfigError::Invalid("min_span_days must be at least 1".to_string()));
        }
        if !(self.day_width_px.is_finite() && self.day_width_px > 0.0) {
            return Err(ConfigError::Invalid("day_width_px must be positive".to_string()));
        }
        if !(self.drag_activation_px.is_finite() && self.drag_activation_px >= 0.0) {
            return Err(ConfigError::Invalid(
                "drag_activation_px must not be negative".to_string(),
            ));
        }
        if self.working_days_per_week < 1 || self.working_days_per_week > 7 {
            return Err(ConfigError::Invalid(
                "working_days_per_week must be between 1 and 7".to_string(),
            ));
        }
        if let Some(step) = self
            .default_sequence
            .iter()
            .find(|step| !(step.weight.is_finite() && step.weight >= 0.0))
        {
            return Err(ConfigError::Invalid(format!(
                "default_sequence step {:?} has an invalid weight",
                step.name
            )));
        }
        if self.document.rows_per_page == 0 || self.document.day_column_width == 0 {
            return Err(ConfigError::Invalid(
                "document rows_per_page and day_column_width must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_from_path(path: &Path) -> Result<Settings, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings following the resolution order in the module docs. An
/// explicitly named file must exist; the implicit default file may not.
pub fn load_settings(cli_path: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = cli_path {
        return load_from_path(path);
    }

    if let Some(path) = env::var_os("CHRONOS_GANTT_CONFIG") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return load_from_path(&path);
        }
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    match load_from_path(&default_path) {
        Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using built-in settings");
            Ok(Settings::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Settings, load_from_path};
    use crate::error::ConfigError;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().expect("defaults should validate");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "min_span_days = 21\n[document]\nrows_per_page = 10").expect("write");
        let settings = load_from_path(file.path()).expect("settings should load");
        assert_eq!(settings.min_span_days, 21);
        assert_eq!(settings.document.rows_per_page, 10);
        assert_eq!(settings.document.name_column_width, 28);
        assert_eq!(settings.day_width_px, Settings::default().day_width_px);
    }

    #[test]
    fn rejects_non_positive_day_width() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "day_width_px = 0.0").expect("write");
        assert!(matches!(load_from_path(file.path()), Err(ConfigError::Invalid(_))));
    }
}

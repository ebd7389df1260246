use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::RegistryError;

const RECENT_SCHEDULES_FILE: &str = "recent_schedules.txt";
const MAX_RECENT_SCHEDULES: usize = 50;
const STATE_DIR_NAME: &str = "chronos_gantt";

/// Most-recently-used schedule paths, newest first, one per line in the
/// state directory.
#[derive(Debug, Clone)]
pub struct RecentSchedules {
	dir: PathBuf,
}

impl RecentSchedules {
	pub fn from_env() -> Self {
		Self::in_dir(state_dir_from(|key| env::var_os(key)))
	}

	pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn list(&self, limit: usize) -> Result<Vec<PathBuf>, RegistryError> {
		let path = self.file();
		let raw = match fs::read_to_string(&path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(source) => return Err(RegistryError::Io { path, source }),
		};

		Ok(raw
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.take(limit)
			.map(PathBuf::from)
			.collect())
	}

	/// Moves `path` to the front of the list.
	pub fn remember(&self, path: &Path) -> Result<(), RegistryError> {
		let path = absolutize(path.to_path_buf());
		let mut entries = self.list(MAX_RECENT_SCHEDULES)?;
		entries.retain(|entry| entry != &path);
		entries.insert(0, path);
		entries.truncate(MAX_RECENT_SCHEDULES);
		self.save(&entries)
	}

	pub fn most_recent(&self) -> Result<Option<PathBuf>, RegistryError> {
		Ok(self.list(1)?.into_iter().next())
	}

	fn save(&self, entries: &[PathBuf]) -> Result<(), RegistryError> {
		let io_error = |source| RegistryError::Io {
			path: self.file(),
			source,
		};
		fs::create_dir_all(&self.dir).map_err(io_error)?;

		let mut file = fs::File::create(self.file()).map_err(io_error)?;
		for path in entries {
			writeln!(file, "{}", path.display()).map_err(io_error)?;
		}

		Ok(())
	}

	fn file(&self) -> PathBuf {
		self.dir.join(RECENT_SCHEDULES_FILE)
	}
}

/// `--schedule`, then `CHRONOS_GANTT_SCHEDULE`, then the most recent entry.
pub fn resolve_schedule_path(cli_path: Option<PathBuf>, recent: &RecentSchedules) -> Result<PathBuf, RegistryError> {
	resolve_from(cli_path, env::var_os("CHRONOS_GANTT_SCHEDULE"), recent)
}

fn resolve_from(
	cli_path: Option<PathBuf>,
	env_path: Option<OsString>,
	recent: &RecentSchedules,
) -> Result<PathBuf, RegistryError> {
	if let Some(path) = cli_path {
		return Ok(absolutize(path));
	}

	if let Some(path) = env_path.filter(|path| !path.is_empty()) {
		return Ok(absolutize(PathBuf::from(path)));
	}

	match recent.most_recent() {
		Ok(Some(path)) => Ok(path),
		Ok(None) => Err(RegistryError::NoSchedule),
		Err(err) => {
			tracing::warn!(error = %err, "failed to read recent schedules");
			Err(RegistryError::NoSchedule)
		}
	}
}

fn state_dir_from(lookup: impl Fn(&str) -> Option<OsString>) -> PathBuf {
	let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

	if let Some(path) = var("CHRONOS_GANTT_STATE_DIR") {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = var("LOCALAPPDATA") {
			return PathBuf::from(path).join(STATE_DIR_NAME);
		}
	}

	if let Some(path) = var("XDG_STATE_HOME") {
		return PathBuf::from(path).join(STATE_DIR_NAME);
	}

	if let Some(path) = var("HOME") {
		return PathBuf::from(path).join(".local").join("state").join(STATE_DIR_NAME);
	}

	PathBuf::from(".chronos_gantt")
}

fn absolutize(path: PathBuf) -> PathBuf {
	let path = if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	};

	if path.exists() {
		fs::canonicalize(&path).unwrap_or(path)
	} else {
		path
	}
}

#[cfg(test)]
mod tests {
	use std::ffi::OsString;
	use std::fs;
	use std::path::PathBuf;

	use tempfile::tempdir;

	use super::*;

	fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<OsString> + 'a {
		move |key: &str| {
			vars.iter()
				.find(|(name, _)| *name == key)
				.map(|(_, value)| OsString::from(value))
		}
	}

	#[test]
	fn absolutize_anchors_relative_paths_at_cwd() {
		let path = absolutize(PathBuf::from("plans/not-yet-created.schedule"));
		assert!(path.is_absolute());
		assert!(path.ends_with("plans/not-yet-created.schedule"));
	}

	#[test]
	fn state_dir_prefers_the_explicit_override() {
		let vars = [
			("CHRONOS_GANTT_STATE_DIR", "/srv/gantt-state"),
			("XDG_STATE_HOME", "/home/pm/.state"),
			("HOME", "/home/pm"),
		];
		assert_eq!(state_dir_from(lookup(&vars)), PathBuf::from("/srv/gantt-state"));
	}

	#[cfg(not(target_os = "windows"))]
	#[test]
	fn state_dir_falls_back_through_xdg_and_home() {
		let xdg = [("XDG_STATE_HOME", "/home/pm/.state"), ("HOME", "/home/pm")];
		assert_eq!(state_dir_from(lookup(&xdg)), PathBuf::from("/home/pm/.state/chronos_gantt"));

		let home = [("CHRONOS_GANTT_STATE_DIR", ""), ("HOME", "/home/pm")];
		assert_eq!(
			state_dir_from(lookup(&home)),
			PathBuf::from("/home/pm/.local/state/chronos_gantt")
		);

		assert_eq!(state_dir_from(lookup(&[])), PathBuf::from(".chronos_gantt"));
	}

	#[test]
	fn missing_recent_file_lists_nothing() {
		let dir = tempdir().expect("tempdir");
		let recent = RecentSchedules::in_dir(dir.path().join("state"));
		assert!(recent.list(10).expect("list").is_empty());
		assert_eq!(recent.most_recent().expect("recent"), None);
	}

	#[test]
	fn remember_moves_existing_entry_to_front_without_duplicates() {
		let dir = tempdir().expect("tempdir");
		let recent = RecentSchedules::in_dir(dir.path().join("state"));
		let office = dir.path().join("office.schedule");
		let depot = dir.path().join("depot.schedule");

		recent.remember(&office).expect("remember");
		recent.remember(&depot).expect("remember");
		recent.remember(&office).expect("remember");

		assert_eq!(recent.list(10).expect("list"), vec![office.clone(), depot]);
		assert_eq!(recent.most_recent().expect("recent"), Some(office));
	}

	#[test]
	fn remember_keeps_only_the_newest_entries() {
		let dir = tempdir().expect("tempdir");
		let recent = RecentSchedules::in_dir(dir.path());
		for index in 0..MAX_RECENT_SCHEDULES + 5 {
			recent
				.remember(&dir.path().join(format!("plan-{index}.schedule")))
				.expect("remember");
		}

		let entries = recent.list(usize::MAX).expect("list");
		assert_eq!(entries.len(), MAX_RECENT_SCHEDULES);
		assert_eq!(
			entries.first(),
			Some(&dir.path().join(format!("plan-{}.schedule", MAX_RECENT_SCHEDULES + 4)))
		);
		assert_eq!(entries.last(), Some(&dir.path().join("plan-5.schedule")));
		assert_eq!(recent.list(3).expect("list").len(), 3);
	}

	#[test]
	fn unreadable_recent_file_reports_its_path() {
		let dir = tempdir().expect("tempdir");
		fs::create_dir(dir.path().join(RECENT_SCHEDULES_FILE)).expect("mkdir");
		let recent = RecentSchedules::in_dir(dir.path());
		match recent.list(10) {
			Err(RegistryError::Io { path, .. }) => assert_eq!(path, dir.path().join(RECENT_SCHEDULES_FILE)),
			other => panic!("expected io error, got {other:?}"),
		}
	}

	#[test]
	fn resolution_order_is_flag_then_env_then_recent() {
		let dir = tempdir().expect("tempdir");
		let recent = RecentSchedules::in_dir(dir.path());
		assert!(matches!(resolve_from(None, None, &recent), Err(RegistryError::NoSchedule)));

		let remembered = dir.path().join("remembered.schedule");
		recent.remember(&remembered).expect("remember");
		assert_eq!(resolve_from(None, Some(OsString::new()), &recent).expect("resolve"), remembered);

		let from_env = dir.path().join("env.schedule");
		assert_eq!(
			resolve_from(None, Some(from_env.clone().into_os_string()), &recent).expect("resolve"),
			from_env
		);

		let from_flag = dir.path().join("flag.schedule");
		assert_eq!(
			resolve_from(Some(from_flag.clone()), Some(from_env.into_os_string()), &recent).expect("resolve"),
			from_flag
		);
	}
}

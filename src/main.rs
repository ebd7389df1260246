use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use chronos_gantt::calendar::{format_day, parse_day};
use chronos_gantt::config::{Settings, load_settings};
use chronos_gantt::document;
use chronos_gantt::domain::{EntryType, Period, Schedule, Task};
use chronos_gantt::error::ScheduleError;
use chronos_gantt::ledger::{self, DurationUnit, PoolPolicy};
use chronos_gantt::logging::{LogLevel, init_logging};
use chronos_gantt::projection;
use chronos_gantt::schedules::{RecentSchedules, resolve_schedule_path};
use chronos_gantt::storage::{load_schedule, save_schedule};
use chronos_gantt::ui::run_gantt_view;

#[derive(Debug, Parser)]
#[command(name = "chronos-gantt", about = "Terminal-first Gantt scheduler")]
struct Cli {
	#[arg(long, global = true)]
	schedule: Option<PathBuf>,
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[arg(long, global = true, value_enum)]
	log_level: Option<LogLevel>,
	/// Overrides today's date (YYYY-MM-DD) for highlighting.
	#[arg(long, global = true)]
	today: Option<String>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Init {
		#[arg(long)]
		name: Option<String>,
	},
	View,
	AddTask {
		#[arg(long)]
		name: String,
		#[arg(long)]
		start: Option<String>,
		#[arg(long)]
		end: Option<String>,
		/// Stage id or outline number to nest the task under.
		#[arg(long)]
		stage: Option<String>,
		#[arg(long)]
		single_event: bool,
		/// Split the task into the configured default mini-task sequence.
		#[arg(long)]
		sequence: bool,
	},
	AddStage {
		#[arg(long)]
		name: String,
	},
	SetDates {
		#[arg(long)]
		task: String,
		#[arg(long)]
		start: Option<String>,
		#[arg(long)]
		end: Option<String>,
	},
	AddMini {
		#[arg(long)]
		task: String,
		#[arg(long)]
		name: String,
		#[arg(long, default_value_t = 1)]
		duration: i64,
		/// Read `--duration` as working weeks.
		#[arg(long)]
		weeks: bool,
	},
	Adjust {
		#[arg(long)]
		task: String,
		#[arg(long)]
		segment: String,
		/// Working days to add (negative to remove).
		#[arg(
			long,
			allow_hyphen_values = true,
			value_parser = clap::value_parser!(i64).range(-ledger::MAX_ADJUST_DAYS..=ledger::MAX_ADJUST_DAYS)
		)]
		delta: i64,
		/// Let the task grow when no day can be borrowed.
		#[arg(long)]
		extend: bool,
	},
	RenameMini {
		#[arg(long)]
		task: String,
		#[arg(long)]
		segment: String,
		#[arg(long)]
		name: String,
	},
	Lock {
		#[arg(long)]
		task: String,
		#[arg(long)]
		segment: String,
	},
	AddDeadline {
		#[arg(long)]
		name: String,
		#[arg(long)]
		start: String,
		#[arg(long)]
		end: Option<String>,
	},
	AddStanddown {
		#[arg(long)]
		name: String,
		#[arg(long)]
		start: String,
		#[arg(long)]
		end: String,
	},
	List,
	Timeline,
	Export {
		#[arg(long)]
		output: Option<PathBuf>,
	},
	Schedules {
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	init_logging(cli.log_level);

	let recent = RecentSchedules::from_env();
	if let Some(Command::Schedules { limit }) = &cli.command {
		print_recent_schedules(&recent, *limit)?;
		return Ok(());
	}

	let settings = load_settings(cli.config.as_deref())?;
	let today = match cli.today.as_deref() {
		Some(raw) => require_day(raw)?,
		None => Local::now().date_naive(),
	};

	let schedule_path = resolve_schedule_path(cli.schedule, &recent)?;
	let mut schedule = load_schedule(&schedule_path)?;
	if let Err(err) = recent.remember(&schedule_path) {
		tracing::warn!(error = %err, "failed to store recent schedule");
	}

	match cli.command.unwrap_or(Command::View) {
		Command::Init { name } => {
			if let Some(name) = name {
				schedule.header.name = name;
			}
			save_schedule(&schedule_path, &schedule)?;
			println!("initialized schedule at {}", schedule_path.display());
		}
		Command::View => {
			run_gantt_view(&mut schedule, &schedule_path, &settings, today)?;
		}
		Command::AddTask {
			name,
			start,
			end,
			stage,
			single_event,
			sequence,
		} => {
			let task_id = add_task(&mut schedule, &settings, name, start, end, stage, single_event, sequence)?;
			commit(&schedule_path, &mut schedule)?;
			println!("created task {task_id}");
		}
		Command::AddStage { name } => {
			let stage_id = schedule.insert_task(Task::new(name, EntryType::Stage))?;
			commit(&schedule_path, &mut schedule)?;
			println!("created stage {stage_id}");
		}
		Command::SetDates { task, start, end } => {
			let task_id = find_task_id(&schedule, &task)?;
			set_dates(&mut schedule, &task_id, start.as_deref(), end.as_deref())?;
			commit(&schedule_path, &mut schedule)?;
			if let Some(task) = schedule.task(&task_id) {
				println!(
					"{} now runs {} -> {}",
					task.display_name(),
					date_text(task.start_date),
					date_text(task.end_date)
				);
			}
		}
		Command::AddMini {
			task,
			name,
			duration,
			weeks,
		} => {
			let task_id = find_task_id(&schedule, &task)?;
			if !settings.mini_task_options.iter().any(|option| option == &name) {
				tracing::warn!(name = %name, "mini-task name is not one of the configured options");
			}
			let unit = if weeks { DurationUnit::Weeks } else { DurationUnit::Days };
			let days = unit.to_days(duration, settings.working_days_per_week);
			let calendar = schedule.calendar();
			let segment_id = ledger::add_segment(schedule.require_task_mut(&task_id)?, &name, days, &calendar)?;
			commit(&schedule_path, &mut schedule)?;
			println!("added mini-task {segment_id} ({days}d)");
		}
		Command::Adjust {
			task,
			segment,
			delta,
			extend,
		} => {
			let task_id = find_task_id(&schedule, &task)?;
			let policy = if extend { PoolPolicy::Extend } else { PoolPolicy::Fixed };
			let calendar = schedule.calendar();
			let report = ledger::adjust_task(schedule.require_task_mut(&task_id)?, &segment, delta, policy, &calendar)?;
			if report.achieved != 0 {
				commit(&schedule_path, &mut schedule)?;
			}
			match report.refusal {
				Some(refusal) => println!("adjusted {segment} by {} of {delta} days: {refusal}", report.achieved),
				None => println!("adjusted {segment} by {} days", report.achieved),
			}
		}
		Command::RenameMini { task, segment, name } => {
			let task_id = find_task_id(&schedule, &task)?;
			ledger::rename_segment(schedule.require_task_mut(&task_id)?, &segment, &name)?;
			commit(&schedule_path, &mut schedule)?;
			println!("renamed {segment} to {name}");
		}
		Command::Lock { task, segment } => {
			let task_id = find_task_id(&schedule, &task)?;
			let locked = ledger::toggle_lock(schedule.require_task_mut(&task_id)?, &segment)?;
			commit(&schedule_path, &mut schedule)?;
			println!("{segment} {}", if locked { "locked" } else { "unlocked" });
		}
		Command::AddDeadline { name, start, end } => {
			let start = require_day(&start)?;
			let end = match end.as_deref() {
				Some(raw) => require_day(raw)?,
				None => start,
			};
			schedule.add_deadline(Period::new(name, start, end));
			commit(&schedule_path, &mut schedule)?;
			println!("added deadline {} -> {}", format_day(start), format_day(end));
		}
		Command::AddStanddown { name, start, end } => {
			let start = require_day(&start)?;
			let end = require_day(&end)?;
			schedule.add_standdown(Period::new(name, start, end));
			realign_tasks(&mut schedule);
			commit(&schedule_path, &mut schedule)?;
			println!("added stand-down {} -> {}", format_day(start), format_day(end));
		}
		Command::List => {
			print_tasks(&schedule);
		}
		Command::Timeline => {
			let projection = projection::build(&schedule, Some(today), &settings);
			println!("{}", serde_json::to_string_pretty(&projection)?);
		}
		Command::Export { output } => {
			let projection = projection::build(&schedule, Some(today), &settings);
			let text = document::render(&projection, &settings.document).to_text();
			match output {
				Some(path) => {
					write_document(&path, &text)?;
					println!("exported {}", path.display());
				}
				None => println!("{text}"),
			}
		}
		Command::Schedules { .. } => {}
	}

	Ok(())
}

#[allow(clippy::too_many_arguments)]
fn add_task(
	schedule: &mut Schedule,
	settings: &Settings,
	name: String,
	start: Option<String>,
	end: Option<String>,
	stage: Option<String>,
	single_event: bool,
	sequence: bool,
) -> Result<String, Box<dyn Error>> {
	let calendar = schedule.calendar();
	let mut task = Task::new(name, EntryType::Task);
	task.single_event = single_event;
	task.parent_id = stage.map(|key| find_task_id(schedule, &key)).transpose()?;

	if let Some(raw) = start.as_deref() {
		let start = calendar
			.ensure_working_day(require_day(raw)?, 1)
			.ok_or_else(|| ScheduleError::InvalidDate(raw.to_string()))?;
		let end = match end.as_deref() {
			Some(raw) if !single_event => require_day(raw)?,
			_ => start,
		};
		if end < start {
			return Err(ScheduleError::InvalidDate(format!("end {} is before start {}", format_day(end), format_day(start))).into());
		}
		task.start_date = Some(start);
		task.end_date = Some(end);
		if sequence && !single_event {
			ledger::apply_default_sequence(&mut task, &settings.default_sequence, &calendar)?;
		} else {
			ledger::sync_total(&mut task, &calendar);
		}
	}

	Ok(schedule.insert_task(task)?)
}

fn set_dates(schedule: &mut Schedule, task_id: &str, start: Option<&str>, end: Option<&str>) -> Result<(), Box<dyn Error>> {
	let calendar = schedule.calendar();
	let task = schedule.require_task_mut(task_id)?;
	if task.is_stage() {
		return Err(ScheduleError::StageNotEditable(task_id.to_string()).into());
	}
	let start = start.map(require_day).transpose()?;
	let end = end.map(require_day).transpose()?;

	let (current_start, current_end) = match (task.start_date, task.end_date) {
		(Some(current_start), Some(current_end)) => (current_start, current_end),
		_ => {
			let (Some(start), Some(end)) = (start, end) else {
				return Err(ScheduleError::UndatedTask(task_id.to_string()).into());
			};
			task.start_date = Some(start);
			task.end_date = Some(end.max(start));
			ledger::sync_total(task, &calendar);
			return Ok(());
		}
	};

	if let Some(start) = start {
		ledger::apply_new_start(task, start, current_end, &calendar)
			.ok_or_else(|| ScheduleError::InvalidDate(format_day(start)))?;
	}
	if let Some(end) = end {
		let fixed_start = task.start_date.unwrap_or(current_start);
		ledger::apply_new_end(task, fixed_start, end, &calendar).ok_or_else(|| ScheduleError::InvalidDate(format_day(end)))?;
	}
	Ok(())
}

/// Stand-down edits change working-day counts, so pools follow the dates.
fn realign_tasks(schedule: &mut Schedule) {
	let calendar = schedule.calendar();
	for task in &mut schedule.tasks {
		ledger::sync_total(task, &calendar);
	}
}

fn commit(path: &Path, schedule: &mut Schedule) -> Result<(), Box<dyn Error>> {
	schedule.update_stage_summaries();
	save_schedule(path, schedule)?;
	Ok(())
}

/// Accepts a task id or its outline number (`2.1`).
fn find_task_id(schedule: &Schedule, key: &str) -> Result<String, ScheduleError> {
	if schedule.task(key).is_some() {
		return Ok(key.to_string());
	}
	schedule
		.task_identifiers()
		.into_iter()
		.find(|(_, identifier)| identifier == key)
		.map(|(id, _)| id)
		.ok_or_else(|| ScheduleError::TaskNotFound(key.to_string()))
}

fn require_day(raw: &str) -> Result<NaiveDate, ScheduleError> {
	parse_day(raw).ok_or_else(|| ScheduleError::InvalidDate(raw.to_string()))
}

fn date_text(day: Option<NaiveDate>) -> String {
	day.map(format_day).unwrap_or_else(|| "-".to_string())
}

fn write_document(path: &Path, text: &str) -> Result<(), Box<dyn Error>> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent)?;
		}
	}
	fs::write(path, format!("{text}\n"))?;
	Ok(())
}

fn print_recent_schedules(recent: &RecentSchedules, limit: usize) -> Result<(), Box<dyn Error>> {
	let rows = recent.list(limit)?;
	if rows.is_empty() {
		println!("no recent schedules");
		return Ok(());
	}

	for (index, path) in rows.iter().enumerate() {
		println!("{:>2}. {}", index + 1, path.display());
	}

	Ok(())
}

fn print_tasks(schedule: &Schedule) {
	if schedule.tasks.is_empty() {
		println!("no tasks yet");
		return;
	}

	let calendar = schedule.calendar();
	let identifiers = schedule.task_identifiers();
	for entry in schedule.ordered_tasks() {
		let task = &schedule.tasks[entry.index];
		let identifier = identifiers.get(&task.id).map(String::as_str).unwrap_or("-");
		println!(
			"{}{} | {} | {} | {} -> {} | {}d | {}%",
			"  ".repeat(entry.depth),
			identifier,
			task.id,
			task.display_name(),
			date_text(task.start_date),
			date_text(task.end_date),
			task.duration(&calendar),
			task.progress
		);
		for segment in task.mini_tasks.iter().filter(|segment| segment.enabled) {
			println!(
				"{}    - {} | {} | {}d{}",
				"  ".repeat(entry.depth),
				segment.id,
				segment.name,
				segment.duration,
				if segment.locked { " | locked" } else { "" }
			);
		}
		if !task.is_stage() && task.undefined_duration > 0 {
			println!("{}    - unallocated | {}d", "  ".repeat(entry.depth), task.undefined_duration);
		}
	}
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::{Cli, Command};

	fn parse_adjust(delta: &str) -> Result<Cli, clap::Error> {
		Cli::try_parse_from(["chronos-gantt", "adjust", "--task", "1", "--segment", "design", "--delta", delta])
	}

	#[test]
	fn adjust_accepts_negative_deltas() {
		let cli = parse_adjust("-3").expect("parse");
		assert!(matches!(cli.command, Some(Command::Adjust { delta: -3, .. })));
	}

	#[test]
	fn adjust_rejects_deltas_beyond_the_limit() {
		assert!(parse_adjust("9223372036854775807").is_err());
		assert!(parse_adjust("-100000").is_err());
		assert!(parse_adjust("3660").is_ok());
	}
}

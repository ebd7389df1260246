use std::error::Error;
use std::io;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{Datelike, NaiveDate};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use crate::calendar::{format_display_day, parse_day};
use crate::config::Settings;
use crate::domain::{EntryType, Schedule, Task};
use crate::highlight::HighlightKind;
use crate::interaction::{self, Edge, GestureController, GestureMetrics};
use crate::ledger::{self, DurationUnit, PoolPolicy, SpanKind};
use crate::projection::{self, ProjectedRow, ScheduleProjection};
use crate::storage::save_schedule;
use crate::timeline::ViewMode;

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);
const SEGMENT_COLORS: [Color; 6] = [
	Color::Blue,
	Color::Green,
	Color::Cyan,
	Color::Magenta,
	Color::LightBlue,
	Color::LightGreen,
];
const NAME_COLUMN_WIDTH: usize = 26;
const SCROLL_DAYS: usize = 7;

pub fn run_gantt_view(
	schedule: &mut Schedule,
	schedule_path: &Path,
	settings: &Settings,
	today: NaiveDate,
) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, schedule, schedule_path, settings, today);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	schedule: &mut Schedule,
	schedule_path: &Path,
	settings: &Settings,
	today: NaiveDate,
) -> Result<(), Box<dyn Error>> {
	let mut app = App::new(&build_view(&App::default(), schedule, settings, today), today);

	loop {
		let view = build_view(&app, schedule, settings, today);
		app.clamp_selection(&view);
		terminal.draw(|frame| draw_gantt(frame, &mut app, &view))?;

		if event::poll(StdDuration::from_millis(250))? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}

				let should_quit = match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, schedule, schedule_path, settings, today),
					InputMode::Select(_) => handle_select_key(&mut app, key.code),
					InputMode::Normal => handle_normal_key(&mut app, key.code, schedule, schedule_path, settings, &view),
				};

				if should_quit {
					break;
				}
			}
		}
	}

	Ok(())
}

fn draw_gantt(frame: &mut Frame, app: &mut App, view: &ViewModel) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(10), Constraint::Length(5)])
		.split(frame.area());

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
		.split(layout[0]);

	render_chart_panel(frame, body[0], app, view);
	render_details_panel(frame, body[1], app, view);
	render_footer(frame, layout[1], app);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_chart_panel(frame: &mut Frame, area: Rect, app: &mut App, view: &ViewModel) {
	let projection = &view.projection;
	let title = format!(
		"{} | {} view",
		if projection.name.trim().is_empty() {
			"Schedule"
		} else {
			projection.name.trim()
		},
		match app.view_mode {
			ViewMode::Days => "days",
			ViewMode::Weeks => "weeks",
		}
	);
	let block = Block::default()
		.borders(Borders::ALL)
		.title(title)
		.border_style(border_style(app.focus == FocusPane::Tasks));
	let inner = block.inner(area);
	frame.render_widget(block, area);

	let sections = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(2), Constraint::Min(1)])
		.split(inner);

	let cell = cell_chars(app.view_mode);
	app.visible_days = (usize::from(inner.width).saturating_sub(NAME_COLUMN_WIDTH) / cell).max(1);
	let window = DayWindow {
		start: app.day_offset.min(projection.day_count().saturating_sub(1)),
		len: app.visible_days,
		cell,
	};

	frame.render_widget(Paragraph::new(chart_header(projection, &window, app.view_mode)), sections[0]);

	let editing = app.gesture.as_ref().map(|gesture| gesture.controller.task_id().to_string());
	let items = projection
		.rows
		.iter()
		.map(|row| ListItem::new(chart_row(projection, row, &window, editing.as_deref() == Some(row.task_id.as_str()))))
		.collect::<Vec<_>>();

	let mut state = ListState::default();
	if !projection.rows.is_empty() {
		state.select(Some(app.task_index.min(projection.rows.len() - 1)));
	}

	let list = List::new(if items.is_empty() {
		vec![ListItem::new("(no tasks, press n to add one)")]
	} else {
		items
	})
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, sections[1], &mut state);
}

/// Slice of the day axis currently on screen.
#[derive(Debug, Clone, Copy)]
struct DayWindow {
	start: usize,
	len: usize,
	cell: usize,
}

impl DayWindow {
	fn indices(&self, day_count: usize) -> std::ops::Range<usize> {
		self.start.min(day_count)..(self.start + self.len).min(day_count)
	}
}

fn chart_header(projection: &ScheduleProjection, window: &DayWindow, view_mode: ViewMode) -> Vec<Line<'static>> {
	let indices = window.indices(projection.day_count());
	let width = indices.len() * window.cell;
	let mut months = vec![' '; width];
	let mut days = vec![' '; width];

	for group in &projection.groups_by_month {
		let first = group.start_index.max(indices.start);
		if first > group.end_index || first >= indices.end {
			continue;
		}
		place_label(&mut months, &group.label, (first - indices.start) * window.cell);
	}

	match view_mode {
		ViewMode::Days => {
			for index in indices.clone() {
				if let Some(day) = projection.days.get(index) {
					place_label(&mut days, &format!("{:02}", day.date.day()), (index - indices.start) * window.cell);
				}
			}
		}
		ViewMode::Weeks => {
			for boundary in projection
				.monday_boundaries
				.iter()
				.filter(|boundary| indices.contains(&boundary.index))
			{
				place_label(
					&mut days,
					&boundary.monday.format("%d/%m").to_string(),
					(boundary.index - indices.start) * window.cell,
				);
			}
		}
	}

	let pad = " ".repeat(NAME_COLUMN_WIDTH);
	vec![
		Line::from(format!("{pad}{}", months.into_iter().collect::<String>())),
		Line::from(Span::styled(
			format!("{pad}{}", days.into_iter().collect::<String>()),
			Style::default().fg(Color::DarkGray),
		)),
	]
}

fn place_label(line: &mut [char], label: &str, offset: usize) {
	if offset >= line.len() {
		return;
	}
	for (slot, ch) in line[offset..].iter_mut().zip(label.chars()) {
		*slot = ch;
	}
}

fn chart_row(projection: &ScheduleProjection, row: &ProjectedRow, window: &DayWindow, editing: bool) -> Line<'static> {
	let label = format!("{}{} {}", "  ".repeat(row.depth), row.identifier, row.name);
	let mut spans = vec![Span::styled(
		format!("{:<width$}", fit(&label, NAME_COLUMN_WIDTH - 1), width = NAME_COLUMN_WIDTH),
		if row.is_stage() {
			Style::default().add_modifier(Modifier::BOLD)
		} else {
			Style::default()
		},
	)];

	for index in window.indices(projection.day_count()) {
		let (glyph, mut style) = day_cell(projection, row, index);
		if editing && row.covers(index) {
			style = style.add_modifier(Modifier::BOLD);
		}
		spans.push(Span::styled(std::iter::repeat_n(glyph, window.cell).collect::<String>(), style));
	}

	Line::from(spans)
}

fn day_cell(projection: &ScheduleProjection, row: &ProjectedRow, index: usize) -> (char, Style) {
	if !row.covers(index) {
		let kind = projection
			.highlight(index)
			.and_then(|highlights| highlights.kinds.iter().max().copied());
		return match kind {
			Some(HighlightKind::Today) => ('│', Style::default().fg(Color::Red)),
			Some(HighlightKind::Deadline) => ('!', Style::default().fg(Color::LightRed)),
			Some(HighlightKind::Standdown) => ('~', Style::default().fg(Color::DarkGray)),
			None => (' ', Style::default()),
		};
	}
	if row.is_stage() {
		return ('═', Style::default().fg(Color::Magenta));
	}
	if row.single_event {
		return ('◆', Style::default().fg(Color::Yellow));
	}
	if projection.days.get(index).is_some_and(|day| !day.working_day) {
		return ('·', Style::default().fg(Color::DarkGray));
	}

	let complete = row.progress_fill_at(index).is_some_and(|fill| fill >= 0.5);
	let glyph = if complete { '█' } else { '▒' };
	match row.segment_at(index) {
		Some(span) if span.kind == SpanKind::Undefined => ('░', Style::default().fg(Color::DarkGray)),
		Some(span) if span.kind == SpanKind::Segment => {
			let position = row
				.segments
				.iter()
				.filter(|candidate| candidate.kind == SpanKind::Segment)
				.position(|candidate| candidate.segment_id == span.segment_id)
				.unwrap_or(0);
			let mut style = Style::default().fg(SEGMENT_COLORS[position % SEGMENT_COLORS.len()]);
			if span.locked {
				style = style.add_modifier(Modifier::UNDERLINED);
			}
			(glyph, style)
		}
		_ => (glyph, Style::default().fg(Color::Gray)),
	}
}

fn render_details_panel(frame: &mut Frame, area: Rect, app: &App, view: &ViewModel) {
	let mut lines = Vec::new();
	match (&view.selected, view.projection.rows.get(app.task_index)) {
		(Some(task), Some(row)) => {
			lines.push(Line::from(Span::styled(
				format!("{} {}", row.identifier, row.name),
				Style::default().add_modifier(Modifier::BOLD),
			)));
			lines.push(Line::from(format!("Start: {}", date_text(row.start_date))));
			lines.push(Line::from(format!("End:   {}", date_text(row.end_date))));
			lines.push(Line::from(format!("Working days: {}", row.duration)));
			lines.push(Line::from(format!("Progress: {}%", row.progress)));

			if !task.is_stage() && !task.single_event {
				lines.push(Line::from(""));
				lines.push(Line::from("Mini-tasks:"));
				let enabled = enabled_segment_ids(task);
				if enabled.is_empty() {
					lines.push(Line::from(Span::styled("  (none)", Style::default().fg(Color::DarkGray))));
				}
				for (position, segment_id) in enabled.iter().enumerate() {
					let Some(segment) = task.mini_task(segment_id) else {
						continue;
					};
					let selected = app.focus == FocusPane::Segments && position == app.segment_index;
					let style = if selected {
						Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
					} else {
						Style::default().fg(SEGMENT_COLORS[position % SEGMENT_COLORS.len()])
					};
					lines.push(Line::from(vec![
						Span::raw(if selected { "> " } else { "  " }),
						Span::styled(format!("{} {}d", segment.name, segment.duration), style),
						Span::raw(if segment.locked { " [locked]" } else { "" }),
					]));
				}
				if task.undefined_duration > 0 {
					lines.push(Line::from(Span::styled(
						format!("  unallocated {}d", task.undefined_duration),
						Style::default().fg(Color::DarkGray),
					)));
				}
			}
		}
		_ => lines.push(Line::from("(nothing selected)")),
	}

	if let Some(gesture) = &app.gesture {
		let preview = gesture.controller.preview();
		lines.push(Line::from(""));
		lines.push(Line::from(Span::styled(
			format!("{}: {:+}d, {}%", gesture.label, preview.day_delta, preview.progress),
			Style::default().fg(Color::Yellow),
		)));
	}

	let panel = Paragraph::new(lines).block(
		Block::default()
			.borders(Borders::ALL)
			.title("Task")
			.border_style(border_style(app.focus == FocusPane::Segments)),
	);
	frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let footer_lines = match &app.mode {
		InputMode::Normal if app.gesture.is_some() => vec![
			Line::from("h/l or arrows move one day | Enter commit | Esc cancel"),
			Line::from(""),
			Line::from(app.status.clone()),
		],
		InputMode::Normal => vec![
			Line::from("Tab pane | j/k select | h/l scroll | t today | v days/weeks | n new task | a add mini-task | q quit"),
			Line::from(
				"m move bar | s/e resize start/end | r/R resize mini-task right/left | p progress | +/- adjust mini-task | L lock",
			),
			Line::from(app.status.clone()),
		],
		InputMode::Prompt(prompt) => vec![
			Line::from(prompt.title.clone()),
			Line::from(format!("> {}", prompt.input)),
			Line::from("Enter submit | Esc cancel"),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from(format!(
				"Selected: {}",
				select
					.selected_option()
					.map(|option| option.label.as_str())
					.unwrap_or("(none)")
			)),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(50, 50, frame.area());
	frame.render_widget(Clear, area);

	let items = if select.options.is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		select
			.options
			.iter()
			.map(|option| ListItem::new(option.label.clone()))
			.collect::<Vec<_>>()
	};

	let current = if select.options.is_empty() {
		0
	} else {
		select.selected.saturating_add(1)
	};
	let total = select.options.len();
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!("{} ({current}/{total})", select.title)),
		)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	if !select.options.is_empty() {
		state.select(Some(select.selected.min(select.options.len().saturating_sub(1))));
	}
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn handle_normal_key(
	app: &mut App,
	code: KeyCode,
	schedule: &mut Schedule,
	schedule_path: &Path,
	settings: &Settings,
	view: &ViewModel,
) -> bool {
	if app.gesture.is_some() {
		match code {
			KeyCode::Char('q') => return true,
			KeyCode::Left | KeyCode::Char('h') => nudge_gesture(app, -1.0),
			KeyCode::Right | KeyCode::Char('l') => nudge_gesture(app, 1.0),
			KeyCode::Enter => commit_gesture(app, schedule, schedule_path),
			KeyCode::Esc => cancel_gesture(app),
			_ => app.status = "Finish the current edit first: Enter commits, Esc cancels".to_string(),
		}
		return false;
	}

	match code {
		KeyCode::Char('q') => return true,
		KeyCode::Tab | KeyCode::BackTab => {
			app.focus = app.focus.toggled();
		}
		KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1, view),
		KeyCode::Down | KeyCode::Char('j') => app.move_selection(1, view),
		KeyCode::Left | KeyCode::Char('h') => {
			app.day_offset = app.day_offset.saturating_sub(SCROLL_DAYS);
		}
		KeyCode::Right | KeyCode::Char('l') => {
			app.day_offset = (app.day_offset + SCROLL_DAYS).min(view.projection.day_count().saturating_sub(1));
		}
		KeyCode::Char('t') => match view.projection.today.and_then(|today| view.projection.day_index_of(today)) {
			Some(index) => {
				app.day_offset = index.saturating_sub(app.visible_days / 2);
				app.status = "Jumped to today".to_string();
			}
			None => app.status = "Today is outside the timeline".to_string(),
		},
		KeyCode::Char('v') => {
			app.view_mode = app.view_mode.toggled();
			app.follow_selection(view);
			app.status = format!("{:?} view", app.view_mode);
		}
		KeyCode::Char('m') => start_gesture(app, schedule, settings, view, GestureRequest::Drag),
		KeyCode::Char('s') => start_gesture(app, schedule, settings, view, GestureRequest::Resize(Edge::Start)),
		KeyCode::Char('e') => start_gesture(app, schedule, settings, view, GestureRequest::Resize(Edge::End)),
		KeyCode::Char('r') => start_gesture(app, schedule, settings, view, GestureRequest::Segment(Edge::End)),
		KeyCode::Char('R') => start_gesture(app, schedule, settings, view, GestureRequest::Segment(Edge::Start)),
		KeyCode::Char('p') => start_gesture(app, schedule, settings, view, GestureRequest::Progress),
		KeyCode::Char('+') | KeyCode::Char('=') => adjust_selected_segment(app, schedule, schedule_path, view, 1),
		KeyCode::Char('-') => adjust_selected_segment(app, schedule, schedule_path, view, -1),
		KeyCode::Char('L') => {
			let Some((task_id, segment_id)) = app.selected_segment(view) else {
				app.status = "Select a mini-task first (Tab)".to_string();
				return false;
			};
			app.status = match schedule
				.require_task_mut(&task_id)
				.and_then(|task| ledger::toggle_lock(task, &segment_id))
			{
				Ok(locked) => match persist(schedule_path, schedule) {
					Ok(()) if locked => "Mini-task locked".to_string(),
					Ok(()) => "Mini-task unlocked".to_string(),
					Err(err) => format!("error: {err}"),
				},
				Err(err) => format!("error: {err}"),
			};
		}
		KeyCode::Char('n') => {
			app.mode = InputMode::Prompt(PromptState::new("New task name", PromptKind::NewTaskName));
		}
		KeyCode::Char('a') => match app.selected_task_id(view) {
			Some(task_id) if schedule.task(&task_id).is_some_and(|task| !task.is_stage() && !task.single_event) => {
				app.mode = InputMode::Select(build_mini_task_select(settings, task_id));
			}
			_ => app.status = "Select a task to add a mini-task to".to_string(),
		},
		_ => {}
	}

	false
}

fn start_gesture(app: &mut App, schedule: &Schedule, settings: &Settings, view: &ViewModel, request: GestureRequest) {
	let Some(row) = view.projection.rows.get(app.task_index) else {
		app.status = "No task selected".to_string();
		return;
	};
	let Some(task) = schedule.task(&row.task_id) else {
		return;
	};
	let calendar = schedule.calendar();
	let metrics = GestureMetrics::new(settings, app.view_mode);

	let started = match request {
		GestureRequest::Drag => interaction::begin_drag(task, metrics, &calendar).map(|controller| (controller, "Move")),
		GestureRequest::Resize(edge) => interaction::begin_resize(task, edge, metrics, &calendar).map(|controller| {
			(
				controller,
				match edge {
					Edge::Start => "Resize start",
					Edge::End => "Resize end",
				},
			)
		}),
		GestureRequest::Segment(edge) => {
			let Some((_, segment_id)) = app.selected_segment(view) else {
				app.status = "Select a mini-task first (Tab)".to_string();
				return;
			};
			interaction::begin_mini_segment_resize(task, &segment_id, edge, metrics, &calendar)
				.map(|controller| (controller, "Resize mini-task"))
		}
		GestureRequest::Progress => {
			let cells = match (row.start_index, row.end_index) {
				(Some(start), Some(end)) if end >= start => end - start + 1,
				_ => 1,
			};
			interaction::begin_progress(task, cells as f64 * metrics.day_width, metrics, &calendar)
				.map(|controller| (controller, "Progress"))
		}
	};

	match started {
		Ok((controller, label)) => {
			app.status = format!("{label}: h/l to move, Enter to commit, Esc to cancel");
			app.gesture = Some(ActiveGesture {
				controller,
				travel: 0.0,
				step: metrics.day_width,
				label,
			});
		}
		Err(err) => app.status = format!("error: {err}"),
	}
}

fn nudge_gesture(app: &mut App, direction: f64) {
	let Some(gesture) = app.gesture.as_mut() else {
		return;
	};
	gesture.travel += direction * gesture.step;
	app.status = match gesture.controller.on_move(gesture.travel) {
		Ok(preview) => format!(
			"{}: {:+}d | {} -> {}",
			gesture.label,
			preview.day_delta,
			date_text(preview.start_date),
			date_text(preview.end_date)
		),
		Err(err) => format!("error: {err}"),
	};
}

fn commit_gesture(app: &mut App, schedule: &mut Schedule, schedule_path: &Path) {
	let Some(mut gesture) = app.gesture.take() else {
		return;
	};
	let Some(task) = schedule.task_mut(gesture.controller.task_id()) else {
		app.status = "Task disappeared during the edit".to_string();
		return;
	};
	app.status = match gesture.controller.on_end(task) {
		Ok(true) => {
			schedule.update_stage_summaries();
			match persist(schedule_path, schedule) {
				Ok(()) => format!("{} saved", gesture.label),
				Err(err) => format!("error: {err}"),
			}
		}
		Ok(false) => "Nothing changed".to_string(),
		Err(err) => format!("error: {err}"),
	};
}

fn cancel_gesture(app: &mut App) {
	if let Some(mut gesture) = app.gesture.take() {
		app.status = match gesture.controller.on_cancel() {
			Ok(()) => format!("{} cancelled", gesture.label),
			Err(err) => format!("error: {err}"),
		};
	}
}

fn adjust_selected_segment(app: &mut App, schedule: &mut Schedule, schedule_path: &Path, view: &ViewModel, delta: i64) {
	let Some((task_id, segment_id)) = app.selected_segment(view) else {
		app.status = "Select a mini-task first (Tab)".to_string();
		return;
	};
	let calendar = schedule.calendar();
	let report = schedule
		.require_task_mut(&task_id)
		.and_then(|task| ledger::adjust_task(task, &segment_id, delta, PoolPolicy::Fixed, &calendar));
	app.status = match report {
		Ok(report) if report.achieved != 0 => {
			schedule.update_stage_summaries();
			match persist(schedule_path, schedule) {
				Ok(()) => format!("Mini-task {:+}d", report.achieved),
				Err(err) => format!("error: {err}"),
			}
		}
		Ok(report) => match report.refusal {
			Some(refusal) => format!("Unchanged: {refusal}"),
			None => "Unchanged".to_string(),
		},
		Err(err) => format!("error: {err}"),
	};
}

fn handle_prompt_key(
	app: &mut App,
	code: KeyCode,
	schedule: &mut Schedule,
	schedule_path: &Path,
	settings: &Settings,
	today: NaiveDate,
) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(prompt.clone(), schedule, schedule_path, settings, today) {
				Ok(PromptOutcome::NextPrompt(next_prompt)) => app.mode = InputMode::Prompt(next_prompt),
				Ok(PromptOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Prompt(prompt);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key(app: &mut App, code: KeyCode) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			match submit_select(select.clone()) {
				Ok(prompt) => app.mode = InputMode::Prompt(prompt),
				Err(err) => {
					app.mode = InputMode::Select(select);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn submit_prompt(
	prompt: PromptState,
	schedule: &mut Schedule,
	schedule_path: &Path,
	settings: &Settings,
	today: NaiveDate,
) -> Result<PromptOutcome, String> {
	match prompt.kind {
		PromptKind::NewTaskName => {
			let name = required_text(&prompt.input, "task name")?;
			Ok(PromptOutcome::NextPrompt(PromptState::new(
				"Start date (YYYY-MM-DD, blank for today)",
				PromptKind::NewTaskStart { name },
			)))
		}
		PromptKind::NewTaskStart { name } => {
			let start = match prompt.input.trim() {
				"" => today,
				raw => parse_day(raw).ok_or_else(|| format!("invalid date: {raw}"))?,
			};
			Ok(PromptOutcome::NextPrompt(PromptState::new(
				"Length in working days (or 3w for weeks)",
				PromptKind::NewTaskLength { name, start },
			)))
		}
		PromptKind::NewTaskLength { name, start } => {
			let days = parse_length(&prompt.input, settings.working_days_per_week)?;
			let calendar = schedule.calendar();
			let start = calendar
				.ensure_working_day(start, 1)
				.ok_or_else(|| "no working day on or after the start date".to_string())?;
			let end = calendar
				.shift_working_days(start, days - 1)
				.ok_or_else(|| "end date is out of range".to_string())?;
			let mut task = Task::new(name.clone(), EntryType::Task);
			task.start_date = Some(start);
			task.end_date = Some(end);
			ledger::apply_default_sequence(&mut task, &settings.default_sequence, &calendar).map_err(|err| err.to_string())?;
			schedule.insert_task(task).map_err(|err| err.to_string())?;
			persist(schedule_path, schedule)?;
			Ok(PromptOutcome::Done(format!("created task: {name}")))
		}
		PromptKind::MiniTaskLength { task_id, name } => {
			let days = parse_length(&prompt.input, settings.working_days_per_week)?;
			let calendar = schedule.calendar();
			let task = schedule.require_task_mut(&task_id).map_err(|err| err.to_string())?;
			ledger::add_segment(task, &name, days, &calendar).map_err(|err| err.to_string())?;
			schedule.update_stage_summaries();
			persist(schedule_path, schedule)?;
			Ok(PromptOutcome::Done(format!("added mini-task: {name} ({days}d)")))
		}
	}
}

fn submit_select(select: SelectState) -> Result<PromptState, String> {
	let selected_value = select
		.selected_option()
		.map(|option| option.value.clone())
		.ok_or_else(|| "no option selected".to_string())?;

	match select.kind {
		SelectKind::MiniTaskName { task_id } => Ok(PromptState::new(
			format!("{selected_value} length in working days (or 2w for weeks)"),
			PromptKind::MiniTaskLength {
				task_id,
				name: selected_value,
			},
		)),
	}
}

fn build_mini_task_select(settings: &Settings, task_id: String) -> SelectState {
	let options = settings
		.mini_task_options
		.iter()
		.map(|name| SelectOption::new(name.clone(), name.clone()))
		.collect();
	SelectState::new("Add mini-task", SelectKind::MiniTaskName { task_id }, options)
}

/// Applies the running gesture's preview to a copy of the schedule and
/// projects it.
fn build_view(app: &App, schedule: &Schedule, settings: &Settings, today: NaiveDate) -> ViewModel {
	let mut draft = schedule.clone();
	if let Some(gesture) = &app.gesture {
		if let Some(task) = draft.task_mut(gesture.controller.task_id()) {
			gesture.controller.preview().apply_to(task);
		}
	}
	let projection = projection::build(&draft, Some(today), settings);
	let selected = projection
		.rows
		.get(app.task_index)
		.and_then(|row| draft.task(&row.task_id))
		.cloned();
	ViewModel { projection, selected }
}

fn persist(path: &Path, schedule: &Schedule) -> Result<(), String> {
	save_schedule(path, schedule).map_err(|err| err.to_string())
}

fn required_text(input: &str, field_name: &str) -> Result<String, String> {
	let value = input.trim();
	if value.is_empty() {
		Err(format!("{field_name} is required"))
	} else {
		Ok(value.to_string())
	}
}

/// `5` is five working days, `2w` two working weeks.
fn parse_length(input: &str, working_days_per_week: i64) -> Result<i64, String> {
	let raw = input.trim().to_lowercase();
	let (number, unit) = match raw.strip_suffix('w') {
		Some(weeks) => (weeks.trim(), DurationUnit::Weeks),
		None => (raw.strip_suffix('d').unwrap_or(&raw).trim(), DurationUnit::Days),
	};
	let amount = number
		.parse::<i64>()
		.map_err(|_| format!("invalid length: {}", input.trim()))?;
	if amount < 1 {
		return Err("length must be at least one day".to_string());
	}
	Ok(unit.to_days(amount, working_days_per_week))
}

fn enabled_segment_ids(task: &Task) -> Vec<String> {
	task.mini_tasks
		.iter()
		.filter(|segment| segment.enabled)
		.map(|segment| segment.id.clone())
		.collect()
}

fn cell_chars(view_mode: ViewMode) -> usize {
	match view_mode {
		ViewMode::Days => 3,
		ViewMode::Weeks => 1,
	}
}

fn date_text(day: Option<NaiveDate>) -> String {
	day.map(format_display_day).unwrap_or_else(|| "-".to_string())
}

fn fit(text: &str, width: usize) -> String {
	if text.chars().count() <= width {
		return text.to_string();
	}
	let mut kept = text.chars().take(width.saturating_sub(1)).collect::<String>();
	kept.push('…');
	kept
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

#[derive(Debug, Clone)]
enum PromptOutcome {
	NextPrompt(PromptState),
	Done(String),
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind) -> Self {
		Self {
			title: title.into(),
			input: String::new(),
			kind,
		}
	}
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		if self.options.is_empty() {
			self.selected = 0;
			return;
		}

		if delta > 0 {
			self.selected = (self.selected + delta as usize).min(self.options.len() - 1);
		} else {
			self.selected = self.selected.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	value: String,
}

impl SelectOption {
	fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			value: value.into(),
		}
	}
}

#[derive(Debug, Clone)]
enum PromptKind {
	NewTaskName,
	NewTaskStart { name: String },
	NewTaskLength { name: String, start: NaiveDate },
	MiniTaskLength { task_id: String, name: String },
}

#[derive(Debug, Clone)]
enum SelectKind {
	MiniTaskName { task_id: String },
}

#[derive(Debug, Clone, Copy)]
enum GestureRequest {
	Drag,
	Resize(Edge),
	Segment(Edge),
	Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusPane {
	Tasks,
	Segments,
}

impl FocusPane {
	fn toggled(self) -> Self {
		match self {
			FocusPane::Tasks => FocusPane::Segments,
			FocusPane::Segments => FocusPane::Tasks,
		}
	}
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

/// A gesture driven from the keyboard: every key press is one day cell of
/// pointer travel.
#[derive(Debug, Clone)]
struct ActiveGesture {
	controller: GestureController,
	travel: f64,
	step: f64,
	label: &'static str,
}

#[derive(Debug, Clone)]
struct App {
	focus: FocusPane,
	task_index: usize,
	segment_index: usize,
	day_offset: usize,
	visible_days: usize,
	view_mode: ViewMode,
	gesture: Option<ActiveGesture>,
	mode: InputMode,
	status: String,
}

impl Default for App {
	fn default() -> Self {
		Self {
			focus: FocusPane::Tasks,
			task_index: 0,
			segment_index: 0,
			day_offset: 0,
			visible_days: 30,
			view_mode: ViewMode::Days,
			gesture: None,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
		}
	}
}

impl App {
	/// Opens the chart scrolled to today when today is on the timeline.
	fn new(view: &ViewModel, today: NaiveDate) -> Self {
		let mut app = Self::default();
		if let Some(index) = view.projection.day_index_of(today) {
			app.day_offset = index.saturating_sub(SCROLL_DAYS);
		}
		app
	}

	fn clamp_selection(&mut self, view: &ViewModel) {
		if view.projection.rows.is_empty() {
			self.task_index = 0;
		} else {
			self.task_index = self.task_index.min(view.projection.rows.len() - 1);
		}

		let segments = view.selected.as_ref().map_or(0, |task| enabled_segment_ids(task).len());
		if segments == 0 {
			self.segment_index = 0;
		} else {
			self.segment_index = self.segment_index.min(segments - 1);
		}
		self.day_offset = self.day_offset.min(view.projection.day_count().saturating_sub(1));
	}

	fn move_selection(&mut self, delta: isize, view: &ViewModel) {
		match self.focus {
			FocusPane::Tasks => {
				let count = view.projection.rows.len();
				if count == 0 {
					return;
				}
				self.task_index = self.task_index.saturating_add_signed(delta).min(count - 1);
				self.segment_index = 0;
				self.follow_selection(view);
			}
			FocusPane::Segments => {
				let count = view.selected.as_ref().map_or(0, |task| enabled_segment_ids(task).len());
				if count == 0 {
					return;
				}
				self.segment_index = self.segment_index.saturating_add_signed(delta).min(count - 1);
			}
		}
	}

	/// Scrolls horizontally so the selected bar's start is on screen.
	fn follow_selection(&mut self, view: &ViewModel) {
		let Some(start) = view
			.projection
			.rows
			.get(self.task_index)
			.and_then(|row| row.start_index)
		else {
			return;
		};
		if start < self.day_offset || start >= self.day_offset + self.visible_days {
			self.day_offset = start.saturating_sub(1);
		}
	}

	fn selected_task_id(&self, view: &ViewModel) -> Option<String> {
		view.projection
			.rows
			.get(self.task_index)
			.map(|row| row.task_id.clone())
	}

	fn selected_segment(&self, view: &ViewModel) -> Option<(String, String)> {
		let task = view.selected.as_ref()?;
		let segment_id = enabled_segment_ids(task).into_iter().nth(self.segment_index)?;
		Some((task.id.clone(), segment_id))
	}
}

#[derive(Debug, Clone)]
struct ViewModel {
	projection: ScheduleProjection,
	/// Selected task with any running preview applied.
	selected: Option<Task>,
}

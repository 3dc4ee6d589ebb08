use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use planner_core::{
    agenda::{self, AgendaEntry, MonthGrid, ViewMode},
    clock::SystemClock,
    reminder::ReminderConfig,
    service::AgendaSnapshot,
    storage::FileKeyValueStore,
    task::{RepeatRule, Task, TaskKind},
    PlannerService,
};
use tracing::{info, warn};

use crate::sink::LogSink;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) view: ViewMode,
    pub(crate) date: Option<NaiveDate>,
    pub(crate) default_start_time: NaiveTime,
    pub(crate) snooze_minutes: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("PLANNER_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(view) = std::env::var("PLANNER_VIEW") {
            match view.parse::<ViewMode>() {
                Ok(mode) => config.view = mode,
                Err(err) => warn!(%err, "ignoring PLANNER_VIEW"),
            }
        }
        if let Ok(date) = std::env::var("PLANNER_DATE") {
            match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
                Ok(parsed) => config.date = Some(parsed),
                Err(err) => warn!(%err, value = %date, "ignoring PLANNER_DATE"),
            }
        }
        if let Ok(start) = std::env::var("PLANNER_DEFAULT_START") {
            match NaiveTime::parse_from_str(start.trim(), "%H:%M") {
                Ok(parsed) => config.default_start_time = parsed,
                Err(err) => warn!(%err, value = %start, "ignoring PLANNER_DEFAULT_START"),
            }
        }
        if let Ok(snooze) = std::env::var("PLANNER_SNOOZE_MINUTES") {
            if let Ok(value) = snooze.trim().parse::<u32>() {
                if value > 0 {
                    config.snooze_minutes = value;
                }
            }
        }
        Ok(config)
    }

    pub fn reminder_config(&self) -> ReminderConfig {
        ReminderConfig {
            default_start_time: self.default_start_time,
            snooze_minutes: self.snooze_minutes,
            ..ReminderConfig::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let reminders = ReminderConfig::default();
        Self {
            data_dir: dirs::data_dir()
                .map(|dir| dir.join("planner"))
                .unwrap_or_else(|| PathBuf::from("planner-data")),
            view: ViewMode::Day,
            date: None,
            default_start_time: reminders.default_start_time,
            snooze_minutes: reminders.snooze_minutes,
        }
    }
}

pub fn run(config: AppConfig) -> Result<()> {
    info!(data_dir = %config.data_dir.display(), view = ?config.view, "starting planner");
    let store = FileKeyValueStore::open(&config.data_dir)
        .with_context(|| format!("failed to open data dir {}", config.data_dir.display()))?;
    let service = PlannerService::builder()
        .with_store(Box::new(store))
        .with_notification_sink(Box::new(LogSink::new()))
        .with_clock(Box::new(SystemClock))
        .with_reminder_config(config.reminder_config())
        .build()
        .context("failed to initialize planner service")?;
    service.initialise_reminders();
    let armed = service
        .refresh_reminders()
        .context("failed to refresh reminders")?;
    info!(armed, "reminders armed");

    let today = Local::now().date_naive();
    let selected = config.date.unwrap_or(today);
    let mut output = String::new();
    if config.view == ViewMode::Month {
        output.push_str(&render_month_grid(&service.list(), selected, today));
        output.push('\n');
    }
    output.push_str(&render_agenda(&service.agenda(selected, config.view), today));
    print!("{output}");
    Ok(())
}

/// Text calendar for the month containing `selected`; days with tasks are
/// starred, today is bracketed.
pub fn render_month_grid(tasks: &[Task], selected: NaiveDate, today: NaiveDate) -> String {
    let grid = MonthGrid::for_date(selected);
    let mut out = String::new();
    let _ = writeln!(out, "{}", selected.format("%B %Y"));
    out.push_str("  S    M    T    W    T    F    S\n");
    let mut column = 0;
    for _ in 0..grid.leading_blanks {
        out.push_str("     ");
        column += 1;
    }
    for day in 1..=grid.days {
        let Some(date) = NaiveDate::from_ymd_opt(grid.year, grid.month, day) else {
            continue;
        };
        let marker = if agenda::has_tasks_on(tasks, date) { '*' } else { ' ' };
        if date == today {
            let _ = write!(out, "[{day:>2}]{marker}");
        } else {
            let _ = write!(out, " {day:>2} {marker}");
        }
        column += 1;
        if column == 7 {
            out.push('\n');
            column = 0;
        }
    }
    if column != 0 {
        out.push('\n');
    }
    out
}

pub fn render_agenda(snapshot: &AgendaSnapshot, today: NaiveDate) -> String {
    let mut out = String::new();
    for day in &snapshot.days {
        if snapshot.mode != ViewMode::Day && day.entries.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}", format_day_heading(day.date, today));
        if day.entries.is_empty() {
            out.push_str("  No tasks for this day.\n");
        }
        for entry in &day.entries {
            let _ = writeln!(out, "  {}", describe_entry(entry));
        }
    }
    if out.is_empty() {
        out.push_str("No tasks in this view.\n");
    }
    out
}

fn describe_entry(entry: &AgendaEntry) -> String {
    let check = if entry.completed { "[x]" } else { "[ ]" };
    let time = match (entry.start_time, entry.end_time) {
        (Some(start), Some(end)) => format!("{}-{} ", start.format("%H:%M"), end.format("%H:%M")),
        (Some(start), None) => format!("{} ", start.format("%H:%M")),
        _ => String::new(),
    };
    let mut line = format!("{check} {time}{}", entry.title);
    if entry.kind == TaskKind::Event {
        line.push_str(" (event)");
    }
    if entry.repeat != RepeatRule::None {
        let _ = write!(line, " · {}", entry.repeat.label());
    }
    if entry.has_reminder {
        line.push_str(" · reminder");
    }
    line
}

fn format_day_heading(date: NaiveDate, today: NaiveDate) -> String {
    format!("{} — {}", relative_day(date, today), date.format("%A, %B %d, %Y"))
}

fn relative_day(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".into(),
        1 => "Tomorrow".into(),
        -1 => "Yesterday".into(),
        ahead if ahead > 0 => format!("In {ahead} days"),
        behind => format!("{} days ago", behind.unsigned_abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use planner_core::task::TaskDraft;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tasks() -> Vec<Task> {
        let mut standup = Task::from_draft(
            "s".into(),
            TaskDraft::new("Standup", date(2024, 3, 1))
                .with_repeat(RepeatRule::Weekly)
                .with_times(NaiveTime::from_hms_opt(9, 0, 0), NaiveTime::from_hms_opt(9, 15, 0)),
            Utc::now(),
        );
        standup.completed_exceptions.insert(date(2024, 3, 8));
        let launch = Task::from_draft(
            "l".into(),
            TaskDraft::new("Launch", date(2024, 3, 12)).with_kind(TaskKind::Event),
            Utc::now(),
        );
        vec![standup, launch]
    }

    #[test]
    fn relative_day_labels() {
        let today = date(2024, 3, 8);
        assert_eq!(relative_day(today, today), "Today");
        assert_eq!(relative_day(date(2024, 3, 9), today), "Tomorrow");
        assert_eq!(relative_day(date(2024, 3, 5), today), "3 days ago");
        assert_eq!(relative_day(date(2024, 3, 18), today), "In 10 days");
    }

    #[test]
    fn renders_day_agenda() {
        let tasks = tasks();
        let snapshot = AgendaSnapshot {
            selected: date(2024, 3, 8),
            mode: ViewMode::Day,
            days: agenda::agenda_days(&tasks, date(2024, 3, 8), ViewMode::Day),
        };
        let text = render_agenda(&snapshot, date(2024, 3, 8));
        assert!(text.starts_with("Today — Friday, March 08, 2024"));
        assert!(text.contains("[x] 09:00-09:15 Standup · Weekly"));
    }

    #[test]
    fn empty_day_says_so() {
        let snapshot = AgendaSnapshot {
            selected: date(2024, 3, 9),
            mode: ViewMode::Day,
            days: agenda::agenda_days(&tasks(), date(2024, 3, 9), ViewMode::Day),
        };
        assert!(render_agenda(&snapshot, date(2024, 3, 8)).contains("No tasks for this day."));
    }

    #[test]
    fn month_grid_marks_task_days_and_today() {
        let text = render_month_grid(&tasks(), date(2024, 3, 8), date(2024, 3, 8));
        assert!(text.starts_with("March 2024\n"));
        assert!(text.contains("[ 8]*"));
        assert!(text.contains(" 12 *"));
        assert!(text.contains("  2  "));
    }

    #[test]
    fn reminder_config_carries_overrides() {
        let config = AppConfig {
            default_start_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            snooze_minutes: 10,
            ..AppConfig::default()
        };
        let reminders = config.reminder_config();
        assert_eq!(reminders.default_start_time, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(reminders.snooze_minutes, 10);
        assert_eq!(reminders.channel.id, "task-reminders");
    }
}

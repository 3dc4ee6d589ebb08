use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::task::{RepeatRule, Task, TaskKind};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(ViewMode::Day),
            "week" => Ok(ViewMode::Week),
            "month" => Ok(ViewMode::Month),
            other => Err(format!("unknown view mode `{other}`")),
        }
    }
}

/// Calendar dates shown by `mode` around `selected`: the day itself, its
/// Sunday-started week, or every day of its month.
pub fn view_dates(selected: NaiveDate, mode: ViewMode) -> Vec<NaiveDate> {
    match mode {
        ViewMode::Day => vec![selected],
        ViewMode::Week => {
            let back = u64::from(selected.weekday().num_days_from_sunday());
            let start = selected - Days::new(back);
            start.iter_days().take(7).collect()
        }
        ViewMode::Month => {
            let grid = MonthGrid::for_date(selected);
            (1..=grid.days)
                .filter_map(|day| NaiveDate::from_ymd_opt(grid.year, grid.month, day))
                .collect()
        }
    }
}

pub fn tasks_on(tasks: &[Task], date: NaiveDate) -> Vec<&Task> {
    tasks.iter().filter(|task| task.occurs_on(date)).collect()
}

pub fn has_tasks_on(tasks: &[Task], date: NaiveDate) -> bool {
    tasks.iter().any(|task| task.occurs_on(date))
}

/// Tasks with at least one occurrence in the view. The day view keeps list
/// order; wider views list each task once, ordered by anchor date.
pub fn tasks_for_view(tasks: &[Task], selected: NaiveDate, mode: ViewMode) -> Vec<&Task> {
    if mode == ViewMode::Day {
        return tasks_on(tasks, selected);
    }
    let dates = view_dates(selected, mode);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut found: Vec<&Task> = Vec::new();
    for date in &dates {
        for task in tasks {
            if task.occurs_on(*date) && seen.insert(task.id.as_str()) {
                found.push(task);
            }
        }
    }
    found.sort_by(|a, b| a.anchor_date.cmp(&b.anchor_date));
    found
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaEntry {
    pub task_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub kind: TaskKind,
    pub repeat: RepeatRule,
    pub completed: bool,
    pub has_reminder: bool,
}

impl AgendaEntry {
    fn new(task: &Task, date: NaiveDate) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            date,
            start_time: task.start_time,
            end_time: task.end_time,
            kind: task.kind,
            repeat: task.repeat,
            completed: task.is_completed_on(date),
            has_reminder: task.scheduled_reminder.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaDay {
    pub date: NaiveDate,
    pub entries: Vec<AgendaEntry>,
}

/// Per-day occurrence lists for the view, empty days included. Entries are
/// ordered by start time (untimed first), then title.
pub fn agenda_days(tasks: &[Task], selected: NaiveDate, mode: ViewMode) -> Vec<AgendaDay> {
    view_dates(selected, mode)
        .into_iter()
        .map(|date| {
            let mut entries: Vec<AgendaEntry> = tasks_on(tasks, date)
                .into_iter()
                .map(|task| AgendaEntry::new(task, date))
                .collect();
            entries.sort_by(compare_entries);
            AgendaDay { date, entries }
        })
        .collect()
}

fn compare_entries(a: &AgendaEntry, b: &AgendaEntry) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| a.title.cmp(&b.title))
}

/// Layout facts for drawing a month calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub days: u32,
    /// Weekday of the 1st, 0 = Sunday; the number of blank leading cells.
    pub leading_blanks: u32,
}

impl MonthGrid {
    pub fn for_date(date: NaiveDate) -> Self {
        let first = date.with_day(1).unwrap_or(date);
        let days = first
            .checked_add_months(Months::new(1))
            .and_then(|next| u32::try_from((next - first).num_days()).ok())
            .unwrap_or(31);
        Self {
            year: first.year(),
            month: first.month(),
            days,
            leading_blanks: first.weekday().num_days_from_sunday(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskDraft;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(id: &str, title: &str, anchor: NaiveDate, repeat: RepeatRule) -> Task {
        Task::from_draft(
            id.into(),
            TaskDraft::new(title, anchor).with_repeat(repeat),
            Utc::now(),
        )
    }

    #[test]
    fn week_view_starts_on_sunday() {
        // 2024-03-06 is a Wednesday.
        let dates = view_dates(date(2024, 3, 6), ViewMode::Week);
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], date(2024, 3, 3));
        assert_eq!(dates[6], date(2024, 3, 9));
    }

    #[test]
    fn month_view_covers_leap_february() {
        let dates = view_dates(date(2024, 2, 10), ViewMode::Month);
        assert_eq!(dates.len(), 29);
        assert_eq!(dates.last(), Some(&date(2024, 2, 29)));
    }

    #[test]
    fn month_grid_offsets_first_weekday() {
        let grid = MonthGrid::for_date(date(2024, 9, 15));
        // 2024-09-01 is a Sunday.
        assert_eq!(grid.leading_blanks, 0);
        assert_eq!(grid.days, 30);
        let grid = MonthGrid::for_date(date(2024, 3, 15));
        assert_eq!(grid.leading_blanks, 5);
        assert_eq!(grid.days, 31);
        assert_eq!(MonthGrid::for_date(date(2023, 2, 28)).days, 28);
        assert_eq!(MonthGrid::for_date(date(2024, 12, 31)).days, 31);
    }

    #[test]
    fn wider_views_list_each_task_once() {
        let tasks = vec![
            task("b", "Gym", date(2024, 3, 1), RepeatRule::Daily),
            task("a", "Report", date(2024, 2, 20), RepeatRule::Weekly),
            task("c", "Trip", date(2024, 4, 2), RepeatRule::None),
        ];
        let week = tasks_for_view(&tasks, date(2024, 3, 6), ViewMode::Week);
        let ids: Vec<&str> = week.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let month = tasks_for_view(&tasks, date(2024, 4, 10), ViewMode::Month);
        assert_eq!(month.len(), 3);

        assert!(has_tasks_on(&tasks, date(2024, 4, 2)));
        assert!(!has_tasks_on(&tasks, date(2024, 2, 21)));
    }

    #[test]
    fn agenda_days_sort_by_start_time_and_mark_completion() {
        let mut early = task("e", "Zumba", date(2024, 3, 1), RepeatRule::Daily);
        early.start_time = NaiveTime::from_hms_opt(7, 0, 0);
        early.completed_exceptions.insert(date(2024, 3, 2));
        let late = {
            let mut t = task("l", "Alpha", date(2024, 3, 2), RepeatRule::None);
            t.start_time = NaiveTime::from_hms_opt(18, 0, 0);
            t
        };
        let untimed = task("u", "Beta", date(2024, 3, 2), RepeatRule::None);

        let days = agenda_days(&[late, early, untimed], date(2024, 3, 2), ViewMode::Day);
        assert_eq!(days.len(), 1);
        let titles: Vec<&str> = days[0].entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Beta", "Zumba", "Alpha"]);
        assert!(days[0].entries[1].completed);
        assert!(!days[0].entries[2].completed);
    }

    #[test]
    fn parses_view_mode() {
        assert_eq!("Week".parse::<ViewMode>(), Ok(ViewMode::Week));
        assert!("year".parse::<ViewMode>().is_err());
    }
}

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// How a task projects forward from its anchor date.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RepeatRule {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepeatRule {
    pub fn is_recurring(self) -> bool {
        !matches!(self, RepeatRule::None)
    }

    /// Whether a task anchored on `anchor` has an occurrence on `date`.
    ///
    /// Both values are plain calendar dates, so no time zone or DST shift can
    /// move an occurrence onto a neighbouring day. Recurrence never runs
    /// backwards from the anchor, and day-of-month rules never roll over: a
    /// monthly task anchored on the 31st simply has no occurrence in shorter
    /// months.
    pub fn occurs_on(self, anchor: NaiveDate, date: NaiveDate) -> bool {
        match self {
            RepeatRule::None => date == anchor,
            _ if date < anchor => false,
            RepeatRule::Daily => true,
            RepeatRule::Weekly => date.weekday() == anchor.weekday(),
            RepeatRule::Monthly => date.day() == anchor.day(),
            RepeatRule::Yearly => date.day() == anchor.day() && date.month() == anchor.month(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatRule::None => "No repeat",
            RepeatRule::Daily => "Daily",
            RepeatRule::Weekly => "Weekly",
            RepeatRule::Monthly => "Monthly",
            RepeatRule::Yearly => "Yearly",
        }
    }
}

pub fn occurs_on(task: &Task, date: NaiveDate) -> bool {
    task.repeat.occurs_on(task.anchor_date, date)
}

/// Occurrence dates of `task` in the inclusive range `start..=end`.
pub fn occurrences_between(
    task: &Task,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Iterator<Item = NaiveDate> + '_ {
    let first = start.max(task.anchor_date);
    first
        .iter_days()
        .take_while(move |day| *day <= end)
        .filter(move |day| occurs_on(task, *day))
}

/// First occurrence on or after `from`, looking at most `horizon_days` ahead.
///
/// The horizon bounds the search for sparse rules: a yearly task anchored on
/// February 29th only occurs once every four years.
pub fn next_occurrence_on_or_after(
    task: &Task,
    from: NaiveDate,
    horizon_days: u32,
) -> Option<NaiveDate> {
    let end = from.checked_add_days(chrono::Days::new(u64::from(horizon_days)))?;
    occurrences_between(task, from, end).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskDraft};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(anchor: NaiveDate, repeat: RepeatRule) -> Task {
        let draft = TaskDraft::new("Stretch", anchor).with_repeat(repeat);
        Task::from_draft("t-1".into(), draft, Utc::now())
    }

    #[test]
    fn one_shot_task_occurs_only_on_anchor() {
        let t = task(date(2024, 3, 1), RepeatRule::None);
        assert!(occurs_on(&t, date(2024, 3, 1)));
        for day in date(2024, 2, 1).iter_days().take(60) {
            assert_eq!(occurs_on(&t, day), day == date(2024, 3, 1), "{day}");
        }
    }

    #[test]
    fn recurring_rules_never_run_backwards() {
        for rule in [
            RepeatRule::Daily,
            RepeatRule::Weekly,
            RepeatRule::Monthly,
            RepeatRule::Yearly,
        ] {
            let t = task(date(2024, 3, 1), rule);
            assert!(!occurs_on(&t, date(2023, 3, 1)), "{rule:?}");
            assert!(!occurs_on(&t, date(2024, 2, 29)), "{rule:?}");
            assert!(occurs_on(&t, date(2024, 3, 1)), "{rule:?}");
        }
    }

    #[test]
    fn daily_covers_every_later_day() {
        let t = task(date(2024, 3, 1), RepeatRule::Daily);
        assert!(date(2024, 3, 1)
            .iter_days()
            .take(400)
            .all(|day| occurs_on(&t, day)));
    }

    #[test]
    fn weekly_matches_same_weekday() {
        // 2024-03-01 is a Friday.
        let t = task(date(2024, 3, 1), RepeatRule::Weekly);
        assert!(occurs_on(&t, date(2024, 3, 8)));
        assert!(!occurs_on(&t, date(2024, 3, 9)));
        assert!(occurs_on(&t, date(2025, 2, 28)));
        assert!(!occurs_on(&t, date(2024, 2, 23)));
    }

    #[test]
    fn monthly_skips_short_months_instead_of_rolling_over() {
        let t = task(date(2024, 1, 31), RepeatRule::Monthly);
        assert!(!occurs_on(&t, date(2024, 2, 29)));
        assert!(occurs_on(&t, date(2024, 3, 31)));
        assert!(!occurs_on(&t, date(2024, 4, 30)));
        assert!(occurs_on(&t, date(2024, 5, 31)));
    }

    #[test]
    fn yearly_leap_day_waits_for_leap_years() {
        let t = task(date(2024, 2, 29), RepeatRule::Yearly);
        assert!(!occurs_on(&t, date(2025, 2, 28)));
        assert!(!occurs_on(&t, date(2025, 3, 1)));
        assert!(occurs_on(&t, date(2028, 2, 29)));
        assert_eq!(
            next_occurrence_on_or_after(&t, date(2024, 3, 1), 3000),
            Some(date(2028, 2, 29))
        );
        assert_eq!(next_occurrence_on_or_after(&t, date(2024, 3, 1), 365), None);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let t = task(date(2024, 1, 15), RepeatRule::Monthly);
        let first: Vec<bool> = date(2024, 1, 1)
            .iter_days()
            .take(120)
            .map(|d| occurs_on(&t, d))
            .collect();
        let second: Vec<bool> = date(2024, 1, 1)
            .iter_days()
            .take(120)
            .map(|d| occurs_on(&t, d))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn occurrences_between_starts_at_anchor() {
        let t = task(date(2024, 3, 6), RepeatRule::Weekly);
        let found: Vec<NaiveDate> =
            occurrences_between(&t, date(2024, 3, 1), date(2024, 3, 31)).collect();
        assert_eq!(
            found,
            vec![
                date(2024, 3, 6),
                date(2024, 3, 13),
                date(2024, 3, 20),
                date(2024, 3, 27)
            ]
        );
    }
}

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notifications::ReminderHandle;
pub use crate::recurrence::RepeatRule;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Task,
    Event,
}

/// How long before an occurrence's start a reminder fires.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u32", into = "u32")]
pub enum ReminderLead {
    #[default]
    Off,
    FiveMinutes,
    ThirtyMinutes,
}

impl ReminderLead {
    pub fn minutes(self) -> u32 {
        match self {
            ReminderLead::Off => 0,
            ReminderLead::FiveMinutes => 5,
            ReminderLead::ThirtyMinutes => 30,
        }
    }

    pub fn is_off(self) -> bool {
        self == ReminderLead::Off
    }
}

impl TryFrom<u32> for ReminderLead {
    type Error = InvalidLead;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReminderLead::Off),
            5 => Ok(ReminderLead::FiveMinutes),
            30 => Ok(ReminderLead::ThirtyMinutes),
            other => Err(InvalidLead(other)),
        }
    }
}

impl From<ReminderLead> for u32 {
    fn from(lead: ReminderLead) -> Self {
        lead.minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLead(pub u32);

impl fmt::Display for InvalidLead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reminder lead must be 0, 5 or 30 minutes, got {}", self.0)
    }
}

impl std::error::Error for InvalidLead {}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMode {
    Silent,
    Vibrate,
    #[default]
    Sound,
}

impl ReminderMode {
    pub fn sound_enabled(self) -> bool {
        self == ReminderMode::Sound
    }
}

/// A planner entry as persisted in the local key-value store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(rename = "date")]
    pub anchor_date: NaiveDate,
    #[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub repeat: RepeatRule,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_exceptions: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub reminder_lead_minutes: ReminderLead,
    #[serde(rename = "alarmMode", default)]
    pub reminder_mode: ReminderMode,
    #[serde(rename = "notificationId", default)]
    pub scheduled_reminder: Option<ReminderHandle>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn from_draft(id: String, draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title.trim().to_string(),
            anchor_date: draft.anchor_date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            notes: draft.notes,
            link: draft.link,
            associated: draft.associated,
            kind: draft.kind,
            repeat: draft.repeat,
            is_completed: false,
            completed_exceptions: BTreeSet::new(),
            reminder_lead_minutes: draft.reminder_lead,
            reminder_mode: draft.reminder_mode,
            scheduled_reminder: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every editable field, keeping identity, completion state and
    /// the reminder handle. Completed occurrences the new rule no longer
    /// produces are dropped.
    pub fn apply(&mut self, draft: TaskDraft, now: DateTime<Utc>) {
        self.title = draft.title.trim().to_string();
        self.anchor_date = draft.anchor_date;
        self.start_time = draft.start_time;
        self.end_time = draft.end_time;
        self.notes = draft.notes;
        self.link = draft.link;
        self.associated = draft.associated;
        self.kind = draft.kind;
        self.repeat = draft.repeat;
        self.reminder_lead_minutes = draft.reminder_lead;
        self.reminder_mode = draft.reminder_mode;
        self.updated_at = now;
        if self.is_recurring() {
            let (anchor, repeat) = (self.anchor_date, self.repeat);
            self.completed_exceptions
                .retain(|date| repeat.occurs_on(anchor, *date));
        } else {
            self.completed_exceptions.clear();
        }
    }

    /// True when applying `draft` would change what a reminder for this task
    /// fires for or when.
    pub fn reminder_inputs_differ(&self, draft: &TaskDraft) -> bool {
        self.title != draft.title.trim()
            || self.anchor_date != draft.anchor_date
            || self.start_time != draft.start_time
            || self.repeat != draft.repeat
            || self.reminder_lead_minutes != draft.reminder_lead
            || self.reminder_mode != draft.reminder_mode
    }

    pub fn is_recurring(&self) -> bool {
        self.repeat.is_recurring()
    }

    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        crate::recurrence::occurs_on(self, date)
    }

    /// Completion of the occurrence on `date`. One-shot tasks carry a single
    /// flag; recurring tasks track each completed occurrence separately.
    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        if self.is_recurring() {
            self.completed_exceptions.contains(&date)
        } else {
            self.is_completed && date == self.anchor_date
        }
    }

    pub fn draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            anchor_date: self.anchor_date,
            start_time: self.start_time,
            end_time: self.end_time,
            notes: self.notes.clone(),
            link: self.link.clone(),
            associated: self.associated.clone(),
            kind: self.kind,
            repeat: self.repeat,
            reminder_lead: self.reminder_lead_minutes,
            reminder_mode: self.reminder_mode,
        }
    }
}

/// User-editable task fields, used for both creation and edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub anchor_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
    pub link: Option<String>,
    pub associated: Option<String>,
    pub kind: TaskKind,
    pub repeat: RepeatRule,
    pub reminder_lead: ReminderLead,
    pub reminder_mode: ReminderMode,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, anchor_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            anchor_date,
            start_time: None,
            end_time: None,
            notes: None,
            link: None,
            associated: None,
            kind: TaskKind::default(),
            repeat: RepeatRule::default(),
            reminder_lead: ReminderLead::default(),
            reminder_mode: ReminderMode::default(),
        }
    }

    pub fn with_times(mut self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_start_time(mut self, start: NaiveTime) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatRule) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_reminder(mut self, lead: ReminderLead, mode: ReminderMode) -> Self {
        self.reminder_lead = lead;
        self.reminder_mode = mode;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// `HH:MM` wall-clock times. Empty strings read back as "no time".
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format("%H:%M").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::NotifyError,
    notifications::{
        NotificationChannel, NotificationRequest, NotificationSink, PermissionStatus, ReminderHandle,
        ReminderPayload,
    },
    task::{ReminderLead, ReminderMode, Task},
};

#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Start time assumed for occurrences without one.
    pub default_start_time: NaiveTime,
    pub channel: NotificationChannel,
    pub snooze_minutes: u32,
    /// How far ahead to look for the next occurrence of a recurring task.
    pub occurrence_horizon_days: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            default_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            channel: NotificationChannel::default(),
            snooze_minutes: 5,
            occurrence_horizon_days: 366 * 8,
        }
    }
}

/// One occurrence of a task that a reminder can be booked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTarget {
    pub task_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
}

impl ReminderTarget {
    pub fn for_task(task: &Task, date: NaiveDate) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            date,
            start_time: task.start_time,
        }
    }
}

/// Wall-clock instant at which a reminder for `target` should fire.
pub fn fire_time(
    target: &ReminderTarget,
    lead: ReminderLead,
    default_start_time: NaiveTime,
) -> NaiveDateTime {
    let start = target.date.and_time(target.start_time.unwrap_or(default_start_time));
    start - Duration::minutes(i64::from(lead.minutes()))
}

/// Pin a wall-clock time to the device zone. Times skipped by a DST jump do
/// not exist; times repeated by one resolve to the earlier instant.
pub fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

fn reminder_body(lead: ReminderLead) -> String {
    match lead {
        ReminderLead::Off => "Task reminder".to_string(),
        other => format!("Starts in {} minutes", other.minutes()),
    }
}

/// Books and cancels one-shot reminders against a [`NotificationSink`].
///
/// Every platform failure is absorbed here: callers only ever see `None`
/// meaning "no reminder is pending".
pub struct ReminderScheduler {
    sink: Option<Box<dyn NotificationSink>>,
    clock: Box<dyn Clock>,
    config: ReminderConfig,
    permission: Mutex<Option<PermissionStatus>>,
}

impl ReminderScheduler {
    pub fn new(
        sink: Option<Box<dyn NotificationSink>>,
        clock: Box<dyn Clock>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            sink,
            clock,
            config,
            permission: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Register the reminder channel and ask for permission once.
    pub fn initialise(&self) {
        let Some(sink) = &self.sink else {
            debug!("no notification sink configured; reminders disabled");
            return;
        };
        if let Err(err) = sink.ensure_channel(&self.config.channel) {
            warn!(%err, channel = %self.config.channel.id, "failed to set notification channel");
        }
        let status = self.ensure_permission(sink.as_ref());
        info!(?status, "reminders initialised");
    }

    fn ensure_permission(&self, sink: &dyn NotificationSink) -> Option<PermissionStatus> {
        let mut cached = self.permission.lock();
        match *cached {
            Some(PermissionStatus::Granted) => return Some(PermissionStatus::Granted),
            // The user may have granted it in system settings since.
            Some(previous) => {
                return match sink.permission_status() {
                    Ok(PermissionStatus::Granted) => {
                        info!("notification permission granted");
                        *cached = Some(PermissionStatus::Granted);
                        Some(PermissionStatus::Granted)
                    }
                    Ok(_) => Some(previous),
                    Err(err) => {
                        warn!(%err, "failed to query notification permission");
                        Some(previous)
                    }
                };
            }
            None => {}
        }
        let status = match sink.permission_status() {
            Ok(PermissionStatus::Granted) => Ok(PermissionStatus::Granted),
            Ok(_) => sink.request_permission(),
            Err(err) => Err(err),
        };
        match status {
            Ok(status) => {
                *cached = Some(status);
                Some(status)
            }
            Err(err) => {
                warn!(%err, "failed to get notification permission");
                None
            }
        }
    }

    /// Whether a reminder for `target` would still fire in the future.
    pub fn fires_in_future(&self, target: &ReminderTarget, lead: ReminderLead) -> bool {
        resolve_local(fire_time(target, lead, self.config.default_start_time))
            .map(|at| at > self.clock.now())
            .unwrap_or(false)
    }

    pub fn schedule_reminder(
        &self,
        target: &ReminderTarget,
        lead: ReminderLead,
        mode: ReminderMode,
    ) -> Option<ReminderHandle> {
        if lead.is_off() {
            return None;
        }
        let naive = fire_time(target, lead, self.config.default_start_time);
        let Some(fire_at) = resolve_local(naive) else {
            warn!(task_id = %target.task_id, %naive, "reminder time does not exist in local time zone");
            return None;
        };
        let now = self.clock.now();
        if fire_at <= now {
            debug!(task_id = %target.task_id, %fire_at, %now, "reminder time already passed; skipping");
            return None;
        }
        let Some(sink) = &self.sink else {
            debug!(task_id = %target.task_id, "no notification sink configured");
            return None;
        };
        match self.ensure_permission(sink.as_ref()) {
            Some(PermissionStatus::Granted) => {}
            status => {
                debug!(task_id = %target.task_id, ?status, "notifications not permitted; skipping reminder");
                return None;
            }
        }

        let request = NotificationRequest {
            title: format!("Upcoming: {}", target.title),
            body: reminder_body(lead),
            fire_at,
            sound_enabled: mode.sound_enabled(),
            channel_id: Some(self.config.channel.id.clone()),
            payload: Some(ReminderPayload {
                task_id: target.task_id.clone(),
                task_title: target.title.clone(),
                task_date: target.date,
                task_start_time: target.start_time,
            }),
        };
        match sink.schedule(&request) {
            Ok(handle) => {
                info!(task_id = %target.task_id, %handle, %fire_at, "reminder scheduled");
                Some(handle)
            }
            Err(NotifyError::PermissionDenied) => {
                *self.permission.lock() = Some(PermissionStatus::Denied);
                warn!(task_id = %target.task_id, "notification permission revoked");
                None
            }
            Err(err) => {
                warn!(task_id = %target.task_id, %err, "failed to schedule task reminder");
                None
            }
        }
    }

    /// Cancel a pending reminder. Handles that already fired or were cancelled
    /// count as success.
    pub fn cancel_reminder(&self, handle: &ReminderHandle) {
        let Some(sink) = &self.sink else {
            return;
        };
        match sink.cancel(handle) {
            Ok(()) => debug!(%handle, "reminder cancelled"),
            Err(NotifyError::UnknownHandle(_)) => debug!(%handle, "reminder already gone"),
            Err(err) => warn!(%handle, %err, "failed to cancel reminder"),
        }
    }

    /// Cancel `previous` (if any), then book a reminder for `target`. A task
    /// with nothing left to remind about passes no target and ends up with no
    /// pending reminder.
    pub fn reschedule(
        &self,
        previous: Option<&ReminderHandle>,
        target: Option<&ReminderTarget>,
        lead: ReminderLead,
        mode: ReminderMode,
    ) -> Option<ReminderHandle> {
        if let Some(handle) = previous {
            self.cancel_reminder(handle);
        }
        self.schedule_reminder(target?, lead, mode)
    }

    /// Dismiss a delivered alert and book the same alert again a few minutes
    /// from now.
    pub fn snooze(
        &self,
        handle: &ReminderHandle,
        alert: &NotificationRequest,
    ) -> Option<ReminderHandle> {
        self.cancel_reminder(handle);
        let sink = self.sink.as_ref()?;
        let fire_at = self.clock.now() + Duration::minutes(i64::from(self.config.snooze_minutes));
        let body = if alert.body.trim().is_empty() {
            "Snoozed task reminder".to_string()
        } else {
            alert.body.clone()
        };
        let request = NotificationRequest {
            title: alert.title.clone(),
            body,
            fire_at,
            sound_enabled: alert.sound_enabled,
            channel_id: alert.channel_id.clone(),
            payload: alert.payload.clone(),
        };
        match sink.schedule(&request) {
            Ok(snoozed) => {
                info!(%handle, %snoozed, %fire_at, "reminder snoozed");
                Some(snoozed)
            }
            Err(err) => {
                warn!(%handle, %err, "failed to schedule snoozed reminder");
                None
            }
        }
    }
}

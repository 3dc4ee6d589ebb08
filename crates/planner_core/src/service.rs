use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    agenda::{self, AgendaDay, ViewMode},
    clock::{Clock, SystemClock},
    error::{PlannerError, Result},
    notifications::{NotificationRequest, NotificationSink, ReminderHandle},
    recurrence,
    reminder::{ReminderConfig, ReminderScheduler, ReminderTarget},
    storage::{KeyValueStore, MemoryKeyValueStore},
    task::{Task, TaskDraft},
};

/// Key under which the serialized task list lives.
pub const TASKS_KEY: &str = "plannerTasks_v2";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgendaSnapshot {
    pub selected: NaiveDate,
    pub mode: ViewMode,
    pub days: Vec<AgendaDay>,
}

/// Owns the task list, persists it after every mutation and keeps each
/// task's single pending reminder in step with its fields.
pub struct PlannerService {
    store: Box<dyn KeyValueStore>,
    tasks: RwLock<Vec<Task>>,
    reminders: ReminderScheduler,
}

pub struct PlannerServiceBuilder {
    store: Option<Box<dyn KeyValueStore>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    clock: Option<Box<dyn Clock>>,
    reminder_config: ReminderConfig,
}

impl Default for PlannerServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            notification_sink: None,
            clock: None,
            reminder_config: ReminderConfig::default(),
        }
    }

    pub fn with_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_reminder_config(mut self, config: ReminderConfig) -> Self {
        self.reminder_config = config;
        self
    }

    /// Build the service and load the persisted task list.
    pub fn build(self) -> Result<PlannerService> {
        let service = PlannerService {
            store: self
                .store
                .unwrap_or_else(|| Box::new(MemoryKeyValueStore::new())),
            tasks: RwLock::new(Vec::new()),
            reminders: ReminderScheduler::new(
                self.notification_sink,
                self.clock.unwrap_or_else(|| Box::new(SystemClock)),
                self.reminder_config,
            ),
        };
        service.reload()?;
        Ok(service)
    }
}

impl PlannerService {
    pub fn builder() -> PlannerServiceBuilder {
        PlannerServiceBuilder::new()
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// Register the reminder channel and request notification permission.
    pub fn initialise_reminders(&self) {
        self.reminders.initialise();
    }

    pub fn reload(&self) -> Result<()> {
        let loaded: Vec<Task> = match self.store.get(TASKS_KEY)? {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(&json)?,
            _ => Vec::new(),
        };
        info!(task_count = loaded.len(), "task list loaded");
        *self.tasks.write() = loaded;
        Ok(())
    }

    pub fn list(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or_else(|| PlannerError::UnknownTask(id.to_string()))
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&self, draft: TaskDraft) -> Result<Task> {
        validate(&draft)?;
        let mut task = Task::from_draft(Uuid::new_v4().to_string(), draft, Utc::now());
        task.scheduled_reminder = self.rearm(None, &task);

        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        staged.push(task.clone());
        self.commit(&mut tasks, staged)?;
        info!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Replace a task's editable fields. The old reminder is cancelled before
    /// a new one is booked whenever the fields it depends on changed.
    #[instrument(skip(self, draft))]
    pub fn update(&self, id: &str, draft: TaskDraft) -> Result<Task> {
        validate(&draft)?;
        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        let task = find_mut(&mut staged, id)?;

        let rearm = task.reminder_inputs_differ(&draft) || task.scheduled_reminder.is_none();
        task.apply(draft, Utc::now());
        if rearm {
            let previous = task.scheduled_reminder.take();
            task.scheduled_reminder = self.rearm(previous.as_ref(), task);
        }
        let updated = task.clone();
        self.commit(&mut tasks, staged)?;
        info!(task_id = %id, rearm, "task updated");
        Ok(updated)
    }

    /// Remove a task, cancelling its pending reminder first.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<Task> {
        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        let index = staged
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| PlannerError::UnknownTask(id.to_string()))?;
        let removed = staged.remove(index);
        if let Some(handle) = &removed.scheduled_reminder {
            self.reminders.cancel_reminder(handle);
        }
        self.commit(&mut tasks, staged)?;
        info!(task_id = %id, "task deleted");
        Ok(removed)
    }

    /// Flip completion of the occurrence on `date` and return the new state.
    ///
    /// The reminder is re-armed so it never rings for a completed occurrence.
    #[instrument(skip(self))]
    pub fn toggle_completion(&self, id: &str, date: NaiveDate) -> Result<bool> {
        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        let task = find_mut(&mut staged, id)?;
        if !task.occurs_on(date) {
            return Err(PlannerError::NotAnOccurrence {
                id: id.to_string(),
                date,
            });
        }

        let completed = if task.is_recurring() {
            if !task.completed_exceptions.remove(&date) {
                task.completed_exceptions.insert(date);
            }
            task.completed_exceptions.contains(&date)
        } else {
            task.is_completed = !task.is_completed;
            task.is_completed
        };
        task.updated_at = Utc::now();

        let previous = task.scheduled_reminder.take();
        task.scheduled_reminder = self.rearm(previous.as_ref(), task);
        self.commit(&mut tasks, staged)?;
        debug!(task_id = %id, %date, completed, "completion toggled");
        Ok(completed)
    }

    /// Cancel and re-book every task's reminder, e.g. after start-up so that
    /// recurring tasks whose last reminder already fired get the next one.
    pub fn refresh_reminders(&self) -> Result<usize> {
        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        for task in staged.iter_mut() {
            let previous = task.scheduled_reminder.take();
            task.scheduled_reminder = self.rearm(previous.as_ref(), task);
        }
        let armed = staged
            .iter()
            .filter(|task| task.scheduled_reminder.is_some())
            .count();
        self.commit(&mut tasks, staged)?;
        info!(armed, "reminders refreshed");
        Ok(armed)
    }

    /// Snooze a delivered alert. When it belongs to a known task, the task
    /// now points at the snoozed reminder.
    pub fn snooze(
        &self,
        handle: &ReminderHandle,
        alert: &NotificationRequest,
    ) -> Result<Option<ReminderHandle>> {
        let snoozed = self.reminders.snooze(handle, alert);
        let Some(task_id) = alert.payload.as_ref().map(|payload| payload.task_id.as_str()) else {
            return Ok(snoozed);
        };
        let mut tasks = self.tasks.write();
        let mut staged = tasks.clone();
        let Some(task) = staged.iter_mut().find(|task| task.id == task_id) else {
            return Ok(snoozed);
        };
        if task.scheduled_reminder.as_ref() != Some(handle) {
            return Ok(snoozed);
        }
        task.scheduled_reminder = snoozed.clone();
        self.commit(&mut tasks, staged)?;
        Ok(snoozed)
    }

    pub fn tasks_on(&self, date: NaiveDate) -> Vec<Task> {
        let tasks = self.tasks.read();
        agenda::tasks_on(&tasks, date).into_iter().cloned().collect()
    }

    pub fn tasks_for_view(&self, selected: NaiveDate, mode: ViewMode) -> Vec<Task> {
        let tasks = self.tasks.read();
        agenda::tasks_for_view(&tasks, selected, mode)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn agenda(&self, selected: NaiveDate, mode: ViewMode) -> AgendaSnapshot {
        let tasks = self.tasks.read();
        AgendaSnapshot {
            selected,
            mode,
            days: agenda::agenda_days(&tasks, selected, mode),
        }
    }

    /// Cancel `previous` and book the reminder the task should have now.
    fn rearm(&self, previous: Option<&ReminderHandle>, task: &Task) -> Option<ReminderHandle> {
        let target = self.reminder_target(task);
        self.reminders.reschedule(
            previous,
            target.as_ref(),
            task.reminder_lead_minutes,
            task.reminder_mode,
        )
    }

    /// The occurrence a reminder should fire for. One-shot tasks use their
    /// anchor date; recurring tasks use the first upcoming, not yet completed
    /// occurrence whose reminder time is still ahead.
    fn reminder_target(&self, task: &Task) -> Option<ReminderTarget> {
        let lead = task.reminder_lead_minutes;
        if lead.is_off() {
            return None;
        }
        if !task.is_recurring() {
            return (!task.is_completed).then(|| ReminderTarget::for_task(task, task.anchor_date));
        }
        let today = self.reminders.today();
        let horizon = self.reminders.config().occurrence_horizon_days;
        let end = today.checked_add_days(chrono::Days::new(u64::from(horizon)))?;
        let found = recurrence::occurrences_between(task, today, end)
            .filter(|date| !task.is_completed_on(*date))
            .map(|date| ReminderTarget::for_task(task, date))
            .find(|target| self.reminders.fires_in_future(target, lead));
        if found.is_none() {
            debug!(task_id = %task.id, "no upcoming occurrence to remind about");
        }
        found
    }

    /// Persist `staged` and make it the live list. If the write fails the
    /// live list is kept, reminders booked for `staged` are withdrawn and
    /// tasks whose reminder was cancelled get one again.
    fn commit(&self, tasks: &mut Vec<Task>, staged: Vec<Task>) -> Result<()> {
        let Err(err) = self.persist(&staged) else {
            *tasks = staged;
            return Ok(());
        };
        warn!(%err, "task list not saved; restoring reminders");
        for task in &staged {
            if let Some(handle) = &task.scheduled_reminder {
                if reminder_of(tasks.as_slice(), &task.id).as_ref() != Some(handle) {
                    self.reminders.cancel_reminder(handle);
                }
            }
        }
        let staged_handles: Vec<Option<ReminderHandle>> = tasks
            .iter()
            .map(|task| reminder_of(&staged, &task.id))
            .collect();
        for (task, staged_handle) in tasks.iter_mut().zip(staged_handles) {
            if task.scheduled_reminder.is_some() && task.scheduled_reminder != staged_handle {
                task.scheduled_reminder = self.rearm(None, task);
            }
        }
        Err(err)
    }

    fn persist(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_string(tasks)?;
        self.store.set(TASKS_KEY, &json)?;
        debug!(task_count = tasks.len(), "task list persisted");
        Ok(())
    }
}

fn find_mut<'a>(tasks: &'a mut [Task], id: &str) -> Result<&'a mut Task> {
    tasks
        .iter_mut()
        .find(|task| task.id == id)
        .ok_or_else(|| PlannerError::UnknownTask(id.to_string()))
}

fn reminder_of(tasks: &[Task], id: &str) -> Option<ReminderHandle> {
    tasks
        .iter()
        .find(|task| task.id == id)
        .and_then(|task| task.scheduled_reminder.clone())
}

fn validate(draft: &TaskDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(PlannerError::EmptyTitle);
    }
    Ok(())
}

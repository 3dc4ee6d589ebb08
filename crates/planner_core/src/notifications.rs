use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Opaque identifier returned by the platform for a pending notification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderHandle(String);

impl ReminderHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data attached to a reminder so a delivered alert can be traced back to
/// its task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub task_id: String,
    pub task_title: String,
    pub task_date: NaiveDate,
    pub task_start_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Local>,
    pub sound_enabled: bool,
    pub channel_id: Option<String>,
    pub payload: Option<ReminderPayload>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Importance {
    Low,
    Default,
    High,
}

/// Platform notification channel settings (Android channels; ignored where
/// the platform has no such concept).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
    pub vibration_pattern_ms: Vec<u64>,
    pub light_color: String,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self {
            id: "task-reminders".to_string(),
            name: "Task reminders".to_string(),
            importance: Importance::High,
            vibration_pattern_ms: vec![0, 250, 250, 250],
            light_color: "#2563EB".to_string(),
        }
    }
}

/// Platform-specific notification adapters will implement this trait.
pub trait NotificationSink: Send + Sync {
    fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), NotifyError>;
    fn permission_status(&self) -> Result<PermissionStatus, NotifyError>;
    fn request_permission(&self) -> Result<PermissionStatus, NotifyError>;
    /// Register a one-shot notification firing at `request.fire_at`.
    fn schedule(&self, request: &NotificationRequest) -> Result<ReminderHandle, NotifyError>;
    fn cancel(&self, handle: &ReminderHandle) -> Result<(), NotifyError>;
}

#[derive(Debug)]
struct MemorySinkState {
    pending: BTreeMap<ReminderHandle, NotificationRequest>,
    channels: Vec<NotificationChannel>,
    permission: PermissionStatus,
    grant_on_request: bool,
    failing: bool,
    next_id: u64,
    schedule_calls: usize,
    cancel_calls: usize,
}

/// In-process sink that keeps pending notifications in memory. Clones share
/// the same state, so a test can hand one clone to the scheduler and inspect
/// another.
#[derive(Debug, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_permission(PermissionStatus::Undetermined, true)
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose user refuses the permission prompt.
    pub fn denying() -> Self {
        Self::with_permission(PermissionStatus::Undetermined, false)
    }

    /// A sink whose every schedule call fails.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.state.lock().failing = true;
        sink
    }

    fn with_permission(permission: PermissionStatus, grant_on_request: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemorySinkState {
                pending: BTreeMap::new(),
                channels: Vec::new(),
                permission,
                grant_on_request,
                failing: false,
                next_id: 1,
                schedule_calls: 0,
                cancel_calls: 0,
            })),
        }
    }

    /// Change the permission as the user would in system settings.
    pub fn set_permission(&self, status: PermissionStatus) {
        self.state.lock().permission = status;
    }

    pub fn pending(&self) -> Vec<(ReminderHandle, NotificationRequest)> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|(handle, request)| (handle.clone(), request.clone()))
            .collect()
    }

    pub fn pending_request(&self, handle: &ReminderHandle) -> Option<NotificationRequest> {
        self.state.lock().pending.get(handle).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn schedule_calls(&self) -> usize {
        self.state.lock().schedule_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state.lock().cancel_calls
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.state.lock().channels.clone()
    }

    /// Simulate delivery: the notification leaves the pending set.
    pub fn deliver(&self, handle: &ReminderHandle) -> Option<NotificationRequest> {
        self.state.lock().pending.remove(handle)
    }
}

impl NotificationSink for MemorySink {
    fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), NotifyError> {
        let mut state = self.state.lock();
        state.channels.retain(|existing| existing.id != channel.id);
        state.channels.push(channel.clone());
        Ok(())
    }

    fn permission_status(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(self.state.lock().permission)
    }

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        let mut state = self.state.lock();
        if state.permission == PermissionStatus::Undetermined {
            state.permission = if state.grant_on_request {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
        }
        Ok(state.permission)
    }

    fn schedule(&self, request: &NotificationRequest) -> Result<ReminderHandle, NotifyError> {
        let mut state = self.state.lock();
        state.schedule_calls += 1;
        if state.failing {
            return Err(NotifyError::Platform("scheduler unavailable".into()));
        }
        if state.permission != PermissionStatus::Granted {
            return Err(NotifyError::PermissionDenied);
        }
        let handle = ReminderHandle::new(format!("reminder-{}", state.next_id));
        state.next_id += 1;
        state.pending.insert(handle.clone(), request.clone());
        Ok(handle)
    }

    fn cancel(&self, handle: &ReminderHandle) -> Result<(), NotifyError> {
        let mut state = self.state.lock();
        state.cancel_calls += 1;
        state
            .pending
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| NotifyError::UnknownHandle(handle.to_string()))
    }
}

use std::collections::HashMap;

use parking_lot::Mutex;
use planner_core::{
    error::NotifyError,
    notifications::{
        NotificationChannel, NotificationRequest, NotificationSink, PermissionStatus, ReminderHandle,
    },
};
use tracing::info;
use uuid::Uuid;

/// Desktop stand-in for the platform notification service: reminders are
/// logged instead of shown.
#[derive(Debug, Default)]
pub struct LogSink {
    pending: Mutex<HashMap<ReminderHandle, NotificationRequest>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationSink for LogSink {
    fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), NotifyError> {
        info!(channel = %channel.id, name = %channel.name, "notification channel ready");
        Ok(())
    }

    fn permission_status(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(PermissionStatus::Granted)
    }

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(PermissionStatus::Granted)
    }

    fn schedule(&self, request: &NotificationRequest) -> Result<ReminderHandle, NotifyError> {
        let handle = ReminderHandle::new(Uuid::new_v4().to_string());
        info!(
            %handle,
            fire_at = %request.fire_at,
            title = %request.title,
            sound = request.sound_enabled,
            "reminder registered"
        );
        self.pending.lock().insert(handle.clone(), request.clone());
        Ok(handle)
    }

    fn cancel(&self, handle: &ReminderHandle) -> Result<(), NotifyError> {
        self.pending
            .lock()
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| NotifyError::UnknownHandle(handle.to_string()))
    }
}

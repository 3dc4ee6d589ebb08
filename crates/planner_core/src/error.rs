use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures reported by a [`crate::notifications::NotificationSink`].
///
/// None of these ever leave the reminder scheduler; they are logged and the
/// task ends up without a pending reminder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification permission was not granted")]
    PermissionDenied,
    #[error("notification platform failure: {0}")]
    Platform(String),
    #[error("no scheduled notification with handle `{0}`")]
    UnknownHandle(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("task title must not be empty")]
    EmptyTitle,
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    #[error("task `{id}` does not occur on {date}")]
    NotAnOccurrence { id: String, date: NaiveDate },
    #[error("stored task list is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = PlannerError> = std::result::Result<T, E>;

//! Reminder schedule model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LocalExamId, RemoteExamId, SyncState};

/// Opaque id returned by the platform notifier for one scheduled reminder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifierHandle(String);

impl NotifierHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One scheduled reminder for one (exam, offset) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSchedule {
    /// Row identifier
    pub id: i64,
    pub exam_local_id: LocalExamId,
    /// Filled in once the parent exam is pushed
    pub exam_remote_id: Option<RemoteExamId>,
    pub minutes_before: u32,
    /// When the reminder fires (UTC)
    pub scheduled_at: DateTime<Utc>,
    pub notifier_handle: NotifierHandle,
    pub sync_state: SyncState,
}

/// Values for a schedule row that has just been handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub exam_local_id: LocalExamId,
    pub exam_remote_id: Option<RemoteExamId>,
    pub minutes_before: u32,
    pub scheduled_at: DateTime<Utc>,
    pub notifier_handle: NotifierHandle,
}

//! Reconciliation between the local store and the exam API.
//!
//! [`SyncEngine`] pushes pending local mutations, then pulls the remote
//! collection and merges it. [`SyncScheduler`] drives it from a timer and from
//! connectivity transitions.

mod engine;
mod scheduler;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ExamRef;

pub use engine::SyncEngine;
pub use scheduler::SyncScheduler;

/// Coarse sync status for UI chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncActivity {
    Offline,
    Syncing,
    Synced,
    Error,
}

impl std::fmt::Display for SyncActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Push,
    Pull,
}

/// One collected failure; never aborts the rest of the sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub phase: SyncPhase,
    /// `None` for failures of the whole phase (e.g. the remote fetch)
    pub exam: Option<ExamRef>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Pending records whose mutation reached the server
    pub pushed: usize,
    /// Remote records inserted or applied over a synced local copy
    pub pulled: usize,
    /// Synced local records removed because the server no longer has them
    pub purged: usize,
    pub errors: Vec<SyncFailure>,
    /// Set when this run advanced `lastSyncTime`
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of asking for a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "report", rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another sync was already in flight; nothing was done
    Skipped,
}

impl SyncOutcome {
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }

    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

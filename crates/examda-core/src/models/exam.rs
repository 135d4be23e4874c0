//! Exam model

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// Process-local exam identity (SQLite `AUTOINCREMENT`, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalExamId(i64);

impl LocalExamId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LocalExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side exam identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteExamId(i64);

impl RemoteExamId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RemoteExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of an exam, either before or after its first successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ExamRef {
    Local(LocalExamId),
    Remote(RemoteExamId),
}

impl fmt::Display for ExamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "l{id}"),
            Self::Remote(id) => write!(f, "r{id}"),
        }
    }
}

impl FromStr for ExamRef {
    type Err = Error;

    /// Accepts `l<N>` for local ids and `r<N>` or a bare `N` for remote ids.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || Error::InvalidInput(format!("invalid exam id '{trimmed}'"));

        let (is_local, digits) = if let Some(rest) = trimmed.strip_prefix(['l', 'L']) {
            (true, rest)
        } else if let Some(rest) = trimmed.strip_prefix(['r', 'R']) {
            (false, rest)
        } else {
            (false, trimmed)
        };

        let value = digits.parse::<i64>().map_err(|_| invalid())?;
        if value <= 0 {
            return Err(invalid());
        }

        Ok(if is_local {
            Self::Local(LocalExamId::new(value))
        } else {
            Self::Remote(RemoteExamId::new(value))
        })
    }
}

/// Reconciliation state of a local record.
///
/// `Conflict` is reserved: the merge policy never produces it, but stored
/// rows carrying it are still readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Conflict,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::Database(format!("unknown sync state '{other}'"))),
        }
    }
}

/// The authoritative offline copy of an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalExam {
    pub local_id: LocalExamId,
    pub remote_id: Option<RemoteExamId>,
    pub name: String,
    pub description: Option<String>,
    pub exam_date_time: DateTime<Utc>,
    /// Minutes before the exam at which a reminder fires
    pub reminder_offsets: BTreeSet<u32>,
    pub is_complete: bool,
    pub sync_state: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly when `sync_state != Synced`
    pub locally_modified_at: Option<DateTime<Utc>>,
    /// Deleted locally, waiting for the remote delete
    pub tombstoned: bool,
}

impl LocalExam {
    /// Preferred external address: remote once bound, local before that.
    pub const fn exam_ref(&self) -> ExamRef {
        match self.remote_id {
            Some(remote_id) => ExamRef::Remote(remote_id),
            None => ExamRef::Local(self.local_id),
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.sync_state, SyncState::Pending)
    }
}

/// Server-side `createdAt`/`updatedAt` of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerStamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Field values for a new exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDraft {
    pub name: String,
    pub description: Option<String>,
    pub exam_date_time: DateTime<Utc>,
    #[serde(default)]
    pub reminder_offsets: BTreeSet<u32>,
    #[serde(default)]
    pub is_complete: bool,
    /// Only set when mirroring a record that already exists remotely
    #[serde(default)]
    pub remote_id: Option<RemoteExamId>,
    /// Server stamps of a mirrored record; local inserts use the current time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExamDraft {
    pub fn new(name: impl Into<String>, exam_date_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: None,
            exam_date_time,
            reminder_offsets: BTreeSet::new(),
            is_complete: false,
            remote_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_reminders(mut self, offsets: impl IntoIterator<Item = u32>) -> Self {
        self.reminder_offsets = offsets.into_iter().collect();
        self
    }

    /// Trim text fields and reject an empty name.
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("exam name cannot be empty".to_string()));
        }
        Ok(Self {
            name,
            description: normalize_text_option(self.description),
            ..self
        })
    }
}

/// Tri-state update of a nullable field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldPatch<T> {
    /// Leave the stored value untouched
    #[default]
    Keep,
    /// Store NULL
    Clear,
    /// Store the given value
    Set(T),
}

impl<T> FieldPatch<T> {
    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Clear, Self::Set)
    }
}

/// Partial update of an exam; only provided fields are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExamPatch {
    pub name: Option<String>,
    pub description: FieldPatch<String>,
    pub exam_date_time: Option<DateTime<Utc>>,
    /// `Some(empty)` clears all reminders
    pub reminder_offsets: Option<BTreeSet<u32>>,
    pub is_complete: Option<bool>,
    /// `Some(Synced)` marks a reconciliation write; anything else is a local edit
    pub sync_state: Option<SyncState>,
    /// Server stamps copied by a pull; local edits stamp `updated_at` with now
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExamPatch {
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_keep()
            && self.exam_date_time.is_none()
            && self.reminder_offsets.is_none()
            && self.is_complete.is_none()
    }

    /// Whether applying this patch invalidates scheduled reminders.
    pub const fn affects_reminders(&self) -> bool {
        self.name.is_some() || self.exam_date_time.is_some() || self.reminder_offsets.is_some()
    }

    pub const fn marks_synced(&self) -> bool {
        matches!(self.sync_state, Some(SyncState::Synced))
    }

    /// Trim text fields and reject an empty name.
    pub fn normalized(self) -> Result<Self> {
        let name = match self.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(Error::InvalidInput("exam name cannot be empty".to_string()));
                }
                Some(name)
            }
            None => None,
        };
        let description = match self.description {
            FieldPatch::Set(text) => FieldPatch::from_option(normalize_text_option(Some(text))),
            other => other,
        };
        Ok(Self {
            name,
            description,
            ..self
        })
    }
}

/// Forward-looking date window for exam listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamWindow {
    /// `[now, now + 7 days)`
    ThisWeek,
    /// `[now, start of next calendar month)`
    ThisMonth,
}

impl ExamWindow {
    /// Half-open `[start, end)` bounds of the window relative to `now` (UTC).
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = match self {
            Self::ThisWeek => now + Duration::days(7),
            Self::ThisMonth => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                    .single()
                    .unwrap_or_else(|| now + Duration::days(31))
            }
        };
        (now, end)
    }
}

impl FromStr for ExamWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "thisweek" | "week" => Ok(Self::ThisWeek),
            "thismonth" | "month" => Ok(Self::ThisMonth),
            other => Err(Error::InvalidInput(format!("unknown exam filter '{other}'"))),
        }
    }
}

/// What the UI renders for an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    /// Remote id once synced, local id before that
    pub id: ExamRef,
    pub local_id: LocalExamId,
    pub remote_id: Option<RemoteExamId>,
    pub name: String,
    pub description: Option<String>,
    pub exam_date_time: DateTime<Utc>,
    pub remind_before_minutes: Vec<u32>,
    pub is_complete: bool,
    pub sync_state: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&LocalExam> for ExamView {
    fn from(exam: &LocalExam) -> Self {
        Self {
            id: exam.exam_ref(),
            local_id: exam.local_id,
            remote_id: exam.remote_id,
            name: exam.name.clone(),
            description: exam.description.clone(),
            exam_date_time: exam.exam_date_time,
            remind_before_minutes: exam.reminder_offsets.iter().copied().collect(),
            is_complete: exam.is_complete,
            sync_state: exam.sync_state,
            created_at: exam.created_at,
            updated_at: exam.updated_at,
        }
    }
}

impl From<LocalExam> for ExamView {
    fn from(exam: LocalExam) -> Self {
        Self::from(&exam)
    }
}

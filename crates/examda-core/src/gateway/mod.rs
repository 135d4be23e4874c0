//! Typed access to the exam, profile, shop, and inventory REST API.

mod http;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{
    ExamDraft, ExamPatch, FieldPatch, InventoryItem, LocalExam, RemoteExamId, ServerStamps, ShopItem,
    SyncState, UserProfile,
};
use crate::util::normalize_text_option;

pub use http::HttpGateway;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Not authorized; sign in again")]
    Unauthorized,
    #[error("Resource not found")]
    NotFound,
    #[error("API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid API payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Exam as the server returns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteExam {
    pub id: RemoteExamId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub exam_date_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_reminder_offsets")]
    pub remind_before_minutes: BTreeSet<u32>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteExam {
    fn description(&self) -> Option<String> {
        normalize_text_option(self.description.clone())
    }

    pub const fn stamps(&self) -> ServerStamps {
        ServerStamps {
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Draft for mirroring this exam into the local store.
    pub fn to_draft(&self) -> ExamDraft {
        ExamDraft {
            name: self.name.trim().to_string(),
            description: self.description(),
            exam_date_time: self.exam_date_time,
            reminder_offsets: self.remind_before_minutes.clone(),
            is_complete: self.is_complete,
            remote_id: Some(self.id),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Patch overwriting every mirrored field while keeping the row synced.
    pub fn to_patch(&self) -> ExamPatch {
        ExamPatch {
            name: Some(self.name.trim().to_string()),
            description: FieldPatch::from_option(self.description()),
            exam_date_time: Some(self.exam_date_time),
            reminder_offsets: Some(self.remind_before_minutes.clone()),
            is_complete: Some(self.is_complete),
            sync_state: Some(SyncState::Synced),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Whether any mirrored field differs from the local copy.
    pub fn differs_from(&self, local: &LocalExam) -> bool {
        self.affects_reminders_of(local)
            || self.description() != local.description
            || self.is_complete != local.is_complete
            || differs_in_millis(self.created_at, local.created_at)
            || differs_in_millis(self.updated_at, local.updated_at)
    }

    /// Whether overwriting the local copy would change its reminders.
    pub fn affects_reminders_of(&self, local: &LocalExam) -> bool {
        self.name.trim() != local.name
            || self.exam_date_time != local.exam_date_time
            || self.remind_before_minutes != local.reminder_offsets
    }
}

/// Stored stamps keep millisecond precision.
fn differs_in_millis(remote: Option<DateTime<Utc>>, local: DateTime<Utc>) -> bool {
    remote.is_some_and(|at| at.timestamp_millis() != local.timestamp_millis())
}

/// Body of `POST /exams` and `PATCH /exams/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub exam_date_time: DateTime<Utc>,
    pub remind_before_minutes: Vec<u32>,
}

impl ExamPayload {
    pub fn for_create(exam: &LocalExam) -> Self {
        Self {
            name: exam.name.clone(),
            description: exam.description.clone(),
            exam_date_time: exam.exam_date_time,
            remind_before_minutes: exam.reminder_offsets.iter().copied().collect(),
        }
    }

    /// Full current state; a missing description is sent empty so a local
    /// clear reaches the server.
    pub fn for_update(exam: &LocalExam) -> Self {
        Self {
            description: Some(exam.description.clone().unwrap_or_default()),
            ..Self::for_create(exam)
        }
    }
}

/// Result of `POST /exams/{id}/complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub coins_awarded: i64,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserProfile,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LoginResponse")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub item: ShopItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub equipped_item: Option<ShopItem>,
}

/// Source of the bearer token attached to API requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Option<String>;

    /// Called when the API answers `401`
    async fn invalidate(&self);
}

/// Token held in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(normalize_text_option(token)),
        }
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.token.write().await = normalize_text_option(Some(token.into()));
    }
}

#[async_trait]
impl TokenProvider for MemoryTokenStore {
    async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn invalidate(&self) {
        self.token.write().await.take();
    }
}

/// The REST API consumed by the sync engine and the façades.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// `GET /exams`: every upcoming exam of the signed-in user
    async fn list_exams(&self) -> RemoteResult<Vec<RemoteExam>>;

    async fn get_exam(&self, id: RemoteExamId) -> RemoteResult<RemoteExam>;

    async fn create_exam(&self, payload: &ExamPayload) -> RemoteResult<RemoteExam>;

    async fn update_exam(&self, id: RemoteExamId, payload: &ExamPayload)
        -> RemoteResult<RemoteExam>;

    async fn delete_exam(&self, id: RemoteExamId) -> RemoteResult<()>;

    /// Server deletes the exam and awards coins
    async fn complete_exam(&self, id: RemoteExamId) -> RemoteResult<CompletionReceipt>;

    async fn login(&self, student_id: &str, password: &str) -> RemoteResult<LoginResponse>;

    async fn fetch_profile(&self) -> RemoteResult<UserProfile>;

    async fn change_password(&self, new_password: &str) -> RemoteResult<UserProfile>;

    async fn list_shop_items(&self) -> RemoteResult<Vec<ShopItem>>;

    async fn purchase_item(&self, item_id: i64) -> RemoteResult<PurchaseReceipt>;

    async fn list_inventory(&self) -> RemoteResult<Vec<InventoryItem>>;

    async fn equip_item(&self, item_id: i64) -> RemoteResult<EquipReceipt>;

    async fn unequip_item(&self) -> RemoteResult<()>;
}

/// Accepts a JSON array, a string holding a JSON array, or null.
fn deserialize_reminder_offsets<'de, D>(deserializer: D) -> Result<BTreeSet<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOffsets {
        List(Vec<u32>),
        Encoded(String),
    }

    match Option::<RawOffsets>::deserialize(deserializer)? {
        None => Ok(BTreeSet::new()),
        Some(RawOffsets::List(offsets)) => Ok(offsets.into_iter().collect()),
        Some(RawOffsets::Encoded(encoded)) => {
            if encoded.trim().is_empty() {
                return Ok(BTreeSet::new());
            }
            serde_json::from_str::<Option<Vec<u32>>>(&encoded)
                .map(|offsets| offsets.unwrap_or_default().into_iter().collect())
                .map_err(serde::de::Error::custom)
        }
    }
}

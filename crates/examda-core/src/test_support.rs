//! In-memory collaborators for tests.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::gateway::{
    CompletionReceipt, EquipReceipt, ExamPayload, LoginResponse, PurchaseReceipt, RemoteError,
    RemoteExam, RemoteGateway, RemoteResult,
};
use crate::models::{ExamDraft, ExamRef, InventoryItem, NotifierHandle, RemoteExamId, ShopItem, UserProfile};
use crate::reminders::Notifier;
use crate::util::now_millis_precision;

pub const COMPLETION_REWARD: i64 = 5;

#[derive(Default)]
struct FakeState {
    exams: BTreeMap<RemoteExamId, RemoteExam>,
    next_id: i64,
    fail_list: bool,
    fail_writes: bool,
    failing_names: HashSet<String>,
    delay: Option<Duration>,
    calls: Vec<&'static str>,
    profile: Option<UserProfile>,
    shop: Vec<ShopItem>,
    inventory: Vec<InventoryItem>,
}

/// Exam API kept in a map, with switchable failures.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

fn unavailable() -> RemoteError {
    RemoteError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

impl FakeGateway {
    pub async fn insert_remote(&self, draft: ExamDraft) -> RemoteExamId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = RemoteExamId::new(state.next_id);
        state.exams.insert(
            id,
            RemoteExam {
                id,
                name: draft.name,
                description: draft.description,
                exam_date_time: draft.exam_date_time,
                remind_before_minutes: draft.reminder_offsets,
                is_complete: draft.is_complete,
                created_at: Some(now_millis_precision()),
                updated_at: Some(now_millis_precision()),
            },
        );
        id
    }

    pub async fn edit_remote(&self, id: RemoteExamId, edit: impl FnOnce(&mut RemoteExam)) {
        let mut state = self.state.lock().await;
        if let Some(exam) = state.exams.get_mut(&id) {
            edit(exam);
            exam.updated_at = Some(now_millis_precision());
        }
    }

    pub async fn remove_remote(&self, id: RemoteExamId) {
        self.state.lock().await.exams.remove(&id);
    }

    pub async fn remote_exams(&self) -> Vec<RemoteExam> {
        self.state.lock().await.exams.values().cloned().collect()
    }

    pub async fn set_fail_list(&self, fail: bool) {
        self.state.lock().await.fail_list = fail;
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    /// Fail creates and updates of exams with this name.
    pub async fn fail_writes_for(&self, name: &str) {
        self.state
            .lock()
            .await
            .failing_names
            .insert(name.to_string());
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    pub async fn set_profile(&self, profile: UserProfile) {
        self.state.lock().await.profile = Some(profile);
    }

    pub async fn set_shop(&self, items: Vec<ShopItem>) {
        self.state.lock().await.shop = items;
    }

    pub async fn call_count(&self, call: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|recorded| **recorded == call)
            .count()
    }

    /// Record the call and apply the configured delay.
    async fn enter(&self, call: &'static str) {
        let delay = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn check_write(&self, name: &str) -> RemoteResult<()> {
        let state = self.state.lock().await;
        if state.fail_writes || state.failing_names.contains(name) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }

    async fn profile(&self) -> RemoteResult<UserProfile> {
        self.state
            .lock()
            .await
            .profile
            .clone()
            .ok_or(RemoteError::Unauthorized)
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn list_exams(&self) -> RemoteResult<Vec<RemoteExam>> {
        self.enter("list").await;
        let state = self.state.lock().await;
        if state.fail_list {
            return Err(unavailable());
        }
        Ok(state.exams.values().cloned().collect())
    }

    async fn get_exam(&self, id: RemoteExamId) -> RemoteResult<RemoteExam> {
        self.enter("get").await;
        self.state
            .lock()
            .await
            .exams
            .get(&id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn create_exam(&self, payload: &ExamPayload) -> RemoteResult<RemoteExam> {
        self.enter("create").await;
        self.check_write(&payload.name).await?;
        let mut draft = ExamDraft::new(payload.name.clone(), payload.exam_date_time)
            .with_reminders(payload.remind_before_minutes.iter().copied());
        draft.description = payload.description.clone();
        let id = self.insert_remote(draft).await;
        self.get_exam(id).await
    }

    async fn update_exam(
        &self,
        id: RemoteExamId,
        payload: &ExamPayload,
    ) -> RemoteResult<RemoteExam> {
        self.enter("update").await;
        self.check_write(&payload.name).await?;
        let mut state = self.state.lock().await;
        let exam = state.exams.get_mut(&id).ok_or(RemoteError::NotFound)?;
        exam.name = payload.name.clone();
        if let Some(description) = &payload.description {
            exam.description = Some(description.clone());
        }
        exam.exam_date_time = payload.exam_date_time;
        exam.remind_before_minutes = payload.remind_before_minutes.iter().copied().collect();
        exam.updated_at = Some(now_millis_precision());
        Ok(exam.clone())
    }

    async fn delete_exam(&self, id: RemoteExamId) -> RemoteResult<()> {
        self.enter("delete").await;
        if self.state.lock().await.fail_writes {
            return Err(unavailable());
        }
        self.state
            .lock()
            .await
            .exams
            .remove(&id)
            .map(|_| ())
            .ok_or(RemoteError::NotFound)
    }

    async fn complete_exam(&self, id: RemoteExamId) -> RemoteResult<CompletionReceipt> {
        self.enter("complete").await;
        let mut state = self.state.lock().await;
        if state.fail_writes {
            return Err(unavailable());
        }
        state.exams.remove(&id).ok_or(RemoteError::NotFound)?;
        if let Some(profile) = state.profile.as_mut() {
            profile.coin += COMPLETION_REWARD;
        }
        Ok(CompletionReceipt {
            success: true,
            coins_awarded: COMPLETION_REWARD,
        })
    }

    async fn login(&self, student_id: &str, password: &str) -> RemoteResult<LoginResponse> {
        self.enter("login").await;
        let profile = self.profile().await?;
        if profile.student_id != student_id || password.is_empty() {
            return Err(RemoteError::Unauthorized);
        }
        Ok(LoginResponse {
            access_token: format!("token-{student_id}"),
            user: profile,
        })
    }

    async fn fetch_profile(&self) -> RemoteResult<UserProfile> {
        self.enter("profile").await;
        self.profile().await
    }

    async fn change_password(&self, _new_password: &str) -> RemoteResult<UserProfile> {
        self.enter("password").await;
        self.profile().await
    }

    async fn list_shop_items(&self) -> RemoteResult<Vec<ShopItem>> {
        self.enter("shop").await;
        Ok(self.state.lock().await.shop.clone())
    }

    async fn purchase_item(&self, item_id: i64) -> RemoteResult<PurchaseReceipt> {
        self.enter("purchase").await;
        let mut state = self.state.lock().await;
        let item = state
            .shop
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or(RemoteError::NotFound)?;
        let profile = state.profile.as_mut().ok_or(RemoteError::Unauthorized)?;
        if profile.coin < item.price {
            return Err(RemoteError::Api {
                status: 400,
                message: "Not enough coins".to_string(),
            });
        }
        profile.coin -= item.price;
        state.inventory.push(InventoryItem {
            id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
            image_url: item.image_url.clone(),
            purchased_at: Utc::now(),
            is_equipped: false,
        });
        Ok(PurchaseReceipt {
            success: true,
            message: "Purchase successful".to_string(),
            item,
        })
    }

    async fn list_inventory(&self) -> RemoteResult<Vec<InventoryItem>> {
        self.enter("inventory").await;
        Ok(self.state.lock().await.inventory.clone())
    }

    async fn equip_item(&self, item_id: i64) -> RemoteResult<EquipReceipt> {
        self.enter("equip").await;
        let mut state = self.state.lock().await;
        let item = state
            .shop
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or(RemoteError::NotFound)?;
        for owned in &mut state.inventory {
            owned.is_equipped = owned.id == item_id;
        }
        if let Some(profile) = state.profile.as_mut() {
            profile.equipped_item = Some(item.clone());
        }
        Ok(EquipReceipt {
            success: true,
            message: "Item equipped".to_string(),
            equipped_item: Some(item),
        })
    }

    async fn unequip_item(&self) -> RemoteResult<()> {
        self.enter("unequip").await;
        let mut state = self.state.lock().await;
        for owned in &mut state.inventory {
            owned.is_equipped = false;
        }
        if let Some(profile) = state.profile.as_mut() {
            profile.equipped_item = None;
        }
        Ok(())
    }
}

/// Scheduled reminder as seen by the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub exam: ExamRef,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub handle: NotifierHandle,
}

/// Notifier that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    state: Mutex<NotifierState>,
}

#[derive(Debug, Default)]
struct NotifierState {
    next_id: u64,
    scheduled: Vec<ScheduledReminder>,
    cancelled: Vec<NotifierHandle>,
    failing_body: Option<String>,
}

impl RecordingNotifier {
    pub async fn scheduled(&self) -> Vec<ScheduledReminder> {
        self.state.lock().await.scheduled.clone()
    }

    pub async fn cancelled(&self) -> Vec<NotifierHandle> {
        self.state.lock().await.cancelled.clone()
    }

    pub async fn fail_for_body_containing(&self, needle: &str) {
        self.state.lock().await.failing_body = Some(needle.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn schedule(
        &self,
        exam: ExamRef,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<NotifierHandle> {
        let mut state = self.state.lock().await;
        if state
            .failing_body
            .as_deref()
            .is_some_and(|needle| body.contains(needle))
        {
            return Err(Error::Notification("notifier refused".to_string()));
        }
        state.next_id += 1;
        let handle = NotifierHandle::new(format!("n-{}", state.next_id));
        state.scheduled.push(ScheduledReminder {
            exam,
            title: title.to_string(),
            body: body.to_string(),
            fire_at,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotifierHandle) -> Result<()> {
        self.state.lock().await.cancelled.push(handle.clone());
        Ok(())
    }
}

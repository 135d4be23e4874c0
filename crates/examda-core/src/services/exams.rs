//! Offline-first exam API used by the UI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::LocalStore;
use crate::connectivity::ConnectivityOracle;
use crate::error::{Error, Result};
use crate::models::{ExamDraft, ExamPatch, ExamRef, ExamView, ExamWindow, LocalExam, SyncState};
use crate::reminders::ReminderScheduler;
use crate::sync::{SyncActivity, SyncEngine, SyncOutcome};

/// Every call writes the local store first and returns the local view; network
/// confirmation runs in the background when the device is online.
#[derive(Clone)]
pub struct ExamService {
    store: LocalStore,
    engine: SyncEngine,
    connectivity: Arc<ConnectivityOracle>,
    reminders: ReminderScheduler,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ExamService {
    pub fn new(
        store: LocalStore,
        engine: SyncEngine,
        connectivity: Arc<ConnectivityOracle>,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            store,
            engine,
            connectivity,
            reminders,
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Local exams, then a fire-and-forget sync when online.
    pub async fn list(&self, window: Option<ExamWindow>) -> Result<Vec<ExamView>> {
        self.list_at(window, Utc::now()).await
    }

    /// `list` with an explicit reference instant for the window.
    pub async fn list_at(
        &self,
        window: Option<ExamWindow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExamView>> {
        let exams = self.store.list_active_at(window, now).await?;
        if self.connectivity.is_usable() {
            self.track(self.engine.spawn_sync("list")).await;
        }
        Ok(exams.into_iter().map(ExamView::from).collect())
    }

    /// Find a visible exam; tombstoned rows count as missing.
    pub async fn resolve(&self, exam: ExamRef) -> Result<LocalExam> {
        let found = match exam {
            ExamRef::Remote(remote_id) => self.store.get_by_remote_id(remote_id).await?,
            ExamRef::Local(local_id) => self.store.get_by_local_id(local_id).await?,
        };
        found
            .filter(|row| !row.tombstoned)
            .ok_or_else(|| Error::RecordNotFound(exam.to_string()))
    }

    pub async fn get(&self, exam: ExamRef) -> Result<ExamView> {
        Ok(ExamView::from(self.resolve(exam).await?))
    }

    pub async fn create(&self, draft: ExamDraft) -> Result<ExamView> {
        let draft = ExamDraft {
            remote_id: None,
            created_at: None,
            updated_at: None,
            ..draft.normalized()?
        };
        let exam = self.store.insert(&draft, SyncState::Pending).await?;
        self.reminders.schedule_for(&exam).await?;
        tracing::debug!(exam = %exam.local_id, "Created exam locally");

        self.confirm_inline(&exam).await;
        Ok(ExamView::from(exam))
    }

    /// Apply a local edit; reminder-affecting edits recreate all reminders.
    pub async fn update(&self, exam: ExamRef, patch: ExamPatch) -> Result<ExamView> {
        let current = self.resolve(exam).await?;
        let patch = ExamPatch {
            sync_state: None,
            created_at: None,
            updated_at: None,
            ..patch.normalized()?
        };
        if patch.is_empty() {
            return Ok(ExamView::from(current));
        }

        let completion_changed = patch
            .is_complete
            .is_some_and(|complete| complete != current.is_complete);
        let updated = self.store.patch(current.local_id, &patch).await?;
        if patch.affects_reminders() || completion_changed {
            self.reminders.reschedule(&updated).await?;
        }

        self.confirm_inline(&updated).await;
        Ok(ExamView::from(updated))
    }

    /// Mark complete locally; once pushed, the server removes the exam and
    /// awards coins.
    pub async fn complete(&self, exam: ExamRef) -> Result<ExamView> {
        let current = self.resolve(exam).await?;
        if current.is_complete {
            return Ok(ExamView::from(current));
        }

        let updated = self
            .store
            .patch(
                current.local_id,
                &ExamPatch {
                    is_complete: Some(true),
                    ..ExamPatch::default()
                },
            )
            .await?;
        self.reminders.cancel_for(updated.local_id).await?;

        self.confirm_inline(&updated).await;
        Ok(ExamView::from(updated))
    }

    /// Hide the exam now; the remote delete follows on the next push.
    pub async fn delete(&self, exam: ExamRef) -> Result<()> {
        let current = self.resolve(exam).await?;
        self.store.tombstone(current.local_id).await?;
        self.reminders.cancel_for(current.local_id).await?;
        tracing::debug!(exam = %current.exam_ref(), "Deleted exam locally");

        self.confirm_inline(&current).await;
        Ok(())
    }

    /// Run a full sync and wait for it.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.engine.sync().await
    }

    pub fn activity(&self) -> watch::Receiver<SyncActivity> {
        self.engine.activity()
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_sync_time().await
    }

    /// Number of exams with local changes not yet on the server.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.list_pending().await?.len())
    }

    /// Wait for background work started by this service.
    pub async fn drain_background(&self) {
        let handles = std::mem::take(&mut *self.background.lock().await);
        for handle in handles {
            if let Err(error) = handle.await {
                tracing::error!("Background exam task panicked: {error}");
            }
        }
    }

    async fn confirm_inline(&self, exam: &LocalExam) {
        if self.connectivity.is_usable() {
            self.track(self.engine.spawn_push_one(exam.local_id)).await;
        }
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock().await;
        background.retain(|task| !task.is_finished());
        background.push(handle);
    }
}

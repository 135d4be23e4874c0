//! Push-then-pull reconciliation with an at-most-one-in-flight guard.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{SyncActivity, SyncFailure, SyncOutcome, SyncPhase, SyncReport};
use crate::error::{Error, Result};
use crate::gateway::{CompletionReceipt, ExamPayload, RemoteError, RemoteExam, RemoteGateway};
use crate::models::{ExamPatch, LocalExam, LocalExamId, RemoteExamId, SyncState};
use crate::reminders::ReminderScheduler;
use crate::services::LocalStore;

/// Brings the local store and the remote collection into agreement.
///
/// Cloning is cheap; clones share the in-flight guard.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    reminders: ReminderScheduler,
    in_flight: AtomicBool,
    activity: watch::Sender<SyncActivity>,
}

/// Releases the in-flight flag when the sync ends, including on early return.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Counters for one push phase
#[derive(Debug, Default)]
struct PushTally {
    attempted: usize,
    failed: usize,
}

impl PushTally {
    const fn totally_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        reminders: ReminderScheduler,
    ) -> Self {
        let (activity, _) = watch::channel(SyncActivity::Offline);
        Self {
            inner: Arc::new(EngineInner {
                store,
                gateway,
                reminders,
                in_flight: AtomicBool::new(false),
                activity,
            }),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn activity(&self) -> watch::Receiver<SyncActivity> {
        self.inner.activity.subscribe()
    }

    pub fn current_activity(&self) -> SyncActivity {
        *self.inner.activity.borrow()
    }

    /// Publish `Offline` unless a sync is running.
    pub fn mark_offline(&self) {
        if !self.is_syncing() {
            self.publish(SyncActivity::Offline);
        }
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.inner.store.last_sync_time().await
    }

    fn publish(&self, activity: SyncActivity) {
        self.inner.activity.send_replace(activity);
    }

    /// Claim the in-flight flag before any suspension point.
    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.inner.in_flight))
    }

    /// Run a full push-then-pull cycle.
    ///
    /// Returns `Skipped` immediately when another sync (or inline push) is in
    /// flight. Per-record remote failures are collected in the report; only
    /// store failures are returned as errors.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Sync already in progress; skipping");
            return Ok(SyncOutcome::Skipped);
        };

        self.publish(SyncActivity::Syncing);
        let result = self.run_cycle().await;
        self.publish_result(&result);
        result.map(SyncOutcome::Completed)
    }

    /// Push a single pending exam right away, under the same guard as `sync`.
    pub async fn push_one(&self, local_id: LocalExamId) -> Result<SyncOutcome> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!(exam = %local_id, "Sync in progress; inline push deferred");
            return Ok(SyncOutcome::Skipped);
        };

        self.publish(SyncActivity::Syncing);
        let result: Result<SyncReport> = async {
            let mut report = SyncReport::default();
            if let Some(exam) = self.inner.store.get_by_local_id(local_id).await? {
                if exam.is_pending() {
                    self.push_isolated(&exam, &mut report, &mut PushTally::default())
                        .await?;
                }
            }
            Ok(report)
        }
        .await;
        self.publish_result(&result);
        result.map(SyncOutcome::Completed)
    }

    /// Run `sync` on the runtime without waiting; failures go to the log.
    pub fn spawn_sync(&self, trigger: &'static str) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.sync().await {
                Ok(SyncOutcome::Completed(report)) => {
                    for failure in &report.errors {
                        tracing::warn!(trigger, "Background sync failure: {}", failure.message);
                    }
                }
                Ok(SyncOutcome::Skipped) => {}
                Err(error) => tracing::error!(trigger, "Background sync failed: {error}"),
            }
        })
    }

    /// Run `push_one` on the runtime without waiting; failures go to the log.
    pub fn spawn_push_one(&self, local_id: LocalExamId) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.push_one(local_id).await {
                Ok(SyncOutcome::Completed(report)) => {
                    for failure in &report.errors {
                        tracing::debug!(exam = %local_id, "Inline push left pending: {}", failure.message);
                    }
                }
                Ok(SyncOutcome::Skipped) => {}
                Err(error) => tracing::error!(exam = %local_id, "Inline push failed: {error}"),
            }
        })
    }

    fn publish_result(&self, result: &Result<SyncReport>) {
        let activity = match result {
            Ok(report) if report.is_clean() => SyncActivity::Synced,
            _ => SyncActivity::Error,
        };
        self.publish(activity);
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let push = self.push_phase(&mut report).await?;
        let pull_succeeded = self.pull_phase(&mut report).await?;

        if push.totally_failed() && !pull_succeeded {
            tracing::warn!("Sync made no progress; lastSyncTime unchanged");
        } else {
            let now = Utc::now();
            self.inner.store.set_last_sync_time(now).await?;
            report.last_sync_time = Some(now);
        }

        tracing::info!(
            pushed = report.pushed,
            pulled = report.pulled,
            purged = report.purged,
            errors = report.errors.len(),
            "Sync finished"
        );
        Ok(report)
    }

    // Push

    async fn push_phase(&self, report: &mut SyncReport) -> Result<PushTally> {
        let pending = self.inner.store.list_pending().await?;
        let mut tally = PushTally::default();
        tracing::debug!(count = pending.len(), "Pushing pending exams");

        for exam in &pending {
            self.push_isolated(exam, report, &mut tally).await?;
        }
        Ok(tally)
    }

    /// Push one record, turning a remote failure into a collected error.
    async fn push_isolated(
        &self,
        exam: &LocalExam,
        report: &mut SyncReport,
        tally: &mut PushTally,
    ) -> Result<()> {
        tally.attempted += 1;
        match self.push_record(exam).await {
            Ok(()) => {
                report.pushed += 1;
                Ok(())
            }
            Err(Error::RemoteRequestFailed(error)) => {
                tally.failed += 1;
                tracing::warn!(exam = %exam.exam_ref(), "Push failed, will retry: {error}");
                report.errors.push(SyncFailure {
                    phase: SyncPhase::Push,
                    exam: Some(exam.exam_ref()),
                    message: error.to_string(),
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn push_record(&self, exam: &LocalExam) -> Result<()> {
        let store = &self.inner.store;
        let gateway = &self.inner.gateway;

        match (exam.tombstoned, exam.remote_id) {
            (true, Some(remote_id)) => {
                match gateway.delete_exam(remote_id).await {
                    Ok(()) => {}
                    Err(error) if error.is_not_found() => {
                        tracing::debug!(exam = %exam.exam_ref(), "Already gone remotely");
                    }
                    Err(error) => return Err(error.into()),
                }
                self.discard_local(exam.local_id).await?;
                tracing::debug!(exam = %exam.exam_ref(), "Pushed delete");
            }
            (true, None) => {
                // Never reached the server; nothing to tell it
                self.discard_local(exam.local_id).await?;
            }
            (false, None) => {
                let created = gateway.create_exam(&ExamPayload::for_create(exam)).await?;
                if store.bind_remote_id(exam, created.id, created.stamps()).await? {
                    tracing::debug!(exam = %exam.local_id, remote = %created.id, "Pushed create");
                } else {
                    // Edited or deleted while the create was in flight
                    tracing::debug!(exam = %exam.local_id, remote = %created.id, "Pushed create; newer local change pending");
                    return Ok(());
                }

                if exam.is_complete {
                    if let Err(error) = self.push_completion(exam.local_id, created.id).await {
                        // Bound but not completed: keep it pending for the next cycle
                        store
                            .patch(
                                exam.local_id,
                                &ExamPatch {
                                    sync_state: Some(SyncState::Pending),
                                    ..ExamPatch::default()
                                },
                            )
                            .await?;
                        return Err(error);
                    }
                }
            }
            (false, Some(remote_id)) if exam.is_complete => {
                self.push_completion(exam.local_id, remote_id).await?;
            }
            (false, Some(remote_id)) => {
                let updated = gateway
                    .update_exam(remote_id, &ExamPayload::for_update(exam))
                    .await?;
                if store.mark_synced(exam, updated.stamps()).await? {
                    tracing::debug!(exam = %exam.exam_ref(), "Pushed update");
                } else {
                    tracing::debug!(exam = %exam.exam_ref(), "Pushed update; newer local change pending");
                }
            }
        }
        Ok(())
    }

    /// Completing deletes the exam server-side and awards coins.
    async fn push_completion(&self, local_id: LocalExamId, remote_id: RemoteExamId) -> Result<()> {
        let receipt = match self.inner.gateway.complete_exam(remote_id).await {
            Ok(receipt) => receipt,
            Err(RemoteError::NotFound) => {
                tracing::debug!(remote = %remote_id, "Completed exam already gone remotely");
                CompletionReceipt {
                    success: true,
                    coins_awarded: 0,
                }
            }
            Err(error) => return Err(error.into()),
        };

        self.discard_local(local_id).await?;
        self.credit_coins(receipt.coins_awarded).await?;
        tracing::info!(
            remote = %remote_id,
            coins = receipt.coins_awarded,
            "Exam completed"
        );
        Ok(())
    }

    async fn credit_coins(&self, awarded: i64) -> Result<()> {
        if awarded == 0 {
            return Ok(());
        }
        if let Some(cached) = self.inner.store.cached_profile().await? {
            let profile = cached.profile;
            self.inner
                .store
                .update_cached_coins(profile.id, profile.coin.saturating_add(awarded))
                .await?;
        }
        Ok(())
    }

    async fn discard_local(&self, local_id: LocalExamId) -> Result<()> {
        self.inner.reminders.cancel_for(local_id).await?;
        self.inner.store.purge(local_id).await?;
        Ok(())
    }

    // Pull

    /// Returns whether the remote fetch succeeded.
    async fn pull_phase(&self, report: &mut SyncReport) -> Result<bool> {
        let remote = match self.inner.gateway.list_exams().await {
            Ok(remote) => remote,
            Err(error) => {
                tracing::warn!("Pull failed, will retry: {error}");
                report.errors.push(SyncFailure {
                    phase: SyncPhase::Pull,
                    exam: None,
                    message: error.to_string(),
                });
                return Ok(false);
            }
        };

        let mut seen = HashSet::with_capacity(remote.len());
        for remote_exam in &remote {
            seen.insert(remote_exam.id);
            if self.merge_remote(remote_exam).await? {
                report.pulled += 1;
            }
        }

        for local in self.inner.store.list_synced().await? {
            let Some(remote_id) = local.remote_id else {
                continue;
            };
            if !seen.contains(&remote_id) {
                self.discard_local(local.local_id).await?;
                report.purged += 1;
                tracing::debug!(exam = %local.exam_ref(), "Removed exam deleted remotely");
            }
        }

        Ok(true)
    }

    /// Apply one remote record; returns whether the local store changed.
    async fn merge_remote(&self, remote: &RemoteExam) -> Result<bool> {
        let store = &self.inner.store;

        let Some(local) = store.get_by_remote_id(remote.id).await? else {
            let inserted = store.insert(&remote.to_draft(), SyncState::Synced).await?;
            self.inner.reminders.schedule_for(&inserted).await?;
            tracing::debug!(exam = %inserted.exam_ref(), "Pulled new exam");
            return Ok(true);
        };

        if local.sync_state != SyncState::Synced || local.tombstoned {
            // Local edit wins until it is pushed
            tracing::debug!(exam = %local.exam_ref(), "Keeping pending local edit");
            return Ok(false);
        }

        if !remote.differs_from(&local) {
            return Ok(false);
        }

        let reminders_changed =
            remote.affects_reminders_of(&local) || remote.is_complete != local.is_complete;
        let Some(updated) = store.apply_remote(local.local_id, &remote.to_patch()).await? else {
            tracing::debug!(exam = %local.exam_ref(), "Local edit landed during pull; keeping it");
            return Ok(false);
        };
        if reminders_changed {
            self.inner.reminders.reschedule(&updated).await?;
        }
        tracing::debug!(exam = %updated.exam_ref(), "Applied remote changes");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExamDraft, ExamRef, ExamWindow, FieldPatch, UserProfile};
    use crate::test_support::{FakeGateway, RecordingNotifier};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    struct Harness {
        store: LocalStore,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
        engine: SyncEngine,
    }

    async fn harness() -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reminders = ReminderScheduler::new(store.clone(), notifier.clone());
        let engine = SyncEngine::new(store.clone(), gateway.clone(), reminders);
        Harness {
            store,
            gateway,
            notifier,
            engine,
        }
    }

    fn future_time(days: i64) -> DateTime<Utc> {
        let at = Utc::now() + Duration::days(days);
        crate::util::datetime_from_millis(at.timestamp_millis())
    }

    async fn completed(engine: &SyncEngine) -> SyncReport {
        match engine.sync().await.unwrap() {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::Skipped => panic!("sync unexpectedly skipped"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_create_then_sync_binds_remote_id() {
        let h = harness().await;
        let exam = h
            .store
            .insert(
                &ExamDraft::new("Midterm", future_time(5)),
                SyncState::Pending,
            )
            .await
            .unwrap();

        let listed = h.store.list_active(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sync_state, SyncState::Pending);
        assert_eq!(listed[0].remote_id, None);
        assert_eq!(listed[0].exam_ref(), ExamRef::Local(exam.local_id));

        let report = completed(&h.engine).await;
        assert_eq!((report.pushed, report.pulled), (1, 0));
        assert!(report.is_clean());

        let listed = h.store.list_active(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sync_state, SyncState::Synced);
        let remote_id = listed[0].remote_id.expect("remote id bound");
        assert_eq!(listed[0].exam_ref(), ExamRef::Remote(remote_id));
        assert_eq!(h.gateway.remote_exams().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_sync_is_a_no_op() {
        let h = harness().await;
        h.store
            .insert(
                &ExamDraft::new("Algebra", future_time(3))
                    .with_description("Hall B")
                    .with_reminders([60]),
                SyncState::Pending,
            )
            .await
            .unwrap();
        h.gateway
            .insert_remote(
                ExamDraft::new("Geometry", future_time(4)).with_reminders([1440]),
            )
            .await;

        let first = completed(&h.engine).await;
        assert_eq!((first.pushed, first.pulled), (1, 1));

        let second = completed(&h.engine).await;
        assert_eq!((second.pushed, second.pulled, second.purged), (0, 0, 0));
        assert!(second.is_clean());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_sync_is_skipped() {
        let h = harness().await;
        h.store
            .insert(&ExamDraft::new("Slow", future_time(2)), SyncState::Pending)
            .await
            .unwrap();
        h.gateway.set_delay(std::time::Duration::from_millis(200)).await;

        let (first, second) = tokio::join!(h.engine.sync(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            h.engine.sync().await
        });

        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_skipped()).count(), 1);
        assert_eq!(h.gateway.call_count("create").await, 1);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_local_edit_survives_remote_change() {
        let h = harness().await;
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("Chemistry", future_time(6)))
            .await;
        completed(&h.engine).await;

        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();
        h.store
            .patch(
                local.local_id,
                &ExamPatch {
                    name: Some("Chemistry (local)".to_string()),
                    ..ExamPatch::default()
                },
            )
            .await
            .unwrap();
        h.gateway
            .edit_remote(remote_id, |exam| exam.name = "Chemistry (remote)".to_string())
            .await;
        // Push fails, so the pull sees a pending local row
        h.gateway.set_fail_writes(true).await;

        let report = completed(&h.engine).await;
        assert_eq!(report.pulled, 0);
        assert_eq!(report.errors.len(), 1);

        let after = h.store.get_by_local_id(local.local_id).await.unwrap().unwrap();
        assert_eq!(after.name, "Chemistry (local)");
        assert_eq!(after.sync_state, SyncState::Pending);
    }

    async fn synced_then_edited(h: &Harness, name: &str) -> (RemoteExamId, LocalExam) {
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new(name, future_time(5)))
            .await;
        completed(&h.engine).await;
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();
        let edited = h
            .store
            .patch(
                local.local_id,
                &ExamPatch {
                    name: Some(format!("{name} v1")),
                    ..ExamPatch::default()
                },
            )
            .await
            .unwrap();
        (remote_id, edited)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_during_update_push_still_reaches_server() {
        let h = harness().await;
        let (remote_id, exam) = synced_then_edited(&h, "Geology").await;
        h.gateway
            .set_delay(std::time::Duration::from_millis(200))
            .await;

        let (first, deleted) = tokio::join!(h.engine.sync(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            h.store.tombstone(exam.local_id).await
        });
        first.unwrap();
        deleted.unwrap();

        let stranded = h.store.get_by_local_id(exam.local_id).await.unwrap().unwrap();
        assert!(stranded.tombstoned);
        assert_eq!(stranded.sync_state, SyncState::Pending);

        h.gateway.set_delay(std::time::Duration::ZERO).await;
        completed(&h.engine).await;

        assert_eq!(h.store.get_by_local_id(exam.local_id).await.unwrap(), None);
        assert!(h
            .gateway
            .remote_exams()
            .await
            .iter()
            .all(|remote| remote.id != remote_id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_during_update_push_is_pushed_next_cycle() {
        let h = harness().await;
        let (remote_id, exam) = synced_then_edited(&h, "Algebra").await;
        h.gateway
            .set_delay(std::time::Duration::from_millis(200))
            .await;

        let (first, edited) = tokio::join!(h.engine.sync(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            h.store
                .patch(
                    exam.local_id,
                    &ExamPatch {
                        name: Some("Algebra v2".to_string()),
                        ..ExamPatch::default()
                    },
                )
                .await
        });
        first.unwrap();
        edited.unwrap();

        let after_first = h.store.get_by_local_id(exam.local_id).await.unwrap().unwrap();
        assert_eq!(after_first.name, "Algebra v2");
        assert_eq!(after_first.sync_state, SyncState::Pending);

        h.gateway.set_delay(std::time::Duration::ZERO).await;
        completed(&h.engine).await;

        let local = h.store.get_by_local_id(exam.local_id).await.unwrap().unwrap();
        assert_eq!(local.name, "Algebra v2");
        assert_eq!(local.sync_state, SyncState::Synced);
        let remote = h
            .gateway
            .remote_exams()
            .await
            .into_iter()
            .find(|remote| remote.id == remote_id)
            .unwrap();
        assert_eq!(remote.name, "Algebra v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_during_create_push_removes_server_copy() {
        let h = harness().await;
        let exam = h
            .store
            .insert(&ExamDraft::new("Drafted", future_time(4)), SyncState::Pending)
            .await
            .unwrap();
        h.gateway
            .set_delay(std::time::Duration::from_millis(200))
            .await;

        let (first, deleted) = tokio::join!(h.engine.sync(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            h.store.tombstone(exam.local_id).await
        });
        first.unwrap();
        deleted.unwrap();

        let bound = h.store.get_by_local_id(exam.local_id).await.unwrap().unwrap();
        assert!(bound.remote_id.is_some());
        assert!(bound.tombstoned);
        assert_eq!(bound.sync_state, SyncState::Pending);
        assert_eq!(h.gateway.remote_exams().await.len(), 1);

        h.gateway.set_delay(std::time::Duration::ZERO).await;
        completed(&h.engine).await;

        assert_eq!(h.store.get_by_local_id(exam.local_id).await.unwrap(), None);
        assert!(h.gateway.remote_exams().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_remote_rows_are_not_rewritten() {
        let h = harness().await;
        h.gateway
            .insert_remote(ExamDraft::new("Steady", future_time(3)))
            .await;
        assert_eq!(completed(&h.engine).await.pulled, 1);
        assert_eq!(completed(&h.engine).await.pulled, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn synced_copy_takes_remote_values() {
        let h = harness().await;
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("Biology", future_time(6)).with_reminders([60]))
            .await;
        completed(&h.engine).await;
        let scheduled_before = h.notifier.scheduled().await.len();
        assert_eq!(scheduled_before, 1);

        let moved = future_time(8);
        h.gateway
            .edit_remote(remote_id, |exam| {
                exam.exam_date_time = moved;
                exam.description = Some("Lab 2".to_string());
            })
            .await;

        let report = completed(&h.engine).await;
        assert_eq!(report.pulled, 1);

        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();
        assert_eq!(local.exam_date_time, moved);
        assert_eq!(local.description.as_deref(), Some("Lab 2"));
        assert_eq!(local.sync_state, SyncState::Synced);
        assert_eq!(local.locally_modified_at, None);
        let server = h
            .gateway
            .remote_exams()
            .await
            .into_iter()
            .find(|exam| exam.id == remote_id)
            .unwrap();
        assert_eq!(Some(local.created_at), server.created_at);
        assert_eq!(Some(local.updated_at), server.updated_at);

        // Reminders were recreated for the new time
        assert_eq!(h.notifier.cancelled().await.len(), 1);
        let rows = h.store.schedules_for_exam(local.local_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scheduled_at, moved - Duration::minutes(60));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tombstone_is_hidden_then_purged() {
        let h = harness().await;
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("History", future_time(2)))
            .await;
        completed(&h.engine).await;
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();

        h.store.tombstone(local.local_id).await.unwrap();
        assert!(h.store.list_active(None).await.unwrap().is_empty());

        let report = completed(&h.engine).await;
        assert_eq!(report.pushed, 1);
        assert!(h.store.get_by_local_id(local.local_id).await.unwrap().is_none());
        assert!(h.gateway.remote_exams().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unpushed_tombstone_is_purged_without_remote_call() {
        let h = harness().await;
        let exam = h
            .store
            .insert(&ExamDraft::new("Draft", future_time(2)), SyncState::Pending)
            .await
            .unwrap();
        h.store.tombstone(exam.local_id).await.unwrap();

        completed(&h.engine).await;

        assert!(h.store.get_by_local_id(exam.local_id).await.unwrap().is_none());
        assert_eq!(h.gateway.call_count("delete").await, 0);
        assert_eq!(h.gateway.call_count("create").await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_deletion_purges_synced_copy() {
        let h = harness().await;
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("Art", future_time(2)).with_reminders([30]))
            .await;
        completed(&h.engine).await;
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();

        h.gateway.remove_remote(remote_id).await;
        let report = completed(&h.engine).await;

        assert_eq!(report.purged, 1);
        assert!(h.store.get_by_local_id(local.local_id).await.unwrap().is_none());
        assert!(h.store.all_schedules().await.unwrap().is_empty());
        assert_eq!(h.notifier.cancelled().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_failures_are_isolated_per_record() {
        let h = harness().await;
        for name in ["Good A", "Broken", "Good B"] {
            h.store
                .insert(&ExamDraft::new(name, future_time(3)), SyncState::Pending)
                .await
                .unwrap();
        }
        h.gateway.fail_writes_for("Broken").await;

        let report = completed(&h.engine).await;

        assert_eq!(report.pushed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].phase, SyncPhase::Push);
        let pending = h.store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Broken");
        assert_eq!(h.engine.current_activity(), SyncActivity::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_failure_keeps_push_effects() {
        let h = harness().await;
        let exam = h
            .store
            .insert(&ExamDraft::new("Physics", future_time(1)), SyncState::Pending)
            .await
            .unwrap();
        h.gateway.set_fail_list(true).await;

        let report = completed(&h.engine).await;

        assert_eq!(report.pushed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].phase, SyncPhase::Pull);
        let synced = h.store.get_by_local_id(exam.local_id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Synced);
        // Push succeeded, so the run counts as progress
        assert!(report.last_sync_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_sync_time_only_moves_on_progress() {
        let h = harness().await;
        h.store
            .insert(&ExamDraft::new("Music", future_time(1)), SyncState::Pending)
            .await
            .unwrap();
        h.gateway.set_fail_writes(true).await;
        h.gateway.set_fail_list(true).await;

        let failed = completed(&h.engine).await;
        assert_eq!(failed.errors.len(), 2);
        assert_eq!(failed.last_sync_time, None);
        assert_eq!(h.engine.last_sync_time().await.unwrap(), None);

        h.gateway.set_fail_writes(false).await;
        let partial = completed(&h.engine).await;
        assert_eq!(partial.pushed, 1);
        assert_eq!(h.engine.last_sync_time().await.unwrap(), partial.last_sync_time);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn uninitialized_store_fails_sync() {
        let store = LocalStore::uninitialized();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(FakeGateway::default()),
            ReminderScheduler::new(store, notifier),
        );

        assert!(matches!(engine.sync().await, Err(Error::StoreUnavailable)));
        assert!(!engine.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completion_purges_and_credits_coins() {
        let h = harness().await;
        h.store
            .save_profile(&UserProfile {
                id: 9,
                student_id: "6500009".to_string(),
                first_name: "Lin".to_string(),
                last_name: "Chen".to_string(),
                email: "lin@example.com".to_string(),
                coin: 10,
                equipped_item: None,
            })
            .await
            .unwrap();
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("Thesis", future_time(1)))
            .await;
        completed(&h.engine).await;
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();

        h.store
            .patch(
                local.local_id,
                &ExamPatch {
                    is_complete: Some(true),
                    ..ExamPatch::default()
                },
            )
            .await
            .unwrap();
        let outcome = h.engine.push_one(local.local_id).await.unwrap();

        assert_eq!(outcome.report().map(|r| r.pushed), Some(1));
        assert!(h.store.get_by_local_id(local.local_id).await.unwrap().is_none());
        assert_eq!(h.store.cached_profile().await.unwrap().unwrap().profile.coin, 15);
        assert!(h.gateway.remote_exams().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_one_respects_in_flight_sync() {
        let h = harness().await;
        let exam = h
            .store
            .insert(&ExamDraft::new("Race", future_time(2)), SyncState::Pending)
            .await
            .unwrap();
        h.gateway.set_delay(std::time::Duration::from_millis(200)).await;

        let (full, inline) = tokio::join!(h.engine.sync(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            h.engine.push_one(exam.local_id).await
        });

        assert!(!full.unwrap().is_skipped());
        assert!(inline.unwrap().is_skipped());
        assert_eq!(h.gateway.call_count("create").await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cleared_description_reaches_server() {
        let h = harness().await;
        let remote_id = h
            .gateway
            .insert_remote(ExamDraft::new("Law", future_time(2)).with_description("Room 1"))
            .await;
        completed(&h.engine).await;
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();

        h.store
            .patch(
                local.local_id,
                &ExamPatch {
                    description: FieldPatch::Clear,
                    ..ExamPatch::default()
                },
            )
            .await
            .unwrap();
        let report = completed(&h.engine).await;

        assert_eq!((report.pushed, report.pulled), (1, 0));
        let remote = h.gateway.remote_exams().await;
        assert_eq!(remote[0].description.as_deref(), Some(""));
        let local = h.store.get_by_remote_id(remote_id).await.unwrap().unwrap();
        assert_eq!(local.description, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn window_filters_after_pull() {
        let h = harness().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        for days in [-1, 3, 10, 40] {
            h.gateway
                .insert_remote(ExamDraft::new(format!("d{days}"), now + Duration::days(days)))
                .await;
        }
        completed(&h.engine).await;

        let names = |exams: Vec<LocalExam>| exams.into_iter().map(|e| e.name).collect::<Vec<_>>();
        assert_eq!(
            names(
                h.store
                    .list_active_at(Some(ExamWindow::ThisWeek), now)
                    .await
                    .unwrap()
            ),
            vec!["d3"]
        );
        assert_eq!(
            names(
                h.store
                    .list_active_at(Some(ExamWindow::ThisMonth), now)
                    .await
                    .unwrap()
            ),
            vec!["d3", "d10"]
        );
    }
}

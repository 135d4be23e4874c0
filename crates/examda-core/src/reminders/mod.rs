//! Exam reminders: turns reminder offsets into platform notifications and
//! keeps the schedule table in step with them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{ExamRef, LocalExam, LocalExamId, NewSchedule, NotificationSchedule, NotifierHandle};
use crate::services::LocalStore;

/// Platform notification scheduler.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn schedule(
        &self,
        exam: ExamRef,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<NotifierHandle>;

    async fn cancel(&self, handle: &NotifierHandle) -> Result<()>;
}

/// Notifier for hosts without a notification service: reminders are only
/// written to the log.
#[derive(Debug, Default)]
pub struct LogNotifier {
    next_id: AtomicU64,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn schedule(
        &self,
        exam: ExamRef,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<NotifierHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = NotifierHandle::new(format!("log-{exam}-{id}"));
        tracing::info!(%exam, %fire_at, %handle, "{title}: {body}");
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotifierHandle) -> Result<()> {
        tracing::debug!(%handle, "Cancelled reminder");
        Ok(())
    }
}

pub const REMINDER_TITLE: &str = "Exam reminder";

/// Body text for a reminder `minutes` before `exam_name`.
pub fn reminder_body(exam_name: &str, minutes: u32) -> String {
    let when = match minutes {
        1 => "starts in 1 minute".to_string(),
        60 => "starts in 1 hour".to_string(),
        1440 => "is tomorrow".to_string(),
        other => format!("starts in {other} minutes"),
    };
    format!("{exam_name} {when}!")
}

/// Keeps notifier handles and `notification_schedules` rows consistent.
#[derive(Clone)]
pub struct ReminderScheduler {
    store: LocalStore,
    notifier: Arc<dyn Notifier>,
}

impl ReminderScheduler {
    pub fn new(store: LocalStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Schedule one notification per offset whose fire time is still ahead.
    pub async fn schedule_for(&self, exam: &LocalExam) -> Result<Vec<NotificationSchedule>> {
        self.schedule_for_at(exam, Utc::now()).await
    }

    /// `schedule_for` relative to an explicit instant.
    pub async fn schedule_for_at(
        &self,
        exam: &LocalExam,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationSchedule>> {
        if exam.is_complete || exam.tombstoned {
            return Ok(Vec::new());
        }

        let mut scheduled = Vec::new();
        for &minutes in &exam.reminder_offsets {
            let fire_at = exam.exam_date_time - Duration::minutes(i64::from(minutes));
            if fire_at <= now {
                tracing::debug!(
                    exam = %exam.exam_ref(),
                    minutes,
                    "Skipping reminder whose time already passed"
                );
                continue;
            }

            let body = reminder_body(&exam.name, minutes);
            // One failing offset must not stop the others
            let handle = match self
                .notifier
                .schedule(exam.exam_ref(), REMINDER_TITLE, &body, fire_at)
                .await
            {
                Ok(handle) => handle,
                Err(error) => {
                    tracing::warn!(
                        exam = %exam.exam_ref(),
                        minutes,
                        "Failed to schedule reminder: {error}"
                    );
                    continue;
                }
            };

            let row = self
                .store
                .insert_schedule(&NewSchedule {
                    exam_local_id: exam.local_id,
                    exam_remote_id: exam.remote_id,
                    minutes_before: minutes,
                    scheduled_at: fire_at,
                    notifier_handle: handle,
                })
                .await?;
            scheduled.push(row);
        }

        tracing::debug!(
            exam = %exam.exam_ref(),
            count = scheduled.len(),
            "Scheduled reminders"
        );
        Ok(scheduled)
    }

    /// Cancel every notifier handle of an exam and delete its rows.
    pub async fn cancel_for(&self, exam: LocalExamId) -> Result<usize> {
        let schedules = self.store.schedules_for_exam(exam).await?;
        for schedule in &schedules {
            self.cancel_handle(&schedule.notifier_handle).await;
        }
        self.store.delete_schedules_for_exam(exam).await?;
        Ok(schedules.len())
    }

    /// Drop all of an exam's reminders and recreate them from its current
    /// fields. No partial diffing.
    pub async fn reschedule(&self, exam: &LocalExam) -> Result<Vec<NotificationSchedule>> {
        self.cancel_for(exam.local_id).await?;
        self.schedule_for(exam).await
    }

    /// Cancel every scheduled notification; rows are left to the caller.
    pub async fn cancel_all(&self) -> Result<usize> {
        let schedules = self.store.all_schedules().await?;
        for schedule in &schedules {
            self.cancel_handle(&schedule.notifier_handle).await;
        }
        Ok(schedules.len())
    }

    async fn cancel_handle(&self, handle: &NotifierHandle) {
        if let Err(error) = self.notifier.cancel(handle).await {
            tracing::warn!(%handle, "Failed to cancel reminder: {error}");
        }
    }
}

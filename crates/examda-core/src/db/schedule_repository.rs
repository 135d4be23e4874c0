//! Reminder schedule repository implementation

use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{
    LocalExamId, NewSchedule, NotificationSchedule, NotifierHandle, RemoteExamId, SyncState,
};
use crate::util::datetime_from_millis;

/// Trait for reminder schedule storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ScheduleRepository {
    /// Record a reminder that was handed to the notifier
    async fn insert(&self, schedule: &NewSchedule) -> Result<NotificationSchedule>;

    /// All schedules of one exam, earliest first
    async fn list_for_exam(&self, exam: LocalExamId) -> Result<Vec<NotificationSchedule>>;

    /// Every schedule row
    async fn list_all(&self) -> Result<Vec<NotificationSchedule>>;

    /// Delete all schedules of one exam; returns the number removed
    async fn delete_for_exam(&self, exam: LocalExamId) -> Result<u64>;

    /// Attach the server id once the parent exam is pushed
    async fn bind_remote_id(&self, exam: LocalExamId, remote_id: RemoteExamId) -> Result<()>;

    /// Mark all schedules of one exam as synced
    async fn mark_synced(&self, exam: LocalExamId) -> Result<()>;

    /// Remove every schedule row
    async fn delete_all(&self) -> Result<()>;
}

/// libSQL implementation of `ScheduleRepository`
pub struct LibSqlScheduleRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlScheduleRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_schedule(row: &Row) -> Result<NotificationSchedule> {
        let minutes_before: i64 = row.get(3)?;
        Ok(NotificationSchedule {
            id: row.get(0)?,
            exam_local_id: LocalExamId::new(row.get(1)?),
            exam_remote_id: row.get::<Option<i64>>(2)?.map(RemoteExamId::new),
            minutes_before: u32::try_from(minutes_before).unwrap_or_default(),
            scheduled_at: datetime_from_millis(row.get(4)?),
            notifier_handle: NotifierHandle::new(row.get::<String>(5)?),
            sync_state: row.get::<String>(6)?.parse()?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<NotificationSchedule>> {
        let mut schedules = Vec::new();
        while let Some(row) = rows.next().await? {
            schedules.push(Self::parse_schedule(&row)?);
        }
        Ok(schedules)
    }
}

impl ScheduleRepository for LibSqlScheduleRepository<'_> {
    async fn insert(&self, schedule: &NewSchedule) -> Result<NotificationSchedule> {
        // A schedule inherits its parent's state: bound exams start out synced
        let sync_state = if schedule.exam_remote_id.is_some() {
            SyncState::Synced
        } else {
            SyncState::Pending
        };

        self.conn
            .execute(
                "INSERT INTO notification_schedules (
                    exam_local_id, exam_remote_id, minutes_before, scheduled_at,
                    notifier_handle, sync_state
                 ) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    schedule.exam_local_id.get(),
                    schedule.exam_remote_id.map(RemoteExamId::get),
                    i64::from(schedule.minutes_before),
                    schedule.scheduled_at.timestamp_millis(),
                    schedule.notifier_handle.as_str(),
                    sync_state.as_str()
                ],
            )
            .await?;

        Ok(NotificationSchedule {
            id: self.conn.last_insert_rowid(),
            exam_local_id: schedule.exam_local_id,
            exam_remote_id: schedule.exam_remote_id,
            minutes_before: schedule.minutes_before,
            scheduled_at: schedule.scheduled_at,
            notifier_handle: schedule.notifier_handle.clone(),
            sync_state,
        })
    }

    async fn list_for_exam(&self, exam: LocalExamId) -> Result<Vec<NotificationSchedule>> {
        let rows = self
            .conn
            .query(
                "SELECT id, exam_local_id, exam_remote_id, minutes_before, scheduled_at,
                        notifier_handle, sync_state
                 FROM notification_schedules
                 WHERE exam_local_id = ?
                 ORDER BY scheduled_at ASC, id ASC",
                params![exam.get()],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_all(&self) -> Result<Vec<NotificationSchedule>> {
        let rows = self
            .conn
            .query(
                "SELECT id, exam_local_id, exam_remote_id, minutes_before, scheduled_at,
                        notifier_handle, sync_state
                 FROM notification_schedules
                 ORDER BY scheduled_at ASC, id ASC",
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn delete_for_exam(&self, exam: LocalExamId) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM notification_schedules WHERE exam_local_id = ?",
                params![exam.get()],
            )
            .await?;
        Ok(removed)
    }

    async fn bind_remote_id(&self, exam: LocalExamId, remote_id: RemoteExamId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE notification_schedules SET exam_remote_id = ? WHERE exam_local_id = ?",
                params![remote_id.get(), exam.get()],
            )
            .await?;
        Ok(())
    }

    async fn mark_synced(&self, exam: LocalExamId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE notification_schedules SET sync_state = 'synced' WHERE exam_local_id = ?",
                params![exam.get()],
            )
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM notification_schedules", ())
            .await?;
        Ok(())
    }
}

//! Exam repository implementation

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    ExamDraft, ExamPatch, ExamWindow, FieldPatch, LocalExam, LocalExamId, RemoteExamId, ServerStamps,
    SyncState,
};
use crate::util::{datetime_from_millis, now_millis_precision};

const EXAM_COLUMNS: &str = "local_id, remote_id, name, description, exam_date_time, \
     reminder_offsets, is_complete, sync_state, created_at, updated_at, \
     locally_modified_at, tombstoned";

/// Trait for exam storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ExamRepository {
    /// Non-tombstoned exams ordered by exam time, optionally limited to a window
    async fn list_active(
        &self,
        window: Option<ExamWindow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<LocalExam>>;

    /// Point lookup by local id (tombstoned rows included)
    async fn get_by_local_id(&self, id: LocalExamId) -> Result<Option<LocalExam>>;

    /// Point lookup by remote id (tombstoned rows included)
    async fn get_by_remote_id(&self, id: RemoteExamId) -> Result<Option<LocalExam>>;

    /// Insert a new exam with a fresh local id
    async fn insert(&self, draft: &ExamDraft, sync_state: SyncState) -> Result<LocalExam>;

    /// Merge the provided fields into an existing exam
    async fn patch(&self, id: LocalExamId, patch: &ExamPatch) -> Result<LocalExam>;

    /// Mark an exam deleted locally, pending remote deletion
    async fn tombstone(&self, id: LocalExamId) -> Result<()>;

    /// Physically remove an exam row; returns whether a row existed
    async fn purge(&self, id: LocalExamId) -> Result<bool>;

    /// Every `Pending` exam, tombstoned ones included
    async fn list_pending(&self) -> Result<Vec<LocalExam>>;

    /// Every `Synced` exam that has a remote id
    async fn list_synced(&self) -> Result<Vec<LocalExam>>;

    /// Overwrite a `Synced` row with server values. Returns `None` without
    /// writing when the row is pending, tombstoned, or gone.
    async fn apply_remote(&self, id: LocalExamId, patch: &ExamPatch) -> Result<Option<LocalExam>>;

    /// Record the server identity after a successful create. The row only
    /// turns `Synced` (taking the server stamps) if it is unchanged since
    /// `pushed` was read; returns whether it did.
    async fn bind_remote_id(
        &self,
        pushed: &LocalExam,
        remote_id: RemoteExamId,
        stamps: ServerStamps,
    ) -> Result<bool>;

    /// Mark the pushed snapshot as matching the server copy. Returns `false`
    /// and leaves the row pending if it changed while the push was in flight.
    async fn mark_synced(&self, pushed: &LocalExam, stamps: ServerStamps) -> Result<bool>;

    /// Remove every exam row
    async fn delete_all(&self) -> Result<()>;
}

/// libSQL implementation of `ExamRepository`
pub struct LibSqlExamRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlExamRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an exam from a database row selected with `EXAM_COLUMNS`
    fn parse_exam(row: &Row) -> Result<LocalExam> {
        let reminder_json: String = row.get(5)?;
        let reminder_offsets: BTreeSet<u32> = serde_json::from_str(&reminder_json)?;
        let sync_state: SyncState = row.get::<String>(7)?.parse()?;

        Ok(LocalExam {
            local_id: LocalExamId::new(row.get(0)?),
            remote_id: row.get::<Option<i64>>(1)?.map(RemoteExamId::new),
            name: row.get(2)?,
            description: row.get(3)?,
            exam_date_time: datetime_from_millis(row.get(4)?),
            reminder_offsets,
            is_complete: row.get::<i32>(6)? != 0,
            sync_state,
            created_at: datetime_from_millis(row.get(8)?),
            updated_at: datetime_from_millis(row.get(9)?),
            locally_modified_at: row.get::<Option<i64>>(10)?.map(datetime_from_millis),
            tombstoned: row.get::<i32>(11)? != 0,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<LocalExam>> {
        let mut exams = Vec::new();
        while let Some(row) = rows.next().await? {
            exams.push(Self::parse_exam(&row)?);
        }
        Ok(exams)
    }

    async fn first(mut rows: libsql::Rows) -> Result<Option<LocalExam>> {
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_exam(&row)?)),
            None => Ok(None),
        }
    }

    async fn require(&self, id: LocalExamId) -> Result<LocalExam> {
        self.get_by_local_id(id)
            .await?
            .ok_or_else(|| Error::RecordNotFound(format!("l{id}")))
    }

    /// Write a patch; with `only_if_synced` rows carrying local changes are
    /// left alone. Returns the number of rows written.
    async fn write_patch(
        &self,
        id: LocalExamId,
        patch: &ExamPatch,
        only_if_synced: bool,
    ) -> Result<u64> {
        let now = now_millis_precision().timestamp_millis();
        let (sync_state, locally_modified_at) = if patch.marks_synced() {
            (SyncState::Synced, None)
        } else {
            (patch.sync_state.unwrap_or(SyncState::Pending), Some(now))
        };

        let (replace_description, description) = match &patch.description {
            FieldPatch::Keep => (0, None),
            FieldPatch::Clear => (1, None),
            FieldPatch::Set(text) => (1, Some(text.clone())),
        };
        let reminder_offsets = patch
            .reminder_offsets
            .as_ref()
            .map(encode_offsets)
            .transpose()?;

        // Local stamps only move forward so a push can tell it is stale
        let rows = self
            .conn
            .execute(
                "UPDATE exams SET
                    name = COALESCE(?1, name),
                    description = CASE WHEN ?2 = 1 THEN ?3 ELSE description END,
                    exam_date_time = COALESCE(?4, exam_date_time),
                    reminder_offsets = COALESCE(?5, reminder_offsets),
                    is_complete = COALESCE(?6, is_complete),
                    sync_state = ?7,
                    created_at = COALESCE(?8, created_at),
                    updated_at = COALESCE(?9, ?10),
                    locally_modified_at = CASE WHEN ?11 IS NULL THEN NULL
                        ELSE MAX(?11, COALESCE(locally_modified_at + 1, ?11)) END
                 WHERE local_id = ?12
                   AND (?13 = 0 OR (sync_state = 'synced' AND tombstoned = 0))",
                params![
                    patch.name.clone(),
                    replace_description,
                    description,
                    patch.exam_date_time.map(|at| at.timestamp_millis()),
                    reminder_offsets,
                    patch.is_complete.map(i32::from),
                    sync_state.as_str(),
                    patch.created_at.map(|at| at.timestamp_millis()),
                    patch.updated_at.map(|at| at.timestamp_millis()),
                    now,
                    locally_modified_at,
                    id.get(),
                    i32::from(only_if_synced)
                ],
            )
            .await?;
        Ok(rows)
    }
}

fn encode_offsets(offsets: &BTreeSet<u32>) -> Result<String> {
    Ok(serde_json::to_string(offsets)?)
}

impl ExamRepository for LibSqlExamRepository<'_> {
    async fn list_active(
        &self,
        window: Option<ExamWindow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<LocalExam>> {
        let rows = match window {
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {EXAM_COLUMNS} FROM exams
                             WHERE tombstoned = 0
                             ORDER BY exam_date_time ASC, local_id ASC"
                        ),
                        (),
                    )
                    .await?
            }
            Some(window) => {
                let (start, end) = window.bounds(now);
                self.conn
                    .query(
                        &format!(
                            "SELECT {EXAM_COLUMNS} FROM exams
                             WHERE tombstoned = 0
                               AND is_complete = 0
                               AND exam_date_time >= ?
                               AND exam_date_time < ?
                             ORDER BY exam_date_time ASC, local_id ASC"
                        ),
                        params![start.timestamp_millis(), end.timestamp_millis()],
                    )
                    .await?
            }
        };

        Self::collect(rows).await
    }

    async fn get_by_local_id(&self, id: LocalExamId) -> Result<Option<LocalExam>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {EXAM_COLUMNS} FROM exams WHERE local_id = ?"),
                params![id.get()],
            )
            .await?;
        Self::first(rows).await
    }

    async fn get_by_remote_id(&self, id: RemoteExamId) -> Result<Option<LocalExam>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {EXAM_COLUMNS} FROM exams WHERE remote_id = ?"),
                params![id.get()],
            )
            .await?;
        Self::first(rows).await
    }

    async fn insert(&self, draft: &ExamDraft, sync_state: SyncState) -> Result<LocalExam> {
        let now = now_millis_precision().timestamp_millis();
        let locally_modified_at = (sync_state != SyncState::Synced).then_some(now);

        self.conn
            .execute(
                "INSERT INTO exams (
                    remote_id, name, description, exam_date_time, reminder_offsets,
                    is_complete, sync_state, created_at, updated_at, locally_modified_at, tombstoned
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
                params![
                    draft.remote_id.map(RemoteExamId::get),
                    draft.name.clone(),
                    draft.description.clone(),
                    draft.exam_date_time.timestamp_millis(),
                    encode_offsets(&draft.reminder_offsets)?,
                    i32::from(draft.is_complete),
                    sync_state.as_str(),
                    draft.created_at.map_or(now, |at| at.timestamp_millis()),
                    draft.updated_at.map_or(now, |at| at.timestamp_millis()),
                    locally_modified_at
                ],
            )
            .await?;

        let local_id = LocalExamId::new(self.conn.last_insert_rowid());
        self.require(local_id).await
    }

    async fn patch(&self, id: LocalExamId, patch: &ExamPatch) -> Result<LocalExam> {
        if self.write_patch(id, patch, false).await? == 0 {
            return Err(Error::RecordNotFound(format!("l{id}")));
        }
        self.require(id).await
    }

    async fn apply_remote(&self, id: LocalExamId, patch: &ExamPatch) -> Result<Option<LocalExam>> {
        let synced = ExamPatch {
            sync_state: Some(SyncState::Synced),
            ..patch.clone()
        };
        if self.write_patch(id, &synced, true).await? == 0 {
            return Ok(None);
        }
        self.get_by_local_id(id).await
    }

    async fn tombstone(&self, id: LocalExamId) -> Result<()> {
        let now = now_millis_precision().timestamp_millis();
        let rows = self
            .conn
            .execute(
                "UPDATE exams
                 SET tombstoned = 1, sync_state = 'pending',
                     locally_modified_at = MAX(?1, COALESCE(locally_modified_at + 1, ?1))
                 WHERE local_id = ?2",
                params![now, id.get()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::RecordNotFound(format!("l{id}")));
        }
        Ok(())
    }

    async fn purge(&self, id: LocalExamId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM exams WHERE local_id = ?", params![id.get()])
            .await?;
        Ok(rows > 0)
    }

    async fn list_pending(&self) -> Result<Vec<LocalExam>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EXAM_COLUMNS} FROM exams
                     WHERE sync_state = 'pending'
                     ORDER BY local_id ASC"
                ),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_synced(&self) -> Result<Vec<LocalExam>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EXAM_COLUMNS} FROM exams
                     WHERE sync_state = 'synced' AND remote_id IS NOT NULL
                     ORDER BY local_id ASC"
                ),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn bind_remote_id(
        &self,
        pushed: &LocalExam,
        remote_id: RemoteExamId,
        stamps: ServerStamps,
    ) -> Result<bool> {
        let id = pushed.local_id;
        // The remote id is always kept so a later delete can reach the server
        let rows = self
            .conn
            .execute(
                "UPDATE exams SET
                    remote_id = ?1,
                    sync_state = CASE WHEN tombstoned = 0 AND locally_modified_at IS ?2
                        THEN 'synced' ELSE sync_state END,
                    created_at = CASE WHEN tombstoned = 0 AND locally_modified_at IS ?2
                        THEN COALESCE(?3, created_at) ELSE created_at END,
                    updated_at = CASE WHEN tombstoned = 0 AND locally_modified_at IS ?2
                        THEN COALESCE(?4, updated_at) ELSE updated_at END,
                    locally_modified_at = CASE WHEN tombstoned = 0 AND locally_modified_at IS ?2
                        THEN NULL ELSE locally_modified_at END
                 WHERE local_id = ?5",
                params![
                    remote_id.get(),
                    pushed.locally_modified_at.map(|at| at.timestamp_millis()),
                    stamps.created_at.map(|at| at.timestamp_millis()),
                    stamps.updated_at.map(|at| at.timestamp_millis()),
                    id.get()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::RecordNotFound(format!("l{id}")));
        }
        Ok(self.require(id).await?.sync_state == SyncState::Synced)
    }

    async fn mark_synced(&self, pushed: &LocalExam, stamps: ServerStamps) -> Result<bool> {
        let id = pushed.local_id;
        let rows = self
            .conn
            .execute(
                "UPDATE exams
                 SET sync_state = 'synced', locally_modified_at = NULL,
                     created_at = COALESCE(?3, created_at),
                     updated_at = COALESCE(?4, updated_at)
                 WHERE local_id = ?1 AND tombstoned = 0 AND locally_modified_at IS ?2",
                params![
                    id.get(),
                    pushed.locally_modified_at.map(|at| at.timestamp_millis()),
                    stamps.created_at.map(|at| at.timestamp_millis()),
                    stamps.updated_at.map(|at| at.timestamp_millis())
                ],
            )
            .await?;

        if rows > 0 {
            return Ok(true);
        }
        self.require(id).await?;
        Ok(false)
    }

    async fn delete_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM exams", ()).await?;
        Ok(())
    }
}

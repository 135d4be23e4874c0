//! Shared local store used by the façades and the sync engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::db::{
    Database, ExamRepository, LibSqlExamRepository, LibSqlMetadataRepository,
    LibSqlProfileRepository, LibSqlScheduleRepository, MetadataRepository, ProfileRepository,
    ScheduleRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    CachedUserProfile, ExamDraft, ExamPatch, ExamWindow, LocalExam, LocalExamId, NewSchedule,
    NotificationSchedule, RemoteExamId, ServerStamps, SyncState, UserProfile,
};

/// Thread-safe handle to the local database.
///
/// A store created with [`LocalStore::uninitialized`] fails every operation
/// with `StoreUnavailable` until [`LocalStore::initialize`] succeeds.
#[derive(Clone, Default)]
pub struct LocalStore {
    db: Arc<Mutex<Option<Database>>>,
}

/// Gives the unlocked database to a block of repository calls.
macro_rules! with_db {
    ($store:expr, |$db:ident| $body:expr) => {{
        let guard = $store.db.lock().await;
        let $db = Self::database(&guard)?;
        $body
    }};
}

impl LocalStore {
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// Open (or create) the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::uninitialized();
        store.initialize(db_path).await?;
        Ok(store)
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
        })
    }

    /// Open the database file, recovering once from a corrupt file.
    pub async fn initialize(&self, db_path: impl Into<PathBuf>) -> Result<()> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        tracing::debug!("Opened local store at {}", db_path.display());
        *self.db.lock().await = Some(db);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.db.lock().await.is_some()
    }

    fn database<'a>(guard: &'a MutexGuard<'_, Option<Database>>) -> Result<&'a Database> {
        guard.as_ref().ok_or(Error::StoreUnavailable)
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("examda.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        // WAL and shared-memory sidecars belong to the moved file
        for suffix in ["-wal", "-shm"] {
            let sidecar = parent.join(format!("{base_name}{suffix}"));
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale sidecar file {}", sidecar.display());
            }
        }

        Ok(())
    }

    // Exams

    /// Non-tombstoned exams ordered by exam time; windows exclude completed exams.
    pub async fn list_active(&self, window: Option<ExamWindow>) -> Result<Vec<LocalExam>> {
        self.list_active_at(window, Utc::now()).await
    }

    /// `list_active` with an explicit reference instant for the window.
    pub async fn list_active_at(
        &self,
        window: Option<ExamWindow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .list_active(window, now)
                .await
        })
    }

    pub async fn get_by_local_id(&self, id: LocalExamId) -> Result<Option<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .get_by_local_id(id)
                .await
        })
    }

    pub async fn get_by_remote_id(&self, id: RemoteExamId) -> Result<Option<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .get_by_remote_id(id)
                .await
        })
    }

    pub async fn insert(&self, draft: &ExamDraft, sync_state: SyncState) -> Result<LocalExam> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .insert(draft, sync_state)
                .await
        })
    }

    pub async fn patch(&self, id: LocalExamId, patch: &ExamPatch) -> Result<LocalExam> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .patch(id, patch)
                .await
        })
    }

    pub async fn tombstone(&self, id: LocalExamId) -> Result<()> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .tombstone(id)
                .await
        })
    }

    /// Physically delete an exam; its schedule rows go with it.
    pub async fn purge(&self, id: LocalExamId) -> Result<bool> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection()).purge(id).await
        })
    }

    pub async fn list_pending(&self) -> Result<Vec<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .list_pending()
                .await
        })
    }

    pub async fn list_synced(&self) -> Result<Vec<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .list_synced()
                .await
        })
    }

    /// Overwrite a synced exam with server values; `None` if it now has
    /// local changes.
    pub async fn apply_remote(&self, id: LocalExamId, patch: &ExamPatch) -> Result<Option<LocalExam>> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .apply_remote(id, patch)
                .await
        })
    }

    /// Bind the server id to the exam and its schedules. Returns whether the
    /// exam is now `Synced`; edits made since `pushed` was read keep it pending.
    pub async fn bind_remote_id(
        &self,
        pushed: &LocalExam,
        remote_id: RemoteExamId,
        stamps: ServerStamps,
    ) -> Result<bool> {
        with_db!(self, |db| {
            let synced = LibSqlExamRepository::new(db.connection())
                .bind_remote_id(pushed, remote_id, stamps)
                .await?;
            let schedules = LibSqlScheduleRepository::new(db.connection());
            schedules.bind_remote_id(pushed.local_id, remote_id).await?;
            schedules.mark_synced(pushed.local_id).await?;
            Ok(synced)
        })
    }

    /// Mark the pushed snapshot synced unless the row changed meanwhile.
    pub async fn mark_synced(&self, pushed: &LocalExam, stamps: ServerStamps) -> Result<bool> {
        with_db!(self, |db| {
            LibSqlExamRepository::new(db.connection())
                .mark_synced(pushed, stamps)
                .await
        })
    }

    // Reminder schedules

    pub async fn insert_schedule(&self, schedule: &NewSchedule) -> Result<NotificationSchedule> {
        with_db!(self, |db| {
            LibSqlScheduleRepository::new(db.connection())
                .insert(schedule)
                .await
        })
    }

    pub async fn schedules_for_exam(&self, id: LocalExamId) -> Result<Vec<NotificationSchedule>> {
        with_db!(self, |db| {
            LibSqlScheduleRepository::new(db.connection())
                .list_for_exam(id)
                .await
        })
    }

    pub async fn all_schedules(&self) -> Result<Vec<NotificationSchedule>> {
        with_db!(self, |db| {
            LibSqlScheduleRepository::new(db.connection())
                .list_all()
                .await
        })
    }

    pub async fn delete_schedules_for_exam(&self, id: LocalExamId) -> Result<u64> {
        with_db!(self, |db| {
            LibSqlScheduleRepository::new(db.connection())
                .delete_for_exam(id)
                .await
        })
    }

    // Profile cache

    pub async fn save_profile(&self, profile: &UserProfile) -> Result<CachedUserProfile> {
        with_db!(self, |db| {
            LibSqlProfileRepository::new(db.connection())
                .save(profile)
                .await
        })
    }

    pub async fn cached_profile(&self) -> Result<Option<CachedUserProfile>> {
        with_db!(self, |db| {
            LibSqlProfileRepository::new(db.connection()).load().await
        })
    }

    pub async fn update_cached_coins(&self, user_id: i64, coins: i64) -> Result<()> {
        with_db!(self, |db| {
            LibSqlProfileRepository::new(db.connection())
                .update_coins(user_id, coins)
                .await
        })
    }

    pub async fn clear_profile(&self) -> Result<()> {
        with_db!(self, |db| {
            LibSqlProfileRepository::new(db.connection()).clear().await
        })
    }

    // Sync metadata

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        with_db!(self, |db| {
            LibSqlMetadataRepository::new(db.connection())
                .last_sync_time()
                .await
        })
    }

    pub async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        with_db!(self, |db| {
            LibSqlMetadataRepository::new(db.connection())
                .set_last_sync_time(at)
                .await
        })
    }

    /// Wipe every table; used on logout.
    pub async fn clear_all(&self) -> Result<()> {
        with_db!(self, |db| {
            let conn = db.connection();
            LibSqlScheduleRepository::new(conn).delete_all().await?;
            LibSqlExamRepository::new(conn).delete_all().await?;
            LibSqlProfileRepository::new(conn).clear().await?;
            LibSqlMetadataRepository::new(conn).clear().await?;
            tracing::info!("Cleared all local data");
            Ok(())
        })
    }
}

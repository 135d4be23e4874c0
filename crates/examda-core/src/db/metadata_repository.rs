//! Sync bookkeeping repository implementation

use chrono::{DateTime, Utc};
use libsql::Connection;

use crate::error::{Error, Result};

const LAST_SYNC_TIME: &str = "lastSyncTime";

/// Trait for sync metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetadataRepository {
    /// When the last sync that made progress finished
    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Record the finish time of a sync
    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()>;

    /// Remove every metadata entry
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `MetadataRepository`
pub struct LibSqlMetadataRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetadataRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MetadataRepository for LibSqlMetadataRepository<'_> {
    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(value) = self.get_value(LAST_SYNC_TIME).await? else {
            return Ok(None);
        };

        DateTime::parse_from_rfc3339(&value)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| Error::Database(format!("invalid {LAST_SYNC_TIME} '{value}': {e}")))
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_value(LAST_SYNC_TIME, &at.to_rfc3339()).await
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sync_metadata", ()).await?;
        Ok(())
    }
}

impl LibSqlMetadataRepository<'_> {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_metadata WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_metadata (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

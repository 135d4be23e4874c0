//! Cached user profile repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{CachedUserProfile, ShopItem, UserProfile};
use crate::util::{datetime_from_millis, now_millis_precision};

/// Trait for the single-row profile cache (async)
#[allow(async_fn_in_trait)]
pub trait ProfileRepository {
    /// Replace the cached snapshot with a freshly fetched profile
    async fn save(&self, profile: &UserProfile) -> Result<CachedUserProfile>;

    /// The cached snapshot, if any
    async fn load(&self) -> Result<Option<CachedUserProfile>>;

    /// Overwrite the cached coin balance
    async fn update_coins(&self, user_id: i64, coins: i64) -> Result<()>;

    /// Remove the cached snapshot
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `ProfileRepository`
pub struct LibSqlProfileRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlProfileRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ProfileRepository for LibSqlProfileRepository<'_> {
    async fn save(&self, profile: &UserProfile) -> Result<CachedUserProfile> {
        let updated_at = now_millis_precision();
        let equipped_item_json = profile
            .equipped_item
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Single-row snapshot: drop any other user's cache first
        self.conn.execute("DELETE FROM user_cache", ()).await?;
        self.conn
            .execute(
                "INSERT INTO user_cache (
                    id, student_id, first_name, last_name, email, coin,
                    equipped_item_json, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    profile.id,
                    profile.student_id.clone(),
                    profile.first_name.clone(),
                    profile.last_name.clone(),
                    profile.email.clone(),
                    profile.coin,
                    equipped_item_json,
                    updated_at.timestamp_millis()
                ],
            )
            .await?;

        Ok(CachedUserProfile {
            profile: profile.clone(),
            updated_at,
        })
    }

    async fn load(&self) -> Result<Option<CachedUserProfile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, student_id, first_name, last_name, email, coin,
                        equipped_item_json, updated_at
                 FROM user_cache
                 ORDER BY updated_at DESC
                 LIMIT 1",
                (),
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let equipped_item = row
            .get::<Option<String>>(6)?
            .map(|json| serde_json::from_str::<ShopItem>(&json))
            .transpose()?;

        Ok(Some(CachedUserProfile {
            profile: UserProfile {
                id: row.get(0)?,
                student_id: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                email: row.get(4)?,
                coin: row.get(5)?,
                equipped_item,
            },
            updated_at: datetime_from_millis(row.get(7)?),
        }))
    }

    async fn update_coins(&self, user_id: i64, coins: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE user_cache SET coin = ?, updated_at = ? WHERE id = ?",
                params![coins, now_millis_precision().timestamp_millis(), user_id],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM user_cache", ()).await?;
        Ok(())
    }
}

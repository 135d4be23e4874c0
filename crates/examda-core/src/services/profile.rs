//! Account, shop, and inventory operations.
//!
//! Only the profile has an offline fallback; everything else needs the server.

use std::sync::Arc;

use serde::Serialize;

use super::LocalStore;
use crate::connectivity::ConnectivityOracle;
use crate::error::{Error, Result};
use crate::gateway::{EquipReceipt, LoginResponse, PurchaseReceipt, RemoteGateway};
use crate::models::{CachedUserProfile, InventoryItem, ShopItem};
use crate::reminders::ReminderScheduler;

/// Shortest password the server accepts
pub const MIN_PASSWORD_LEN: usize = 6;

/// Where a returned profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    Remote,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub source: ProfileSource,
    #[serde(flatten)]
    pub cached: CachedUserProfile,
}

#[derive(Clone)]
pub struct ProfileService {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    connectivity: Arc<ConnectivityOracle>,
    reminders: ReminderScheduler,
}

impl ProfileService {
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: Arc<ConnectivityOracle>,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            store,
            gateway,
            connectivity,
            reminders,
        }
    }

    /// Sign in and seed the profile cache. The caller persists the token.
    pub async fn login(&self, student_id: &str, password: &str) -> Result<LoginResponse> {
        let student_id = student_id.trim();
        if student_id.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "student id and password are required".to_string(),
            ));
        }
        self.connectivity.require_online("Sign in").await?;

        let response = self.gateway.login(student_id, password).await?;
        self.store.save_profile(&response.user).await?;
        tracing::info!(user_id = response.user.id, "Signed in");
        Ok(response)
    }

    /// Fresh profile when reachable, otherwise the last cached snapshot.
    pub async fn profile(&self) -> Result<Option<ProfileSnapshot>> {
        if self.connectivity.is_online_now().await {
            match self.gateway.fetch_profile().await {
                Ok(profile) => {
                    let cached = self.store.save_profile(&profile).await?;
                    return Ok(Some(ProfileSnapshot {
                        source: ProfileSource::Remote,
                        cached,
                    }));
                }
                Err(error) => {
                    tracing::warn!("Profile fetch failed, using cached copy: {error}");
                }
            }
        }

        Ok(self
            .store
            .cached_profile()
            .await?
            .map(|cached| ProfileSnapshot {
                source: ProfileSource::Cache,
                cached,
            }))
    }

    pub async fn change_password(&self, new_password: &str) -> Result<()> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        self.connectivity.require_online("Password change").await?;

        let profile = self.gateway.change_password(new_password).await?;
        self.store.save_profile(&profile).await?;
        Ok(())
    }

    pub async fn shop_items(&self) -> Result<Vec<ShopItem>> {
        self.connectivity.require_online("The shop").await?;
        Ok(self.gateway.list_shop_items().await?)
    }

    pub async fn purchase(&self, item_id: i64) -> Result<PurchaseReceipt> {
        self.connectivity.require_online("Purchasing").await?;
        let receipt = self.gateway.purchase_item(item_id).await?;
        self.refresh_cache().await;
        Ok(receipt)
    }

    pub async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        self.connectivity.require_online("The inventory").await?;
        Ok(self.gateway.list_inventory().await?)
    }

    pub async fn equip(&self, item_id: i64) -> Result<EquipReceipt> {
        self.connectivity.require_online("Equipping items").await?;
        let receipt = self.gateway.equip_item(item_id).await?;
        self.refresh_cache().await;
        Ok(receipt)
    }

    pub async fn unequip(&self) -> Result<()> {
        self.connectivity.require_online("Unequipping items").await?;
        self.gateway.unequip_item().await?;
        self.refresh_cache().await;
        Ok(())
    }

    /// Drop every reminder and all local data.
    pub async fn logout(&self) -> Result<()> {
        let cancelled = self.reminders.cancel_all().await?;
        self.store.clear_all().await?;
        tracing::info!(cancelled, "Cleared local data");
        Ok(())
    }

    async fn refresh_cache(&self) {
        match self.gateway.fetch_profile().await {
            Ok(profile) => {
                if let Err(error) = self.store.save_profile(&profile).await {
                    tracing::warn!("Failed to cache profile: {error}");
                }
            }
            Err(error) => tracing::warn!("Failed to refresh profile: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticProbe;
    use crate::gateway::RemoteError;
    use crate::models::{ExamDraft, SyncState, UserProfile};
    use crate::test_support::{FakeGateway, RecordingNotifier};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn ada(coin: i64) -> UserProfile {
        UserProfile {
            id: 1,
            student_id: "6510001".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            coin,
            equipped_item: None,
        }
    }

    fn hat() -> ShopItem {
        ShopItem {
            id: 3,
            name: "Hat".to_string(),
            description: None,
            price: 10,
            image_url: None,
            is_purchased: None,
        }
    }

    struct Harness {
        service: ProfileService,
        store: LocalStore,
        gateway: Arc<FakeGateway>,
        probe: Arc<StaticProbe>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness(online: bool) -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_profile(ada(12)).await;
        gateway.set_shop(vec![hat()]).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reminders = ReminderScheduler::new(store.clone(), notifier.clone());
        let probe = Arc::new(StaticProbe::new(online));
        let connectivity = Arc::new(ConnectivityOracle::new(probe.clone()));
        let service = ProfileService::new(store.clone(), gateway.clone(), connectivity, reminders);
        Harness {
            service,
            store,
            gateway,
            probe,
            notifier,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_seeds_profile_cache() {
        let h = harness(true).await;

        let response = h.service.login(" 6510001 ", "secret1").await.unwrap();

        assert_eq!(response.access_token, "token-6510001");
        let cached = h.store.cached_profile().await.unwrap().unwrap();
        assert_eq!(cached.profile, ada(12));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_offline_requires_connection() {
        let h = harness(false).await;
        assert!(matches!(
            h.service.login("6510001", "secret1").await,
            Err(Error::OfflineRequired(_))
        ));
        assert_eq!(h.gateway.call_count("login").await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn profile_falls_back_to_cache_offline() {
        let h = harness(true).await;
        let fresh = h.service.profile().await.unwrap().unwrap();
        assert_eq!(fresh.source, ProfileSource::Remote);

        h.probe.set_online(false);
        let cached = h.service.profile().await.unwrap().unwrap();
        assert_eq!(cached.source, ProfileSource::Cache);
        assert_eq!(cached.cached.profile.coin, 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn profile_offline_without_cache_is_none() {
        let h = harness(false).await;
        assert_eq!(h.service.profile().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn short_password_is_rejected_before_network() {
        let h = harness(true).await;
        assert!(matches!(
            h.service.change_password("abc").await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(h.gateway.call_count("password").await, 0);

        h.service.change_password("longer-secret").await.unwrap();
        assert_eq!(h.gateway.call_count("password").await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shop_actions_require_connection() {
        let h = harness(false).await;
        assert!(matches!(
            h.service.shop_items().await,
            Err(Error::OfflineRequired(_))
        ));
        assert!(matches!(
            h.service.purchase(3).await,
            Err(Error::OfflineRequired(_))
        ));
        assert!(matches!(
            h.service.equip(3).await,
            Err(Error::OfflineRequired(_))
        ));
        assert!(matches!(
            h.service.unequip().await,
            Err(Error::OfflineRequired(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purchase_and_equip_refresh_cached_profile() {
        let h = harness(true).await;

        let receipt = h.service.purchase(3).await.unwrap();
        assert_eq!(receipt.item.name, "Hat");
        assert_eq!(
            h.store.cached_profile().await.unwrap().unwrap().profile.coin,
            2
        );

        h.service.equip(3).await.unwrap();
        let inventory = h.service.inventory().await.unwrap();
        assert!(inventory[0].is_equipped);
        let cached = h.store.cached_profile().await.unwrap().unwrap();
        assert_eq!(cached.profile.equipped_item.map(|item| item.id), Some(3));

        h.service.unequip().await.unwrap();
        let cached = h.store.cached_profile().await.unwrap().unwrap();
        assert_eq!(cached.profile.equipped_item, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insufficient_coins_surface_server_message() {
        let h = harness(true).await;
        h.gateway.set_profile(ada(4)).await;

        let error = h.service.purchase(3).await.unwrap_err();
        assert!(matches!(
            error,
            Error::RemoteRequestFailed(RemoteError::Api { status: 400, .. })
        ));
        assert!(error.to_string().contains("Not enough coins"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn logout_clears_reminders_and_data() {
        let h = harness(true).await;
        h.service.login("6510001", "secret1").await.unwrap();
        let exam = h
            .store
            .insert(
                &ExamDraft::new("Physics", Utc::now() + Duration::days(2)).with_reminders([60]),
                SyncState::Pending,
            )
            .await
            .unwrap();
        ReminderScheduler::new(h.store.clone(), h.notifier.clone())
            .schedule_for(&exam)
            .await
            .unwrap();

        h.service.logout().await.unwrap();

        assert_eq!(h.notifier.cancelled().await.len(), 1);
        assert!(h.store.all_schedules().await.unwrap().is_empty());
        assert!(h.store.list_active(None).await.unwrap().is_empty());
        assert_eq!(h.store.cached_profile().await.unwrap(), None);
        assert_eq!(h.store.last_sync_time().await.unwrap(), None);
    }
}

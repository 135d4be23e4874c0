//! Network reachability: a live signal plus an on-demand check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Other,
    None,
    #[default]
    Unknown,
}

/// Snapshot of what the platform reports about the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    /// `None` while the platform has not determined reachability yet
    pub is_internet_reachable: Option<bool>,
    pub connection_type: ConnectionType,
}

impl NetworkState {
    pub const fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type,
        }
    }

    pub const fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
            connection_type: ConnectionType::None,
        }
    }

    /// Connected and not known to be unreachable; unknown reachability counts
    /// as usable.
    pub const fn is_usable(&self) -> bool {
        self.is_connected && !matches!(self.is_internet_reachable, Some(false))
    }
}

/// One-shot platform query behind `ConnectivityOracle::is_online_now`.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self) -> NetworkState;
}

/// Probes reachability by issuing a request against the API base URL.
///
/// Any HTTP response, whatever its status, proves the API is reachable.
pub struct HttpProbe {
    url: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let config = config.clone().normalized()?;
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build probe client: {error}")))?;
        Ok(Self {
            url: config.api_base_url,
            client,
        })
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn probe(&self) -> NetworkState {
        match self.client.head(&self.url).send().await {
            Ok(_) => NetworkState::online(ConnectionType::Unknown),
            Err(error) if error.is_timeout() => {
                tracing::debug!("Reachability probe timed out: {error}");
                NetworkState {
                    is_connected: true,
                    is_internet_reachable: Some(false),
                    connection_type: ConnectionType::Unknown,
                }
            }
            Err(error) => {
                tracing::debug!("Reachability probe failed: {error}");
                NetworkState::offline()
            }
        }
    }
}

/// Probe with a fixed answer, for forced-offline mode and tests.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn probe(&self) -> NetworkState {
        if self.online.load(Ordering::SeqCst) {
            NetworkState::online(ConnectionType::Other)
        } else {
            NetworkState::offline()
        }
    }
}

/// Transitions buffered per subscriber before it starts lagging
const TRANSITION_BUFFER: usize = 64;

/// Answers "can we reach the network right now".
///
/// Reports are passed through without debouncing. Every usable/unusable
/// transition is queued for each [`subscribe`](Self::subscribe) receiver, so a
/// quick off, on, off flap arrives as three messages. The `watch` receiver from
/// [`subscribe_state`](Self::subscribe_state) only holds the latest state.
pub struct ConnectivityOracle {
    probe: Arc<dyn NetworkProbe>,
    state: watch::Sender<NetworkState>,
    usable: watch::Sender<bool>,
    transitions: broadcast::Sender<bool>,
}

impl ConnectivityOracle {
    /// Starts out disconnected until the first report or probe.
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        let initial = NetworkState::default();
        let (state, _) = watch::channel(initial);
        let (usable, _) = watch::channel(initial.is_usable());
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            probe,
            state,
            usable,
            transitions,
        }
    }

    /// Feed a platform network event into the oracle.
    pub fn report(&self, next: NetworkState) {
        self.state.send_replace(next);
        let usable = next.is_usable();
        let changed = self.usable.send_if_modified(|current| {
            let changed = *current != usable;
            *current = usable;
            changed
        });
        if changed {
            tracing::info!(usable, "Connectivity changed");
            // No subscribers is fine
            let _ = self.transitions.send(usable);
        }
    }

    /// Last reported state, without probing.
    pub fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn is_usable(&self) -> bool {
        *self.usable.borrow()
    }

    /// Every usable/unusable transition from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.transitions.subscribe()
    }

    /// Latest reported state; intermediate reports may be coalesced.
    pub fn subscribe_state(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    /// Query the platform now and publish the result.
    pub async fn is_online_now(&self) -> bool {
        let state = self.probe.probe().await;
        self.report(state);
        state.is_usable()
    }

    /// Fail with `OfflineRequired` unless the network is usable right now.
    pub async fn require_online(&self, action: &str) -> Result<()> {
        if self.is_online_now().await {
            Ok(())
        } else {
            Err(Error::OfflineRequired(action.to_string()))
        }
    }
}

//! Background trigger for the sync engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{SyncEngine, SyncOutcome};
use crate::connectivity::ConnectivityOracle;

/// Runs `sync` on a fixed interval and whenever connectivity comes back.
pub struct SyncScheduler {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the worker. The first tick fires immediately.
    pub fn start(
        engine: SyncEngine,
        connectivity: Arc<ConnectivityOracle>,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(?interval, "Background sync worker started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut usable = connectivity.subscribe();

            loop {
                tokio::select! {
                    () = signal.notified() => {
                        tracing::info!("Background sync worker received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if connectivity.is_online_now().await {
                            run_sync(&engine, "interval").await;
                        } else {
                            tracing::debug!("Skipping sync - no connectivity");
                            engine.mark_offline();
                        }
                    }
                    transition = usable.recv() => {
                        let online = match transition {
                            Ok(online) => online,
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Connectivity transitions dropped");
                                connectivity.is_usable()
                            }
                            Err(RecvError::Closed) => break,
                        };
                        if online {
                            run_sync(&engine, "connectivity-restored").await;
                        } else {
                            engine.mark_offline();
                        }
                    }
                }
            }

            tracing::info!("Background sync worker stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the worker and wait for it to finish its current step.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(error) = self.handle.await {
            tracing::error!("Background sync worker panicked: {error}");
        }
    }
}

async fn run_sync(engine: &SyncEngine, trigger: &'static str) {
    match engine.sync().await {
        Ok(SyncOutcome::Completed(report)) => {
            tracing::debug!(trigger, pushed = report.pushed, pulled = report.pulled, "Triggered sync done");
        }
        Ok(SyncOutcome::Skipped) => tracing::debug!(trigger, "Triggered sync skipped"),
        Err(error) => tracing::error!(trigger, "Triggered sync failed: {error}"),
    }
}

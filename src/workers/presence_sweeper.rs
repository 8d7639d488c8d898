use crate::services::router::DeliveryRouter;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Periodically reclaims presence entries whose session died without
/// unregistering, so the online snapshot converges even after crashes.
#[derive(Debug)]
pub struct PresenceSweeper {
    router: DeliveryRouter,
    sweep_interval_secs: u64,
}

impl PresenceSweeper {
    #[must_use]
    pub const fn new(router: DeliveryRouter, sweep_interval_secs: u64) -> Self {
        Self { router, sweep_interval_secs }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.sweep_interval_secs));
        tracing::info!("Presence sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = interval.tick() => {
                    async {
                        let reclaimed = self.router.sweep_dead_connections();
                        if reclaimed > 0 {
                            tracing::debug!(reclaimed, "Presence sweep iteration reclaimed entries");
                        }
                    }
                    .instrument(tracing::debug_span!("presence_sweep_iteration"))
                    .await;
                }
            }
        }

        tracing::info!("Presence sweeper shutting down...");
    }
}

//! Background purge of long-expired refresh credentials.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::MaintenanceConfig;
use crate::services::Clock;
use crate::store::CredentialStore;

pub struct CredentialMaintenance {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: chrono::Duration,
    shutdown_token: CancellationToken,
}

impl CredentialMaintenance {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: &MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            clock,
            interval: Duration::from_secs(config.interval_seconds),
            retention: chrono::Duration::days(config.retention_days),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancel this token to stop [`run`](Self::run).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Delete credentials that expired more than the retention window ago.
    pub async fn purge_once(&self) -> Result<u64, anyhow::Error> {
        let cutoff = self.clock.now() - self.retention;
        let purged = self.store.purge_expired(cutoff).await?;

        if purged > 0 {
            tracing::info!(purged = purged, cutoff = %cutoff, "Purged expired refresh credentials");
        }

        Ok(purged)
    }

    pub async fn run(self) {
        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            retention_days = self.retention.num_days(),
            "Starting credential maintenance"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Credential maintenance shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.purge_once().await {
                        tracing::error!(error = %e, "Credential purge failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RefreshCredential;
    use crate::services::ManualClock;
    use crate::store::InMemoryCredentialStore;
    use chrono::Utc;

    fn maintenance(
        store: Arc<InMemoryCredentialStore>,
        clock: Arc<ManualClock>,
    ) -> CredentialMaintenance {
        CredentialMaintenance::new(
            store,
            clock,
            &MaintenanceConfig {
                interval_seconds: 1,
                retention_days: 30,
            },
        )
    }

    #[tokio::test]
    async fn test_purge_respects_retention() -> Result<(), anyhow::Error> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let (credential, _) =
            RefreshCredential::issue("user_123", "10.0.0.1", start, chrono::Duration::days(7));
        store.insert(&credential).await?;

        let job = maintenance(store.clone(), clock.clone());

        // Expired, but still inside the retention window.
        clock.advance(chrono::Duration::days(20));
        assert_eq!(job.purge_once().await?, 0);

        clock.advance(chrono::Duration::days(20));
        assert_eq!(job.purge_once().await?, 1);
        assert!(store.find_by_id(credential.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let job = maintenance(store, Arc::new(ManualClock::default()));
        let token = job.shutdown_token();

        let handle = tokio::spawn(job.run());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("maintenance loop did not stop")
            .expect("maintenance task panicked");
    }
}

//! Revocation cascade: walk a chain forward and revoke its live tail.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::RefreshCredential;
use crate::services::{Clock, CredentialError};
use crate::store::CredentialStore;

/// Provenance recorded when a replayed secret ends its chain.
pub const REUSE_REVOCATION_MARKER: &str = "server: duplicate refresh";

/// Provenance recorded when every session of a subject is revoked.
pub const BULK_REVOCATION_MARKER: &str = "server: revoke all";

/// Upper bound on successor hops, so a corrupted store cannot spin us.
const MAX_CHAIN_LENGTH: usize = 100_000;

/// Upper bound on retries when the tail keeps moving under us.
const MAX_TAIL_RACES: usize = 16;

#[derive(Clone)]
pub struct RevocationCascade {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl RevocationCascade {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Revoke the terminal node of the chain containing `start`.
    ///
    /// Returns the id of the node this call revoked, or `None` when the tail
    /// was already revoked. If the tail is rotated while we revoke it, the
    /// walk continues from there, so a newer live node is never left behind.
    pub async fn revoke_tail(
        &self,
        start: &RefreshCredential,
        reason: &str,
    ) -> Result<Option<Uuid>, CredentialError> {
        let mut from = start.clone();

        for _ in 0..MAX_TAIL_RACES {
            let tail = self.walk_to_tail(from).await?;
            if tail.is_revoked() {
                return Ok(None);
            }

            let now = self.clock.now();
            if self.store.revoke_if_active(tail.id, now, reason).await? {
                tracing::info!(
                    target: "audit",
                    credential_id = %tail.id,
                    subject_id = %tail.subject_id,
                    reason = %reason,
                    "Refresh chain revoked"
                );
                return Ok(Some(tail.id));
            }

            // Lost a race with a rotation or another revocation.
            from = self
                .store
                .find_by_id(tail.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Credential {} disappeared", tail.id))?;
        }

        Err(CredentialError::Internal(anyhow::anyhow!(
            "Chain tail of {} kept moving during revocation",
            start.id
        )))
    }

    async fn walk_to_tail(
        &self,
        mut node: RefreshCredential,
    ) -> Result<RefreshCredential, CredentialError> {
        let mut hops = 0;

        while let Some(next) = node.successor_id {
            hops += 1;
            if hops > MAX_CHAIN_LENGTH {
                return Err(CredentialError::Internal(anyhow::anyhow!(
                    "Chain starting at {} exceeds {} nodes",
                    node.id,
                    MAX_CHAIN_LENGTH
                )));
            }

            let current_id = node.id;
            node = self.store.find_by_id(next).await?.ok_or_else(|| {
                anyhow::anyhow!("Successor {} of credential {} not found", next, current_id)
            })?;
        }

        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ManualClock;
    use crate::store::InMemoryCredentialStore;
    use chrono::{Duration, Utc};

    async fn chain(
        store: &InMemoryCredentialStore,
        len: usize,
    ) -> Result<Vec<RefreshCredential>, anyhow::Error> {
        let now = Utc::now();
        let (mut current, _) = RefreshCredential::issue("user_123", "10.0.0.1", now, Duration::days(7));
        store.insert(&current).await?;
        let mut ids = vec![current.id];

        for _ in 1..len {
            let (next, _) = RefreshCredential::issue("user_123", "10.0.0.1", now, Duration::days(7));
            store.rotate(current.id, &next, now, "10.0.0.1").await?;
            ids.push(next.id);
            current = next;
        }

        let mut nodes = Vec::new();
        for id in ids {
            nodes.push(store.find_by_id(id).await?.expect("node exists"));
        }
        Ok(nodes)
    }

    #[tokio::test]
    async fn test_revokes_live_tail_from_any_node() -> Result<(), anyhow::Error> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cascade = RevocationCascade::new(store.clone(), Arc::new(ManualClock::default()));
        let nodes = chain(&store, 4).await?;

        let revoked = cascade
            .revoke_tail(&nodes[0], REUSE_REVOCATION_MARKER)
            .await?;
        assert_eq!(revoked, Some(nodes[3].id));

        let tail = store.find_by_id(nodes[3].id).await?.expect("tail exists");
        assert!(tail.is_revoked());
        assert_eq!(
            tail.revoked_from_address.as_deref(),
            Some(REUSE_REVOCATION_MARKER)
        );
        assert!(tail.successor_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_already_revoked_tail_is_noop() -> Result<(), anyhow::Error> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cascade = RevocationCascade::new(store.clone(), Arc::new(ManualClock::default()));
        let nodes = chain(&store, 2).await?;

        assert_eq!(cascade.revoke_tail(&nodes[1], "10.0.0.1").await?, Some(nodes[1].id));
        assert_eq!(cascade.revoke_tail(&nodes[0], "10.0.0.9").await?, None);

        let tail = store.find_by_id(nodes[1].id).await?.expect("tail exists");
        assert_eq!(tail.revoked_from_address.as_deref(), Some("10.0.0.1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_successor_is_an_error() -> Result<(), anyhow::Error> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cascade = RevocationCascade::new(store.clone(), Arc::new(ManualClock::default()));
        let (mut dangling, _) =
            RefreshCredential::issue("user_123", "10.0.0.1", Utc::now(), Duration::days(7));
        dangling.revoked_at = Some(Utc::now());
        dangling.revoked_from_address = Some("10.0.0.1".to_string());
        dangling.successor_id = Some(Uuid::new_v4());

        assert!(matches!(
            cascade.revoke_tail(&dangling, REUSE_REVOCATION_MARKER).await,
            Err(CredentialError::Internal(_))
        ));
        Ok(())
    }
}

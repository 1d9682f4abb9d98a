use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CredentialStore, RotateOutcome};
use crate::models::RefreshCredential;

#[derive(Default)]
struct Arena {
    credentials: HashMap<Uuid, RefreshCredential>,
    by_secret_hash: HashMap<String, Uuid>,
}

impl Arena {
    fn insert(&mut self, credential: &RefreshCredential) -> Result<(), anyhow::Error> {
        if self.credentials.contains_key(&credential.id) {
            anyhow::bail!("Duplicate credential id {}", credential.id);
        }
        if self.by_secret_hash.contains_key(&credential.secret_hash) {
            anyhow::bail!("Duplicate credential secret");
        }

        self.by_secret_hash
            .insert(credential.secret_hash.clone(), credential.id);
        self.credentials.insert(credential.id, credential.clone());
        Ok(())
    }
}

/// Credential store held in process memory.
///
/// A single mutex guards the whole arena, so every trait method is
/// linearizable. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    arena: Mutex<Arena>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Arena>, anyhow::Error> {
        self.arena
            .lock()
            .map_err(|e| anyhow::anyhow!("Credential store mutex poisoned: {}", e))
    }

    /// Every credential of a subject, oldest first.
    pub fn snapshot_for_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<RefreshCredential>, anyhow::Error> {
        let arena = self.lock()?;
        let mut nodes: Vec<RefreshCredential> = arena
            .credentials
            .values()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|c| c.created_at);
        Ok(nodes)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<RefreshCredential>, anyhow::Error> {
        let arena = self.lock()?;
        Ok(arena
            .by_secret_hash
            .get(secret_hash)
            .and_then(|id| arena.credentials.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshCredential>, anyhow::Error> {
        Ok(self.lock()?.credentials.get(&id).cloned())
    }

    async fn find_active_by_subject(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshCredential>, anyhow::Error> {
        let mut active: Vec<RefreshCredential> = self
            .lock()?
            .credentials
            .values()
            .filter(|c| c.subject_id == subject_id && !c.is_revoked() && !c.is_expired_at(now))
            .cloned()
            .collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active)
    }

    async fn insert(&self, credential: &RefreshCredential) -> Result<(), anyhow::Error> {
        self.lock()?.insert(credential)
    }

    async fn rotate(
        &self,
        predecessor_id: Uuid,
        successor: &RefreshCredential,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<RotateOutcome, anyhow::Error> {
        let mut arena = self.lock()?;

        match arena.credentials.get(&predecessor_id) {
            None => anyhow::bail!("Credential {} not found", predecessor_id),
            Some(predecessor) if predecessor.is_revoked() => {
                return Ok(RotateOutcome::AlreadyRevoked)
            }
            Some(_) => {}
        }

        arena.insert(successor)?;
        if let Some(predecessor) = arena.credentials.get_mut(&predecessor_id) {
            predecessor.revoked_at = Some(revoked_at);
            predecessor.revoked_from_address = Some(revoked_from_address.to_string());
            predecessor.successor_id = Some(successor.id);
        }

        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_if_active(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut arena = self.lock()?;

        match arena.credentials.get_mut(&id) {
            Some(credential) if !credential.is_revoked() => {
                credential.revoked_at = Some(revoked_at);
                credential.revoked_from_address = Some(revoked_from_address.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: &str,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<u64, anyhow::Error> {
        let mut arena = self.lock()?;
        let mut revoked = 0;

        for credential in arena
            .credentials
            .values_mut()
            .filter(|c| c.subject_id == subject_id && !c.is_revoked())
        {
            credential.revoked_at = Some(revoked_at);
            credential.revoked_from_address = Some(revoked_from_address.to_string());
            revoked += 1;
        }

        Ok(revoked)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let mut arena = self.lock()?;

        let predecessors: HashMap<Uuid, Uuid> = arena
            .credentials
            .values()
            .filter_map(|c| c.successor_id.map(|next| (next, c.id)))
            .collect();

        // A chain goes only once its tail, the newest node, is past the cutoff.
        let mut doomed: Vec<Uuid> = Vec::new();
        for tail in arena
            .credentials
            .values()
            .filter(|c| c.successor_id.is_none() && c.expires_at < before)
        {
            let mut current = Some(tail.id);
            while let Some(id) = current {
                doomed.push(id);
                current = predecessors.get(&id).copied();
            }
        }

        for id in &doomed {
            if let Some(credential) = arena.credentials.remove(id) {
                arena.by_secret_hash.remove(&credential.secret_hash);
            }
        }

        Ok(doomed.len() as u64)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.lock().map(|_| ())
    }
}

//! Persistence for refresh credentials.
//!
//! All mutation goes through [`CredentialStore::insert`],
//! [`CredentialStore::rotate`] and the conditional revocation methods. Each
//! of them is atomic on its own; callers never need a read-then-write.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::RefreshCredential;

/// Result of a conditional rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// Predecessor was unrevoked; successor inserted and linked.
    Rotated,
    /// Predecessor was already revoked; nothing was written.
    AlreadyRevoked,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<RefreshCredential>, anyhow::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshCredential>, anyhow::Error>;

    /// Unrevoked, unexpired credentials of a subject.
    async fn find_active_by_subject(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshCredential>, anyhow::Error>;

    /// Persist the root of a new chain.
    async fn insert(&self, credential: &RefreshCredential) -> Result<(), anyhow::Error>;

    /// Insert `successor` and mark `predecessor_id` revoked with
    /// `successor_id = successor.id`, as one unit.
    ///
    /// Succeeds only while the predecessor is unrevoked. Concurrent calls
    /// for the same predecessor see exactly one `Rotated`.
    async fn rotate(
        &self,
        predecessor_id: Uuid,
        successor: &RefreshCredential,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<RotateOutcome, anyhow::Error>;

    /// Revoke `id` if it is still unrevoked. Returns whether this call did it.
    async fn revoke_if_active(
        &self,
        id: Uuid,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<bool, anyhow::Error>;

    /// Revoke every unrevoked credential of a subject. Returns the count.
    ///
    /// Successors committed by rotations racing this call are revoked too.
    async fn revoke_all_for_subject(
        &self,
        subject_id: &str,
        revoked_at: DateTime<Utc>,
        revoked_from_address: &str,
    ) -> Result<u64, anyhow::Error>;

    /// Delete every chain whose tail expired before `before`. Returns the
    /// number of nodes removed.
    ///
    /// Chains are removed whole: a rotated node of a chain that is still
    /// live must keep resolving, or its replay would go undetected.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

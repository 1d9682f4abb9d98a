//! Refresh credential model - one node of a rotation chain.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::RefreshSecret;

/// Lifecycle state of a chain node at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Not revoked and not expired: the only node of a chain that may rotate.
    Active,
    /// Revoked with a successor.
    Rotated,
    /// Revoked without a successor (logout, cascade, bulk revocation).
    RevokedTerminal,
    /// Never revoked, but past `expires_at`.
    Expired,
}

/// Persisted refresh credential.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshCredential {
    pub id: Uuid,
    /// SHA-256 hex digest of the secret; the plaintext is never stored.
    pub secret_hash: String,
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_from_address: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_from_address: Option<String>,
    pub successor_id: Option<Uuid>,
}

impl RefreshCredential {
    /// Create a new, unpersisted node together with its plaintext secret.
    pub fn issue(
        subject_id: impl Into<String>,
        origin_address: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> (Self, RefreshSecret) {
        let secret = RefreshSecret::generate();
        let credential = Self {
            id: Uuid::new_v4(),
            secret_hash: Self::hash_secret(secret.as_str()),
            subject_id: subject_id.into(),
            created_at: now,
            expires_at: now + ttl,
            created_from_address: origin_address.into(),
            revoked_at: None,
            revoked_from_address: None,
            successor_id: None,
        };

        (credential, secret)
    }

    /// Hash a secret using SHA-256.
    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Revocation wins over expiry: a revoked node is never reported as
    /// merely expired.
    pub fn state_at(&self, now: DateTime<Utc>) -> ChainState {
        match (self.revoked_at, self.successor_id) {
            (Some(_), Some(_)) => ChainState::Rotated,
            (Some(_), None) => ChainState::RevokedTerminal,
            (None, _) if self.is_expired_at(now) => ChainState::Expired,
            (None, _) => ChainState::Active,
        }
    }
}

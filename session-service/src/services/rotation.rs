//! Refresh rotation engine.
//!
//! Each presented secret resolves to one chain node whose [`ChainState`]
//! decides the outcome:
//!
//! - `Active`: rotate. The successor is inserted and the node revoked and
//!   linked to it in one conditional store write.
//! - `Rotated` / `RevokedTerminal`: reuse. The live tail of the chain is
//!   revoked and the call fails with `ReuseDetected`.
//! - `Expired`: fail with `CredentialExpired`. An idle session is not a
//!   theft signal, so nothing else is touched.
//!
//! Two concurrent calls with the same active secret race on the conditional
//! write; the loser is treated exactly like a replay.

use chrono::Duration;
use std::sync::Arc;

use crate::models::{ChainState, RefreshCredential, TokenPair};
use crate::services::revocation::REUSE_REVOCATION_MARKER;
use crate::services::{Clock, CredentialError, JwtService, RevocationCascade};
use crate::store::{CredentialStore, RotateOutcome};

#[derive(Clone)]
pub struct RotationEngine {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
    cascade: RevocationCascade,
    clock: Arc<dyn Clock>,
    refresh_ttl: Duration,
}

impl RotationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt: JwtService,
        cascade: RevocationCascade,
        clock: Arc<dyn Clock>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            jwt,
            cascade,
            clock,
            refresh_ttl,
        }
    }

    /// Exchange a refresh secret for a new access token and refresh secret.
    pub async fn rotate(
        &self,
        secret: &str,
        origin_address: &str,
    ) -> Result<TokenPair, CredentialError> {
        let secret_hash = RefreshCredential::hash_secret(secret);
        let current = self
            .store
            .find_by_secret_hash(&secret_hash)
            .await?
            .ok_or(CredentialError::UnknownCredential)?;

        let now = self.clock.now();
        match current.state_at(now) {
            ChainState::Active => {}
            ChainState::Rotated | ChainState::RevokedTerminal => {
                return Err(self.reject_reuse(&current, origin_address).await);
            }
            ChainState::Expired => {
                tracing::info!(
                    credential_id = %current.id,
                    subject_id = %current.subject_id,
                    "Expired refresh credential presented"
                );
                return Err(CredentialError::CredentialExpired);
            }
        }

        // Signing is pure; doing it first means a committed rotation is never
        // followed by a failure the client cannot recover from.
        let access_token = self.jwt.issue(&current.subject_id)?;

        let (successor, refresh_secret) = RefreshCredential::issue(
            current.subject_id.clone(),
            origin_address,
            now,
            self.refresh_ttl,
        );

        match self
            .store
            .rotate(current.id, &successor, now, origin_address)
            .await?
        {
            RotateOutcome::Rotated => {}
            RotateOutcome::AlreadyRevoked => {
                tracing::warn!(
                    target: "audit",
                    credential_id = %current.id,
                    subject_id = %current.subject_id,
                    "Concurrent rotation of one refresh credential"
                );
                return Err(self.reject_reuse(&current, origin_address).await);
            }
        }

        tracing::info!(
            subject_id = %current.subject_id,
            predecessor_id = %current.id,
            credential_id = %successor.id,
            "Refresh credential rotated"
        );

        Ok(TokenPair {
            access_token,
            refresh_secret,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_expires_at: successor.expires_at,
            credential_id: successor.id,
        })
    }

    /// Revoke the chain's live tail and produce the reuse error.
    ///
    /// A store failure during the cascade wins over `ReuseDetected`: the
    /// caller must not believe the chain is dead when it may not be.
    async fn reject_reuse(&self, node: &RefreshCredential, origin_address: &str) -> CredentialError {
        tracing::warn!(
            target: "audit",
            credential_id = %node.id,
            subject_id = %node.subject_id,
            origin_address = %origin_address,
            "Refresh credential reuse detected, revoking chain"
        );

        match self.cascade.revoke_tail(node, REUSE_REVOCATION_MARKER).await {
            Ok(_) => CredentialError::ReuseDetected,
            Err(e) => {
                tracing::error!(
                    credential_id = %node.id,
                    error = %e,
                    "Failed to revoke chain after reuse"
                );
                e
            }
        }
    }
}

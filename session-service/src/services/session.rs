//! Session facade.
//!
//! The only entry point for the routing layer. Composes the identity
//! collaborator, the access token issuer, the rotation engine and the
//! revocation cascade, and folds their precise errors into [`SessionError`].

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::models::{RefreshCredential, SessionInfo, TokenPair};
use crate::services::revocation::BULK_REVOCATION_MARKER;
use crate::services::{
    Clock, CredentialError, IdentityProvider, JwtService, RevocationCascade, RotationEngine,
    SessionError,
};
use crate::store::CredentialStore;
use crate::utils::Password;

/// Lifetimes and timing applied by the facade.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub refresh_ttl: chrono::Duration,
    /// Floor on login and logout latency, success or failure.
    pub min_response_time: StdDuration,
}

impl SessionPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            refresh_ttl: chrono::Duration::days(config.jwt.refresh_token_expiry_days),
            min_response_time: StdDuration::from_millis(config.auth.min_response_ms),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            refresh_ttl: chrono::Duration::days(7),
            min_response_time: StdDuration::from_millis(1000),
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    identities: Arc<dyn IdentityProvider>,
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
    rotation: RotationEngine,
    cascade: RevocationCascade,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionService {
    pub fn new(
        identities: Arc<dyn IdentityProvider>,
        store: Arc<dyn CredentialStore>,
        jwt: JwtService,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        let cascade = RevocationCascade::new(store.clone(), clock.clone());
        let rotation = RotationEngine::new(
            store.clone(),
            jwt.clone(),
            cascade.clone(),
            clock.clone(),
            policy.refresh_ttl,
        );

        Self {
            identities,
            store,
            jwt,
            rotation,
            cascade,
            clock,
            policy,
        }
    }

    /// Verify email and password and start a new chain.
    ///
    /// Unknown email and wrong password produce the same error in the same
    /// wall time.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        origin_address: &str,
    ) -> Result<TokenPair, SessionError> {
        let deadline = Instant::now() + self.policy.min_response_time;
        let result = self.start_session(email, password, origin_address).await;
        tokio::time::sleep_until(deadline).await;
        result.map_err(SessionError::from)
    }

    async fn start_session(
        &self,
        email: &str,
        password: &Password,
        origin_address: &str,
    ) -> Result<TokenPair, CredentialError> {
        let identity = self.identities.find_identity_by_email(email).await?;

        let identity = match identity {
            Some(identity) if self.identities.verify_password(password, &identity.password_hash) => {
                identity
            }
            _ => {
                tracing::info!(
                    target: "audit",
                    origin_address = %origin_address,
                    "Login rejected"
                );
                return Err(CredentialError::InvalidCredentials);
            }
        };

        let access_token = self.jwt.issue(&identity.id)?;
        let (credential, refresh_secret) = RefreshCredential::issue(
            identity.id.clone(),
            origin_address,
            self.clock.now(),
            self.policy.refresh_ttl,
        );
        self.store.insert(&credential).await?;

        tracing::info!(
            target: "audit",
            subject_id = %identity.id,
            credential_id = %credential.id,
            origin_address = %origin_address,
            "Session started"
        );

        Ok(TokenPair {
            access_token,
            refresh_secret,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_expires_at: credential.expires_at,
            credential_id: credential.id,
        })
    }

    /// Rotate a refresh secret. Every refusal reads the same to the caller.
    pub async fn refresh(
        &self,
        refresh_secret: &str,
        origin_address: &str,
    ) -> Result<TokenPair, SessionError> {
        if refresh_secret.is_empty() {
            return Err(SessionError::MissingCredential);
        }

        self.rotation
            .rotate(refresh_secret, origin_address)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh refused");
                SessionError::from(e)
            })
    }

    /// End the session a refresh secret belongs to.
    ///
    /// Succeeds for unknown and already revoked secrets. A stale secret
    /// still ends the newest node of its chain.
    pub async fn logout(&self, refresh_secret: &str, origin_address: &str) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.policy.min_response_time;
        let result = self.end_session(refresh_secret, origin_address).await;
        tokio::time::sleep_until(deadline).await;
        result
    }

    async fn end_session(&self, refresh_secret: &str, origin_address: &str) -> Result<(), SessionError> {
        if refresh_secret.is_empty() {
            return Ok(());
        }

        let secret_hash = RefreshCredential::hash_secret(refresh_secret);
        let Some(credential) = self
            .store
            .find_by_secret_hash(&secret_hash)
            .await
            .map_err(SessionError::Internal)?
        else {
            return Ok(());
        };

        if let Some(revoked_id) = self.cascade.revoke_tail(&credential, origin_address).await? {
            tracing::info!(
                target: "audit",
                subject_id = %credential.subject_id,
                credential_id = %revoked_id,
                origin_address = %origin_address,
                "Session ended"
            );
        }

        Ok(())
    }

    /// Resolve an access token to its subject id.
    pub fn authenticate(&self, access_token: &str) -> Result<String, SessionError> {
        self.jwt.verify(access_token).map_err(SessionError::from)
    }

    pub async fn active_sessions(&self, subject_id: &str) -> Result<Vec<SessionInfo>, SessionError> {
        let credentials = self
            .store
            .find_active_by_subject(subject_id, self.clock.now())
            .await
            .map_err(SessionError::Internal)?;

        Ok(credentials.into_iter().map(SessionInfo::from).collect())
    }

    /// Revoke every session of a subject. Returns how many were live.
    pub async fn revoke_all(&self, subject_id: &str) -> Result<u64, SessionError> {
        let revoked = self
            .store
            .revoke_all_for_subject(subject_id, self.clock.now(), BULK_REVOCATION_MARKER)
            .await
            .map_err(SessionError::Internal)?;

        tracing::warn!(
            target: "audit",
            subject_id = %subject_id,
            revoked = revoked,
            "All sessions revoked"
        );

        Ok(revoked)
    }

    pub async fn health_check(&self) -> Result<(), SessionError> {
        self.store.health_check().await.map_err(SessionError::Internal)
    }
}

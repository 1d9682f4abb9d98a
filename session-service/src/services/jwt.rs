use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::{Clock, CredentialError};

/// Signer and verifier of short-lived access tokens.
///
/// Keys are derived once from the configured shared secret and never change
/// for the lifetime of the process.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry: Duration,
    clock: Arc<dyn Clock>,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

impl JwtService {
    /// Build the issuer from configuration.
    ///
    /// A missing or empty signing key is a configuration fault and fails
    /// with [`CredentialError::SigningKeyUnavailable`].
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, CredentialError> {
        let key = config
            .signing_key
            .as_ref()
            .map(|k| k.expose_secret().as_bytes())
            .filter(|k| !k.is_empty())
            .ok_or(CredentialError::SigningKeyUnavailable)?;

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256 key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            issuer: config.issuer.clone(),
            access_token_expiry: Duration::minutes(config.access_token_expiry_minutes),
            clock,
        })
    }

    /// Generate an access token asserting `subject_id`.
    pub fn issue(&self, subject_id: &str) -> Result<String, CredentialError> {
        let now = self.clock.now();
        let exp = now + self.access_token_expiry;

        let claims = AccessTokenClaims {
            sub: subject_id.to_string(),
            iss: self.issuer.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            CredentialError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e))
        })
    }

    /// Validate an access token and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, CredentialError> {
        Ok(self.verify_claims(token)?.sub)
    }

    /// Validate an access token and return all claims.
    ///
    /// Expiry is checked against the injected clock with no leeway: a token
    /// is rejected from the second its `exp` is reached.
    pub fn verify_claims(&self, token: &str) -> Result<AccessTokenClaims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                CredentialError::InvalidOrExpiredCredential
            })?
            .claims;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(CredentialError::InvalidOrExpiredCredential);
        }

        Ok(claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ManualClock;
    use chrono::Utc;
    use secrecy::Secret;

    fn config(key: Option<&str>) -> JwtConfig {
        JwtConfig {
            signing_key: key.map(|k| Secret::new(k.to_string())),
            issuer: "session-service".to_string(),
            access_token_expiry_minutes: 5,
            refresh_token_expiry_days: 7,
        }
    }

    fn service(clock: Arc<ManualClock>) -> JwtService {
        JwtService::new(&config(Some("test-signing-key-0123456789abcdef")), clock)
            .expect("Failed to create JWT service")
    }

    #[test]
    fn test_missing_signing_key() {
        let clock = Arc::new(ManualClock::default());

        assert!(matches!(
            JwtService::new(&config(None), clock.clone()),
            Err(CredentialError::SigningKeyUnavailable)
        ));
        assert!(matches!(
            JwtService::new(&config(Some("")), clock),
            Err(CredentialError::SigningKeyUnavailable)
        ));
    }

    #[test]
    fn test_issue_and_verify() -> Result<(), CredentialError> {
        let service = service(Arc::new(ManualClock::default()));

        let token = service.issue("user_123")?;
        let claims = service.verify_claims(&token)?;

        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.iss, "session-service");
        assert_eq!(claims.exp - claims.iat, 300);
        assert_eq!(service.access_token_expiry_seconds(), 300);
        Ok(())
    }

    #[test]
    fn test_five_minute_boundary() -> Result<(), CredentialError> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = service(clock.clone());
        let token = service.issue("user_123")?;

        clock.advance(Duration::minutes(4));
        assert_eq!(service.verify(&token)?, "user_123");

        clock.advance(Duration::minutes(2));
        assert!(matches!(
            service.verify(&token),
            Err(CredentialError::InvalidOrExpiredCredential)
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_foreign_signature() -> Result<(), CredentialError> {
        let clock = Arc::new(ManualClock::default());
        let ours = service(clock.clone());
        let theirs = JwtService::new(&config(Some("some-other-key-fedcba9876543210")), clock)?;

        let forged = theirs.issue("user_123")?;
        assert!(matches!(
            ours.verify(&forged),
            Err(CredentialError::InvalidOrExpiredCredential)
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_issuer() -> Result<(), CredentialError> {
        let clock = Arc::new(ManualClock::default());
        let ours = service(clock.clone());
        let mut other = config(Some("test-signing-key-0123456789abcdef"));
        other.issuer = "somebody-else".to_string();
        let theirs = JwtService::new(&other, clock)?;

        assert!(ours.verify(&theirs.issue("user_123")?).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_malformed_token() {
        let service = service(Arc::new(ManualClock::default()));

        assert!(matches!(
            service.verify("not.a.jwt"),
            Err(CredentialError::InvalidOrExpiredCredential)
        ));
        assert!(service.verify("").is_err());
    }
}

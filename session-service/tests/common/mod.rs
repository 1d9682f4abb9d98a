//! Shared setup for session-service integration tests.
//!
//! Everything runs against the in-memory credential store and a manual
//! clock, so no database is needed.

#![allow(dead_code)]

use chrono::Utc;
use secrecy::Secret;
use session_service::{
    config::JwtConfig,
    models::RefreshCredential,
    services::{
        Identity, IdentityProvider, JwtService, ManualClock, SessionPolicy, SessionService,
    },
    store::InMemoryCredentialStore,
    utils::{hash_password, Password},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SIGNING_KEY: &str = "integration-test-signing-key-0123456789";
pub const TEST_EMAIL: &str = "alice@example.com";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const TEST_SUBJECT: &str = "user_alice";
pub const CLIENT_ADDRESS: &str = "203.0.113.7";

pub struct InMemoryIdentityProvider {
    identities: HashMap<String, Identity>,
}

impl InMemoryIdentityProvider {
    pub fn with_identity(email: &str, subject_id: &str, password: &str) -> Self {
        let password_hash =
            hash_password(&Password::new(password)).expect("Failed to hash test password");
        let mut identities = HashMap::new();
        identities.insert(
            email.to_string(),
            Identity {
                id: subject_id.to_string(),
                password_hash,
            },
        );
        Self { identities }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, anyhow::Error> {
        Ok(self.identities.get(email).cloned())
    }
}

pub struct TestContext {
    pub service: SessionService,
    pub store: Arc<InMemoryCredentialStore>,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_min_response_time(Duration::ZERO)
    }

    pub fn with_min_response_time(min_response_time: Duration) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();

        let store = Arc::new(InMemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let jwt = JwtService::new(&jwt_config(), clock.clone()).expect("Failed to create JWT service");
        let identities = Arc::new(InMemoryIdentityProvider::with_identity(
            TEST_EMAIL,
            TEST_SUBJECT,
            TEST_PASSWORD,
        ));

        let service = SessionService::new(
            identities,
            store.clone(),
            jwt,
            clock.clone(),
            SessionPolicy {
                refresh_ttl: chrono::Duration::days(7),
                min_response_time,
            },
        );

        Self {
            service,
            store,
            clock,
        }
    }

    pub fn password() -> Password {
        Password::new(TEST_PASSWORD)
    }

    /// Nodes of the test subject, oldest first.
    pub fn nodes(&self) -> Vec<RefreshCredential> {
        self.store
            .snapshot_for_subject(TEST_SUBJECT)
            .expect("Failed to read store")
    }

    pub fn unrevoked_count(&self) -> usize {
        self.nodes().iter().filter(|c| !c.is_revoked()).count()
    }
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        signing_key: Some(Secret::new(TEST_SIGNING_KEY.to_string())),
        issuer: "session-service".to_string(),
        access_token_expiry_minutes: 5,
        refresh_token_expiry_days: 7,
    }
}

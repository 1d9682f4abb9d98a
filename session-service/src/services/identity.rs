//! Identity collaborator.
//!
//! Accounts live in another subsystem. The session core only needs to find
//! an identity by email and check a password against its stored hash.

use async_trait::async_trait;

use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub password_hash: PasswordHashString,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, anyhow::Error>;

    /// Argon2 by default. Providers with another hashing scheme override it.
    fn verify_password(&self, password: &Password, password_hash: &PasswordHashString) -> bool {
        verify_password(password, password_hash).is_ok()
    }
}

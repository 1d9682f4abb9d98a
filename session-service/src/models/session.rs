//! Session views handed to callers of the facade.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::RefreshCredential;
use crate::utils::RefreshSecret;

/// Freshly issued credentials for one session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_secret: RefreshSecret,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
    /// Row id of the new chain node, for audit correlation on the server.
    /// Not part of a client response.
    pub credential_id: Uuid,
}

/// Active session summary for listing a subject's devices.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Server-side only; never serialized.
    #[serde(skip)]
    pub credential_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_from_address: String,
}

impl From<RefreshCredential> for SessionInfo {
    fn from(c: RefreshCredential) -> Self {
        Self {
            credential_id: c.id,
            created_at: c.created_at,
            expires_at: c.expires_at,
            created_from_address: c.created_from_address,
        }
    }
}

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

/// Number of random bytes behind every refresh secret (512 bits).
pub const SECRET_BYTES: usize = 64;

/// Plaintext refresh secret as handed to the client.
///
/// Only the SHA-256 digest is persisted. `Debug` is redacted so the value
/// cannot end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshSecret(String);

impl RefreshSecret {
    /// Generate a fresh secret from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap a secret presented by a client.
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for RefreshSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_length() {
        let secret = RefreshSecret::generate();
        let decoded = URL_SAFE_NO_PAD
            .decode(secret.as_str())
            .expect("secret should be base64url");

        assert_eq!(decoded.len(), SECRET_BYTES);
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = RefreshSecret::generate();
        let b = RefreshSecret::generate();

        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = RefreshSecret::new("super-secret-value".to_string());

        assert!(!format!("{:?}", secret).contains("super-secret-value"));
    }
}

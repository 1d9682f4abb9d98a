use service_core::error::AppError;
use thiserror::Error;

/// Outcomes of the credential state machine, issuer and cascade.
///
/// These are precise on purpose and stay inside the service: the facade
/// folds them into [`SessionError`] before anything reaches a client.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Refresh credential not found")]
    UnknownCredential,

    #[error("Refresh credential expired")]
    CredentialExpired,

    #[error("Refresh credential reuse detected")]
    ReuseDetected,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access token signing key is not configured")]
    SigningKeyUnavailable,

    #[error("Invalid or expired access token")]
    InvalidOrExpiredCredential,

    /// Store or signing failure; never a statement about the credential.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Caller-facing outcomes of the session facade.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Refresh credential required")]
    MissingCredential,

    /// Every refresh failure: unknown, expired or replayed secret.
    #[error("Session expired. Please sign in again.")]
    ReauthenticationRequired,

    #[error("Invalid token. Please refresh or sign in again.")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl From<CredentialError> for SessionError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::UnknownCredential
            | CredentialError::CredentialExpired
            | CredentialError::ReuseDetected => SessionError::ReauthenticationRequired,
            CredentialError::InvalidCredentials => SessionError::InvalidCredentials,
            CredentialError::InvalidOrExpiredCredential => SessionError::Unauthorized,
            CredentialError::SigningKeyUnavailable => {
                SessionError::Configuration(CredentialError::SigningKeyUnavailable.to_string())
            }
            CredentialError::Internal(e) => SessionError::Internal(e),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::InvalidCredentials | SessionError::ReauthenticationRequired => {
                AppError::AuthError(anyhow::anyhow!(message))
            }
            SessionError::Unauthorized => AppError::Unauthorized(anyhow::anyhow!(message)),
            SessionError::MissingCredential => AppError::BadRequest(anyhow::anyhow!(message)),
            SessionError::Configuration(e) => AppError::ConfigError(anyhow::anyhow!(e)),
            SessionError::Internal(e) => AppError::InternalError(e),
        }
    }
}

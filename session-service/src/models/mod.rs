//! Domain models for session-service.

pub mod refresh_credential;
pub mod session;

pub use refresh_credential::{ChainState, RefreshCredential};
pub use session::{SessionInfo, TokenPair};

//! Services layer for session-service.
//!
//! The access token issuer, the refresh rotation engine, the revocation
//! cascade and the session facade that composes them.

mod clock;
pub mod error;
mod identity;
mod jwt;
pub mod maintenance;
pub mod revocation;
mod rotation;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CredentialError, SessionError};
pub use identity::{Identity, IdentityProvider};
pub use jwt::{AccessTokenClaims, JwtService};
pub use maintenance::CredentialMaintenance;
pub use revocation::{RevocationCascade, BULK_REVOCATION_MARKER, REUSE_REVOCATION_MARKER};
pub use rotation::RotationEngine;
pub use session::{SessionPolicy, SessionService};

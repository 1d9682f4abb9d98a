pub mod password;
pub mod secret;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use secret::RefreshSecret;

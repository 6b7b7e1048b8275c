//! Authentication: token issuance/validation and the credential store boundary.

pub mod credentials;
pub mod jwt;

pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use jwt::{AuthError, Claims, IssuedToken, TokenService};

/// Caller identity established by a credential check or a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub app_id: String,
    pub app_name: String,
}

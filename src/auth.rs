//! OAuth credential state, token verification, refresh lifecycle, and endpoint access checks.

pub mod access;
pub mod credential;
pub mod token;
pub mod verifier;

pub use access::{AccessCheck, ScopeMap};
pub use credential::Credential;
pub use token::TokenManager;
pub use verifier::{TokenClaims, TokenVerifier};

/// Scope granted to every caller, authenticated or not.
pub const PUBLIC_SCOPE: &str = "public";

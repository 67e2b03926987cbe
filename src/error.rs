//! Error taxonomy for identity validation and propagation.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by configuration validation, token validation, and
/// identity propagation.
///
/// The variant names are the taxonomy *kinds*; callers that collapse
/// verifier detail for an external response should match on the variant,
/// never format `Display` output into a user-facing message.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No credential was presented, the credential was malformed, or no
    /// configured route could handle it.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The credential's `exp` claim is in the past beyond the configured
    /// clock skew.
    #[error("credential expired")]
    CredentialExpired,

    /// Signature, issuer, audience, `nbf`, or structural validation failed,
    /// including the `alg: none` rejection and oversized tokens.
    #[error("invalid credential: {0}")]
    CredentialInvalid(String),

    /// A JWKS or discovery document fetch failed for a reason the caller
    /// may reasonably retry (network error, non-200, oversized body).
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// An encoded propagation header would exceed the size cap.
    #[error("serialized value too large: {0} bytes (max {1})")]
    SerializationTooLarge(usize, usize),
}

impl Error {
    /// `true` for the three kinds a transport adapter must collapse into a
    /// single external "unauthenticated" response.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::Unauthenticated(_) | Error::CredentialExpired | Error::CredentialInvalid(_)
        )
    }
}

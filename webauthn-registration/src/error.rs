//! Errors of relying party configuration and of finishing a registration.

use thiserror::Error;
use webauthn_registration_core::error::{ParseError, RegistrationError};

/// A result type of this crate.
pub type WebauthnRegistrationResult<T> = Result<T, WebauthnRegistrationError>;

/// The relying party configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// rp_id must be the host of rp_origin, or a parent domain of it.
    #[error("rp_id {rp_id:?} is not an effective domain of rp_origin {rp_origin}")]
    RpIdNotEffectiveDomain {
        /// The configured relying party id.
        rp_id: String,
        /// The configured relying party origin.
        rp_origin: String,
    },
    /// The user verification policy was never chosen.
    #[error("the user verification requirement must be set explicitly")]
    UserVerificationUnset,
    /// No attestation format is accepted, so every registration would fail.
    #[error("no attestation formats are registered")]
    NoAttestationFormats,
}

/// Possible errors of this crate.
#[derive(Debug, Error)]
pub enum WebauthnRegistrationError {
    /// The relying party configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// The registration response is malformed, or failed a ceremony step.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// The registration response is not the expected JSON.
    #[error("invalid registration response json")]
    Json(#[from] serde_json::Error),
}

impl From<ParseError> for WebauthnRegistrationError {
    fn from(e: ParseError) -> Self {
        WebauthnRegistrationError::Registration(e.into())
    }
}

//! Possible errors that may occur during Webauthn registration verification.
//!
//! There are two disjoint families. A [`ParseError`] means the input is not
//! well formed per the wire format. A [`VerificationError`] means the input is
//! well formed but fails a check of the registration ceremony, and names the
//! WebAuthn §7.1 step and field at fault. Neither is ever retried.

use crate::attestation::AttestationFailure;
use std::fmt;
use thiserror::Error;

/// A specialised result for structural parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Structural errors in authenticator supplied bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input ended before the structure it describes was complete.
    #[error("The input is truncated")]
    Truncated,
    /// The attestation object is not a map with `fmt` (text), `attStmt` (map)
    /// and `authData` (bytes).
    #[error("The attestation object envelope is malformed")]
    MalformedEnvelope,
    /// No verifier is registered for this attestation statement format.
    #[error("The attestation format {0:?} is not supported")]
    UnsupportedFormat(String),
    /// The COSE key type is not EC2.
    #[error("The COSE key type {0} is not supported")]
    UnsupportedKeyType(i128),
    /// The authenticator data signals extension data, which is not processed.
    #[error("Authenticator data extensions are not supported")]
    UnsupportedExtension,
    /// Bytes remain after the authenticator data, and no extension data was signalled.
    #[error("Unexpected trailing bytes after the authenticator data")]
    TrailingData,
    /// The COSE key is missing a label, has a mistyped value, names an unknown
    /// curve, or describes a point that is not on its curve.
    #[error("The COSE key is invalid: {0}")]
    InvalidCoseKey(&'static str),
    /// The COSE algorithm is not an ECDSA algorithm this crate verifies.
    #[error("The COSE algorithm {0} is not supported")]
    UnsupportedAlgorithm(i128),
}

/// The steps of the registration ceremony, identified by their section of
/// <https://www.w3.org/TR/webauthn-2/#sctn-registering-a-new-credential>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStep {
    /// Parse clientDataJSON into C.
    ClientDataParse,
    /// C.type is webauthn.create
    ClientDataType,
    /// C.challenge matches the issued challenge.
    Challenge,
    /// C.origin matches the relying party origin.
    Origin,
    /// The attested credential data and its public key are present.
    AttestedCredentialData,
    /// authData.rpIdHash is the hash of the relying party id.
    RpIdHash,
    /// The user present flag is set.
    UserPresent,
    /// The user verified flag is set, when required.
    UserVerified,
    /// The attestation statement verifies.
    AttestationStatement,
}

impl RegistrationStep {
    /// The WebAuthn section identifier of this step, such as `"7.1.8"`.
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStep::ClientDataParse => "7.1.6",
            RegistrationStep::ClientDataType => "7.1.7",
            RegistrationStep::Challenge => "7.1.8",
            RegistrationStep::Origin => "7.1.9",
            RegistrationStep::AttestedCredentialData => "7.1.12",
            RegistrationStep::RpIdHash => "7.1.13",
            RegistrationStep::UserPresent => "7.1.14",
            RegistrationStep::UserVerified => "7.1.15",
            RegistrationStep::AttestationStatement => "7.1.19",
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The underlying reason a step failed, when there is more to say than the
/// step and field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    /// The attestation format verifier rejected the statement.
    #[error(transparent)]
    Attestation(AttestationFailure),
    /// A structure needed by the step could not be parsed.
    #[error(transparent)]
    Parse(ParseError),
}

/// A registration check failed. Identifies exactly which step and field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("registration step {step} failed on {field}")]
pub struct VerificationError {
    step: RegistrationStep,
    field: &'static str,
    cause: Option<FailureCause>,
}

impl VerificationError {
    pub(crate) fn new(step: RegistrationStep, field: &'static str) -> Self {
        VerificationError {
            step,
            field,
            cause: None,
        }
    }

    pub(crate) fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// The step that failed.
    pub fn step(&self) -> RegistrationStep {
        self.step
    }

    /// The field that failed the step's check, such as `"C.challenge"`.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The nested reason, if the step has one.
    pub fn cause(&self) -> Option<&FailureCause> {
        self.cause.as_ref()
    }
}

/// The error of a registration ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The response is not structurally valid.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The response is well formed but failed a ceremony step.
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl RegistrationError {
    /// The failed step, if this is a verification failure.
    pub fn step(&self) -> Option<RegistrationStep> {
        match self {
            RegistrationError::Parse(_) => None,
            RegistrationError::Verification(e) => Some(e.step()),
        }
    }
}

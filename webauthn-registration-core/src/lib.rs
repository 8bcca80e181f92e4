//! Webauthn registration verification.
//!
//! This crate decides whether the response an authenticator returns from a
//! credential creation ceremony is structurally and cryptographically valid. On
//! success it yields a [`Credential`](credential::Credential) that the caller
//! persists against the user account.
//!
//! The pieces, leaf first:
//!
//! * [`opaque`] - byte values with constant time equality, and the [`Challenge`](opaque::Challenge).
//! * [`crypto`] - the COSE public key parser and signature verification.
//! * [`authenticator_data`] - the authenticator data wire format.
//! * [`attestation`] - the attestation object envelope and the per format verifiers.
//! * [`registration`] - the ordered §7.1 registration ceremony.
//!
//! Trust anchor policy, duplicate credential checks, challenge storage and the
//! persistence of credentials all belong to the caller.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod constants;

pub mod attestation;
pub mod authenticator_data;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod opaque;
pub mod registration;

#[cfg(test)]
mod testutils;

/// Commonly used types.
pub mod proto {
    pub use crate::attestation::{
        AttestationFailure, AttestationFormatRegistry, AttestationFormatVerifier,
        AttestationObject, AttestationStatement, AttestationTrust, FidoU2FAttestation,
        NoneAttestation, PackedAttestation, VerificationOutcome,
    };
    pub use crate::authenticator_data::{AttestedCredentialData, AuthenticatorData};
    pub use crate::credential::{Credential, CredentialID};
    pub use crate::crypto::{COSEAlgorithm, COSEEC2Key, COSEKey, COSEKeyType, ECDSACurve};
    pub use crate::error::{
        FailureCause, ParseError, RegistrationError, RegistrationStep, VerificationError,
    };
    pub use crate::opaque::{Challenge, OpaqueBytes};
    pub use crate::registration::{verify_registration, RegistrationVerifier, RelyingParty};
    pub use base64urlsafedata::Base64UrlSafeData;
}

//! Webauthn registration for relying parties.
//!
//! Build a [`WebauthnRegistration`] once per relying party, then pass each
//! [`RegisterPublicKeyCredential`](prelude::RegisterPublicKeyCredential) your
//! client returns to [`WebauthnRegistration::finish_registration`] along with
//! the challenge you issued for it.
//!
//! ```
//! use webauthn_registration::prelude::*;
//!
//! let rp_origin = Url::parse("https://idm.example.com").expect("Invalid URL");
//! let webauthn = WebauthnRegistrationBuilder::new("example.com", &rp_origin)
//!     .expect("Invalid configuration")
//!     .require_user_verification(true)
//!     .build()
//!     .expect("Invalid configuration");
//! assert_eq!(webauthn.relying_party().origin, "https://idm.example.com");
//! ```
//!
//! Issuing, storing and expiring challenges, deciding whether an attestation is
//! trustworthy, rejecting credential ids that are already registered and
//! persisting the [`Credential`](prelude::Credential) remain your responsibility.

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

pub mod error;
mod interface;

use url::{Host, Url};
use webauthn_registration_core::proto::*;

use crate::error::{ConfigError, WebauthnRegistrationResult};
use crate::interface::*;

/// A prelude of types that are used by `WebauthnRegistration`
pub mod prelude {
    pub use crate::error::{ConfigError, WebauthnRegistrationError, WebauthnRegistrationResult};
    pub use crate::interface::*;
    pub use crate::{WebauthnRegistration, WebauthnRegistrationBuilder};
    pub use base64urlsafedata::Base64UrlSafeData;
    pub use url::Url;
    pub use uuid::Uuid;
    pub use webauthn_registration_core::proto::{
        AttestationFailure, AttestationFormatRegistry, AttestationFormatVerifier,
        AttestationStatement, AttestationTrust, AuthenticatorData, Challenge, Credential,
        CredentialID, OpaqueBytes, ParseError, RegistrationError, RegistrationStep,
        RelyingParty, VerificationError, VerificationOutcome,
    };
}

fn is_effective_domain(rp_id: &str, rp_origin: &Url) -> bool {
    match rp_origin.host() {
        // We need to prepend the '.' here to ensure that myexample.com != example.com,
        // rather than just ends with.
        Some(Host::Domain(effective_domain)) => {
            effective_domain.ends_with(&format!(".{}", rp_id)) || effective_domain == rp_id
        }
        // An ip address has no parent domains.
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => rp_origin.host_str() == Some(rp_id),
        None => false,
    }
}

/// A constructor for a new [WebauthnRegistration] instance. This accepts and configures the
/// site-wide properties that apply to every registration of this service.
#[derive(Debug)]
pub struct WebauthnRegistrationBuilder<'a> {
    rp_id: &'a str,
    rp_origin: &'a Url,
    require_user_verification: Option<bool>,
    registry: AttestationFormatRegistry,
}

impl<'a> WebauthnRegistrationBuilder<'a> {
    /// Initiate a new builder. This takes the relying party id and relying party origin.
    ///
    /// # Safety
    ///
    /// rp_id is what Credentials (Authenticators) bind themself to - rp_id can NOT be changed
    /// without potentially breaking all of your associated credentials in the future!
    ///
    /// # Errors
    ///
    /// rp_id *must* be an effective domain of rp_origin. This means that if you are hosting
    /// `https://idm.example.com`, rp_id must be `idm.example.com`, `example.com` or `com`.
    ///
    /// ```
    /// use webauthn_registration::prelude::*;
    ///
    /// let rp_id = "example.com";
    /// let rp_origin = Url::parse("https://idm.different.com")
    ///     .expect("Invalid URL");
    /// assert!(WebauthnRegistrationBuilder::new(rp_id, &rp_origin).is_err());
    /// ```
    pub fn new(rp_id: &'a str, rp_origin: &'a Url) -> WebauthnRegistrationResult<Self> {
        if is_effective_domain(rp_id, rp_origin) {
            Ok(WebauthnRegistrationBuilder {
                rp_id,
                rp_origin,
                require_user_verification: None,
                registry: AttestationFormatRegistry::with_builtin(),
            })
        } else {
            error!("rp_id is not an effective_domain of rp_origin");
            Err(ConfigError::RpIdNotEffectiveDomain {
                rp_id: rp_id.to_string(),
                rp_origin: rp_origin.to_string(),
            }
            .into())
        }
    }

    /// Whether every registration must have verified the user, for example with a PIN
    /// or biometric. This has no default, and must be set.
    pub fn require_user_verification(mut self, require: bool) -> Self {
        self.require_user_verification = Some(require);
        self
    }

    /// Accept an additional attestation statement format, or replace the built in
    /// verifier of the same format.
    pub fn attestation_format<V>(mut self, verifier: V) -> Self
    where
        V: AttestationFormatVerifier + 'static,
    {
        self.registry = self.registry.register(verifier);
        self
    }

    /// Accept exactly the formats of `registry`, in place of the built in ones.
    pub fn attestation_formats(mut self, registry: AttestationFormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Complete the construction of the [WebauthnRegistration] instance. If an invalid
    /// configuration setting is found, an Error is returned.
    pub fn build(self) -> WebauthnRegistrationResult<WebauthnRegistration> {
        let require_user_verification = self
            .require_user_verification
            .ok_or(ConfigError::UserVerificationUnset)?;

        if self.registry.formats().next().is_none() {
            return Err(ConfigError::NoAttestationFormats.into());
        }

        Ok(WebauthnRegistration {
            rp: RelyingParty::new(self.rp_id, self.rp_origin.origin().ascii_serialization()),
            require_user_verification,
            registry: self.registry,
        })
    }
}

/// Registers credentials for one relying party. It is immutable once built, and may be
/// shared between threads.
#[derive(Debug, Clone)]
pub struct WebauthnRegistration {
    rp: RelyingParty,
    require_user_verification: bool,
    registry: AttestationFormatRegistry,
}

impl WebauthnRegistration {
    /// The relying party this instance registers credentials to.
    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    /// Verify the response of a registration ceremony. `challenge` is the challenge that
    /// was issued for this ceremony, and must be invalidated by the caller afterwards
    /// whether or not this succeeds.
    ///
    /// On success the [Credential] should be stored against the user account, once the
    /// caller is satisfied with its attestation and has checked its id is not already
    /// registered.
    pub fn finish_registration(
        &self,
        reg: &RegisterPublicKeyCredential,
        challenge: &Challenge,
    ) -> WebauthnRegistrationResult<Credential> {
        // Perform CBOR decoding on the attestationObject field of the
        // AuthenticatorAttestationResponse structure to obtain the attestation statement
        // format fmt, the authenticator data authData, and the attestation statement attStmt.
        let attestation_object = AttestationObject::decode(reg.response.attestation_object.as_ref())
            .inspect_err(|e| {
                debug!(?e, "attestation object could not be decoded");
            })?;

        let credential = RegistrationVerifier::new(&self.registry, self.require_user_verification)
            .verify(
                reg.response.client_data_json.as_ref(),
                &attestation_object,
                challenge,
                &self.rp,
            )?;

        trace!(cred_id = ?credential.cred_id, format = %credential.attestation_format);
        Ok(credential)
    }

    /// As [finish_registration](Self::finish_registration), for the JSON of a
    /// [RegisterPublicKeyCredential].
    pub fn finish_registration_json(
        &self,
        reg: &str,
        challenge: &Challenge,
    ) -> WebauthnRegistrationResult<Credential> {
        let reg: RegisterPublicKeyCredential = reg.parse()?;
        self.finish_registration(&reg, challenge)
    }
}

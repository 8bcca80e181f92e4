//! Attestation objects, and the verifiers of their attestation statement formats.
//!
//! An attestation object is the CBOR map `{fmt, attStmt, authData}` an
//! authenticator returns from `authenticatorMakeCredential`. The statement in
//! `attStmt` is checked by the [`AttestationFormatVerifier`] registered for
//! `fmt` in an [`AttestationFormatRegistry`].

use crate::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use crate::crypto::{
    assert_fido_gen_ce_aaguid, assert_packed_attest_req, verify_x509_signature, x509_ec_curve,
    x509_from_der, COSEAlgorithm, COSEKey, ECDSACurve,
};
use crate::error::{ParseError, ParseResult};
use crate::opaque::OpaqueBytes;
use base64urlsafedata::Base64UrlSafeData;
use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// The decoded `attStmt` map. Its keys and values depend on the format.
pub type AttestationStatement = BTreeMap<Value, Value>;

/// Why an attestation statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationFailure {
    /// The format needs the attested credential data, and the authenticator data has none.
    #[error("The authenticator data has no attested credential data")]
    AttestedCredentialDataMissing,
    /// The credential public key can not be used by this format.
    #[error("The credential public key is invalid for this attestation format")]
    CredentialPublicKeyInvalid,
    /// `alg` is absent from the statement.
    #[error("The attestation statement alg is missing")]
    AlgMissing,
    /// `alg` is mistyped or names an unsupported algorithm.
    #[error("The attestation statement alg is invalid")]
    AlgInvalid,
    /// `alg` does not match the credential public key.
    #[error("The attestation statement alg does not match the credential public key")]
    AlgMismatch,
    /// `sig` is absent or mistyped.
    #[error("The attestation statement sig is missing")]
    SigMissing,
    /// `sig` does not verify.
    #[error("The attestation statement sig is invalid")]
    SigInvalid,
    /// `x5c` is absent.
    #[error("The attestation statement x5c is missing")]
    X5CMissing,
    /// `x5c` is not an array of DER certificates of the required length.
    #[error("The attestation statement x5c is invalid")]
    X5CInvalid,
    /// The attestation certificate's public key is unusable or of the wrong type.
    #[error("The attestation certificate public key is invalid")]
    CertificatePublicKeyInvalid,
    /// The attestation certificate does not meet the format's requirements.
    #[error("The attestation certificate does not meet the format requirements")]
    CertificateRequirementsNotMet,
    /// The certificate's id-fido-gen-ce-aaguid extension names another authenticator model.
    #[error("The attestation certificate aaguid does not match the authenticator data")]
    CertificateAaguidMismatch,
    /// ECDAA attestation is not verified.
    #[error("ECDAA attestation is not supported")]
    EcdaaUnsupported,
    /// A caller supplied verifier rejected the statement.
    #[error("The attestation statement was rejected: {0}")]
    Rejected(String),
}

/// What a verified attestation statement proves about the new credential. The
/// caller decides whether that is trustworthy enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationTrust {
    /// No attestation was provided. If in doubt, reject this credential.
    None,
    /// The credential signed its own attestation with its private key.
    Self_,
    /// The credential is attested by a vendor or provider certificate.
    Basic {
        /// The DER certificates of the trust path, leaf first.
        x5c: Vec<Base64UrlSafeData>,
    },
    /// The statement verified, but what it conveys can not be determined.
    Uncertain,
}

/// The result of checking an attestation statement. Never a plain boolean, as
/// trust policy needs the detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The statement is valid and conveys this trust.
    Verified(AttestationTrust),
    /// The statement is invalid.
    Failed(AttestationFailure),
}

impl From<Result<AttestationTrust, AttestationFailure>> for VerificationOutcome {
    fn from(r: Result<AttestationTrust, AttestationFailure>) -> Self {
        match r {
            Ok(trust) => VerificationOutcome::Verified(trust),
            Err(reason) => VerificationOutcome::Failed(reason),
        }
    }
}

/// Verifies one attestation statement format.
///
/// Implementations must be pure: the same inputs always produce the same
/// outcome, and nothing is mutated.
pub trait AttestationFormatVerifier: Send + Sync + fmt::Debug {
    /// The `fmt` identifier this verifier handles, such as `"packed"`.
    fn format(&self) -> &str;

    /// Check `att_stmt` over the authenticator data and the hash of the client data.
    fn verify(
        &self,
        att_stmt: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &OpaqueBytes,
    ) -> VerificationOutcome;
}

/// A read only mapping from format identifier to verifier.
///
/// ```
/// use webauthn_registration_core::proto::AttestationFormatRegistry;
///
/// let registry = AttestationFormatRegistry::with_builtin();
/// assert!(registry.lookup("packed").is_ok());
/// assert!(registry.lookup("tpm").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttestationFormatRegistry {
    verifiers: BTreeMap<String, Arc<dyn AttestationFormatVerifier>>,
}

impl AttestationFormatRegistry {
    /// A registry that knows no formats.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry of the formats this crate verifies: `none`, `packed` and `fido-u2f`.
    pub fn with_builtin() -> Self {
        Self::empty()
            .register(NoneAttestation)
            .register(PackedAttestation)
            .register(FidoU2FAttestation)
    }

    /// The process wide registry of built in formats.
    pub fn builtin() -> &'static AttestationFormatRegistry {
        static BUILTIN: OnceLock<AttestationFormatRegistry> = OnceLock::new();
        BUILTIN.get_or_init(AttestationFormatRegistry::with_builtin)
    }

    /// Add a verifier, replacing any verifier of the same format.
    pub fn register<V>(mut self, verifier: V) -> Self
    where
        V: AttestationFormatVerifier + 'static,
    {
        self.verifiers
            .insert(verifier.format().to_string(), Arc::new(verifier));
        self
    }

    /// The verifier of `fmt`.
    pub fn lookup(&self, fmt: &str) -> ParseResult<&dyn AttestationFormatVerifier> {
        self.verifiers
            .get(fmt)
            .map(|v| v.as_ref())
            .ok_or_else(|| ParseError::UnsupportedFormat(fmt.to_string()))
    }

    /// The registered format identifiers, in order.
    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.verifiers.keys().map(|k| k.as_str())
    }
}

/// A decoded attestation object.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    format: String,
    auth_data: AuthenticatorData,
    att_stmt: AttestationStatement,
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = ParseError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        AttestationObject::decode(data)
    }
}

impl AttestationObject {
    /// Decode the CBOR envelope, and parse the authenticator data within it.
    pub fn decode(data: &[u8]) -> ParseResult<Self> {
        let value: Value = serde_cbor_2::from_slice(data).map_err(|e| {
            debug!(?e, "invalid attestation object cbor");
            if e.is_eof() {
                ParseError::Truncated
            } else {
                ParseError::MalformedEnvelope
            }
        })?;

        let envelope = cbor_try_map!(&value, ParseError::MalformedEnvelope)?;
        let field = |name: &str| {
            envelope
                .get(&Value::Text(name.to_string()))
                .ok_or(ParseError::MalformedEnvelope)
        };

        let format = field("fmt")
            .and_then(|v| cbor_try_string!(v, ParseError::MalformedEnvelope))?
            .clone();
        let att_stmt = field("attStmt")
            .and_then(|v| cbor_try_map!(v, ParseError::MalformedEnvelope))?
            .clone();
        let auth_data = field("authData")
            .and_then(|v| cbor_try_bytes!(v, ParseError::MalformedEnvelope))
            .and_then(|b| AuthenticatorData::parse(b))?;

        Ok(AttestationObject {
            format,
            auth_data,
            att_stmt,
        })
    }

    /// The attestation statement format identifier.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The parsed authenticator data.
    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.auth_data
    }

    /// The attestation statement.
    pub fn att_stmt(&self) -> &AttestationStatement {
        &self.att_stmt
    }

    /// Verify the attestation statement with the built in formats.
    pub fn verify(&self, client_data_hash: &OpaqueBytes) -> ParseResult<VerificationOutcome> {
        self.verify_with(AttestationFormatRegistry::builtin(), client_data_hash)
    }

    /// Verify the attestation statement with the verifier `registry` holds for
    /// its format. An unknown format is a structural error, not a failed outcome.
    pub fn verify_with(
        &self,
        registry: &AttestationFormatRegistry,
        client_data_hash: &OpaqueBytes,
    ) -> ParseResult<VerificationOutcome> {
        let verifier = registry.lookup(&self.format)?;
        Ok(verifier.verify(&self.att_stmt, &self.auth_data, client_data_hash))
    }
}

fn stmt_get<'a>(att_stmt: &'a AttestationStatement, key: &str) -> Option<&'a Value> {
    att_stmt.get(&Value::Text(key.to_string()))
}

fn stmt_sig(att_stmt: &AttestationStatement) -> Result<&[u8], AttestationFailure> {
    stmt_get(att_stmt, "sig")
        .ok_or(AttestationFailure::SigMissing)
        .and_then(|s| cbor_try_bytes!(s, AttestationFailure::SigMissing))
        .map(|s| s.as_slice())
}

fn stmt_x5c(att_stmt: &AttestationStatement) -> Result<&Vec<Value>, AttestationFailure> {
    stmt_get(att_stmt, "x5c")
        .ok_or(AttestationFailure::X5CMissing)
        .and_then(|x5c| cbor_try_array!(x5c, AttestationFailure::X5CInvalid))
}

fn x5c_der(x5c: &[Value]) -> Result<Vec<&Vec<u8>>, AttestationFailure> {
    x5c.iter()
        .map(|v| cbor_try_bytes!(v, AttestationFailure::X5CInvalid))
        .collect()
}

fn require_acd(auth_data: &AuthenticatorData) -> Result<&AttestedCredentialData, AttestationFailure> {
    auth_data
        .attested_credential_data()
        .ok_or(AttestationFailure::AttestedCredentialDataMissing)
}

fn credential_public_key(acd: &AttestedCredentialData) -> Result<COSEKey, AttestationFailure> {
    acd.credential_public_key().map_err(|e| {
        debug!(?e, "credential public key could not be parsed");
        AttestationFailure::CredentialPublicKeyInvalid
    })
}

/// The `none` format. There is nothing to verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneAttestation;

impl AttestationFormatVerifier for NoneAttestation {
    fn format(&self) -> &str {
        "none"
    }

    fn verify(
        &self,
        _att_stmt: &AttestationStatement,
        _auth_data: &AuthenticatorData,
        _client_data_hash: &OpaqueBytes,
    ) -> VerificationOutcome {
        VerificationOutcome::Verified(AttestationTrust::None)
    }
}

/// The `packed` format, with self and basic attestation.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation>
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedAttestation;

impl PackedAttestation {
    fn verify_inner(
        att_stmt: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &OpaqueBytes,
    ) -> Result<AttestationTrust, AttestationFailure> {
        // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and
        // perform CBOR decoding on it to extract the contained fields.
        let alg = stmt_get(att_stmt, "alg")
            .ok_or(AttestationFailure::AlgMissing)
            .and_then(|v| cbor_try_i128!(v, AttestationFailure::AlgInvalid))
            .and_then(|v| {
                COSEAlgorithm::try_from(v).map_err(|_| AttestationFailure::AlgInvalid)
            })?;

        let sig = stmt_sig(att_stmt)?;

        let verification_data: Vec<u8> = auth_data
            .as_bytes()
            .iter()
            .chain(client_data_hash.as_slice().iter())
            .copied()
            .collect();

        trace!(x5c = ?stmt_get(att_stmt, "x5c"));
        trace!(ecdaa = ?stmt_get(att_stmt, "ecdaaKeyId"));

        match (stmt_get(att_stmt, "x5c"), stmt_get(att_stmt, "ecdaaKeyId")) {
            (Some(_), _) => {
                // 2. If x5c is present, this indicates that the attestation type is not ECDAA.
                // x5c: [ attestnCert: bytes, * (caCert: bytes) ]
                let x5c = x5c_der(stmt_x5c(att_stmt)?)?;

                // The attestation certificate attestnCert MUST be the first element in the array.
                let attestn_cert = x5c
                    .first()
                    .ok_or(AttestationFailure::X5CInvalid)
                    .and_then(|der| x509_from_der(der))?;

                // The certificate must hold a key that alg can verify with: an EC key on
                // the curve that alg names.
                if x509_ec_curve(&attestn_cert)?.map(ECDSACurve::implied_algorithm) != Some(alg) {
                    debug!(?alg, "attestation certificate key does not match alg");
                    return Err(AttestationFailure::AlgMismatch);
                }

                // Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the attestation public key in
                // attestnCert with the algorithm specified in alg.
                if !verify_x509_signature(alg, &attestn_cert, sig, &verification_data)? {
                    trace!("packed x509 signature invalid");
                    return Err(AttestationFailure::SigInvalid);
                }

                // Verify that attestnCert meets the requirements in § 8.2.1 Packed
                // Attestation Statement Certificate Requirements.
                assert_packed_attest_req(&attestn_cert)?;

                // If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
                // (id-fido-gen-ce-aaguid) verify that the value of this extension matches
                // the aaguid in authenticatorData.
                let acd = require_acd(auth_data)?;
                assert_fido_gen_ce_aaguid(&attestn_cert, acd.aaguid().as_bytes())?;

                // Whether this is Basic or AttCA needs external knowledge, which is the
                // caller's trust policy.
                Ok(AttestationTrust::Basic {
                    x5c: x5c.into_iter().map(|der| der.clone().into()).collect(),
                })
            }
            (None, Some(_ecdaa_key_id)) => {
                // 3. If ecdaaKeyId is present, then the attestation type is ECDAA.
                debug!("ecdaa attestation is not supported");
                Err(AttestationFailure::EcdaaUnsupported)
            }
            (None, None) => {
                // 4. If neither x5c nor ecdaaKeyId is present, self attestation is in use.
                let credential_public_key = credential_public_key(require_acd(auth_data)?)?;

                // 4.a. Validate that alg matches the algorithm of the credentialPublicKey in
                // authenticatorData.
                if alg != credential_public_key.algorithm() {
                    return Err(AttestationFailure::AlgMismatch);
                }

                // 4.b. Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the credential public key with alg.
                if !credential_public_key.verify(&verification_data, sig) {
                    trace!("invalid self attestation signature");
                    return Err(AttestationFailure::SigInvalid);
                }

                // 4.c. Return attestation type Self and an empty attestation trust path.
                Ok(AttestationTrust::Self_)
            }
        }
    }
}

impl AttestationFormatVerifier for PackedAttestation {
    fn format(&self) -> &str {
        "packed"
    }

    fn verify(
        &self,
        att_stmt: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &OpaqueBytes,
    ) -> VerificationOutcome {
        Self::verify_inner(att_stmt, auth_data, client_data_hash).into()
    }
}

/// The `fido-u2f` format of legacy U2F authenticators.
/// <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>
#[derive(Debug, Clone, Copy, Default)]
pub struct FidoU2FAttestation;

impl FidoU2FAttestation {
    fn verify_inner(
        att_stmt: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &OpaqueBytes,
    ) -> Result<AttestationTrust, AttestationFailure> {
        let acd = require_acd(auth_data)?;
        let sig = stmt_sig(att_stmt)?;

        // Check that x5c has exactly one element and let att_cert be that element.
        let x5c = x5c_der(stmt_x5c(att_stmt)?)?;
        let att_cert_der = match x5c.as_slice() {
            [der] => *der,
            _ => return Err(AttestationFailure::X5CInvalid),
        };
        let att_cert = x509_from_der(att_cert_der)?;

        // If certificate public key is not an Elliptic Curve (EC) public key over the
        // P-256 curve, terminate this algorithm and return an appropriate error.
        if x509_ec_curve(&att_cert)? != Some(ECDSACurve::SECP256R1) {
            return Err(AttestationFailure::CertificatePublicKeyInvalid);
        }

        // Convert the COSE_KEY formatted credentialPublicKey to Raw ANSI X9.62 public
        // key format. Its x and y must each be 32 bytes, so P-256.
        let credential_public_key = credential_public_key(acd)?;
        if credential_public_key.curve() != ECDSACurve::SECP256R1 {
            return Err(AttestationFailure::CredentialPublicKeyInvalid);
        }
        let public_key_u2f = credential_public_key.to_x962_raw();

        // Let verificationData be the concatenation of (0x00 || rpIdHash ||
        // clientDataHash || credentialId || publicKeyU2F).
        let verification_data: Vec<u8> = std::iter::once(0x00)
            .chain(auth_data.rp_id_hash().as_slice().iter().copied())
            .chain(client_data_hash.as_slice().iter().copied())
            .chain(acd.credential_id().as_slice().iter().copied())
            .chain(public_key_u2f)
            .collect();

        // Verify the sig using verificationData and certificate public key per [SEC1].
        if !verify_x509_signature(COSEAlgorithm::ES256, &att_cert, sig, &verification_data)? {
            error!("fido-u2f signature verification failed");
            return Err(AttestationFailure::SigInvalid);
        }

        Ok(AttestationTrust::Basic {
            x5c: vec![att_cert_der.clone().into()],
        })
    }
}

impl AttestationFormatVerifier for FidoU2FAttestation {
    fn format(&self) -> &str {
        "fido-u2f"
    }

    fn verify(
        &self,
        att_stmt: &AttestationStatement,
        auth_data: &AuthenticatorData,
        client_data_hash: &OpaqueBytes,
    ) -> VerificationOutcome {
        Self::verify_inner(att_stmt, auth_data, client_data_hash).into()
    }
}

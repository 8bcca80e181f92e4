//! The registration ceremony.
//! <https://www.w3.org/TR/webauthn-2/#sctn-registering-a-new-credential>
//!
//! Each check is a step function returning `Result`. They run in the order the
//! ceremony defines, and the first failure ends the ceremony with the step and
//! field it names.

use crate::attestation::{
    AttestationFormatRegistry, AttestationFormatVerifier, AttestationObject, AttestationTrust,
    VerificationOutcome,
};
use crate::authenticator_data::AuthenticatorData;
use crate::constants::CLIENT_DATA_TYPE_CREATE;
use crate::credential::Credential;
use crate::crypto::compute_sha256;
use crate::error::{FailureCause, RegistrationError, RegistrationStep, VerificationError};
use crate::opaque::{ct_eq, Challenge, OpaqueBytes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

type StepResult<T> = Result<T, VerificationError>;

/// The relying party a credential is registered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    /// The relying party id, a domain such as `example.com`.
    pub id: String,
    /// The origin the client reports, such as `https://example.com`.
    pub origin: String,
}

impl RelyingParty {
    /// Create a relying party.
    pub fn new(id: impl Into<String>, origin: impl Into<String>) -> Self {
        RelyingParty {
            id: id.into(),
            origin: origin.into(),
        }
    }
}

/// C, the client data collected during credential creation.
#[derive(Debug)]
struct ClientData<'a> {
    type_: &'a str,
    challenge: &'a str,
    origin: &'a str,
}

fn client_data_field<'a>(
    c: &'a Map<String, Value>,
    key: &str,
    field: &'static str,
) -> StepResult<&'a str> {
    c.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| VerificationError::new(RegistrationStep::ClientDataParse, field))
}

// Let C, the client data claimed as collected during the credential creation, be the result
// of running an implementation-specific JSON parser on JSONtext.
fn parse_client_data(json: &Value) -> StepResult<ClientData<'_>> {
    let c = json.as_object().ok_or_else(|| {
        VerificationError::new(RegistrationStep::ClientDataParse, "clientDataJSON")
    })?;

    Ok(ClientData {
        type_: client_data_field(c, "type", "C.type")?,
        challenge: client_data_field(c, "challenge", "C.challenge")?,
        origin: client_data_field(c, "origin", "C.origin")?,
    })
}

// Verify that the value of C.type is webauthn.create.
fn check_type(c: &ClientData<'_>) -> StepResult<()> {
    if c.type_ != CLIENT_DATA_TYPE_CREATE {
        return Err(VerificationError::new(
            RegistrationStep::ClientDataType,
            "C.type",
        ));
    }
    Ok(())
}

// Verify that the value of C.challenge equals the base64url encoding of options.challenge.
fn check_challenge(c: &ClientData<'_>, challenge: &Challenge) -> StepResult<()> {
    if !challenge.matches_client_challenge(c.challenge) {
        return Err(VerificationError::new(
            RegistrationStep::Challenge,
            "C.challenge",
        ));
    }
    Ok(())
}

// Verify that the value of C.origin matches the Relying Party's origin.
fn check_origin(c: &ClientData<'_>, rp: &RelyingParty) -> StepResult<()> {
    if !ct_eq(rp.origin.as_bytes(), c.origin.as_bytes()) {
        return Err(VerificationError::new(RegistrationStep::Origin, "C.origin"));
    }
    Ok(())
}

// Verify that the rpIdHash in authData is the SHA-256 hash of the RP ID expected by the
// Relying Party.
fn check_rp_id_hash(auth_data: &AuthenticatorData, rp: &RelyingParty) -> StepResult<()> {
    let expected = compute_sha256(rp.id.as_bytes());
    if !ct_eq(&expected, auth_data.rp_id_hash().as_slice()) {
        return Err(VerificationError::new(
            RegistrationStep::RpIdHash,
            "authData.rpIdHash",
        ));
    }
    Ok(())
}

// Verify that the User Present bit of the flags in authData is set.
fn check_user_present(auth_data: &AuthenticatorData) -> StepResult<()> {
    if !auth_data.user_present() {
        return Err(VerificationError::new(
            RegistrationStep::UserPresent,
            "authData.flags.UP",
        ));
    }
    Ok(())
}

// If user verification is required for this registration, verify that the User Verified bit
// of the flags in authData is set.
fn check_user_verified(auth_data: &AuthenticatorData, required: bool) -> StepResult<()> {
    if required && !auth_data.user_verified() {
        return Err(VerificationError::new(
            RegistrationStep::UserVerified,
            "authData.flags.UV",
        ));
    }
    Ok(())
}

// Verify that attStmt is a correct attestation statement, conveying a valid attestation
// signature, by using the attestation statement format fmt's verification procedure given
// attStmt, authData and hash.
fn check_attestation(
    verifier: &dyn AttestationFormatVerifier,
    attestation_object: &AttestationObject,
    client_data_hash: &OpaqueBytes,
) -> StepResult<AttestationTrust> {
    match verifier.verify(
        attestation_object.att_stmt(),
        attestation_object.auth_data(),
        client_data_hash,
    ) {
        VerificationOutcome::Verified(trust) => Ok(trust),
        VerificationOutcome::Failed(reason) => Err(VerificationError::new(
            RegistrationStep::AttestationStatement,
            "attStmt",
        )
        .with_cause(FailureCause::Attestation(reason))),
    }
}

// The attested credential data, and the credential public key within it, must be present.
fn extract_credential(
    attestation_object: &AttestationObject,
    attestation: AttestationTrust,
) -> StepResult<Credential> {
    let auth_data = attestation_object.auth_data();

    let acd = auth_data.attested_credential_data().ok_or_else(|| {
        VerificationError::new(
            RegistrationStep::AttestedCredentialData,
            "authData.attestedCredentialData",
        )
    })?;

    let cred = acd.credential_public_key().map_err(|e| {
        VerificationError::new(
            RegistrationStep::AttestedCredentialData,
            "credentialPublicKey",
        )
        .with_cause(FailureCause::Parse(e))
    })?;

    // A registration never carries a private key.
    if cred.has_private_component() {
        return Err(VerificationError::new(
            RegistrationStep::AttestedCredentialData,
            "credentialPublicKey.d",
        ));
    }

    Ok(Credential {
        cred_id: acd.credential_id().clone(),
        cred,
        counter: auth_data.counter(),
        user_verified: auth_data.user_verified(),
        aaguid: acd.aaguid(),
        attestation,
        attestation_format: attestation_object.format().to_string(),
    })
}

/// Runs the registration ceremony with a fixed attestation format registry and
/// user verification policy. It holds no state between calls, and may be shared
/// between threads.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationVerifier<'a> {
    registry: &'a AttestationFormatRegistry,
    require_user_verification: bool,
}

impl<'a> RegistrationVerifier<'a> {
    /// Create a verifier. `require_user_verification` is the caller's policy,
    /// there is no default for it.
    pub fn new(registry: &'a AttestationFormatRegistry, require_user_verification: bool) -> Self {
        RegistrationVerifier {
            registry,
            require_user_verification,
        }
    }

    /// Verify a registration response, yielding the credential to persist.
    ///
    /// An attestation format the registry does not know fails with
    /// [`ParseError::UnsupportedFormat`](crate::error::ParseError::UnsupportedFormat)
    /// before any step runs. Otherwise the first failing step is reported as a
    /// [`VerificationError`].
    pub fn verify(
        &self,
        client_data_json: &[u8],
        attestation_object: &AttestationObject,
        challenge: &Challenge,
        rp: &RelyingParty,
    ) -> Result<Credential, RegistrationError> {
        // Determine the attestation statement format by performing a USASCII case-sensitive
        // match on fmt against the set of supported WebAuthn Attestation Statement Format
        // Identifier values. This is structural, so it precedes the ceremony steps.
        let verifier = self.registry.lookup(attestation_object.format())?;

        self.run_steps(verifier, client_data_json, attestation_object, challenge, rp)
            .inspect_err(|e| {
                debug!(step = %e.step(), field = e.field(), "registration failed");
            })
            .map_err(RegistrationError::Verification)
    }

    fn run_steps(
        &self,
        verifier: &dyn AttestationFormatVerifier,
        client_data_json: &[u8],
        attestation_object: &AttestationObject,
        challenge: &Challenge,
        rp: &RelyingParty,
    ) -> StepResult<Credential> {
        // 7.1.6
        let json: Value = serde_json::from_slice(client_data_json).map_err(|e| {
            trace!(?e, "client data is not json");
            VerificationError::new(RegistrationStep::ClientDataParse, "clientDataJSON")
        })?;
        let c = parse_client_data(&json)?;

        // 7.1.7
        check_type(&c)?;
        // 7.1.8
        check_challenge(&c, challenge)?;
        // 7.1.9
        check_origin(&c, rp)?;

        // C.tokenBinding is not checked.

        // Compute the hash of response.clientDataJSON using SHA-256.
        let client_data_hash: OpaqueBytes = compute_sha256(client_data_json).into();

        let auth_data = attestation_object.auth_data();
        // 7.1.13
        check_rp_id_hash(auth_data, rp)?;
        // 7.1.14
        check_user_present(auth_data)?;
        // 7.1.15
        check_user_verified(auth_data, self.require_user_verification)?;

        // 7.1.19
        let attestation = check_attestation(verifier, attestation_object, &client_data_hash)?;
        trace!(?attestation);

        // 7.1.12, last, as the credential is only extracted once everything verified.
        let credential = extract_credential(attestation_object, attestation)?;

        // Trust anchor evaluation (7.1.20, 7.1.21) and the duplicate credential id
        // checks (7.1.22, 7.1.23) are the caller's.
        Ok(credential)
    }
}

/// Verify a registration response with the built in attestation formats.
pub fn verify_registration(
    client_data_json: &[u8],
    attestation_object: &AttestationObject,
    challenge: &Challenge,
    rp: &RelyingParty,
    require_user_verification: bool,
) -> Result<Credential, RegistrationError> {
    RegistrationVerifier::new(AttestationFormatRegistry::builtin(), require_user_verification)
        .verify(client_data_json, attestation_object, challenge, rp)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use crate::attestation::AttestationFailure;
    use crate::crypto::{COSEAlgorithm, ECDSACurve};
    use crate::error::ParseError;
    use crate::testutils::{attestation_object, auth_data, client_data_json, text, TestKey};
    use serde_cbor_2::Value as CborValue;
    use std::collections::BTreeMap;

    const RP_ID: &str = "example.com";
    const ORIGIN: &str = "https://example.com";
    const CRED_ID: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    struct Fixture {
        key: TestKey,
        challenge: Challenge,
        rp: RelyingParty,
    }

    impl Fixture {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt::try_init();
            Fixture {
                key: TestKey::generate(ECDSACurve::SECP256R1),
                challenge: Challenge::new((0u8..32).collect()),
                rp: RelyingParty::new(RP_ID, ORIGIN),
            }
        }

        fn client_data(&self) -> Vec<u8> {
            client_data_json("webauthn.create", &self.challenge, ORIGIN)
        }

        // A packed self attestation over the given client data and flags.
        fn packed(&self, client_data: &[u8], flags: u8) -> AttestationObject {
            let ad = auth_data(RP_ID, flags, &CRED_ID, &self.key.cose_cbor());
            let mut signed = ad.clone();
            signed.extend_from_slice(&compute_sha256(client_data));

            let mut stmt = BTreeMap::new();
            stmt.insert(text("alg"), CborValue::Integer(-7));
            stmt.insert(text("sig"), CborValue::Bytes(self.key.sign(&signed)));
            AttestationObject::decode(&attestation_object("packed", stmt, &ad)).unwrap()
        }

        fn verify(
            &self,
            client_data: &[u8],
            att: &AttestationObject,
            require_uv: bool,
        ) -> Result<Credential, RegistrationError> {
            verify_registration(client_data, att, &self.challenge, &self.rp, require_uv)
        }
    }

    fn failed_step(r: Result<Credential, RegistrationError>) -> (RegistrationStep, &'static str) {
        match r {
            Err(RegistrationError::Verification(e)) => (e.step(), e.field()),
            other => panic!("expected a verification failure, got {:?}", other),
        }
    }

    #[test]
    fn registration_succeeds() {
        let f = Fixture::new();
        let cd = f.client_data();
        let att = f.packed(&cd, 0x45);

        let cred = f.verify(&cd, &att, true).unwrap();
        assert_eq!(cred.cred_id.as_slice(), CRED_ID);
        assert_eq!(cred.counter, 7);
        assert!(cred.user_verified);
        assert_eq!(cred.attestation, AttestationTrust::Self_);
        assert_eq!(cred.attestation_format, "packed");
        assert_eq!(cred.aaguid.as_bytes(), &crate::testutils::TEST_AAGUID);
        assert_eq!(cred.cred.algorithm(), COSEAlgorithm::ES256);
        assert_eq!(cred.public_key_cbor(), f.key.cose_cbor().as_slice());
    }

    #[test]
    fn client_data_must_parse() {
        let f = Fixture::new();
        let cd = f.client_data();
        let att = f.packed(&cd, 0x41);

        assert_eq!(
            failed_step(f.verify(b"not json", &att, false)),
            (RegistrationStep::ClientDataParse, "clientDataJSON")
        );
        assert_eq!(
            failed_step(f.verify(b"[1, 2]", &att, false)),
            (RegistrationStep::ClientDataParse, "clientDataJSON")
        );

        let missing_origin = serde_json::to_vec(&serde_json::json!({
            "type": "webauthn.create",
            "challenge": f.challenge.to_base64url(),
        }))
        .unwrap();
        assert_eq!(
            failed_step(f.verify(&missing_origin, &att, false)),
            (RegistrationStep::ClientDataParse, "C.origin")
        );

        let numeric_type = serde_json::to_vec(&serde_json::json!({
            "type": 1,
            "challenge": f.challenge.to_base64url(),
            "origin": ORIGIN,
        }))
        .unwrap();
        assert_eq!(
            failed_step(f.verify(&numeric_type, &att, false)),
            (RegistrationStep::ClientDataParse, "C.type")
        );
    }

    #[test]
    fn get_type_fails_before_any_other_step() {
        let f = Fixture::new();
        // The challenge and origin are also wrong, but the type is checked first.
        let cd = client_data_json(
            "webauthn.get",
            &Challenge::new(vec![0xff; 32]),
            "https://evil.example",
        );
        // Signed over different client data, so attestation would fail too.
        let att = f.packed(&f.client_data(), 0x40);

        assert_eq!(
            failed_step(f.verify(&cd, &att, true)),
            (RegistrationStep::ClientDataType, "C.type")
        );
    }

    #[test]
    fn one_flipped_challenge_byte_fails_at_challenge() {
        let f = Fixture::new();
        let good = f.client_data();
        let att = f.packed(&good, 0x41);
        assert!(f.verify(&good, &att, false).is_ok());

        let encoded = f.challenge.to_base64url();
        for pos in 0..encoded.len() {
            let mut flipped = encoded.clone().into_bytes();
            flipped[pos] = if flipped[pos] == b'A' { b'B' } else { b'A' };
            let flipped = String::from_utf8(flipped).unwrap();

            let cd = serde_json::to_vec(&serde_json::json!({
                "type": "webauthn.create",
                "challenge": flipped,
                "origin": ORIGIN,
                "crossOrigin": false,
            }))
            .unwrap();

            assert_eq!(
                failed_step(f.verify(&cd, &att, false)),
                (RegistrationStep::Challenge, "C.challenge")
            );
        }
    }

    #[test]
    fn origin_must_match() {
        let f = Fixture::new();
        let cd = client_data_json("webauthn.create", &f.challenge, "https://example.com:8443");
        let att = f.packed(&cd, 0x41);

        assert_eq!(
            failed_step(f.verify(&cd, &att, false)),
            (RegistrationStep::Origin, "C.origin")
        );
    }

    #[test]
    fn rp_id_hash_must_match() {
        let f = Fixture::new();
        let cd = f.client_data();
        let att = f.packed(&cd, 0x41);

        let other_rp = RelyingParty::new("login.example.com", ORIGIN);
        assert_eq!(
            failed_step(verify_registration(&cd, &att, &f.challenge, &other_rp, false)),
            (RegistrationStep::RpIdHash, "authData.rpIdHash")
        );
    }

    #[test]
    fn user_presence_and_verification() {
        let f = Fixture::new();
        let cd = f.client_data();

        let att = f.packed(&cd, 0x40);
        assert_eq!(
            failed_step(f.verify(&cd, &att, false)),
            (RegistrationStep::UserPresent, "authData.flags.UP")
        );

        let att = f.packed(&cd, 0x41);
        assert_eq!(
            failed_step(f.verify(&cd, &att, true)),
            (RegistrationStep::UserVerified, "authData.flags.UV")
        );
        let cred = f.verify(&cd, &att, false).unwrap();
        assert!(!cred.user_verified);
    }

    #[test]
    fn attestation_failure_carries_reason() {
        let f = Fixture::new();
        let cd = f.client_data();
        // Signed over other client data.
        let other = client_data_json("webauthn.create", &Challenge::new(vec![9; 32]), ORIGIN);
        let att = f.packed(&other, 0x41);

        match f.verify(&cd, &att, false) {
            Err(RegistrationError::Verification(e)) => {
                assert_eq!(e.step(), RegistrationStep::AttestationStatement);
                assert_eq!(e.step().as_str(), "7.1.19");
                assert_eq!(
                    e.cause(),
                    Some(&FailureCause::Attestation(AttestationFailure::SigInvalid))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_format_fails_before_client_data() {
        let f = Fixture::new();
        let ad = auth_data(RP_ID, 0x41, &CRED_ID, &f.key.cose_cbor());
        let att = AttestationObject::decode(&attestation_object(
            "android-safetynet",
            BTreeMap::new(),
            &ad,
        ))
        .unwrap();

        // The client data is not even json.
        assert_eq!(
            f.verify(b"", &att, false),
            Err(RegistrationError::Parse(ParseError::UnsupportedFormat(
                "android-safetynet".to_string()
            )))
        );
    }

    #[test]
    fn credential_requires_attested_data() {
        let f = Fixture::new();
        let cd = f.client_data();

        // A none attestation over authenticator data without the AT flag.
        let mut ad = compute_sha256(RP_ID.as_bytes()).to_vec();
        ad.extend_from_slice(&[0x01, 0, 0, 0, 0]);
        let att = AttestationObject::decode(&attestation_object("none", BTreeMap::new(), &ad))
            .unwrap();

        assert_eq!(
            failed_step(f.verify(&cd, &att, false)),
            (
                RegistrationStep::AttestedCredentialData,
                "authData.attestedCredentialData"
            )
        );
    }

    #[test]
    fn credential_key_must_parse() {
        let f = Fixture::new();
        let cd = f.client_data();

        // An OKP key is structurally fine for the authenticator data, but not usable.
        let okp = serde_cbor_2::to_vec(&CborValue::Map(
            [
                (CborValue::Integer(1), CborValue::Integer(1)),
                (CborValue::Integer(3), CborValue::Integer(-8)),
                (CborValue::Integer(-1), CborValue::Integer(6)),
                (CborValue::Integer(-2), CborValue::Bytes(vec![0x43; 32])),
            ]
            .into_iter()
            .collect(),
        ))
        .unwrap();
        let ad = auth_data(RP_ID, 0x41, &CRED_ID, &okp);
        let att = AttestationObject::decode(&attestation_object("none", BTreeMap::new(), &ad))
            .unwrap();

        match f.verify(&cd, &att, false) {
            Err(RegistrationError::Verification(e)) => {
                assert_eq!(e.step(), RegistrationStep::AttestedCredentialData);
                assert_eq!(e.field(), "credentialPublicKey");
                assert_eq!(
                    e.cause(),
                    Some(&FailureCause::Parse(ParseError::UnsupportedKeyType(1)))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn credential_key_must_not_carry_private_scalar() {
        let f = Fixture::new();
        let cd = f.client_data();

        let mut key = f.key.cose_map();
        key.insert(CborValue::Integer(-4), CborValue::Bytes(vec![0x01; 32]));
        let key = serde_cbor_2::to_vec(&CborValue::Map(key)).unwrap();

        let ad = auth_data(RP_ID, 0x41, &CRED_ID, &key);
        let att = AttestationObject::decode(&attestation_object("none", BTreeMap::new(), &ad))
            .unwrap();

        assert_eq!(
            failed_step(f.verify(&cd, &att, false)),
            (RegistrationStep::AttestedCredentialData, "credentialPublicKey.d")
        );
    }

    #[test]
    fn custom_registry() {
        let f = Fixture::new();
        let cd = f.client_data();
        let att = f.packed(&cd, 0x41);

        // Without packed, the format is unknown.
        let registry = AttestationFormatRegistry::empty()
            .register(crate::attestation::NoneAttestation);
        let verifier = RegistrationVerifier::new(&registry, false);
        assert_eq!(
            verifier.verify(&cd, &att, &f.challenge, &f.rp),
            Err(RegistrationError::Parse(ParseError::UnsupportedFormat(
                "packed".to_string()
            )))
        );

        let verifier = RegistrationVerifier::new(AttestationFormatRegistry::builtin(), false);
        assert!(verifier.verify(&cd, &att, &f.challenge, &f.rp).is_ok());
    }

    #[test]
    fn localhost_none_fixture() {
        // rpIdHash of localhost, UP and AT, counter 0, zero aaguid, id 0x0001.
        let _ = tracing_subscriber::fmt::try_init();
        let cose = hex_literal::hex!(
            "A5 01 02 03 26 20 01"
            "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let mut ad = compute_sha256(b"localhost").to_vec();
        ad.extend_from_slice(&[0x41, 0, 0, 0, 0]);
        ad.extend_from_slice(&[0; 16]);
        ad.extend_from_slice(&[0, 2, 0, 1]);
        ad.extend_from_slice(&cose);

        let att = AttestationObject::decode(&attestation_object("none", BTreeMap::new(), &ad))
            .unwrap();
        let challenge = Challenge::new(vec![0x42; 16]);
        let cd = client_data_json("webauthn.create", &challenge, "http://localhost:8080");
        let rp = RelyingParty::new("localhost", "http://localhost:8080");

        let cred = verify_registration(&cd, &att, &challenge, &rp, false).unwrap();
        assert_eq!(cred.cred_id.as_slice(), [0x00, 0x01]);
        assert_eq!(cred.counter, 0);
        assert!(!cred.user_verified);
        assert_eq!(cred.attestation, AttestationTrust::None);
        assert_eq!(cred.public_key_cbor(), &cose[..]);
    }
}

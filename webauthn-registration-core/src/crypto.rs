//! Cryptographic operation wrapper for Webauthn registration. This module exists to
//! allow ease of auditing, safe operation wrappers for the parsers, and
//! cryptographic provider abstraction. This module uses OpenSSL as the
//! cryptographic primitive provider.

#![allow(non_camel_case_types)]

use crate::attestation::AttestationFailure;
use crate::constants::*;
use crate::error::{ParseError, ParseResult};
use crate::opaque::{ct_eq, OpaqueBytes};
use base64urlsafedata::Base64UrlSafeData;
use openssl::{bn, ec, error::ErrorStack, hash, nid, pkey, sha, sign, x509};
use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;
use std::convert::TryFrom;
use std::fmt;
use x509_parser::oid_registry::Oid;

/// An ECDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = ParseError;
    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(ParseError::InvalidCoseKey("crv")),
        }
    }
}

impl ECDSACurve {
    pub(crate) fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }

    fn from_openssl_nid(n: nid::Nid) -> Option<Self> {
        match n {
            nid::Nid::X9_62_PRIME256V1 => Some(ECDSACurve::SECP256R1),
            nid::Nid::SECP384R1 => Some(ECDSACurve::SECP384R1),
            nid::Nid::SECP521R1 => Some(ECDSACurve::SECP521R1),
            _ => None,
        }
    }

    /// The size in bytes of one affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }

    /// The algorithm used with this curve when a key does not declare one.
    pub(crate) fn implied_algorithm(self) -> COSEAlgorithm {
        match self {
            ECDSACurve::SECP256R1 => COSEAlgorithm::ES256,
            ECDSACurve::SECP384R1 => COSEAlgorithm::ES384,
            ECDSACurve::SECP521R1 => COSEAlgorithm::ES512,
        }
    }
}

/// A COSE signature algorithm identifier, indicating the hash that is used with
/// the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEAlgorithm {
    /// ECDSA with SHA-256, recommended with SECP256R1
    ES256 = -7,
    /// ECDSA with SHA-384, recommended with SECP384R1
    ES384 = -35,
    /// ECDSA with SHA-512, recommended with SECP521R1
    ES512 = -36,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = ParseError;
    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            _ => Err(ParseError::UnsupportedAlgorithm(i)),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(c: COSEAlgorithm) -> Self {
        c as i64
    }
}

impl COSEAlgorithm {
    pub(crate) fn message_digest(self) -> hash::MessageDigest {
        match self {
            COSEAlgorithm::ES256 => hash::MessageDigest::sha256(),
            COSEAlgorithm::ES384 => hash::MessageDigest::sha384(),
            COSEAlgorithm::ES512 => hash::MessageDigest::sha512(),
        }
    }
}

/// A COSE Elliptic Curve Public Key. This is generally the provided credential
/// that an authenticator registers, and is used to authenticate the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Base64UrlSafeData,
    /// The key's public Y coordinate.
    pub y: Base64UrlSafeData,
}

/// The type of Key contained within a COSE value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    //    +-----------+-------+-----------------------------------------------+
    //    | Name      | Value | Description                                   |
    //    +-----------+-------+-----------------------------------------------+
    //    | OKP       | 1     | Octet Key Pair                                |
    //    | EC2       | 2     | Elliptic Curve Keys w/ x- and y-coordinate    |
    //    |           |       | pair                                          |
    //    | Symmetric | 4     | Symmetric Keys                                |
    //    | Reserved  | 0     | This value is reserved                        |
    //    +-----------+-------+-----------------------------------------------+
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
}

/// The private scalar of an EC2 key. It is never serialised, and its Debug
/// output is redacted.
#[derive(Clone)]
struct PrivateScalar(Vec<u8>);

impl fmt::Debug for PrivateScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl PartialEq for PrivateScalar {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for PrivateScalar {}

/// A COSE Key as provided by the Authenticator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The algorithm the key declared with label 3, if any.
    pub alg: Option<COSEAlgorithm>,
    /// The public key
    pub key: COSEKeyType,
    /// The CBOR encoding of the public key.
    cbor: OpaqueBytes,
    #[serde(skip)]
    d: Option<PrivateScalar>,
}

impl TryFrom<&[u8]> for COSEKey {
    type Error = ParseError;

    /// Parse the CBOR encoding of a COSE key.
    fn try_from(cbor: &[u8]) -> Result<COSEKey, Self::Error> {
        let value: Value = serde_cbor_2::from_slice(cbor).map_err(|e| {
            if e.is_eof() {
                ParseError::Truncated
            } else {
                debug!(?e, "invalid COSE key cbor");
                ParseError::InvalidCoseKey("cbor")
            }
        })?;
        COSEKey::from_value(&value, cbor)
    }
}

fn cose_label(i: i128) -> Value {
    Value::Integer(i)
}

impl COSEKey {
    // See also https://tools.ietf.org/html/rfc8152#section-7 and section 13.1.1
    // These values look like:
    // Map({
    //     Integer(1): Integer(2),   // kty: EC2
    //     Integer(3): Integer(-7),  // alg: ES256, optional
    //     Integer(-1): Integer(1),  // crv: P-256
    //     Integer(-2): Bytes([..]), // x
    //     Integer(-3): Bytes([..]), // y
    // })
    fn from_value(value: &Value, raw: &[u8]) -> ParseResult<COSEKey> {
        let m = cbor_try_map!(value, ParseError::InvalidCoseKey("map"))?;

        let key_type_value = m
            .get(&cose_label(COSE_LABEL_KTY))
            .ok_or(ParseError::InvalidCoseKey("kty"))?;
        let key_type = cbor_try_i128!(key_type_value, ParseError::InvalidCoseKey("kty"))?;

        if key_type != COSE_KTY_EC2 {
            debug!(?key_type, "unsupported COSE key type");
            return Err(ParseError::UnsupportedKeyType(key_type));
        }

        let alg = m
            .get(&cose_label(COSE_LABEL_ALG))
            .map(|v| {
                cbor_try_i128!(v, ParseError::InvalidCoseKey("alg")).and_then(COSEAlgorithm::try_from)
            })
            .transpose()?;

        // This is an EC2 key consisting of crv, x, y, which are stored in
        // crv (-1), x (-2) and y (-3)
        let curve_value = m
            .get(&cose_label(COSE_LABEL_CRV))
            .ok_or(ParseError::InvalidCoseKey("crv"))?;
        let curve = cbor_try_i128!(curve_value, ParseError::InvalidCoseKey("crv"))
            .and_then(ECDSACurve::try_from)?;

        let x_value = m
            .get(&cose_label(COSE_LABEL_X))
            .ok_or(ParseError::InvalidCoseKey("x"))?;
        let x = cbor_try_bytes!(x_value, ParseError::InvalidCoseKey("x"))?;

        let y_value = m
            .get(&cose_label(COSE_LABEL_Y))
            .ok_or(ParseError::InvalidCoseKey("y"))?;
        let y = cbor_try_bytes!(y_value, ParseError::InvalidCoseKey("y"))?;

        let coord_len = curve.coordinate_size();
        if x.len() != coord_len {
            return Err(ParseError::InvalidCoseKey("x"));
        }
        if y.len() != coord_len {
            return Err(ParseError::InvalidCoseKey("y"));
        }

        let d = m
            .get(&cose_label(COSE_LABEL_D))
            .map(|v| {
                cbor_try_bytes!(v, ParseError::InvalidCoseKey("d"))
                    .map(|d| PrivateScalar(d.clone()))
            })
            .transpose()?;

        // The exposed encoding must never carry the private scalar.
        let cbor = if d.is_some() {
            let mut public = m.clone();
            public.remove(&cose_label(COSE_LABEL_D));
            serde_cbor_2::to_vec(&Value::Map(public))
                .map_err(|_| ParseError::InvalidCoseKey("cbor"))?
        } else {
            raw.to_vec()
        };

        let cose_key = COSEKey {
            alg,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve,
                x: x.clone().into(),
                y: y.clone().into(),
            }),
            cbor: cbor.into(),
            d,
        };

        // The rfc additionally states:
        //   "   Applications MUST check that the curve and the key type are
        //     consistent and reject a key if they are not."
        // this means feeding the values to openssl to validate them for us!
        cose_key.validate()?;
        Ok(cose_key)
    }

    /// The signature algorithm of this key, either declared or implied by the curve.
    pub fn algorithm(&self) -> COSEAlgorithm {
        match (&self.alg, &self.key) {
            (Some(alg), _) => *alg,
            (None, COSEKeyType::EC_EC2(ec2k)) => ec2k.curve.implied_algorithm(),
        }
    }

    /// The CBOR encoding of the public key. This is the authenticator's
    /// encoding byte for byte, unless that carried a private scalar, in which
    /// case it is a re-encoding without it.
    pub fn public_key_cbor(&self) -> &[u8] {
        self.cbor.as_slice()
    }

    /// True if the authenticator supplied a private scalar (label -4).
    pub fn has_private_component(&self) -> bool {
        self.d.is_some()
    }

    /// Let publicKeyU2F be the concatenation 0x04 || x || y.
    /// Note: This signifies uncompressed ECC key format.
    pub fn to_x962_raw(&self) -> Vec<u8> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => std::iter::once(0x04)
                .chain(ecpk.x.as_ref().iter().copied())
                .chain(ecpk.y.as_ref().iter().copied())
                .collect(),
        }
    }

    /// The curve of this key.
    pub fn curve(&self) -> ECDSACurve {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => ec2k.curve,
        }
    }

    fn validate(&self) -> ParseResult<()> {
        self.get_openssl_pkey().map(|_| ()).map_err(|e| {
            debug!(?e, "COSE key point is not valid for its curve");
            ParseError::InvalidCoseKey("point")
        })
    }

    fn get_openssl_pkey(&self) -> Result<pkey::PKey<pkey::Public>, ErrorStack> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let ec_group = ec::EcGroup::from_curve_name(ec2k.curve.to_openssl_nid())?;

                let xbn = bn::BigNum::from_slice(ec2k.x.as_ref())?;
                let ybn = bn::BigNum::from_slice(ec2k.y.as_ref())?;

                let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)?;

                // Validate the key is sound. This checks the point is on the
                // curve as specified.
                ec_key.check_key()?;

                pkey::PKey::from_ec_key(ec_key)
            }
        }
    }

    /// Verify that `signature` (ASN.1 DER ECDSA) is a signature over `message` by
    /// this key, using the digest of the key's algorithm. Malformed signatures
    /// do not verify.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let result = self.get_openssl_pkey().and_then(|pkey| {
            let mut verifier = sign::Verifier::new(self.algorithm().message_digest(), &pkey)?;
            verifier.update(message)?;
            verifier.verify(signature)
        });

        match result {
            Ok(valid) => valid,
            Err(e) => {
                debug!(?e, "signature could not be verified");
                false
            }
        }
    }
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    sha::sha256(data)
}

/// Parse a DER encoded X509 certificate from an attestation statement.
pub(crate) fn x509_from_der(der: &[u8]) -> Result<x509::X509, AttestationFailure> {
    x509::X509::from_der(der).map_err(|e| {
        debug!(?e, "invalid x509 certificate");
        AttestationFailure::X5CInvalid
    })
}

/// Validate an x509 signature is valid for the supplied data.
pub(crate) fn verify_x509_signature(
    alg: COSEAlgorithm,
    pubk: &x509::X509,
    signature: &[u8],
    verification_data: &[u8],
) -> Result<bool, AttestationFailure> {
    let result = pubk.public_key().and_then(|pkey| {
        let mut verifier = sign::Verifier::new(alg.message_digest(), &pkey)?;
        verifier.update(verification_data)?;
        verifier.verify(signature)
    });

    result.or_else(|e| {
        error!(?e, "x509 signature verification error");
        Ok(false)
    })
}

/// The curve of the certificate's EC public key. None if the certificate holds a key
/// of another type, or on a curve we do not support.
pub(crate) fn x509_ec_curve(pubk: &x509::X509) -> Result<Option<ECDSACurve>, AttestationFailure> {
    let pk = pubk
        .public_key()
        .map_err(|_| AttestationFailure::CertificatePublicKeyInvalid)?;

    // Not an EC key at all.
    let ec_key = match pk.ec_key() {
        Ok(k) => k,
        Err(_) => return Ok(None),
    };

    ec_key
        .check_key()
        .map_err(|_| AttestationFailure::CertificatePublicKeyInvalid)?;

    Ok(ec_key
        .group()
        .curve_name()
        .and_then(ECDSACurve::from_openssl_nid))
}

// id-fido-gen-ce-aaguid
const FIDO_GEN_CE_AAGUID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
/// (id-fido-gen-ce-aaguid) verify that the value of this extension matches the aaguid
/// in authenticatorData. The extension is optional.
pub(crate) fn assert_fido_gen_ce_aaguid(
    pubk: &x509::X509,
    aaguid: &[u8; 16],
) -> Result<(), AttestationFailure> {
    let der_bytes = pubk
        .to_der()
        .map_err(|_| AttestationFailure::X5CInvalid)?;
    let (_, cert) = x509_parser::parse_x509_certificate(&der_bytes).map_err(|e| {
        debug!(?e, "x509-parser rejected the attestation certificate");
        AttestationFailure::X5CInvalid
    })?;

    let extension = match cert
        .extensions()
        .iter()
        .find(|extension| extension.oid == FIDO_GEN_CE_AAGUID)
    {
        Some(extension) => extension,
        None => return Ok(()),
    };

    // The extension value is an OCTET STRING holding the 16 byte AAGUID.
    let (_, value) = der_parser::der::parse_der_octetstring(extension.value)
        .map_err(|_| AttestationFailure::X5CInvalid)?;
    let value = value
        .as_slice()
        .map_err(|_| AttestationFailure::X5CInvalid)?;

    if value == aaguid {
        Ok(())
    } else {
        debug!("attestation certificate aaguid does not match the authenticator data");
        Err(AttestationFailure::CertificateAaguidMismatch)
    }
}

/// Verify that attestnCert meets the requirements in § 8.2.1 Packed Attestation
/// Statement Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(pubk: &x509::X509) -> Result<(), AttestationFailure> {
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if pubk.version() != 2 {
        return Err(AttestationFailure::CertificateRequirementsNotMet);
    }

    // Subject-C, Subject-O and Subject-CN must be present, and Subject-OU must be
    // the literal string "Authenticator Attestation".
    let subject = pubk.subject_name();
    let has = |n: nid::Nid| subject.entries_by_nid(n).next().is_some();

    if !(has(nid::Nid::COUNTRYNAME) && has(nid::Nid::ORGANIZATIONNAME) && has(nid::Nid::COMMONNAME))
    {
        return Err(AttestationFailure::CertificateRequirementsNotMet);
    }

    let ou_valid = subject
        .entries_by_nid(nid::Nid::ORGANIZATIONALUNITNAME)
        .next()
        .and_then(|ou| ou.data().as_utf8().ok())
        .map(|ou| ou.to_string() == "Authenticator Attestation")
        .unwrap_or(false);

    if !ou_valid {
        return Err(AttestationFailure::CertificateRequirementsNotMet);
    }

    Ok(())
}

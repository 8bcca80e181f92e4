//! Fixture builders shared by the unit tests.

use crate::crypto::{compute_sha256, ECDSACurve};
use crate::opaque::Challenge;
use openssl::{asn1, bn, ec, hash, pkey, sign, x509};
use serde_cbor_2::Value;
use std::collections::BTreeMap;

pub(crate) const TEST_AAGUID: [u8; 16] = [
    0xcb, 0x69, 0x48, 0x1e, 0x8f, 0xf7, 0x40, 0x39, 0x93, 0xec, 0x0a, 0x27, 0x29, 0xa1, 0x54, 0xa8,
];

pub(crate) struct TestKey {
    pub(crate) curve: ECDSACurve,
    pub(crate) pkey: pkey::PKey<pkey::Private>,
    pub(crate) x: Vec<u8>,
    pub(crate) y: Vec<u8>,
}

impl TestKey {
    pub(crate) fn generate(curve: ECDSACurve) -> Self {
        let group = ec::EcGroup::from_curve_name(curve.to_openssl_nid()).unwrap();
        let ec_key = ec::EcKey::generate(&group).unwrap();

        let mut ctx = bn::BigNumContext::new().unwrap();
        let mut x = bn::BigNum::new().unwrap();
        let mut y = bn::BigNum::new().unwrap();
        ec_key
            .public_key()
            .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)
            .unwrap();

        let size = curve.coordinate_size() as i32;
        TestKey {
            curve,
            x: x.to_vec_padded(size).unwrap(),
            y: y.to_vec_padded(size).unwrap(),
            pkey: pkey::PKey::from_ec_key(ec_key).unwrap(),
        }
    }

    pub(crate) fn cose_map(&self) -> BTreeMap<Value, Value> {
        let mut m = BTreeMap::new();
        m.insert(Value::Integer(1), Value::Integer(2));
        m.insert(
            Value::Integer(3),
            Value::Integer(i64::from(self.curve.implied_algorithm()) as i128),
        );
        m.insert(Value::Integer(-1), Value::Integer(self.curve as i128));
        m.insert(Value::Integer(-2), Value::Bytes(self.x.clone()));
        m.insert(Value::Integer(-3), Value::Bytes(self.y.clone()));
        m
    }

    pub(crate) fn cose_cbor(&self) -> Vec<u8> {
        serde_cbor_2::to_vec(&Value::Map(self.cose_map())).unwrap()
    }

    pub(crate) fn digest(&self) -> hash::MessageDigest {
        self.curve.implied_algorithm().message_digest()
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = sign::Signer::new(self.digest(), &self.pkey).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    /// A self signed certificate over this key with the given subject OU.
    pub(crate) fn certificate(&self, ou: &str) -> x509::X509 {
        self_signed_certificate(&self.pkey, self.digest(), ou, None)
    }
}

/// A self signed packed attestation certificate. With `aaguid`, it carries the
/// id-fido-gen-ce-aaguid extension.
pub(crate) fn self_signed_certificate(
    pkey: &pkey::PKeyRef<pkey::Private>,
    digest: hash::MessageDigest,
    ou: &str,
    aaguid: Option<&[u8; 16]>,
) -> x509::X509 {
    let mut name = x509::X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "AU").unwrap();
    name.append_entry_by_text("O", "Test Authenticator Vendor").unwrap();
    name.append_entry_by_text("OU", ou).unwrap();
    name.append_entry_by_text("CN", "Test Attestation Cert").unwrap();
    let name = name.build();

    let serial = bn::BigNum::from_u32(1)
        .and_then(|bn| bn.to_asn1_integer())
        .unwrap();

    let mut builder = x509::X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(pkey).unwrap();
    builder
        .set_not_before(&asn1::Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&asn1::Asn1Time::days_from_now(365).unwrap())
        .unwrap();

    if let Some(aaguid) = aaguid {
        // OCTET STRING { aaguid }
        let mut value = vec![0x04, 0x10];
        value.extend_from_slice(aaguid);
        let oid = asn1::Asn1Object::from_str("1.3.6.1.4.1.45724.1.1.4").unwrap();
        let value = asn1::Asn1OctetString::new_from_bytes(&value).unwrap();
        let extension = x509::X509Extension::new_from_der(&oid, false, &value).unwrap();
        builder.append_extension(extension).unwrap();
    }

    builder.sign(pkey, digest).unwrap();
    builder.build()
}

/// Authenticator data with attested credential data for `rp_id`.
pub(crate) fn auth_data(rp_id: &str, flags: u8, cred_id: &[u8], cose: &[u8]) -> Vec<u8> {
    let mut data = compute_sha256(rp_id.as_bytes()).to_vec();
    data.push(flags);
    data.extend_from_slice(&7u32.to_be_bytes());
    data.extend_from_slice(&TEST_AAGUID);
    data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
    data.extend_from_slice(cred_id);
    data.extend_from_slice(cose);
    data
}

pub(crate) fn attestation_object(
    fmt: &str,
    att_stmt: BTreeMap<Value, Value>,
    auth_data: &[u8],
) -> Vec<u8> {
    let mut m = BTreeMap::new();
    m.insert(Value::Text("fmt".to_string()), Value::Text(fmt.to_string()));
    m.insert(Value::Text("attStmt".to_string()), Value::Map(att_stmt));
    m.insert(
        Value::Text("authData".to_string()),
        Value::Bytes(auth_data.to_vec()),
    );
    serde_cbor_2::to_vec(&Value::Map(m)).unwrap()
}

pub(crate) fn client_data_json(type_: &str, challenge: &Challenge, origin: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": type_,
        "challenge": challenge.to_base64url(),
        "origin": origin,
        "crossOrigin": false,
    }))
    .unwrap()
}

pub(crate) fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

//! The authenticator data structure.
//! <https://w3c.github.io/webauthn/#sctn-authenticator-data>
//!
//! ```text
//! [ rpIdHash (32) | flags (1) | signCount (4, BE) | attestedCredentialData (var) ]
//!
//! attestedCredentialData:
//! [ aaguid (16) | credIdLen (2, BE) | credentialId (credIdLen) | credentialPublicKey (CBOR) ]
//! ```

use crate::constants::*;
use crate::crypto::COSEKey;
use crate::error::{ParseError, ParseResult};
use crate::opaque::OpaqueBytes;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u8};
use serde::Deserialize;
use serde_cbor_2::Value;
use std::convert::TryFrom;
use uuid::Uuid;

/// Attested Credential Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    aaguid: [u8; AAGUID_LEN],
    credential_id: OpaqueBytes,
    credential_pk: OpaqueBytes,
}

impl AttestedCredentialData {
    /// The guid of the authenticator. May indicate manufacturer.
    pub fn aaguid(&self) -> Uuid {
        Uuid::from_bytes(self.aaguid)
    }

    /// The credential id.
    pub fn credential_id(&self) -> &OpaqueBytes {
        &self.credential_id
    }

    /// The credential public key exactly as the authenticator encoded it.
    pub fn credential_public_key_cbor(&self) -> &OpaqueBytes {
        &self.credential_pk
    }

    /// Parse the embedded COSE credential public key.
    pub fn credential_public_key(&self) -> ParseResult<COSEKey> {
        COSEKey::try_from(self.credential_pk.as_slice())
    }
}

/// Data returned by the authenticator during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    raw: OpaqueBytes,
    rp_id_hash: OpaqueBytes,
    flags: u8,
    counter: u32,
    acd: Option<AttestedCredentialData>,
}

fn header_parser(i: &[u8]) -> nom::IResult<&[u8], (&[u8], u8, u32)> {
    let (i, rp_id_hash) = take(RP_ID_HASH_LEN)(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, counter) = be_u32(i)?;
    Ok((i, (rp_id_hash, flags, counter)))
}

fn acd_header_parser(i: &[u8]) -> nom::IResult<&[u8], (&[u8], &[u8])> {
    let (i, aaguid) = take(AAGUID_LEN)(i)?;
    let (i, cred_id_len) = be_u16(i)?;
    let (i, cred_id) = take(cred_id_len as usize)(i)?;
    Ok((i, (aaguid, cred_id)))
}

/// The length of the single CBOR item at the start of `i`. The COSE key has no
/// length prefix, so this is the only way to find where it ends.
fn cbor_item_len(i: &[u8]) -> ParseResult<usize> {
    if i.is_empty() {
        return Err(ParseError::Truncated);
    }

    let mut de = serde_cbor_2::Deserializer::from_slice(i);
    Value::deserialize(&mut de).map_err(|e| {
        if e.is_eof() {
            ParseError::Truncated
        } else {
            debug!(?e, "invalid credential public key cbor");
            ParseError::InvalidCoseKey("cbor")
        }
    })?;
    Ok(de.byte_offset())
}

fn parse_acd(i: &[u8]) -> ParseResult<(&[u8], AttestedCredentialData)> {
    if i.len() < ACD_MIN_LEN {
        return Err(ParseError::Truncated);
    }

    let (i, (aaguid, cred_id)) = acd_header_parser(i).map_err(|_| ParseError::Truncated)?;
    let aaguid = <[u8; AAGUID_LEN]>::try_from(aaguid).map_err(|_| ParseError::Truncated)?;

    let key_len = cbor_item_len(i)?;
    let (cred_pk, i) = i.split_at(key_len);

    Ok((
        i,
        AttestedCredentialData {
            aaguid,
            credential_id: cred_id.into(),
            credential_pk: cred_pk.into(),
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = ParseError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        AuthenticatorData::parse(data)
    }
}

impl AuthenticatorData {
    /// Parse authenticator data from its wire form. Every length is checked
    /// before it is used.
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        if data.len() < AUTH_DATA_MIN_LEN {
            trace!(len = data.len(), "authenticator data too short");
            return Err(ParseError::Truncated);
        }

        let (rest, (rp_id_hash, flags, counter)) =
            header_parser(data).map_err(|_| ParseError::Truncated)?;

        let (rest, acd) = if flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
            let (rest, acd) = parse_acd(rest)?;
            (rest, Some(acd))
        } else {
            (rest, None)
        };

        // Extensions follow the attested credential data on the wire. They are
        // never processed.
        if flags & FLAG_EXTENSION_DATA != 0 {
            debug!("authenticator data carries extensions");
            return Err(ParseError::UnsupportedExtension);
        }

        if !rest.is_empty() {
            debug!(trailing = rest.len(), "unexpected bytes after authenticator data");
            return Err(ParseError::TrailingData);
        }

        Ok(AuthenticatorData {
            raw: data.into(),
            rp_id_hash: rp_id_hash.into(),
            flags,
            counter,
            acd,
        })
    }

    /// The bytes this was parsed from. Attestation signatures are made over these.
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_slice()
    }

    /// Hash of the relying party id.
    pub fn rp_id_hash(&self) -> &OpaqueBytes {
        &self.rp_id_hash
    }

    /// The raw flag byte.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Flag if the user was present.
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    /// Flag if the user verified to the device. Implies presence.
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// The signature counter.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// The attested credential data, present only when the AT flag was set.
    pub fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.acd.as_ref()
    }
}

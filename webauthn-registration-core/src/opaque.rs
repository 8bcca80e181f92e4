//! Immutable byte values, and the server issued [`Challenge`].
//!
//! Every comparison of a value that an attacker may try to guess byte by byte
//! (the challenge, the origin, the rp id hash) goes through [`ct_eq`], which
//! does not short circuit on the first differing byte.

use base64urlsafedata::{decode_url_safe, encode_url_safe, Base64UrlSafeData};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Compare two byte slices in time that depends only on their lengths.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    // The slice impl checks the lengths first, which are not secret.
    a.ct_eq(b).into()
}

/// An immutable sequence of bytes with no meaning imposed on it. Equality is
/// constant time.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Base64UrlSafeData", into = "Base64UrlSafeData")]
pub struct OpaqueBytes(Vec<u8>);

impl OpaqueBytes {
    /// Wrap a byte vector.
    pub fn new(bytes: Vec<u8>) -> Self {
        OpaqueBytes(bytes)
    }

    /// View the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// The number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for OpaqueBytes {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for OpaqueBytes {}

impl PartialEq<[u8]> for OpaqueBytes {
    fn eq(&self, other: &[u8]) -> bool {
        ct_eq(&self.0, other)
    }
}

impl fmt::Debug for OpaqueBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueBytes({})", encode_url_safe(&self.0))
    }
}

impl AsRef<[u8]> for OpaqueBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for OpaqueBytes {
    fn from(v: Vec<u8>) -> Self {
        OpaqueBytes(v)
    }
}

impl From<&[u8]> for OpaqueBytes {
    fn from(v: &[u8]) -> Self {
        OpaqueBytes(v.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for OpaqueBytes {
    fn from(v: [u8; N]) -> Self {
        OpaqueBytes(v.to_vec())
    }
}

impl From<Base64UrlSafeData> for OpaqueBytes {
    fn from(v: Base64UrlSafeData) -> Self {
        OpaqueBytes(v.into())
    }
}

impl From<OpaqueBytes> for Base64UrlSafeData {
    fn from(v: OpaqueBytes) -> Self {
        Base64UrlSafeData(v.0)
    }
}

/// A server issued anti replay nonce for one registration ceremony.
///
/// Generating, storing and expiring challenges is the caller's job. This crate
/// only reads the challenge, and the caller must invalidate it once a
/// verification attempt has consumed it, whatever the outcome.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(OpaqueBytes);

impl Challenge {
    /// Create a challenge from the bytes that were sent to the client.
    pub fn new(bytes: Vec<u8>) -> Self {
        Challenge(OpaqueBytes::new(bytes))
    }

    /// Parse the URL-safe unpadded Base64 form a client echoes back.
    pub fn from_base64url(s: &str) -> Option<Self> {
        decode_url_safe(s).ok().map(Challenge::new)
    }

    /// The raw challenge bytes.
    pub fn bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// The challenge as it appears in `clientDataJSON.challenge`.
    pub fn to_base64url(&self) -> String {
        encode_url_safe(self.bytes())
    }

    /// Constant time comparison against the `challenge` member of the client data.
    pub fn matches_client_challenge(&self, client_challenge: &str) -> bool {
        ct_eq(self.to_base64url().as_bytes(), client_challenge.as_bytes())
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", self.to_base64url())
    }
}

impl From<Vec<u8>> for Challenge {
    fn from(v: Vec<u8>) -> Self {
        Challenge::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ct_eq_independent_of_mismatch_position() {
        let base = [0x5au8; 32];
        assert!(ct_eq(&base, &base));
        for pos in 0..base.len() {
            let mut other = base;
            other[pos] ^= 0x01;
            assert!(!ct_eq(&base, &other));
        }
        assert!(!ct_eq(&base, &base[..31]));
        assert!(ct_eq(&[], &[]));
    }

    #[test]
    fn opaque_bytes_equality() {
        let a = OpaqueBytes::from(vec![1, 2, 3]);
        assert_eq!(a, OpaqueBytes::from([1u8, 2, 3]));
        assert_ne!(a, OpaqueBytes::from(vec![1, 2]));
        assert!(a == *[1u8, 2, 3].as_slice());
    }

    #[test]
    fn opaque_bytes_serde() {
        let a = OpaqueBytes::from(vec![0x00, 0x01, 0x02, 0xff]);
        let s = serde_json::to_string(&a).unwrap();
        assert_eq!(s, "\"AAEC_w\"");
        let b: OpaqueBytes = serde_json::from_str(&s).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn challenge_base64url_round_trip() {
        for len in 0..=64usize {
            let bytes: Vec<u8> = (0..len).map(|i| (i as u8) ^ 0xa5).collect();
            let chal = Challenge::new(bytes.clone());
            let encoded = chal.to_base64url();
            let decoded = Challenge::from_base64url(&encoded).unwrap();
            assert_eq!(decoded.bytes(), bytes.as_slice());
            assert!(chal.matches_client_challenge(&encoded));
        }
    }

    #[test]
    fn challenge_rejects_modified_text() {
        let chal = Challenge::new(vec![0; 32]);
        let mut encoded = chal.to_base64url();
        assert_eq!(encoded, "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        encoded.push('=');
        assert!(!chal.matches_client_challenge(&encoded));
    }
}

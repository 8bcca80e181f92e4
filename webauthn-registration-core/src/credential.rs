//! The credential a successful registration produces.

use crate::attestation::AttestationTrust;
use crate::crypto::COSEKey;
use crate::opaque::OpaqueBytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A credential id, as chosen by the authenticator.
pub type CredentialID = OpaqueBytes;

/// A user's authenticator credential. It contains an id, the public key
/// and a counter of how many times the authenticator has been used.
///
/// This is the value the caller persists against the user account. It is only
/// ever created by a registration ceremony that passed every step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The ID of this credential.
    pub cred_id: CredentialID,
    /// The public key of this credential
    pub cred: COSEKey,
    /// The counter for this credential
    pub counter: u32,
    /// If the user was verified when this credential was registered.
    pub user_verified: bool,
    /// The model of the authenticator that holds this credential.
    pub aaguid: Uuid,
    /// What the attestation statement proved. Trust policy over it is the caller's.
    pub attestation: AttestationTrust,
    /// The attestation statement format, such as `"packed"`.
    pub attestation_format: String,
}

impl Credential {
    /// The COSE encoding of the public key, as the authenticator supplied it.
    pub fn public_key_cbor(&self) -> &[u8] {
        self.cred.public_key_cbor()
    }
}

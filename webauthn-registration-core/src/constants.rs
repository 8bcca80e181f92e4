// Authenticator data layout.
// https://w3c.github.io/webauthn/#sctn-authenticator-data
pub(crate) const RP_ID_HASH_LEN: usize = 32;
pub(crate) const AUTH_DATA_MIN_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
pub(crate) const AAGUID_LEN: usize = 16;
// aaguid + 2 byte credential id length
pub(crate) const ACD_MIN_LEN: usize = AAGUID_LEN + 2;

// flags:   [ ED | AT | 0 | 0 | 0 | UV | 0 | UP ]
//            7    6                2        0
pub(crate) const FLAG_USER_PRESENT: u8 = 1 << 0;
pub(crate) const FLAG_USER_VERIFIED: u8 = 1 << 2;
pub(crate) const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 1 << 6;
pub(crate) const FLAG_EXTENSION_DATA: u8 = 1 << 7;

// COSE key map labels, RFC 8152 §7 and §13.1.1
pub(crate) const COSE_LABEL_KTY: i128 = 1;
pub(crate) const COSE_LABEL_ALG: i128 = 3;
pub(crate) const COSE_LABEL_CRV: i128 = -1;
pub(crate) const COSE_LABEL_X: i128 = -2;
pub(crate) const COSE_LABEL_Y: i128 = -3;
pub(crate) const COSE_LABEL_D: i128 = -4;

// COSE key type EC2, RFC 8152 §13
pub(crate) const COSE_KTY_EC2: i128 = 2;

pub(crate) const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";

//! Key derivation: `KDF(salt, label, context) -> fixed-length secret`,
//! implemented as HKDF-SHA256 extract-then-expand, plus the keyed MAC used
//! in M3/M4.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Length of a session id, master key, or directional message key, in bytes.
pub const SECRET_LEN: usize = 32;
/// Length of the MAC tag used in M3/M4, in bytes.
pub const MAC_LEN: usize = 32;

pub const SESSION_ID_LABEL: &[u8] = b"secure session unique identifier";
pub const MASTER_KEY_LABEL: &[u8] = b"secure session master key";
const CLIENT_TO_SERVER_LABEL: &[u8] = b"client to server key";
const SERVER_TO_CLIENT_LABEL: &[u8] = b"server to client key";

/// `KDF(salt, label, context) -> out`. `salt` may be empty, matching the
/// session-id derivation's `salt=∅`.
pub fn derive(salt: &[u8], label: &[u8], context: &[u8], out: &mut [u8; SECRET_LEN]) -> Result<()> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, context);
    hk.expand(label, out)?;
    Ok(())
}

/// Per-direction transport keys, deterministic functions of the master key
/// and the fixed client/server roles.
pub struct DirectionalKeys {
    pub client_to_server: [u8; SECRET_LEN],
    pub server_to_client: [u8; SECRET_LEN],
}

pub fn derive_directional_keys(master_key: &[u8; SECRET_LEN]) -> Result<DirectionalKeys> {
    let mut client_to_server = [0u8; SECRET_LEN];
    let mut server_to_client = [0u8; SECRET_LEN];
    derive(master_key, CLIENT_TO_SERVER_LABEL, b"", &mut client_to_server)?;
    derive(master_key, SERVER_TO_CLIENT_LABEL, b"", &mut server_to_client)?;
    Ok(DirectionalKeys {
        client_to_server,
        server_to_client,
    })
}

type HmacSha256 = Hmac<Sha256>;

/// Computes `MAC_K(fragments)` under the session master key.
pub fn mac(master_key: &[u8; SECRET_LEN], fragments: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(master_key).expect("HMAC accepts any key length");
    mac.update(fragments);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&tag);
    out
}

/// Verifies `MAC_K(fragments)` against `expected` in constant time.
pub fn verify_mac(master_key: &[u8; SECRET_LEN], fragments: &[u8], expected: &[u8]) -> Result<()> {
    if expected.len() != MAC_LEN {
        return Err(Error::InvalidParameter);
    }
    let computed = mac(master_key, fragments);
    if computed.ct_eq(expected).into() {
        Ok(())
    } else {
        Err(Error::InvalidParameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let mut a = [0u8; SECRET_LEN];
        let mut b = [0u8; SECRET_LEN];
        derive(b"salt", b"label", b"context", &mut a).unwrap();
        derive(b"salt", b"label", b"context", &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_with_empty_salt_differs_from_nonempty() {
        let mut a = [0u8; SECRET_LEN];
        let mut b = [0u8; SECRET_LEN];
        derive(b"", b"label", b"context", &mut a).unwrap();
        derive(b"salt", b"label", b"context", &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn mac_round_trip() {
        let key = [7u8; SECRET_LEN];
        let tag = mac(&key, b"some fragments");
        verify_mac(&key, b"some fragments", &tag).unwrap();
    }

    #[test]
    fn mac_rejects_tampered_fragments() {
        let key = [7u8; SECRET_LEN];
        let tag = mac(&key, b"some fragments");
        assert!(verify_mac(&key, b"other fragments", &tag).is_err());
    }
}

//! Wire encode/decode for M1–M4 and the shared signing/MAC fragment rule.
//!
//! Every signer signs `(own_ecdh, peer_ecdh, own_id, peer_id)`, truncated to
//! just `own_ecdh` for M1, where the signer doesn't yet know the peer's
//! identity. This asymmetry is intentional, not tightened to a uniform
//! 4-tuple. A verifier reconstructs the identical bytes
//! by swapping which side it calls "own" and "peer". All fragments are raw
//! field bytes (SEC1 points, identity bytes); container framing never
//! leaks into a signed or MAC'd transcript (see DESIGN.md).

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey as EcdhPublicKey;

use crate::container::{self, EC_PUB_KEY_TAG, PROTO_TAG, SESSION_ID_TAG};
use crate::error::{Error, Result};
use crate::kdf::MAC_LEN;
use crate::transcript::Fragments;

/// Length of an uncompressed SEC1-encoded P-256 point: `0x04 || X || Y`.
pub const ECDH_PUB_LEN: usize = 65;
/// Length of a fixed-size (r||s) P-256 ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

pub fn ecdh_public_bytes(key: &EcdhPublicKey) -> [u8; ECDH_PUB_LEN] {
    let encoded = key.to_encoded_point(false);
    let mut out = [0u8; ECDH_PUB_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn sign(key: &SigningKey, fragments: &[u8]) -> [u8; SIGNATURE_LEN] {
    let sig: Signature = key.sign(fragments);
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(sig.to_bytes().as_slice());
    out
}

fn verify(key: &VerifyingKey, fragments: &[u8], sig_bytes: &[u8]) -> Result<()> {
    let sig = Signature::try_from(sig_bytes).map_err(|_| Error::InvalidParameter)?;
    key.verify(fragments, &sig).map_err(|_| Error::InvalidParameter)
}

/// `(own_ecdh, peer_ecdh, own_id, peer_id)`, concatenated in that order.
fn auth_fragments<'a>(
    own_ecdh: &'a [u8],
    peer_ecdh: &'a [u8],
    own_id: &'a [u8],
    peer_id: &'a [u8],
) -> Vec<u8> {
    Fragments::new()
        .push(own_ecdh)
        .push(peer_ecdh)
        .push(own_id)
        .push(peer_id)
        .concat()
}

fn ec_pub_container(raw: &[u8; ECDH_PUB_LEN]) -> Vec<u8> {
    container::build(EC_PUB_KEY_TAG, raw)
}

fn parse_ec_pub_container<'a>(buf: &'a [u8]) -> Result<(&'a [u8], usize)> {
    let (payload, consumed) = container::parse(buf, &EC_PUB_KEY_TAG)?;
    if payload.len() != ECDH_PUB_LEN {
        return Err(Error::InvalidParameter);
    }
    Ok((payload, consumed))
}

/// M1: `Container(ID, client_id) ++ Container(ECPK, client_ecdh) ++ sig_client(client_ecdh)`.
pub fn build_m1(client_id: &[u8], client_ecdh: &[u8; ECDH_PUB_LEN], signing_key: &SigningKey) -> Vec<u8> {
    let id_container = container::build(SESSION_ID_TAG, client_id);
    let ecdh_container = ec_pub_container(client_ecdh);
    let sig = sign(signing_key, client_ecdh);

    let mut payload = Vec::with_capacity(id_container.len() + ecdh_container.len() + SIGNATURE_LEN);
    payload.extend_from_slice(&id_container);
    payload.extend_from_slice(&ecdh_container);
    payload.extend_from_slice(&sig);

    container::build(PROTO_TAG, &payload)
}

pub struct ParsedM1 {
    pub client_id: Vec<u8>,
    pub client_ecdh: [u8; ECDH_PUB_LEN],
    pub signature: Vec<u8>,
}

pub fn parse_m1(frame: &[u8]) -> Result<ParsedM1> {
    let (payload, _) = container::parse(frame, &PROTO_TAG)?;

    let (client_id, id_consumed) = container::parse(payload, &SESSION_ID_TAG)?;
    let rest = &payload[id_consumed..];
    let (client_ecdh, ecdh_consumed) = parse_ec_pub_container(rest)?;
    let sig = &rest[ecdh_consumed..];
    if sig.len() != SIGNATURE_LEN {
        return Err(Error::InvalidParameter);
    }

    let mut ecdh = [0u8; ECDH_PUB_LEN];
    ecdh.copy_from_slice(client_ecdh);

    Ok(ParsedM1 {
        client_id: client_id.to_vec(),
        client_ecdh: ecdh,
        signature: sig.to_vec(),
    })
}

/// Verifies M1's signature: covers `client_ecdh` alone.
pub fn verify_m1_signature(parsed: &ParsedM1, client_sign_key: &VerifyingKey) -> Result<()> {
    verify(client_sign_key, &parsed.client_ecdh, &parsed.signature)
}

/// M2: `Container(ID, server_id) ++ Container(ECPK, server_ecdh) ++ sig_server(server_ecdh, client_ecdh, server_id, client_id)`.
pub fn build_m2(
    server_id: &[u8],
    server_ecdh: &[u8; ECDH_PUB_LEN],
    client_ecdh: &[u8; ECDH_PUB_LEN],
    client_id: &[u8],
    signing_key: &SigningKey,
) -> Vec<u8> {
    let id_container = container::build(SESSION_ID_TAG, server_id);
    let ecdh_container = ec_pub_container(server_ecdh);
    let fragments = auth_fragments(server_ecdh, client_ecdh, server_id, client_id);
    let sig = sign(signing_key, &fragments);

    let mut payload = Vec::with_capacity(id_container.len() + ecdh_container.len() + SIGNATURE_LEN);
    payload.extend_from_slice(&id_container);
    payload.extend_from_slice(&ecdh_container);
    payload.extend_from_slice(&sig);

    container::build(PROTO_TAG, &payload)
}

pub struct ParsedM2 {
    pub server_id: Vec<u8>,
    pub server_ecdh: [u8; ECDH_PUB_LEN],
    pub signature: Vec<u8>,
}

pub fn parse_m2(frame: &[u8]) -> Result<ParsedM2> {
    let (payload, _) = container::parse(frame, &PROTO_TAG)?;

    let (server_id, id_consumed) = container::parse(payload, &SESSION_ID_TAG)?;
    let rest = &payload[id_consumed..];
    let (server_ecdh, ecdh_consumed) = parse_ec_pub_container(rest)?;
    let sig = &rest[ecdh_consumed..];
    if sig.len() != SIGNATURE_LEN {
        return Err(Error::InvalidParameter);
    }

    let mut ecdh = [0u8; ECDH_PUB_LEN];
    ecdh.copy_from_slice(server_ecdh);

    Ok(ParsedM2 {
        server_id: server_id.to_vec(),
        server_ecdh: ecdh,
        signature: sig.to_vec(),
    })
}

/// Verifies M2's signature as the client: fragments are
/// `(peer_ecdh=server_ecdh, own_ecdh=client_ecdh, peer_id=server_id, own_id=client_id)`.
pub fn verify_m2_signature(
    parsed: &ParsedM2,
    client_ecdh: &[u8; ECDH_PUB_LEN],
    client_id: &[u8],
    server_sign_key: &VerifyingKey,
) -> Result<()> {
    let fragments = auth_fragments(&parsed.server_ecdh, client_ecdh, &parsed.server_id, client_id);
    verify(server_sign_key, &fragments, &parsed.signature)
}

/// M3: `sig_client(client_ecdh, server_ecdh, client_id, server_id) ++ MAC_K(server_ecdh ++ session_id)`.
pub fn build_m3(
    client_ecdh: &[u8; ECDH_PUB_LEN],
    server_ecdh: &[u8; ECDH_PUB_LEN],
    client_id: &[u8],
    server_id: &[u8],
    signing_key: &SigningKey,
    mac: &[u8; MAC_LEN],
) -> Vec<u8> {
    let fragments = auth_fragments(client_ecdh, server_ecdh, client_id, server_id);
    let sig = sign(signing_key, &fragments);

    let mut payload = Vec::with_capacity(SIGNATURE_LEN + MAC_LEN);
    payload.extend_from_slice(&sig);
    payload.extend_from_slice(mac);

    container::build(PROTO_TAG, &payload)
}

pub struct ParsedM3 {
    pub signature: Vec<u8>,
    pub mac: Vec<u8>,
}

pub fn parse_m3(frame: &[u8]) -> Result<ParsedM3> {
    let (payload, _) = container::parse(frame, &PROTO_TAG)?;
    if payload.len() != SIGNATURE_LEN + MAC_LEN {
        return Err(Error::InvalidParameter);
    }
    Ok(ParsedM3 {
        signature: payload[..SIGNATURE_LEN].to_vec(),
        mac: payload[SIGNATURE_LEN..].to_vec(),
    })
}

/// Verifies M3's signature as the server: fragments are
/// `(peer_ecdh=client_ecdh, own_ecdh=server_ecdh, peer_id=client_id, own_id=server_id)`.
pub fn verify_m3_signature(
    parsed: &ParsedM3,
    client_ecdh: &[u8; ECDH_PUB_LEN],
    server_ecdh: &[u8; ECDH_PUB_LEN],
    client_id: &[u8],
    server_id: &[u8],
    client_sign_key: &VerifyingKey,
) -> Result<()> {
    let fragments = auth_fragments(client_ecdh, server_ecdh, client_id, server_id);
    verify(client_sign_key, &fragments, &parsed.signature)
}

/// M4: `MAC_K(client_ecdh ++ session_id)`.
pub fn build_m4(mac: &[u8; MAC_LEN]) -> Vec<u8> {
    container::build(PROTO_TAG, mac)
}

pub fn parse_m4(frame: &[u8]) -> Result<Vec<u8>> {
    let (payload, _) = container::parse(frame, &PROTO_TAG)?;
    if payload.len() != MAC_LEN {
        return Err(Error::InvalidParameter);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn m1_round_trips_and_verifies() {
        let client_key = SigningKey::random(&mut OsRng);
        let client_ecdh_priv = p256::ecdh::EphemeralSecret::random(&mut OsRng);
        let client_ecdh = ecdh_public_bytes(&client_ecdh_priv.public_key());

        let frame = build_m1(b"client", &client_ecdh, &client_key);
        let parsed = parse_m1(&frame).unwrap();
        assert_eq!(parsed.client_id, b"client");
        assert_eq!(parsed.client_ecdh, client_ecdh);

        verify_m1_signature(&parsed, client_key.verifying_key()).unwrap();
    }

    #[test]
    fn m1_rejects_tampered_ecdh() {
        let client_key = SigningKey::random(&mut OsRng);
        let client_ecdh_priv = p256::ecdh::EphemeralSecret::random(&mut OsRng);
        let client_ecdh = ecdh_public_bytes(&client_ecdh_priv.public_key());

        let frame = build_m1(b"client", &client_ecdh, &client_key);
        let mut parsed = parse_m1(&frame).unwrap();
        parsed.client_ecdh[10] ^= 0xff;

        assert!(verify_m1_signature(&parsed, client_key.verifying_key()).is_err());
    }
}

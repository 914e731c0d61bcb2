//! The 12-byte tag/size/checksum container used for every frame on the wire.
//!
//! Layout: `tag (4) | size (4, big-endian, includes this header) | checksum
//! (4, big-endian, crc32 over tag||size||payload) | payload (size - 12)`.
//! Parsing never trusts a field until the one before it has been validated:
//! length, then tag, then declared size against the buffer actually
//! received, then checksum.

use crate::error::{Error, Result};

/// Size of the tag+size+checksum header, in bytes.
pub const HEADER_LEN: usize = 12;

/// Outer frame tag: wraps both handshake messages and record-layer frames.
pub const PROTO_TAG: [u8; 4] = *b"SSPR";
/// Inner container tag for a peer identity.
pub const SESSION_ID_TAG: [u8; 4] = *b"SSID";
/// Container tag prefix for EC public key material (ephemeral ECDH or signing keys).
pub const EC_PUB_KEY_TAG: [u8; 4] = *b"ECPK";

fn checksum(tag: &[u8; 4], size: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag);
    hasher.update(&size.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Builds a framed container around `payload`, tagged with `tag`.
pub fn build(tag: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (HEADER_LEN + payload.len()) as u32;
    let sum = checksum(&tag, size, payload);

    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&sum.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parses a container with the expected `tag` from the front of `buf`.
///
/// Returns `(payload, consumed)` where `consumed` is the number of bytes of
/// `buf` occupied by this container (its declared `size`), so callers can
/// keep parsing subsequent containers out of the same buffer.
pub fn parse<'a>(buf: &'a [u8], expected_tag: &[u8; 4]) -> Result<(&'a [u8], usize)> {
    if buf.len() < HEADER_LEN {
        return Err(Error::InvalidParameter);
    }

    let tag = &buf[0..4];
    if tag != expected_tag {
        return Err(Error::InvalidParameter);
    }

    let size = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    if size < HEADER_LEN || size > buf.len() {
        return Err(Error::InvalidParameter);
    }

    let declared_checksum = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    let payload = &buf[HEADER_LEN..size];
    let actual_checksum = checksum(expected_tag, size as u32, payload);
    if actual_checksum != declared_checksum {
        return Err(Error::InvalidParameter);
    }

    Ok((payload, size))
}

//! Record layer: the authenticated-encryption channel used once the
//! handshake reaches `Established`.
//!
//! Frames reuse the same outer container framing as the handshake so a
//! receiver can dispatch on tag alone; the ciphertext (ChaCha20-Poly1305,
//! which appends its own 16-byte tag) is the container payload. Nonces are
//! never carried on the wire: both sides increment an independent monotonic
//! counter in lockstep, valid because the transport is assumed in-order and
//! reliable.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use crate::container::{self, PROTO_TAG};
use crate::error::{Error, Result};
use crate::kdf::SECRET_LEN;

/// Size of the Poly1305 authentication tag, in bytes.
pub const TAG_SIZE: usize = 16;

/// Size of an application message, in bytes, after the record layer wraps it
/// (payload + tag + outer container header).
pub fn wrapped_size(plaintext_len: usize) -> usize {
    container::HEADER_LEN + plaintext_len + TAG_SIZE
}

fn nonce_bytes(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    *Nonce::from_slice(&bytes)
}

/// One direction's cipher state: the AEAD key and its monotonic nonce counter.
pub struct DirectionalCipher {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl DirectionalCipher {
    pub fn new(key: &[u8; SECRET_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
            counter: 0,
        }
    }

    /// Encrypts `plaintext` in place, returning the full wire frame
    /// (outer container around ciphertext||tag).
    pub fn wrap(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce_bytes(self.counter), b"", &mut buf)?;
        self.counter = self.counter.checked_add(1).ok_or(Error::CryptoFailure)?;

        buf.extend_from_slice(tag.as_slice());
        Ok(container::build(PROTO_TAG, &buf))
    }

    /// Decrypts one wire frame (outer container already stripped by the
    /// caller; `ciphertext` is `container`'s payload) into `dst`. Returns
    /// the plaintext length, or `BufferTooSmall` if `dst` cannot hold it.
    pub fn unwrap(&mut self, ciphertext: &[u8], dst: &mut [u8]) -> Result<usize> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::InvalidParameter);
        }
        let (ct, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);
        if dst.len() < ct.len() {
            return Err(Error::BufferTooSmall { needed: ct.len() });
        }

        let mut buf = ct.to_vec();
        self.cipher
            .decrypt_in_place_detached(&nonce_bytes(self.counter), b"", &mut buf, tag.into())?;
        self.counter = self.counter.checked_add(1).ok_or(Error::CryptoFailure)?;

        dst[..buf.len()].copy_from_slice(&buf);
        Ok(buf.len())
    }
}

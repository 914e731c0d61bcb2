//! Error kinds surfaced across the public API.

use thiserror::Error;

/// Errors returned by session setup, handshake processing, and the record layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed frame, failed checksum, unknown identity, wrong handshake
    /// state, or a signature/MAC mismatch.
    #[error("invalid parameter")]
    InvalidParameter,

    /// An allocation could not be satisfied.
    #[error("allocation failed")]
    NoMemory,

    /// A caller-provided output buffer was smaller than the value that would
    /// have been written into it. `needed` is the size to retry with.
    #[error("buffer too small, need {needed} bytes")]
    BufferTooSmall {
        /// Bytes required to complete the call.
        needed: usize,
    },

    /// The underlying cryptographic primitive failed or refused its input.
    #[error("cryptographic operation failed")]
    CryptoFailure,
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<hkdf::InvalidLength> for Error {
    fn from(_: hkdf::InvalidLength) -> Self {
        Error::CryptoFailure
    }
}

impl From<p256::elliptic_curve::Error> for Error {
    fn from(_: p256::elliptic_curve::Error) -> Self {
        Error::CryptoFailure
    }
}

impl From<signature::Error> for Error {
    fn from(_: signature::Error) -> Self {
        Error::InvalidParameter
    }
}

impl From<chacha20poly1305::aead::Error> for Error {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        Error::CryptoFailure
    }
}

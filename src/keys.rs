//! Fixed-width secrets that must never be printed or copied out casually.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::kdf::SECRET_LEN;

/// The 32-byte value bound to both peers' identities and ephemeral keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionId([u8; SECRET_LEN]);

/// The 32-byte secret derived from the ECDH shared secret and the session id.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; SECRET_LEN]);

macro_rules! fixed_secret {
    ($ty:ident) => {
        impl $ty {
            pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
                &self.0
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($ty), "(..)"))
            }
        }
    };
}

fixed_secret!(SessionId);
fixed_secret!(MasterKey);

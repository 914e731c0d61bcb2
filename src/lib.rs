//! A mutually-authenticated ephemeral-ECDH handshake and authenticated
//! transport core.
//!
//! Two named peers exchange a four-message handshake (`connect`/`receive`
//! in sequence) signed under long-term P-256 keys over ephemeral P-256 ECDH
//! points, derive a shared master key via HKDF-SHA256, confirm it with an
//! HMAC exchange, and then move application data through a ChaCha20-Poly1305
//! record layer. See [`session::SessionContext`] for the entry point.

pub mod container;
pub mod error;
pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod peer;
pub mod record;
pub mod session;
pub mod transcript;

pub use error::{Error, Result};
pub use handshake::{HandshakeState, ReceiveOutcome, Role};
pub use keys::{MasterKey, SessionId};
pub use session::{Callbacks, IdentityResolver, SessionContext, SessionEvent, MAX_IDENTITY_LEN};

//! In-memory snapshot of the remote peer captured during the handshake.

use p256::ecdsa::VerifyingKey;
use p256::PublicKey as EcdhPublicKey;
use zeroize::Zeroize;

/// The remote's identity, ephemeral ECDH key, and long-term signing key.
///
/// Fully populated only after the first handshake message from that peer
/// has been cryptographically validated; wiped wholesale on any handshake
/// failure so a session never straddles two different identities.
#[derive(Default)]
pub struct PeerRecord {
    pub id: Vec<u8>,
    pub ecdh_public: Option<EcdhPublicKey>,
    pub sign_public: Option<VerifyingKey>,
}

impl PeerRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.ecdh_public.is_some() && self.sign_public.is_some()
    }

    /// Wipes the identity bytes and drops the key material. Called whenever
    /// the handshake aborts so no partial peer state survives the failure.
    pub fn wipe(&mut self) {
        self.id.zeroize();
        self.id.clear();
        self.ecdh_public = None;
        self.sign_public = None;
    }
}

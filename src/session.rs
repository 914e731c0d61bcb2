//! `SessionContext`: the top-level handshake/transport object and its
//! public API (`init`, `connect`, `send`, `receive`).

use p256::ecdh::EphemeralSecret;
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::PublicKey as EcdhPublicKey;
use rand_core::OsRng;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::container;
use crate::error::{Error, Result};
use crate::handshake::messages::{self, ECDH_PUB_LEN};
use crate::handshake::{HandshakeState, ReceiveOutcome, Role};
use crate::kdf::{self, DirectionalKeys, MAC_LEN, MASTER_KEY_LABEL, SESSION_ID_LABEL, SECRET_LEN};
use crate::keys::{MasterKey, SessionId};
use crate::peer::PeerRecord;
use crate::record::DirectionalCipher;

/// Maximum accepted length of an identity, in bytes. Not specified
/// numerically by the protocol (only "at least 1 KB must be accepted"),
/// chosen as a defensive bound against a malicious declared-length field
/// driving an unbounded allocation while a session is still unauthenticated.
pub const MAX_IDENTITY_LEN: usize = 8192;

const HANDSHAKE_STACK_BUF_LEN: usize = 1024;
const RECORD_STACK_BUF_LEN: usize = 2048;

/// Looks up a peer's long-term signing public key by identity. Stands in
/// for the out-of-band identity-to-public-key binding both sides must agree
/// on ahead of time.
pub trait IdentityResolver {
    fn resolve(&self, id: &[u8]) -> Result<VerifyingKey>;
}

/// Notification fired once the handshake reaches `Established`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
}

/// The callback bundle supplied at `init`. Closures capture their own
/// context directly rather than threading an opaque pointer through every
/// call.
pub struct Callbacks<'cb> {
    pub send_data: Box<dyn FnMut(&[u8]) -> Result<()> + 'cb>,
    pub receive_data: Box<dyn FnMut(&mut [u8]) -> Result<usize> + 'cb>,
    pub state_changed: Option<Box<dyn FnMut(SessionEvent) + 'cb>>,
    pub resolver: Box<dyn IdentityResolver + 'cb>,
}

/// The mutually-authenticated handshake and record-layer session.
///
/// Single-threaded, non-reentrant: a `SessionContext` is a mutable state
/// machine and concurrent calls on the same instance from multiple threads
/// have undefined semantics. Distinct instances share no state.
pub struct SessionContext<'cb> {
    role: Role,
    state: HandshakeState,

    local_id: Vec<u8>,
    local_signing_key: SigningKey,
    local_ecdh_priv: Option<EphemeralSecret>,
    local_ecdh_pub: [u8; ECDH_PUB_LEN],

    peer: PeerRecord,

    session_id: Option<SessionId>,
    master_key: Option<MasterKey>,
    send_cipher: Option<DirectionalCipher>,
    recv_cipher: Option<DirectionalCipher>,

    callbacks: Callbacks<'cb>,
}

impl<'cb> SessionContext<'cb> {
    /// Allocates a fresh ephemeral ECDH keypair and sets the initial
    /// handshake state for `role`. `id` must be non-empty and within
    /// `MAX_IDENTITY_LEN`.
    pub fn init(
        role: Role,
        id: Vec<u8>,
        local_signing_key: SigningKey,
        callbacks: Callbacks<'cb>,
    ) -> Result<Self> {
        if id.is_empty() || id.len() > MAX_IDENTITY_LEN {
            return Err(Error::InvalidParameter);
        }

        let local_ecdh_priv = EphemeralSecret::random(&mut OsRng);
        let local_ecdh_pub = messages::ecdh_public_bytes(&local_ecdh_priv.public_key());

        let state = match role {
            Role::Client => HandshakeState::Idle,
            Role::Server => HandshakeState::AcceptWait,
        };

        Ok(Self {
            role,
            state,
            local_id: id,
            local_signing_key,
            local_ecdh_priv: Some(local_ecdh_priv),
            local_ecdh_pub,
            peer: PeerRecord::empty(),
            session_id: None,
            master_key: None,
            send_cipher: None,
            recv_cipher: None,
            callbacks,
        })
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn master_key(&self) -> Option<&MasterKey> {
        self.master_key.as_ref()
    }

    /// Client-only: sends M1 and transitions to `ProceedClientWait`.
    pub fn connect(&mut self) -> Result<()> {
        if self.role != Role::Client || self.state != HandshakeState::Idle {
            return Err(Error::InvalidParameter);
        }

        let frame = messages::build_m1(&self.local_id, &self.local_ecdh_pub, &self.local_signing_key);
        (self.callbacks.send_data)(&frame)?;
        self.state = HandshakeState::ProceedClientWait;
        debug!(role = ?self.role, "sent M1");
        Ok(())
    }

    /// Established only: encrypts and sends one application message.
    pub fn send(&mut self, msg: &[u8]) -> Result<usize> {
        if !self.state.is_established() || msg.is_empty() {
            return Err(Error::InvalidParameter);
        }
        let cipher = self.send_cipher.as_mut().ok_or(Error::InvalidParameter)?;
        let frame = cipher.wrap(msg)?;
        (self.callbacks.send_data)(&frame)?;
        Ok(msg.len())
    }

    /// Dispatches one incoming frame to the handshake handler or the
    /// record-layer decoder, depending on current state.
    pub fn receive(&mut self, dst: &mut [u8]) -> Result<ReceiveOutcome> {
        if self.state.is_established() {
            let frame = self.recv_frame::<RECORD_STACK_BUF_LEN>()?;
            let (payload, _) = container::parse(&frame, &container::PROTO_TAG)?;
            let cipher = self.recv_cipher.as_mut().ok_or(Error::InvalidParameter)?;
            let n = cipher.unwrap(payload, dst)?;
            return Ok(ReceiveOutcome::Data(n));
        }

        let frame = self.recv_frame::<HANDSHAKE_STACK_BUF_LEN>()?;
        match self.handle_handshake_frame(&frame) {
            Ok(()) => Ok(ReceiveOutcome::HandshakeStep),
            Err(e) => {
                warn!(state = ?self.state, error = %e, "handshake step failed, aborting session");
                self.abort();
                Err(e)
            }
        }
    }

    /// Wipes every piece of observable session state on a failed handshake
    /// step: peer record, ephemeral/master key material, and ciphers. A
    /// failure must never leave a previously-derived `session_id` or
    /// `master_key` readable through the accessors above.
    fn abort(&mut self) {
        self.close();
    }

    /// Deterministically tears the session down: wipes peer state and key
    /// material now instead of waiting on scope exit. Safe to call more than
    /// once; `Drop` runs the same teardown for callers who don't.
    pub fn close(&mut self) {
        self.peer.wipe();
        self.local_ecdh_priv = None;
        self.session_id = None;
        self.master_key = None;
        self.send_cipher = None;
        self.recv_cipher = None;
        self.state = HandshakeState::Aborted;
    }

    fn recv_frame<const N: usize>(&mut self) -> Result<Vec<u8>> {
        let mut stack_buf = [0u8; N];
        match (self.callbacks.receive_data)(&mut stack_buf) {
            Ok(n) => Ok(stack_buf[..n].to_vec()),
            Err(Error::BufferTooSmall { needed }) => {
                let mut heap_buf = try_alloc(needed)?;
                let n = (self.callbacks.receive_data)(&mut heap_buf)?;
                heap_buf.truncate(n);
                Ok(heap_buf)
            }
            Err(e) => Err(e),
        }
    }

    fn handle_handshake_frame(&mut self, frame: &[u8]) -> Result<()> {
        match self.state {
            HandshakeState::AcceptWait => self.handle_m1(frame),
            HandshakeState::ProceedClientWait => self.handle_m2(frame),
            HandshakeState::FinishServerWait => self.handle_m3(frame),
            HandshakeState::FinishClientWait => self.handle_m4(frame),
            HandshakeState::Idle | HandshakeState::Established | HandshakeState::Aborted => {
                Err(Error::InvalidParameter)
            }
        }
    }

    fn handle_m1(&mut self, frame: &[u8]) -> Result<()> {
        if self.role != Role::Server {
            return Err(Error::InvalidParameter);
        }

        let parsed = messages::parse_m1(frame)?;
        let client_sign_key = self.callbacks.resolver.resolve(&parsed.client_id)?;
        messages::verify_m1_signature(&parsed, &client_sign_key)?;

        self.peer.id = parsed.client_id;
        self.peer.sign_public = Some(client_sign_key);
        self.peer.ecdh_public = Some(EcdhPublicKey::from_sec1_bytes(&parsed.client_ecdh)?);

        let frame = messages::build_m2(
            &self.local_id,
            &self.local_ecdh_pub,
            &parsed.client_ecdh,
            &self.peer.id,
            &self.local_signing_key,
        );
        (self.callbacks.send_data)(&frame)?;
        self.state = HandshakeState::FinishServerWait;
        debug!(role = ?self.role, "sent M2");
        Ok(())
    }

    fn handle_m2(&mut self, frame: &[u8]) -> Result<()> {
        if self.role != Role::Client {
            return Err(Error::InvalidParameter);
        }

        let parsed = messages::parse_m2(frame)?;
        let server_sign_key = self.callbacks.resolver.resolve(&parsed.server_id)?;
        messages::verify_m2_signature(&parsed, &self.local_ecdh_pub, &self.local_id, &server_sign_key)?;

        self.peer.id = parsed.server_id;
        self.peer.sign_public = Some(server_sign_key);
        self.peer.ecdh_public = Some(EcdhPublicKey::from_sec1_bytes(&parsed.server_ecdh)?);

        // client_ecdh ++ server_ecdh ++ client_id ++ server_id, always
        // client-first regardless of which side computes it.
        let session_id = derive_session_id(&self.local_ecdh_pub, &parsed.server_ecdh, &self.local_id, &self.peer.id)?;
        let shared_secret = self
            .local_ecdh_priv
            .as_ref()
            .ok_or(Error::InvalidParameter)?
            .diffie_hellman(self.peer.ecdh_public.as_ref().ok_or(Error::InvalidParameter)?);
        let master_key = derive_master_key(shared_secret.raw_secret_bytes(), &session_id)?;

        let mac = kdf::mac(master_key.as_bytes(), &mac_fragments(&parsed.server_ecdh, &session_id));
        let frame = messages::build_m3(
            &self.local_ecdh_pub,
            &parsed.server_ecdh,
            &self.local_id,
            &self.peer.id,
            &self.local_signing_key,
            &mac,
        );
        (self.callbacks.send_data)(&frame)?;

        self.session_id = Some(SessionId::from_bytes(session_id));
        self.master_key = Some(master_key);
        self.state = HandshakeState::FinishClientWait;
        debug!(role = ?self.role, "sent M3");
        Ok(())
    }

    fn handle_m3(&mut self, frame: &[u8]) -> Result<()> {
        if self.role != Role::Server {
            return Err(Error::InvalidParameter);
        }

        let parsed = messages::parse_m3(frame)?;
        let client_sign_key = self.peer.sign_public.clone().ok_or(Error::InvalidParameter)?;
        let client_ecdh_raw = messages::ecdh_public_bytes(self.peer.ecdh_public.as_ref().ok_or(Error::InvalidParameter)?);

        messages::verify_m3_signature(
            &parsed,
            &client_ecdh_raw,
            &self.local_ecdh_pub,
            &self.peer.id,
            &self.local_id,
            &client_sign_key,
        )?;

        let session_id = derive_session_id(&client_ecdh_raw, &self.local_ecdh_pub, &self.peer.id, &self.local_id)?;
        let shared_secret = self
            .local_ecdh_priv
            .as_ref()
            .ok_or(Error::InvalidParameter)?
            .diffie_hellman(self.peer.ecdh_public.as_ref().ok_or(Error::InvalidParameter)?);
        let master_key = derive_master_key(shared_secret.raw_secret_bytes(), &session_id)?;

        kdf::verify_mac(
            master_key.as_bytes(),
            &mac_fragments(&self.local_ecdh_pub, &session_id),
            &parsed.mac,
        )?;

        let mac = kdf::mac(master_key.as_bytes(), &mac_fragments(&client_ecdh_raw, &session_id));
        let frame = messages::build_m4(&mac);
        (self.callbacks.send_data)(&frame)?;

        self.session_id = Some(SessionId::from_bytes(session_id));
        self.establish(master_key)?;
        debug!(role = ?self.role, "sent M4, established");
        Ok(())
    }

    fn handle_m4(&mut self, frame: &[u8]) -> Result<()> {
        if self.role != Role::Client {
            return Err(Error::InvalidParameter);
        }

        let mac = messages::parse_m4(frame)?;
        let session_id = self.session_id.clone().ok_or(Error::InvalidParameter)?;
        let master_key = self.master_key.clone().ok_or(Error::InvalidParameter)?;

        kdf::verify_mac(
            master_key.as_bytes(),
            &mac_fragments(&self.local_ecdh_pub, session_id.as_bytes()),
            &mac,
        )?;

        self.establish(master_key)?;
        debug!(role = ?self.role, "established");
        Ok(())
    }

    /// Shared by both sides' final step: derives directional ciphers, wipes
    /// the ephemeral ECDH private key, and transitions to `Established`.
    fn establish(&mut self, master_key: MasterKey) -> Result<()> {
        let DirectionalKeys {
            client_to_server,
            server_to_client,
        } = kdf::derive_directional_keys(master_key.as_bytes())?;

        let (mut send_key, mut recv_key) = match self.role {
            Role::Client => (client_to_server, server_to_client),
            Role::Server => (server_to_client, client_to_server),
        };
        self.send_cipher = Some(DirectionalCipher::new(&send_key));
        self.recv_cipher = Some(DirectionalCipher::new(&recv_key));
        send_key.zeroize();
        recv_key.zeroize();

        self.master_key = Some(master_key);
        self.local_ecdh_priv = None;
        self.state = HandshakeState::Established;

        if let Some(cb) = self.callbacks.state_changed.as_mut() {
            cb(SessionEvent::Established);
        }
        Ok(())
    }
}

impl Drop for SessionContext<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn mac_fragments(ecdh_raw: &[u8; ECDH_PUB_LEN], session_id: &[u8; SECRET_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ECDH_PUB_LEN + SECRET_LEN);
    out.extend_from_slice(ecdh_raw);
    out.extend_from_slice(session_id);
    out
}

fn derive_session_id(
    client_ecdh: &[u8; ECDH_PUB_LEN],
    server_ecdh: &[u8; ECDH_PUB_LEN],
    client_id: &[u8],
    server_id: &[u8],
) -> Result<[u8; SECRET_LEN]> {
    let mut context = Vec::with_capacity(2 * ECDH_PUB_LEN + client_id.len() + server_id.len());
    context.extend_from_slice(client_ecdh);
    context.extend_from_slice(server_ecdh);
    context.extend_from_slice(client_id);
    context.extend_from_slice(server_id);

    let mut out = [0u8; SECRET_LEN];
    kdf::derive(b"", SESSION_ID_LABEL, &context, &mut out)?;
    Ok(out)
}

fn derive_master_key(shared_secret: &[u8], session_id: &[u8; SECRET_LEN]) -> Result<MasterKey> {
    let mut out = [0u8; SECRET_LEN];
    kdf::derive(shared_secret, MASTER_KEY_LABEL, session_id, &mut out)?;
    Ok(MasterKey::from_bytes(out))
}

fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve(len).map_err(|_| Error::NoMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

//! End-to-end handshake and record-layer exchange over a real duplex pipe,
//! each side running on its own thread.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use p256::ecdsa::{SigningKey, VerifyingKey};
use rand_core::OsRng;

use secure_session_core::{
    Callbacks, Error, HandshakeState, IdentityResolver, ReceiveOutcome, Result, Role,
    SessionContext, SessionEvent,
};

struct StaticResolver(HashMap<Vec<u8>, VerifyingKey>);

impl IdentityResolver for StaticResolver {
    fn resolve(&self, id: &[u8]) -> Result<VerifyingKey> {
        self.0.get(id).cloned().ok_or(Error::InvalidParameter)
    }
}

/// Wraps a blocking duplex stream into the length-prefixed `send_data`/
/// `receive_data` callbacks `SessionContext` expects: a 4-byte big-endian
/// length header followed by that many frame bytes. The stream is shared
/// behind a mutex since `send_data`/`receive_data` are two separate
/// closures but `SessionContext` never calls them concurrently with each
/// other for a single instance.
fn local_callbacks<'cb, S>(stream: S, resolver: StaticResolver) -> Callbacks<'cb>
where
    S: Read + Write + Send + 'cb,
{
    let stream = Arc::new(Mutex::new(stream));
    let writer = stream.clone();
    let reader = stream;

    Callbacks {
        send_data: Box::new(move |buf: &[u8]| -> Result<()> {
            let mut stream = writer.lock().expect("pipe mutex poisoned");
            let len = (buf.len() as u32).to_be_bytes();
            stream.write_all(&len).map_err(|_| Error::CryptoFailure)?;
            stream.write_all(buf).map_err(|_| Error::CryptoFailure)?;
            Ok(())
        }),
        receive_data: Box::new(move |dst: &mut [u8]| -> Result<usize> {
            let mut stream = reader.lock().expect("pipe mutex poisoned");
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).map_err(|_| Error::CryptoFailure)?;
            let len = u32::from_be_bytes(len_buf) as usize;
            if dst.len() < len {
                return Err(Error::BufferTooSmall { needed: len });
            }
            stream
                .read_exact(&mut dst[..len])
                .map_err(|_| Error::CryptoFailure)?;
            Ok(len)
        }),
        state_changed: None,
        resolver: Box::new(resolver),
    }
}

fn keypair() -> (SigningKey, VerifyingKey) {
    let sk = SigningKey::random(&mut OsRng);
    let vk = *sk.verifying_key();
    (sk, vk)
}

fn run_handshake_and_echo() {
    let (pipe1, pipe2) = pipe::bipipe_buffered();

    let (client_sign_key, client_verify_key) = keypair();
    let (server_sign_key, server_verify_key) = keypair();

    let client_thread = thread::spawn(move || {
        let mut resolvers = HashMap::new();
        resolvers.insert(b"server".to_vec(), server_verify_key);

        let callbacks = local_callbacks(pipe2, StaticResolver(resolvers));
        let mut client =
            SessionContext::init(Role::Client, b"client".to_vec(), client_sign_key, callbacks)
                .expect("client init");

        client.connect().expect("send M1");

        let mut scratch = [0u8; 1024];
        assert_eq!(client.receive(&mut scratch).unwrap(), ReceiveOutcome::HandshakeStep); // M2
        assert_eq!(client.receive(&mut scratch).unwrap(), ReceiveOutcome::HandshakeStep); // M4
        assert_eq!(client.state(), HandshakeState::Established);

        client.send(b"ping").expect("send ping");

        let mut dst = [0u8; 16];
        match client.receive(&mut dst).unwrap() {
            ReceiveOutcome::Data(n) => assert_eq!(&dst[..n], b"pong"),
            other => panic!("expected application data, got {other:?}"),
        }

        (
            client.session_id().unwrap().as_bytes().to_vec(),
            client.master_key().unwrap().as_bytes().to_vec(),
        )
    });

    let server_thread = thread::spawn(move || {
        let mut resolvers = HashMap::new();
        resolvers.insert(b"client".to_vec(), client_verify_key);

        let callbacks = local_callbacks(pipe1, StaticResolver(resolvers));
        let mut server =
            SessionContext::init(Role::Server, b"server".to_vec(), server_sign_key, callbacks)
                .expect("server init");

        let mut scratch = [0u8; 1024];
        assert_eq!(server.receive(&mut scratch).unwrap(), ReceiveOutcome::HandshakeStep); // M1
        assert_eq!(server.receive(&mut scratch).unwrap(), ReceiveOutcome::HandshakeStep); // M3
        assert_eq!(server.state(), HandshakeState::Established);

        let mut dst = [0u8; 16];
        match server.receive(&mut dst).unwrap() {
            ReceiveOutcome::Data(n) => assert_eq!(&dst[..n], b"ping"),
            other => panic!("expected application data, got {other:?}"),
        }
        server.send(b"pong").expect("send pong");

        (
            server.session_id().unwrap().as_bytes().to_vec(),
            server.master_key().unwrap().as_bytes().to_vec(),
        )
    });

    let (client_session_id, client_master_key) = client_thread.join().expect("client thread panicked");
    let (server_session_id, server_master_key) = server_thread.join().expect("server thread panicked");

    assert_eq!(client_session_id, server_session_id);
    assert_eq!(client_master_key, server_master_key);
}

#[test]
fn full_handshake_then_bidirectional_echo() {
    run_handshake_and_echo();
}

#[test]
fn multiple_concurrent_sessions_do_not_interfere() {
    let handles: Vec<_> = (0..4).map(|_| thread::spawn(run_handshake_and_echo)).collect();
    for h in handles {
        h.join().expect("session thread panicked");
    }
}

#[test]
fn established_event_fires_once_per_side() {
    let (pipe1, pipe2) = pipe::bipipe_buffered();
    let (client_sign_key, client_verify_key) = keypair();
    let (server_sign_key, server_verify_key) = keypair();

    let client_thread = thread::spawn(move || {
        let mut resolvers = HashMap::new();
        resolvers.insert(b"server".to_vec(), server_verify_key);
        let mut callbacks = local_callbacks(pipe2, StaticResolver(resolvers));

        let established = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let established_cb = established.clone();
        callbacks.state_changed = Some(Box::new(move |event| {
            assert_eq!(event, SessionEvent::Established);
            established_cb.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        let mut client =
            SessionContext::init(Role::Client, b"client".to_vec(), client_sign_key, callbacks)
                .expect("client init");
        client.connect().unwrap();
        let mut scratch = [0u8; 1024];
        client.receive(&mut scratch).unwrap();
        client.receive(&mut scratch).unwrap();
        established.load(std::sync::atomic::Ordering::SeqCst)
    });

    let server_thread = thread::spawn(move || {
        let mut resolvers = HashMap::new();
        resolvers.insert(b"client".to_vec(), client_verify_key);
        let callbacks = local_callbacks(pipe1, StaticResolver(resolvers));
        let mut server =
            SessionContext::init(Role::Server, b"server".to_vec(), server_sign_key, callbacks)
                .expect("server init");
        let mut scratch = [0u8; 1024];
        server.receive(&mut scratch).unwrap();
        server.receive(&mut scratch).unwrap();
    });

    let fired = client_thread.join().expect("client thread panicked");
    server_thread.join().expect("server thread panicked");
    assert_eq!(fired, 1);
}

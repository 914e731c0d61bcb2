//! The four-message handshake state machine.
//!
//! Encoded as a tagged variant rather than a function pointer: each variant
//! names exactly what message is expected next. `Idle` and `Aborted` are
//! implementation-only additions (see DESIGN.md) that do not change the
//! behavior of the five core protocol states.

pub mod messages;

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Current position in the handshake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Client only: `connect()` has not been called yet.
    Idle,
    /// Server default: waiting for M1.
    AcceptWait,
    /// Client, after sending M1: waiting for M2.
    ProceedClientWait,
    /// Server, after sending M2: waiting for M3.
    FinishServerWait,
    /// Client, after sending M3: waiting for M4.
    FinishClientWait,
    /// Handshake complete; application data may flow.
    Established,
    /// A prior step failed validation; no further message is accepted.
    Aborted,
}

impl HandshakeState {
    pub fn is_established(self) -> bool {
        matches!(self, HandshakeState::Established)
    }
}

/// What a `receive()` call accomplished. Distinct from a C-style overloaded
/// signed byte count (0/negative during handshake, length afterwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Consumed one handshake message and advanced the state machine.
    HandshakeStep,
    /// Consumed one application-data record; the payload is `len` bytes in
    /// the caller's destination buffer.
    Data(usize),
}

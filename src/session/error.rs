// ABOUTME: Error types for gateway sessions and the protocol engine they drive
// ABOUTME: Start and submit failures are returned; steady-state engine errors are only logged

use crate::datatypes::CommandStatus;
use std::io;
use thiserror::Error;

/// Errors reported by the protocol engine.
///
/// The engine owns sockets, PDU encoding and the bind handshake, so these
/// mirror what can go wrong below the session.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error during network operations (connection, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The SMSC answered with a non-OK command_status
    #[error("Protocol error: {0:?}")]
    Protocol(CommandStatus),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Engine not in correct state for operation
    #[error("Invalid engine state: {0}")]
    InvalidState(String),

    /// Automatic rebind after a lost connection failed
    #[error("Rebind failed: {0}")]
    Rebind(String),
}

/// Invalid [`SessionConfig`](crate::session::SessionConfig) values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("rate limit must be positive, got {0}")]
    RateLimit(f64),

    #[error("burst limit must be at least 1")]
    BurstLimit,

    #[error("max outstanding must be at least 1 when outstanding enforcement is enabled")]
    MaxOutstanding,

    #[error("stream capacity must be at least 1")]
    StreamCapacity,

    #[error("backoff factor must be at least 1.0, got {0}")]
    BackoffFactor(f64),

    #[error("backoff initial delay exceeds max delay")]
    BackoffRange,

    #[error("gateway name is empty")]
    Gateway,
}

/// Errors surfaced by [`Session`](crate::session::Session) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every connection attempt in the retry budget failed
    #[error("failed to create session after {attempts} attempts: {source}")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        source: EngineError,
    },

    /// The cancellation signal fired before a connection or admission succeeded
    #[error("session creation stopped")]
    Cancelled,

    /// The engine rejected a submission; the message was queued for resend
    #[error("submit failed for sequence {sequence_number}: {source}")]
    SubmitFailed {
        sequence_number: u32,
        #[source]
        source: EngineError,
    },

    /// `stop()` has been called
    #[error("session is shutting down")]
    ShuttingDown,

    /// `start()` is running or already bound the session
    #[error("session already started")]
    AlreadyStarted,

    /// No bound session can carry submit_sm (not started, or receiver only)
    #[error("no bound transmitter session")]
    NoTransmitter,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

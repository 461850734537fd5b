//! Error taxonomy for the connection manager.
//!
//! Errors fall into five families with different blast radii: startup
//! failures abort service construction, dial failures release their
//! admission unit and retry later through normal selection, peer I/O errors
//! tear down exactly one connection, misbehavior additionally suppresses
//! the success record, and persistence corruption degrades to empty state.

use std::io;

use thiserror::Error;

use crate::domain::types::{ConnectionId, Endpoint};

/// Top-level error type returned by the service surface.
#[derive(Debug, Error)]
pub enum NetError {
    /// Listening was requested but no bind endpoint could be opened.
    /// Surfaced to the operator; the service does not start.
    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    /// An outbound dial did not produce a connection. Transient by
    /// definition; the address stays eligible for future ticks.
    #[error("dial {endpoint} failed: {kind}")]
    Dial {
        endpoint: Endpoint,
        kind: DialFailure,
    },

    /// A send or receive failed on one connection. Isolated to that peer.
    #[error("peer {id} io error: {kind}")]
    PeerIo { id: ConnectionId, kind: PeerIoError },

    /// Operation referenced a connection the pool no longer tracks.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Message processing has already been stopped by the shutdown
    /// sequencer; no new outbound work is accepted.
    #[error("message processing stopped")]
    MessageProcessingStopped,

    /// Configuration rejected before any socket was opened.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Hard startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to bind any listen endpoint (last error: {last})")]
    NoListenEndpoint { last: String },

    #[error("bind {endpoint} failed: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

/// Why an outbound dial failed; normalized from platform error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DialFailure {
    #[error("connection refused")]
    Refused,
    #[error("timed out")]
    TimedOut,
    #[error("network or host unreachable")]
    Unreachable,
    #[error("invalid or unsupported address")]
    InvalidAddress,
    #[error("canceled by shutdown")]
    Canceled,
    #[error("other io error")]
    Other,
}

impl DialFailure {
    /// Normalize a platform error into the dial taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => DialFailure::Refused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DialFailure::TimedOut,
            io::ErrorKind::AddrNotAvailable | io::ErrorKind::InvalidInput => {
                DialFailure::InvalidAddress
            }
            // ENETUNREACH / EHOSTUNREACH have no stable ErrorKind on our
            // minimum toolchain; match the raw os codes.
            _ => match err.raw_os_error() {
                Some(101) | Some(113) => DialFailure::Unreachable,
                _ => DialFailure::Other,
            },
        }
    }
}

/// Per-connection I/O failures observed by the socket driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeerIoError {
    #[error("connection reset")]
    Reset,
    #[error("remote closed (eof)")]
    Eof,
    #[error("frame exceeds maximum size")]
    OversizedFrame,
    #[error("read failed")]
    Read,
    #[error("write failed")]
    Write,
}

/// Persistence problems are reported, then the state falls back to empty.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("file unreadable: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt contents: {0}")]
    Corrupt(String),

    #[error("unsupported version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_failure_normalizes_common_kinds() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(DialFailure::from_io(&refused), DialFailure::Refused);

        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(DialFailure::from_io(&timeout), DialFailure::TimedOut);

        let invalid = io::Error::from(io::ErrorKind::InvalidInput);
        assert_eq!(DialFailure::from_io(&invalid), DialFailure::InvalidAddress);
    }

    #[test]
    fn error_messages_name_the_peer() {
        let err = NetError::PeerIo {
            id: ConnectionId(7),
            kind: PeerIoError::Reset,
        };
        assert!(err.to_string().contains("peer 7"));
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn startup_error_is_fatal_family() {
        let err = NetError::Startup(StartupError::NoListenEndpoint {
            last: "permission denied".into(),
        });
        assert!(err.to_string().contains("startup failed"));
    }
}

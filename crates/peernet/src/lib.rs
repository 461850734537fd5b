//! # Peernet Connection Manager
//!
//! Peer connection management for a message-based p2p network: listening
//! sockets, outbound dialing with a fixed precedence order, a connection
//! pool that owns every socket lifetime, seed bootstrapping, and a staged
//! shutdown sequencer.
//!
//! The crate moves bytes and manages lifecycles; it never interprets
//! message payloads. Protocol logic lives behind the [`ProtocolHandler`]
//! port and address knowledge behind the [`AddressSource`] port.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - **Domain Layer:** pure connection machinery (pool, dial policy,
//!   framing, shutdown staging) with no I/O
//! - **Ports Layer:** trait boundaries to the embedding node and its
//!   collaborators
//! - **Adapters Layer:** tokio/socket2-backed sockets, multiplexers, the
//!   address book, and flat-file persistence
//! - **Service Layer:** the worker flows, assembled by [`NetService`]
//!
//! ## Example
//!
//! ```rust
//! use peernet::{
//!     AddressBook, AddressProvenance, AddressSource, Endpoint, NetConfig,
//! };
//!
//! let config = NetConfig::default();
//! config.validate().unwrap();
//!
//! // Address knowledge lives outside the manager and is handed in at start.
//! let book = AddressBook::new();
//! let peer = Endpoint::new("203.0.113.7".parse().unwrap(), 9333);
//! book.add(&[peer], AddressProvenance::Manual);
//! assert_eq!(book.known_count(), 1);
//! ```
//!
//! A running manager is obtained with [`NetService::start`], steered through
//! [`NetworkControl`], and torn down with [`NetService::stop`].

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// =============================================================================
// DOMAIN RE-EXPORTS
// =============================================================================

// Core value types
pub use domain::{
    ConnectionClass, ConnectionId, Direction, DisconnectReason, Endpoint, PermissionFlags,
    Timestamp,
};

// Configuration
pub use domain::{
    BindEndpoint, ConnectionLimits, ListenConfig, MultiplexerStrategy, NetConfig, SeedConfig,
    TimeoutConfig, DEFAULT_PORT,
};

// Errors
pub use domain::{DialFailure, NetError, PeerIoError, PersistenceError, StartupError};

// Framing
pub use domain::{encode_frame, extract_frames, HEADER_LEN};

// Pool and lifecycle
pub use domain::{
    Connection, ConnectionLease, ConnectionPool, DestructionRecord, MaintenanceReport,
    PeerSnapshot, PoolCounts, PoolStats,
};

// Dial policy
pub use domain::{DialAction, DialPlan, DialPolicy, DialPurpose};

// Shutdown staging
pub use domain::{ShutdownListener, ShutdownSequencer, ShutdownStage};

// =============================================================================
// PORT RE-EXPORTS
// =============================================================================

pub use ports::{
    AddressBookState, AddressEntry, AddressFilter, AddressProvenance, AddressSource,
    EventMultiplexer, NetworkControl, NoOpProtocolHandler, PollReport, ProtocolHandler,
    StreamInterest, TimeSource,
};

// =============================================================================
// ADAPTER RE-EXPORTS
// =============================================================================

pub use adapters::{
    select_multiplexer, AcceptedSocket, AddressBook, Dialer, FixedTimeSource, ListenerSet,
    ReadinessMultiplexer, ScanMultiplexer, SeedResolver, SystemTimeSource,
};

// =============================================================================
// SERVICE RE-EXPORTS
// =============================================================================

pub use service::NetService;

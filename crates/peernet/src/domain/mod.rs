//! Domain Layer - Pure connection-management logic with no I/O
//!
//! This module contains the core peer connection machinery:
//! - Endpoints, connection identity, classes and disconnect reasons
//! - Length-prefixed frame encoding and extraction
//! - Connection state (buffers, admission permit, lifecycle flags)
//! - Connection pool with mark / drain / finalize maintenance
//! - Outbound dial policy (fixed precedence, Poisson-scheduled probes)
//! - Staged shutdown sequencer
//! - Error taxonomy and configuration

pub mod config;
pub mod connection;
pub mod connector;
pub mod errors;
pub mod framing;
pub mod pool;
pub mod shutdown;
/// Core domain types (entities, values, identifiers)
pub mod types;

pub use config::*;
pub use connection::*;
pub use connector::*;
pub use errors::*;
pub use framing::*;
pub use pool::*;
pub use shutdown::*;
pub use types::*;

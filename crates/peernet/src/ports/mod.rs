//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! Port interfaces (traits) for the connection manager.
//!
//! - **Driving Ports (Inbound):** the control surface the embedding node uses
//!   to steer the manager at runtime
//! - **Driven Ports (Outbound):** the collaborators the manager requires: the
//!   protocol handler it feeds frames to, the address source it draws dial
//!   targets from, the event multiplexer, and the clock

pub mod inbound;
pub mod outbound;

pub use inbound::NetworkControl;
pub use outbound::{
    AddressBookState, AddressEntry, AddressFilter, AddressProvenance, AddressSource,
    EventMultiplexer, NoOpProtocolHandler, PollReport, ProtocolHandler, StreamInterest,
    TimeSource,
};

//! Outbound ports (SPI) required by the connection manager.
//!
//! The manager moves bytes and manages lifecycles; it never interprets
//! message content and never chooses addresses itself. Those jobs belong to
//! the collaborators behind these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::domain::types::{ConnectionId, Endpoint, Timestamp};

/// Protocol logic attached to the manager.
///
/// Invoked only from the message-dispatch flow, never from the socket I/O
/// flow, so implementations may take their time without stalling reads for
/// other peers.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Handle one complete inbound frame. Returns `true` when the handler
    /// wants another pass without waiting for new network activity.
    async fn process_inbound(&self, id: ConnectionId, payload: &[u8]) -> bool;

    /// Called exactly once per connection, after its socket is closed and it
    /// has left both the active and draining sets. No further callbacks for
    /// this id will follow.
    async fn finalize(&self, id: ConnectionId);

    /// Whether the handler has outbound data it still intends to queue for
    /// this peer. Used to skip idle waits in the dispatch flow.
    fn has_outbound_work(&self, id: ConnectionId) -> bool;
}

/// Handler that discards everything. Used by tests and by tools that only
/// exercise connectivity.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProtocolHandler;

#[async_trait]
impl ProtocolHandler for NoOpProtocolHandler {
    async fn process_inbound(&self, _id: ConnectionId, _payload: &[u8]) -> bool {
        false
    }

    async fn finalize(&self, _id: ConnectionId) {}

    fn has_outbound_work(&self, _id: ConnectionId) -> bool {
        false
    }
}

/// Bias applied when drawing a dial target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFilter {
    /// Regular outbound slots: prefer addresses that have worked before.
    Outbound,
    /// Feeler probes: prefer addresses never yet tried, to test the
    /// untried population.
    Untested,
}

/// Where a batch of addresses came from. Sources are not equally
/// trustworthy and the book may weight them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressProvenance {
    Seed,
    Gossip,
    Manual,
}

/// One persisted address record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub endpoint: Endpoint,
    /// Millisecond timestamp of the last fully-handshaken connection, zero
    /// if never.
    pub last_success_millis: u64,
    /// Dial attempts since the last success.
    pub attempts: u32,
}

/// Full serializable state of an address source, written to the address
/// database file and read back at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBookState {
    pub new: Vec<AddressEntry>,
    pub tried: Vec<AddressEntry>,
}

/// The address knowledge the manager dials from.
///
/// Implementations synchronize internally; every method takes `&self` so the
/// source can be shared across the connector, seed and I/O flows.
pub trait AddressSource: Send + Sync {
    /// Draw a dial candidate, or `None` when nothing suitable is known.
    fn pick_address(&self, filter: AddressFilter) -> Option<Endpoint>;

    /// Record a fully-handshaken connection to `endpoint`.
    fn mark_connected(&self, endpoint: &Endpoint, at: Timestamp);

    /// Record that a dial to `endpoint` was started.
    fn mark_attempt(&self, endpoint: &Endpoint, at: Timestamp);

    /// Merge a batch of discovered addresses. Returns how many were new.
    fn add(&self, endpoints: &[Endpoint], provenance: AddressProvenance) -> usize;

    /// Settle any pending tried-table displacement decisions.
    fn resolve_tried_collisions(&self);

    /// Total addresses known, across both tables.
    fn known_count(&self) -> usize;

    fn export_state(&self) -> AddressBookState;

    fn import_state(&self, state: AddressBookState);
}

/// One socket the multiplexer should watch in a poll pass.
#[derive(Clone)]
pub struct StreamInterest {
    pub id: ConnectionId,
    pub socket: Arc<TcpStream>,
    /// Watch for readability. Cleared for peers whose receive buffer is
    /// already full.
    pub read: bool,
    /// Watch for writability. Set only when the connection has queued bytes.
    pub write: bool,
}

/// Outcome of one poll pass.
#[derive(Debug, Default)]
pub struct PollReport {
    pub readable: Vec<ConnectionId>,
    pub writable: Vec<ConnectionId>,
    pub errored: Vec<ConnectionId>,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.errored.is_empty()
    }
}

/// Readiness source for the socket I/O flow.
///
/// `poll` returns once at least one watched socket is ready or `timeout`
/// elapses, whichever is first. It must never block past `timeout`; the I/O
/// flow checks the shutdown stage between polls.
#[async_trait]
pub trait EventMultiplexer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn poll(&self, interest: &[StreamInterest], timeout: Duration) -> PollReport;
}

/// Abstract clock, swapped for a fixed source in tests.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}

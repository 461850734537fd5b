//! # Driving Ports (Inbound API)
//!
//! The runtime control surface the embedding node uses to steer the
//! connection manager: the RPC-equivalent of the original administrative
//! controls.

use crate::domain::errors::NetError;
use crate::domain::pool::{PeerSnapshot, PoolStats};
use crate::domain::types::{ConnectionId, DisconnectReason, Endpoint};

/// Runtime controls over the connection manager.
///
/// All methods are callable from any task. Mutating calls take effect within
/// one maintenance tick rather than synchronously.
pub trait NetworkControl: Send + Sync {
    /// Enable or disable all network activity. Disabling condemns every
    /// active connection, including manual ones, on the next maintenance
    /// tick; re-enabling lets the connector rebuild the outbound set.
    fn set_network_active(&self, active: bool);

    fn network_active(&self) -> bool;

    /// Enable or disable accepting inbound connections. Bound listeners are
    /// kept open either way; disabled listeners simply stop accepting.
    fn set_listening(&self, enabled: bool);

    /// Add a peer the manager should dial and keep retrying regardless of
    /// automatic-outbound caps.
    fn add_manual_target(&self, endpoint: Endpoint);

    /// Request disconnection of one peer. Returns `false` when the id is
    /// unknown.
    fn disconnect_peer(&self, id: ConnectionId, reason: DisconnectReason) -> bool;

    /// Flag a peer as misbehaving: it is disconnected and suppressed from
    /// the successful-connection accounting in the address source.
    fn report_misbehavior(&self, id: ConnectionId) -> bool;

    /// Queue one protocol message for delivery. Fails once message
    /// processing has stopped or when the id is unknown.
    fn send_message(&self, id: ConnectionId, payload: Vec<u8>) -> Result<(), NetError>;

    /// Record that the protocol handshake finished for this peer. Drives the
    /// seed-skip rule and the successful-connection accounting; also the
    /// point where a feeler has served its purpose.
    fn mark_handshake_complete(&self, id: ConnectionId);

    /// Record that this peer delivered fresh tip information. Extends the
    /// evaluation window of an active tip probe.
    fn note_tip_information(&self, id: ConnectionId);

    /// Tell the connector whether the chain tip looks stale. While stale,
    /// the connector periodically rotates one full-relay slot.
    fn set_tip_stale(&self, stale: bool);

    fn stats(&self) -> PoolStats;

    /// Point-in-time view of every active connection.
    fn peers(&self) -> Vec<PeerSnapshot>;
}

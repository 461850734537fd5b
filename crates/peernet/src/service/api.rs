//! `NetworkControl` implementation: the runtime control surface.

use tracing::{debug, info};

use crate::domain::errors::NetError;
use crate::domain::framing::encode_frame;
use crate::domain::pool::{PeerSnapshot, PoolStats};
use crate::domain::shutdown::ShutdownStage;
use crate::domain::types::{ConnectionClass, ConnectionId, DisconnectReason, Endpoint};
use crate::ports::inbound::NetworkControl;
use crate::service::context::NetContext;

impl NetworkControl for NetContext {
    fn set_network_active(&self, active: bool) {
        let was = self.is_network_active();
        if was == active {
            return;
        }
        self.store_network_active(active);
        info!(active, "network activity toggled");
        // Teardown of existing peers happens on the next maintenance tick.
    }

    fn network_active(&self) -> bool {
        self.is_network_active()
    }

    fn set_listening(&self, enabled: bool) {
        self.store_listening(enabled);
        info!(enabled, "listening toggled");
    }

    fn add_manual_target(&self, endpoint: Endpoint) {
        if self.push_manual_target(endpoint) {
            info!(%endpoint, "manual target added");
        }
    }

    fn disconnect_peer(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let known = self.pool.request_disconnect(id, reason);
        if known {
            debug!(peer = %id, reason = reason.label(), "disconnect requested");
        }
        known
    }

    fn report_misbehavior(&self, id: ConnectionId) -> bool {
        let lease = match self.pool.lease(id) {
            Some(lease) => lease,
            None => return false,
        };
        lease.mark_misbehaving();
        lease.request_disconnect(DisconnectReason::Misbehavior);
        info!(peer = %id, endpoint = %lease.endpoint(), "peer reported for misbehavior");
        true
    }

    fn send_message(&self, id: ConnectionId, payload: Vec<u8>) -> Result<(), NetError> {
        if self.sequencer.stage() >= ShutdownStage::MessageProcessingStopped {
            return Err(NetError::MessageProcessingStopped);
        }
        let lease = self.pool.lease(id).ok_or(NetError::UnknownConnection(id))?;
        let frame = encode_frame(&payload, self.config.max_frame_size)
            .map_err(|kind| NetError::PeerIo { id, kind })?;
        lease.queue_send_frame(frame);
        Ok(())
    }

    fn mark_handshake_complete(&self, id: ConnectionId) {
        let lease = match self.pool.lease(id) {
            Some(lease) => lease,
            None => return,
        };
        if lease.is_handshaken() {
            return;
        }
        lease.mark_handshaken();
        info!(peer = %id, endpoint = %lease.endpoint(), class = %lease.class(), "handshake complete");
        // Inbound endpoints carry the peer's ephemeral port; recording them
        // would fill the address book with unreachable entries.
        if lease.class() != ConnectionClass::Inbound {
            self.address_source.mark_connected(&lease.endpoint(), self.now());
        }
    }

    fn note_tip_information(&self, id: ConnectionId) {
        if let Some(lease) = self.pool.lease(id) {
            if lease.note_tip_information(self.now(), self.config.timeouts.probe_eval) {
                debug!(peer = %id, "tip probe extended by fresh information");
            }
        }
    }

    fn set_tip_stale(&self, stale: bool) {
        self.store_tip_stale(stale);
        debug!(stale, "tip staleness signal updated");
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn peers(&self) -> Vec<PeerSnapshot> {
        self.pool.peer_snapshots()
    }
}

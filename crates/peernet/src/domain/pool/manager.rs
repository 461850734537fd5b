//! The connection pool: single source of truth for "who is connected" and
//! the serialization point for teardown.
//!
//! Lifecycle of an entry: inserted into the active set on a successful
//! accept or dial, moved to the draining set once its disconnect flag is
//! observed by maintenance (socket closed, admission unit released there),
//! and finalized only when no leases remain. The lock guarding the sets is
//! held only for list mutation, never across I/O or an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, trace};

use crate::domain::config::{ConnectionLimits, TimeoutConfig};
use crate::domain::connection::Connection;
use crate::domain::pool::eviction::find_eviction_candidate;
use crate::domain::pool::lease::ConnectionLease;
use crate::domain::types::{
    ConnectionClass, ConnectionId, DisconnectReason, Endpoint, PermissionFlags, Timestamp,
};

/// Outcome of offering an inbound connection to the pool.
#[derive(Debug)]
pub enum AdmitResult {
    /// A slot was free.
    Accepted(ConnectionId),
    /// Cap was reached; an existing peer was marked for eviction and the
    /// newcomer took its place.
    AcceptedAfterEviction {
        id: ConnectionId,
        evicted: ConnectionId,
    },
    /// Cap reached and every existing peer is protected.
    Rejected,
}

/// Per-class population snapshot, including the draining backlog.
///
/// Transient tip probes share the block-relay class on the wire but are
/// counted apart so they never consume the block-relay cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub outbound_full: usize,
    pub outbound_block_relay: usize,
    pub tip_probes: usize,
    pub inbound: usize,
    pub manual: usize,
    pub feeler: usize,
    pub addr_fetch: usize,
    pub draining: usize,
}

impl PoolCounts {
    pub fn active_total(&self) -> usize {
        self.outbound_full
            + self.outbound_block_relay
            + self.tip_probes
            + self.inbound
            + self.manual
            + self.feeler
            + self.addr_fetch
    }
}

/// Cumulative pool statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub counts: PoolCounts,
    pub handshaken_relay_outbound: usize,
    pub total_accepted: u64,
    pub total_dialed: u64,
    pub total_destroyed: u64,
    pub total_evicted: u64,
    pub sockets_closed: u64,
}

/// Point-in-time view of one active connection, for the stats surface.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub id: ConnectionId,
    pub endpoint: Endpoint,
    pub class: ConnectionClass,
    pub handshaken: bool,
    pub created_at: Timestamp,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// What maintenance finalized this tick; the caller notifies the protocol
/// handler and the address source outside the pool lock.
#[derive(Debug, Clone)]
pub struct DestructionRecord {
    pub id: ConnectionId,
    pub endpoint: Endpoint,
    pub class: ConnectionClass,
    pub handshaken: bool,
    pub misbehaving: bool,
    pub reason: Option<DisconnectReason>,
}

impl DestructionRecord {
    /// Whether this peer should be recorded as a success in the address
    /// source. Only handshaken outbound peers qualify; misbehavior
    /// suppresses the record, and inbound endpoints carry ephemeral ports
    /// that would poison the address pool.
    pub fn records_success(&self) -> bool {
        self.handshaken && !self.misbehaving && self.class != ConnectionClass::Inbound
    }
}

/// Summary of one maintenance pass.
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    /// Entries finalized this tick, ready for handler/address-source
    /// notification.
    pub destroyed: Vec<DestructionRecord>,
    /// Connections moved from active to draining this tick.
    pub drained: usize,
}

struct PoolInner {
    active: HashMap<ConnectionId, Arc<Connection>>,
    draining: Vec<Arc<Connection>>,
}

pub struct ConnectionPool {
    inner: Mutex<PoolInner>,
    limits: ConnectionLimits,
    timeouts: TimeoutConfig,
    next_id: AtomicU64,
    total_accepted: AtomicU64,
    total_dialed: AtomicU64,
    total_destroyed: AtomicU64,
    total_evicted: AtomicU64,
    sockets_closed: AtomicU64,
}

impl ConnectionPool {
    pub fn new(limits: ConnectionLimits, timeouts: TimeoutConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                active: HashMap::new(),
                draining: Vec::new(),
            }),
            limits,
            timeouts,
            next_id: AtomicU64::new(1),
            total_accepted: AtomicU64::new(0),
            total_dialed: AtomicU64::new(0),
            total_destroyed: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            sockets_closed: AtomicU64::new(0),
        }
    }

    /// Identity numbers are monotonic and never reused.
    fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // === Insertion ===

    /// Register a completed outbound dial. Feelers count as handshaken the
    /// moment the transport connect succeeds; addr-fetch connections and
    /// tip probes get an evaluation deadline.
    pub fn insert_outbound(
        &self,
        socket: Option<Arc<TcpStream>>,
        endpoint: Endpoint,
        class: ConnectionClass,
        permit: Option<OwnedSemaphorePermit>,
        now: Timestamp,
        tip_probe: bool,
    ) -> Arc<Connection> {
        let id = self.allocate_id();
        let conn = Arc::new(Connection::new(
            id,
            endpoint,
            class,
            PermissionFlags::NONE,
            socket,
            permit,
            now,
        ));
        match class {
            ConnectionClass::Feeler => conn.mark_handshaken(),
            ConnectionClass::AddrFetch => {
                conn.arm_probe_deadline(now.saturating_add(self.timeouts.probe_eval));
            }
            ConnectionClass::OutboundBlockOnly if tip_probe => {
                conn.arm_probe_deadline(now.saturating_add(self.timeouts.probe_eval));
            }
            _ => {}
        }
        self.inner.lock().active.insert(id, Arc::clone(&conn));
        self.total_dialed.fetch_add(1, Ordering::Relaxed);
        debug!(peer = %id, endpoint = %endpoint, class = %class, "outbound connection registered");
        conn
    }

    /// Offer an accepted inbound stream. Past the cap, the weakest
    /// unprotected inbound peer is marked for eviction; if every peer is
    /// protected the newcomer is refused and its stream dropped by the
    /// caller.
    pub fn admit_inbound(
        &self,
        socket: Option<Arc<TcpStream>>,
        endpoint: Endpoint,
        permissions: PermissionFlags,
        now: Timestamp,
    ) -> AdmitResult {
        let mut inner = self.inner.lock();
        let inbound: Vec<Arc<Connection>> = inner
            .active
            .values()
            .filter(|c| c.class() == ConnectionClass::Inbound)
            .cloned()
            .collect();

        let evicted = if inbound
            .iter()
            .filter(|c| !c.is_disconnect_requested())
            .count()
            >= self.limits.max_inbound
        {
            match find_eviction_candidate(&inbound, now) {
                Some(victim_id) => {
                    if let Some(victim) = inner.active.get(&victim_id) {
                        victim.request_disconnect(DisconnectReason::Evicted);
                    }
                    self.total_evicted.fetch_add(1, Ordering::Relaxed);
                    Some(victim_id)
                }
                None => return AdmitResult::Rejected,
            }
        } else {
            None
        };

        let id = self.allocate_id();
        let conn = Arc::new(Connection::new(
            id,
            endpoint,
            ConnectionClass::Inbound,
            permissions,
            socket,
            None,
            now,
        ));
        inner.active.insert(id, conn);
        drop(inner);

        self.total_accepted.fetch_add(1, Ordering::Relaxed);
        match evicted {
            Some(evicted) => {
                debug!(peer = %id, endpoint = %endpoint, evicted = %evicted, "inbound admitted after eviction");
                AdmitResult::AcceptedAfterEviction { id, evicted }
            }
            None => {
                debug!(peer = %id, endpoint = %endpoint, "inbound admitted");
                AdmitResult::Accepted(id)
            }
        }
    }

    // === Access ===

    /// Lease an active or draining connection.
    pub fn lease(&self, id: ConnectionId) -> Option<ConnectionLease> {
        let inner = self.inner.lock();
        inner
            .active
            .get(&id)
            .cloned()
            .or_else(|| inner.draining.iter().find(|c| c.id() == id).cloned())
            .map(ConnectionLease::new)
    }

    /// Lease every active connection, for driver and dispatch sweeps.
    pub fn lease_active(&self) -> Vec<ConnectionLease> {
        self.inner
            .lock()
            .active
            .values()
            .cloned()
            .map(ConnectionLease::new)
            .collect()
    }

    pub fn request_disconnect(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        match self.inner.lock().active.get(&id) {
            Some(conn) => conn.request_disconnect(reason),
            None => false,
        }
    }

    pub fn is_connected(&self, endpoint: &Endpoint) -> bool {
        self.inner
            .lock()
            .active
            .values()
            .any(|c| c.endpoint() == *endpoint && !c.is_disconnect_requested())
    }

    /// Endpoints to exclude from address selection.
    pub fn connected_endpoints(&self) -> Vec<Endpoint> {
        self.inner
            .lock()
            .active
            .values()
            .map(|c| c.endpoint())
            .collect()
    }

    pub fn counts(&self) -> PoolCounts {
        let inner = self.inner.lock();
        let mut counts = PoolCounts {
            draining: inner.draining.len(),
            ..PoolCounts::default()
        };
        for conn in inner.active.values() {
            match conn.class() {
                ConnectionClass::OutboundFull => counts.outbound_full += 1,
                ConnectionClass::OutboundBlockOnly => {
                    if conn.probe_deadline().is_some() {
                        counts.tip_probes += 1;
                    } else {
                        counts.outbound_block_relay += 1;
                    }
                }
                ConnectionClass::Inbound => counts.inbound += 1,
                ConnectionClass::Manual => counts.manual += 1,
                ConnectionClass::Feeler => counts.feeler += 1,
                ConnectionClass::AddrFetch => counts.addr_fetch += 1,
            }
        }
        counts
    }

    /// Fully handshaken full/block-relay outbound peers; the seed
    /// bootstrapper stops once two of these exist.
    pub fn handshaken_relay_outbound(&self) -> usize {
        self.inner
            .lock()
            .active
            .values()
            .filter(|c| c.class().is_relay_outbound() && c.is_handshaken())
            .count()
    }

    /// Block-relay peers worth persisting as anchors: handshaken, not a
    /// transient tip probe.
    pub fn anchor_candidates(&self) -> Vec<Endpoint> {
        let mut anchors: Vec<(Timestamp, Endpoint)> = self
            .inner
            .lock()
            .active
            .values()
            .filter(|c| {
                c.class() == ConnectionClass::OutboundBlockOnly
                    && c.is_handshaken()
                    && c.probe_deadline().is_none()
                    && !c.is_disconnect_requested()
            })
            .map(|c| (c.created_at(), c.endpoint()))
            .collect();
        anchors.sort_by_key(|(created, _)| *created);
        anchors
            .into_iter()
            .map(|(_, endpoint)| endpoint)
            .take(self.limits.max_anchors)
            .collect()
    }

    /// Longest-lived full-relay peer, displaced when a stale tip forces a
    /// refresh of the outbound set.
    pub fn oldest_full_relay(&self) -> Option<ConnectionId> {
        self.inner
            .lock()
            .active
            .values()
            .filter(|c| {
                c.class() == ConnectionClass::OutboundFull && !c.is_disconnect_requested()
            })
            .min_by_key(|c| c.created_at())
            .map(|c| c.id())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            counts: self.counts(),
            handshaken_relay_outbound: self.handshaken_relay_outbound(),
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_dialed: self.total_dialed.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            sockets_closed: self.sockets_closed.load(Ordering::Relaxed),
        }
    }

    pub fn peer_snapshots(&self) -> Vec<PeerSnapshot> {
        self.inner
            .lock()
            .active
            .values()
            .map(|c| PeerSnapshot {
                id: c.id(),
                endpoint: c.endpoint(),
                class: c.class(),
                handshaken: c.is_handshaken(),
                created_at: c.created_at(),
                bytes_sent: c.bytes_sent(),
                bytes_received: c.bytes_received(),
            })
            .collect()
    }

    // === Maintenance ===

    /// One maintenance pass, three phases, each under its own short
    /// critical section:
    ///
    /// 1. policy sweep: network-disable fanout, probe deadlines, liveness
    ///    timeouts mark disconnect flags;
    /// 2. teardown: flagged connections leave the active set, their
    ///    admission unit is released, their socket is closed, and they
    ///    join the draining set;
    /// 3. finalize: draining entries with no leases left are removed and
    ///    reported for external cleanup.
    pub fn maintain(&self, now: Timestamp, network_active: bool) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        // Phase 1: mark.
        {
            let inner = self.inner.lock();
            for conn in inner.active.values() {
                if !network_active {
                    conn.request_disconnect(DisconnectReason::NetworkDisabled);
                    continue;
                }
                self.sweep_policies(conn, now);
            }
        }

        // Phase 2: drain. After this point no component touches the
        // socket; only the identity is used for bookkeeping.
        {
            let mut inner = self.inner.lock();
            let flagged: Vec<ConnectionId> = inner
                .active
                .values()
                .filter(|c| c.is_disconnect_requested())
                .map(|c| c.id())
                .collect();
            for id in flagged {
                if let Some(conn) = inner.active.remove(&id) {
                    conn.release_permit();
                    if conn.close_socket() {
                        self.sockets_closed.fetch_add(1, Ordering::Relaxed);
                    }
                    trace!(peer = %id, reason = ?conn.disconnect_reason(), "connection draining");
                    inner.draining.push(conn);
                    report.drained += 1;
                }
            }
        }

        // Phase 3: finalize whatever has no leases left.
        {
            let mut inner = self.inner.lock();
            let mut kept = Vec::with_capacity(inner.draining.len());
            for conn in inner.draining.drain(..) {
                if conn.lease_count() == 0 {
                    report.destroyed.push(DestructionRecord {
                        id: conn.id(),
                        endpoint: conn.endpoint(),
                        class: conn.class(),
                        handshaken: conn.is_handshaken(),
                        misbehaving: conn.is_misbehaving(),
                        reason: conn.disconnect_reason(),
                    });
                } else {
                    kept.push(conn);
                }
            }
            inner.draining = kept;
        }

        self.total_destroyed
            .fetch_add(report.destroyed.len() as u64, Ordering::Relaxed);
        report
    }

    /// Per-connection policy checks that can condemn a peer.
    fn sweep_policies(&self, conn: &Arc<Connection>, now: Timestamp) {
        if conn.is_disconnect_requested() {
            return;
        }
        // Feelers exist only to prove the address answers; done on
        // handshake.
        if conn.class() == ConnectionClass::Feeler && conn.is_handshaken() {
            conn.request_disconnect(DisconnectReason::ProbeDone);
            return;
        }
        // Tip probes and addr-fetch connections live until their deadline.
        if let Some(deadline) = conn.probe_deadline() {
            if now > deadline {
                conn.request_disconnect(DisconnectReason::ProbeDone);
                return;
            }
        }
        if !conn.is_handshaken()
            && conn.age_millis(now) > self.timeouts.handshake.as_millis() as u64
        {
            conn.request_disconnect(DisconnectReason::HandshakeTimeout);
            return;
        }
        if conn.idle_millis(now) > self.timeouts.inactivity.as_millis() as u64 {
            conn.request_disconnect(DisconnectReason::Inactivity);
        }
    }

    /// Tear everything down unconditionally, cycling maintenance until the
    /// draining set empties. Used by shutdown after the flows have exited,
    /// when no further leases can appear.
    pub fn drain_all(&self, now: Timestamp) -> Vec<DestructionRecord> {
        {
            let inner = self.inner.lock();
            for conn in inner.active.values() {
                conn.request_disconnect(DisconnectReason::Shutdown);
            }
        }
        let mut destroyed = Vec::new();
        loop {
            let report = self.maintain(now, true);
            let progress = report.drained > 0 || !report.destroyed.is_empty();
            destroyed.extend(report.destroyed);
            if !progress {
                break;
            }
        }
        destroyed
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self.counts();
        f.debug_struct("ConnectionPool")
            .field("counts", &counts)
            .finish()
    }
}

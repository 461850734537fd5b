//! The connection entity.
//!
//! A `Connection` is shared behind `Arc` between the pool, the socket
//! driver, and short-lived leases. All mutable state is interior: buffers
//! behind per-connection locks, flags as atomics. The socket slot holds
//! `None` once the pool has torn the stream down, which is the valid
//! "not open" sentinel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;

use crate::domain::types::{
    ConnectionClass, ConnectionId, Direction, DisconnectReason, Endpoint, PermissionFlags,
    Timestamp,
};

/// Outbound bytes awaiting flush: whole frames plus the write offset into
/// the frame at the front of the queue.
#[derive(Debug, Default)]
pub(crate) struct SendBuffer {
    pub(crate) queue: VecDeque<Vec<u8>>,
    pub(crate) offset: usize,
}

impl SendBuffer {
    fn queued_bytes(&self) -> usize {
        self.queue.iter().map(Vec::len).sum::<usize>() - self.offset
    }
}

/// A live peer connection.
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    class: ConnectionClass,
    permissions: PermissionFlags,
    created_at: Timestamp,

    /// The owned stream; `None` after teardown.
    socket: Mutex<Option<std::sync::Arc<TcpStream>>>,
    /// Admission unit held for the lifetime of the connection; dropped
    /// (released) when the pool tears the connection down.
    permit: Mutex<Option<OwnedSemaphorePermit>>,

    /// Raw inbound bytes not yet assembled into frames.
    pub(crate) recv_accum: Mutex<Vec<u8>>,
    /// Completed frames awaiting the dispatch flow.
    pub(crate) inbound_frames: Mutex<VecDeque<Vec<u8>>>,
    /// Outbound frames awaiting the socket driver.
    pub(crate) send: Mutex<SendBuffer>,

    disconnect_requested: AtomicBool,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
    handshaken: AtomicBool,
    misbehaving: AtomicBool,
    leases: AtomicUsize,

    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    last_send: AtomicU64,
    last_recv: AtomicU64,

    /// Deadline for extra block-relay probes; `None` for ordinary peers.
    probe_deadline: Mutex<Option<Timestamp>>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        endpoint: Endpoint,
        class: ConnectionClass,
        permissions: PermissionFlags,
        socket: Option<std::sync::Arc<TcpStream>>,
        permit: Option<OwnedSemaphorePermit>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            endpoint,
            class,
            permissions,
            created_at,
            socket: Mutex::new(socket),
            permit: Mutex::new(permit),
            recv_accum: Mutex::new(Vec::new()),
            inbound_frames: Mutex::new(VecDeque::new()),
            send: Mutex::new(SendBuffer::default()),
            disconnect_requested: AtomicBool::new(false),
            disconnect_reason: Mutex::new(None),
            handshaken: AtomicBool::new(false),
            misbehaving: AtomicBool::new(false),
            leases: AtomicUsize::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            last_send: AtomicU64::new(created_at.as_millis()),
            last_recv: AtomicU64::new(created_at.as_millis()),
            probe_deadline: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }

    pub fn direction(&self) -> Direction {
        self.class.direction()
    }

    pub fn permissions(&self) -> PermissionFlags {
        self.permissions
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    // === Socket slot ===

    /// Snapshot the stream handle for readiness polling and I/O.
    pub fn socket(&self) -> Option<std::sync::Arc<TcpStream>> {
        self.socket.lock().clone()
    }

    /// Close the socket slot. Idempotent: returns `true` only for the call
    /// that actually dropped the stream; closing an already-empty slot is
    /// a no-op, never an error.
    pub fn close_socket(&self) -> bool {
        self.socket.lock().take().is_some()
    }

    /// Release the held admission unit back to its semaphore, if any.
    pub(crate) fn release_permit(&self) {
        drop(self.permit.lock().take());
    }

    // === Disconnect protocol ===

    /// Mark for teardown. The first reason wins; later calls are no-ops.
    /// Returns `true` if this call set the flag.
    pub fn request_disconnect(&self, reason: DisconnectReason) -> bool {
        let newly = self
            .disconnect_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if newly {
            *self.disconnect_reason.lock() = Some(reason);
        }
        newly
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::Acquire)
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.disconnect_reason.lock()
    }

    // === Handshake and misbehavior flags ===

    pub fn mark_handshaken(&self) {
        self.handshaken.store(true, Ordering::Release);
    }

    pub fn is_handshaken(&self) -> bool {
        self.handshaken.load(Ordering::Acquire)
    }

    pub fn mark_misbehaving(&self) {
        self.misbehaving.store(true, Ordering::Release);
    }

    pub fn is_misbehaving(&self) -> bool {
        self.misbehaving.load(Ordering::Acquire)
    }

    // === Lease accounting ===

    pub(crate) fn acquire_lease(&self) {
        self.leases.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_lease(&self) {
        let previous = self.leases.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "lease count underflow");
    }

    pub fn lease_count(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }

    // === Buffers ===

    /// Append decoded frames for the dispatch flow.
    pub(crate) fn push_inbound_frames(&self, frames: Vec<Vec<u8>>) {
        if frames.is_empty() {
            return;
        }
        let mut queue = self.inbound_frames.lock();
        queue.extend(frames);
    }

    pub fn pop_inbound_frame(&self) -> Option<Vec<u8>> {
        self.inbound_frames.lock().pop_front()
    }

    pub fn has_inbound_frames(&self) -> bool {
        !self.inbound_frames.lock().is_empty()
    }

    /// Queue an encoded frame for the socket driver to flush.
    pub fn queue_send_frame(&self, frame: Vec<u8>) {
        self.send.lock().queue.push_back(frame);
    }

    pub fn has_queued_send(&self) -> bool {
        !self.send.lock().queue.is_empty()
    }

    pub fn queued_send_bytes(&self) -> usize {
        self.send.lock().queued_bytes()
    }

    // === Traffic accounting ===

    pub(crate) fn note_received(&self, bytes: usize, now: Timestamp) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_recv.store(now.as_millis(), Ordering::Relaxed);
    }

    pub(crate) fn note_sent(&self, bytes: usize, now: Timestamp) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_send.store(now.as_millis(), Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn last_recv(&self) -> Timestamp {
        Timestamp::from_millis(self.last_recv.load(Ordering::Relaxed))
    }

    pub fn last_send(&self) -> Timestamp {
        Timestamp::from_millis(self.last_send.load(Ordering::Relaxed))
    }

    /// Milliseconds since the most recent traffic in either direction.
    pub fn idle_millis(&self, now: Timestamp) -> u64 {
        let last = self
            .last_recv
            .load(Ordering::Relaxed)
            .max(self.last_send.load(Ordering::Relaxed));
        now.as_millis().saturating_sub(last)
    }

    pub fn age_millis(&self, now: Timestamp) -> u64 {
        now.millis_since(self.created_at)
    }

    // === Probe bookkeeping ===

    /// Arm the evaluation deadline for an extra block-relay probe.
    pub(crate) fn arm_probe_deadline(&self, deadline: Timestamp) {
        *self.probe_deadline.lock() = Some(deadline);
    }

    pub fn probe_deadline(&self) -> Option<Timestamp> {
        *self.probe_deadline.lock()
    }

    /// Record that this probe produced fresh tip information, granting it
    /// one more evaluation window before teardown.
    pub fn note_tip_information(&self, now: Timestamp, eval_window: std::time::Duration) -> bool {
        let mut deadline = self.probe_deadline.lock();
        match *deadline {
            Some(current) if now <= current => {
                *deadline = Some(now.saturating_add(eval_window));
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("class", &self.class)
            .field("handshaken", &self.is_handshaken())
            .field("disconnect_requested", &self.is_disconnect_requested())
            .field("leases", &self.lease_count())
            .finish()
    }
}

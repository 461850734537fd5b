//! Core value types shared across the connection manager.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// A network endpoint: address family, IP bytes, and port.
///
/// Immutable value type; equality and hashing are by byte content, so two
/// endpoints compare equal iff they name the same address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    ip: IpAddr,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from an IP address and port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Wildcard IPv4 endpoint (`0.0.0.0:port`).
    pub fn wildcard_v4(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }

    /// Wildcard IPv6 endpoint (`[::]:port`).
    pub fn wildcard_v6(port: u16) -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip.is_ipv6()
    }

    /// True for addresses that are not routable on the public internet:
    /// loopback, unspecified, RFC 1918 / link-local IPv4, and the
    /// unique-local / link-local IPv6 ranges.
    pub fn is_local(&self) -> bool {
        match self.ip {
            IpAddr::V4(v4) => {
                v4.is_loopback() || v4.is_unspecified() || v4.is_private() || v4.is_link_local()
            }
            IpAddr::V6(v6) => {
                let seg = v6.segments();
                v6.is_loopback()
                    || v6.is_unspecified()
                    // fc00::/7 unique-local
                    || (seg[0] & 0xfe00) == 0xfc00
                    // fe80::/10 link-local
                    || (seg[0] & 0xffc0) == 0xfe80
            }
        }
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_socket_addr())
    }
}

/// Identity number of a connection.
///
/// Assigned monotonically by the pool and never reused, so a stale id can
/// never alias a newer peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side initiated the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We dialed the remote endpoint.
    Outbound,
    /// The remote endpoint dialed us.
    Inbound,
}

/// The role a connection plays, fixed at creation.
///
/// Manual and feeler/addr-fetch connections are excluded from the general
/// outbound admission limits; feeler and addr-fetch connections are never
/// recorded as successful peers unless they complete their handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    /// Full-relay outbound peer (blocks, transactions, address gossip).
    OutboundFull,
    /// Block-relay-only outbound peer; relays blocks but no transaction or
    /// address gossip, reducing topology leakage.
    OutboundBlockOnly,
    /// Accepted inbound peer.
    Inbound,
    /// Operator-requested outbound peer; exempt from automatic limits.
    Manual,
    /// Short-lived liveness probe; disconnected right after the transport
    /// handshake completes and never used for application traffic.
    Feeler,
    /// Short-lived connection opened only to fetch addresses from a seed.
    AddrFetch,
}

impl ConnectionClass {
    pub fn direction(&self) -> Direction {
        match self {
            ConnectionClass::Inbound => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }

    /// Classes admitted through the general outbound semaphore.
    pub fn uses_general_semaphore(&self) -> bool {
        matches!(
            self,
            ConnectionClass::OutboundFull | ConnectionClass::OutboundBlockOnly
        )
    }

    /// Classes admitted through the manual/probe semaphore.
    pub fn uses_manual_semaphore(&self) -> bool {
        matches!(
            self,
            ConnectionClass::Manual | ConnectionClass::Feeler | ConnectionClass::AddrFetch
        )
    }

    /// Counts toward the "enough outbound peers" checks used by the seed
    /// bootstrapper and the dial policy.
    pub fn is_relay_outbound(&self) -> bool {
        matches!(
            self,
            ConnectionClass::OutboundFull | ConnectionClass::OutboundBlockOnly
        )
    }

    /// Probe classes are transient by design and never become anchors.
    pub fn is_probe(&self) -> bool {
        matches!(self, ConnectionClass::Feeler | ConnectionClass::AddrFetch)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionClass::OutboundFull => "outbound-full",
            ConnectionClass::OutboundBlockOnly => "block-relay",
            ConnectionClass::Inbound => "inbound",
            ConnectionClass::Manual => "manual",
            ConnectionClass::Feeler => "feeler",
            ConnectionClass::AddrFetch => "addr-fetch",
        }
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-listener permission flags stamped onto accepted connections.
///
/// The core carries these but does not interpret them; the protocol handler
/// decides what they mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionFlags {
    /// Peer is exempt from inbound eviction and misbehavior-based bans.
    pub no_ban: bool,
    /// Peer's relay traffic is always accepted.
    pub force_relay: bool,
}

impl PermissionFlags {
    pub const NONE: PermissionFlags = PermissionFlags {
        no_ban: false,
        force_relay: false,
    };
}

/// Why a connection was marked for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote end closed the stream (zero-byte read).
    RemoteClosed,
    /// A send or receive failed on the socket.
    IoError,
    /// The external protocol handler reported misbehavior.
    Misbehavior,
    /// Network activity was administratively disabled.
    NetworkDisabled,
    /// The node is shutting down.
    Shutdown,
    /// Evicted to make room for a new inbound peer.
    Evicted,
    /// A liveness probe that served its purpose.
    ProbeDone,
    /// Handshake did not complete within the configured window.
    HandshakeTimeout,
    /// No traffic within the inactivity window.
    Inactivity,
    /// Replaced while refreshing the outbound set against a stale tip.
    StaleTipReplaced,
    /// Explicitly requested by the operator.
    Requested,
}

impl DisconnectReason {
    pub fn label(&self) -> &'static str {
        match self {
            DisconnectReason::RemoteClosed => "remote closed",
            DisconnectReason::IoError => "io error",
            DisconnectReason::Misbehavior => "misbehavior",
            DisconnectReason::NetworkDisabled => "network disabled",
            DisconnectReason::Shutdown => "shutdown",
            DisconnectReason::Evicted => "evicted",
            DisconnectReason::ProbeDone => "probe done",
            DisconnectReason::HandshakeTimeout => "handshake timeout",
            DisconnectReason::Inactivity => "inactivity",
            DisconnectReason::StaleTipReplaced => "stale tip replaced",
            DisconnectReason::Requested => "requested",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Millisecond-resolution wall-clock timestamp.
///
/// Plain data so policy code can be driven by a fake clock in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(&self, delta: std::time::Duration) -> Self {
        Self(self.0.saturating_add(delta.as_millis() as u64))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is later.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

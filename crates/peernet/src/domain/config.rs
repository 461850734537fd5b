//! Connection manager configuration.
//!
//! Defaults reflect production values; `for_testing()` shrinks every limit
//! and delay so integration tests run in milliseconds.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::errors::NetError;
use crate::domain::types::{Endpoint, PermissionFlags};

/// Default listen port when no bind endpoints are configured.
pub const DEFAULT_PORT: u16 = 9333;

/// One explicit bind endpoint plus the permissions granted to peers
/// accepted through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindEndpoint {
    pub endpoint: Endpoint,
    pub permissions: PermissionFlags,
}

impl BindEndpoint {
    pub fn plain(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            permissions: PermissionFlags::NONE,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Whether to open listening sockets at all.
    pub enabled: bool,
    /// Explicit bind endpoints. Empty means "bind wildcard IPv6 and IPv4
    /// at `port`".
    pub bind: Vec<BindEndpoint>,
    /// Port used for the wildcard binds.
    pub port: u16,
    /// Listen backlog passed to the platform.
    pub backlog: i32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: Vec::new(),
            port: DEFAULT_PORT,
            backlog: 1024,
        }
    }
}

/// Per-class connection caps.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    /// Full-relay outbound peers. The automatic connector never exceeds
    /// this count.
    pub max_outbound_full: usize,
    /// Block-relay-only outbound peers.
    pub max_outbound_block_relay: usize,
    /// Inbound peers; past this the pool evicts or refuses.
    pub max_inbound: usize,
    /// Capacity of the manual/probe admission semaphore.
    pub max_manual: usize,
    /// Anchors captured at shutdown and redialed at startup.
    pub max_anchors: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_outbound_full: 8,
            max_outbound_block_relay: 2,
            max_inbound: 114,
            max_manual: 8,
            max_anchors: 2,
        }
    }
}

impl ConnectionLimits {
    /// Capacity of the general outbound semaphore: both relay classes plus
    /// one slot reserved for transient probes so a stuck probe can never
    /// starve the relay set.
    pub fn general_semaphore_capacity(&self) -> usize {
        self.max_outbound_full + self.max_outbound_block_relay + 1
    }
}

/// Timing knobs for the worker flows.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Multiplexer poll timeout; also the socket flow tick. Kept sub-second
    /// so maintenance and shutdown checks run even with zero events.
    pub io_poll: Duration,
    /// Outbound connector tick; at most one dial decision per tick.
    pub connector_tick: Duration,
    /// Interval between manual-target redial passes.
    pub manual_retry: Duration,
    /// Dial timeout for a single outbound connect.
    pub dial: Duration,
    /// Disconnect a peer whose handshake has not completed in this window.
    pub handshake: Duration,
    /// Disconnect a peer with no traffic for this long.
    pub inactivity: Duration,
    /// Dispatch flow idle wait when no frames and no outbound work exist.
    pub dispatch_idle: Duration,
    /// How long an extra block-relay probe gets to produce fresh tip
    /// information before it is torn down.
    pub probe_eval: Duration,
    /// Mean of the Poisson schedule for feeler connections.
    pub feeler_interval: Duration,
    /// Mean of the Poisson schedule for extra block-relay probes.
    pub extra_probe_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            io_poll: Duration::from_millis(50),
            connector_tick: Duration::from_millis(500),
            manual_retry: Duration::from_secs(30),
            dial: Duration::from_secs(5),
            handshake: Duration::from_secs(20),
            inactivity: Duration::from_secs(20 * 60),
            dispatch_idle: Duration::from_millis(100),
            probe_eval: Duration::from_secs(30),
            feeler_interval: Duration::from_secs(120),
            extra_probe_interval: Duration::from_secs(300),
        }
    }
}

/// Seed bootstrapping configuration.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Hardcoded seed host names, queried in shuffled order.
    pub hosts: Vec<String>,
    /// Port assumed for seed-provided peers and addr-fetch dials.
    pub port: u16,
    /// Maximum addresses accepted from a single seed, bounding the damage
    /// a compromised seed operator can do to the address pool.
    pub max_per_seed: usize,
    /// Above this many known addresses, seed queries use the long spacing.
    pub many_addresses_threshold: usize,
    /// At this many known addresses the bootstrapper does not run at all.
    pub sufficient_addresses: usize,
    /// Spacing between seed queries while the address pool is small.
    pub short_delay: Duration,
    /// Spacing between seed queries once the pool is well populated.
    pub long_delay: Duration,
    /// Degrade to addr-fetch connections instead of name resolution, as
    /// when running behind a forwarding proxy or when the seed service
    /// cannot filter by capability bits.
    pub use_addr_fetch: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "seed.peernet.example.com".to_string(),
                "seed2.peernet.example.com".to_string(),
                "dnsseed.peernet-hosts.net".to_string(),
            ],
            port: DEFAULT_PORT,
            max_per_seed: 256,
            many_addresses_threshold: 1000,
            sufficient_addresses: 10_000,
            short_delay: Duration::from_secs(11),
            long_delay: Duration::from_secs(5 * 60),
            use_addr_fetch: false,
        }
    }
}

/// Multiplexer strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerStrategy {
    /// Probe at startup and pick the best supported strategy.
    Auto,
    /// Force the unbounded readiness strategy.
    Readiness,
    /// Force the bounded scan strategy.
    Scan,
}

/// Top-level configuration handed to the service at startup.
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub listen: ListenConfig,
    pub limits: ConnectionLimits,
    pub timeouts: TimeoutConfig,
    pub seeds: SeedConfig,
    /// If non-empty, the connector dials exactly these (class manual) and
    /// runs none of the automatic outbound logic.
    pub connect_only: Vec<Endpoint>,
    /// Operator-maintained manual targets, redialed while unconnected.
    pub manual_targets: Vec<Endpoint>,
    /// Permit dialing loopback/private addresses. Off in production so the
    /// selection blocklist drops local networks; tests turn it on.
    pub allow_local: bool,
    /// Multiplexer strategy override.
    pub multiplexer: MultiplexerStrategy,
    /// Working-set cap for the bounded scan strategy.
    pub scan_max_sockets: usize,
    /// Upper bound on a single framed message.
    pub max_frame_size: usize,
    /// Directory for the address database and anchors files; `None`
    /// disables persistence.
    pub data_dir: Option<PathBuf>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            limits: ConnectionLimits::default(),
            timeouts: TimeoutConfig::default(),
            seeds: SeedConfig::default(),
            connect_only: Vec::new(),
            manual_targets: Vec::new(),
            allow_local: false,
            multiplexer: MultiplexerStrategy::Auto,
            scan_max_sockets: 64,
            max_frame_size: 4 * 1024 * 1024,
            data_dir: None,
        }
    }
}

impl NetConfig {
    /// Small limits and millisecond delays for tests.
    pub fn for_testing() -> Self {
        Self {
            listen: ListenConfig {
                enabled: false,
                bind: Vec::new(),
                port: 0,
                backlog: 16,
            },
            limits: ConnectionLimits {
                max_outbound_full: 3,
                max_outbound_block_relay: 1,
                max_inbound: 5,
                max_manual: 3,
                max_anchors: 2,
            },
            timeouts: TimeoutConfig {
                io_poll: Duration::from_millis(10),
                connector_tick: Duration::from_millis(20),
                manual_retry: Duration::from_millis(50),
                dial: Duration::from_millis(500),
                handshake: Duration::from_secs(5),
                inactivity: Duration::from_secs(60),
                dispatch_idle: Duration::from_millis(10),
                probe_eval: Duration::from_millis(200),
                feeler_interval: Duration::from_millis(300),
                extra_probe_interval: Duration::from_millis(700),
            },
            seeds: SeedConfig {
                hosts: Vec::new(),
                port: 0,
                max_per_seed: 8,
                many_addresses_threshold: 1000,
                sufficient_addresses: 10_000,
                short_delay: Duration::from_millis(20),
                long_delay: Duration::from_millis(200),
                use_addr_fetch: false,
            },
            connect_only: Vec::new(),
            manual_targets: Vec::new(),
            allow_local: true,
            multiplexer: MultiplexerStrategy::Auto,
            scan_max_sockets: 8,
            max_frame_size: 64 * 1024,
            data_dir: None,
        }
    }

    /// Reject configurations that cannot work before any socket is opened.
    pub fn validate(&self) -> Result<(), NetError> {
        if self.limits.max_outbound_full == 0 && self.connect_only.is_empty() {
            return Err(NetError::Config(
                "max_outbound_full must be at least 1 without connect-only targets".into(),
            ));
        }
        if self.limits.max_manual == 0 {
            return Err(NetError::Config("max_manual must be at least 1".into()));
        }
        if self.max_frame_size == 0 {
            return Err(NetError::Config("max_frame_size must be non-zero".into()));
        }
        if self.scan_max_sockets == 0 {
            return Err(NetError::Config("scan_max_sockets must be non-zero".into()));
        }
        if self.timeouts.io_poll > Duration::from_secs(1) {
            return Err(NetError::Config(
                "io_poll must stay sub-second so shutdown checks keep running".into(),
            ));
        }
        if self.listen.enabled && self.listen.bind.is_empty() && self.listen.port == 0 {
            return Err(NetError::Config(
                "wildcard listening requires a non-zero port".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(NetConfig::default().validate().is_ok());
        assert!(NetConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn semaphore_capacity_reserves_a_probe_slot() {
        let limits = ConnectionLimits::default();
        assert_eq!(
            limits.general_semaphore_capacity(),
            limits.max_outbound_full + limits.max_outbound_block_relay + 1
        );
    }

    #[test]
    fn oversized_poll_timeout_is_rejected() {
        let mut config = NetConfig::for_testing();
        config.timeouts.io_poll = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_full_cap_requires_connect_only() {
        let mut config = NetConfig::for_testing();
        config.limits.max_outbound_full = 0;
        assert!(config.validate().is_err());

        config.connect_only = vec![Endpoint::new("127.0.0.1".parse().unwrap(), 1)];
        assert!(config.validate().is_ok());
    }
}

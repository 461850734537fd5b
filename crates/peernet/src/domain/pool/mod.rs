//! Connection pool: active set, draining set, leases, and maintenance.

mod eviction;
mod lease;
mod manager;

pub use lease::ConnectionLease;
pub use manager::{
    AdmitResult, ConnectionPool, DestructionRecord, MaintenanceReport, PeerSnapshot, PoolCounts,
    PoolStats,
};

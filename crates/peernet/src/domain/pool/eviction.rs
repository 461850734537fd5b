//! Inbound eviction policy.
//!
//! When the inbound cap is reached, a newcomer may displace the weakest
//! existing inbound peer, never an outbound one. Half of the candidates
//! with the longest uptime are protected, which keeps an attacker from
//! churning fresh connections until it owns every inbound slot.

use std::sync::Arc;

use crate::domain::connection::Connection;
use crate::domain::types::{ConnectionId, Timestamp};

/// Pick the inbound connection to evict, or `None` when every candidate is
/// protected and the newcomer should be refused instead.
pub(crate) fn find_eviction_candidate(
    inbound: &[Arc<Connection>],
    now: Timestamp,
) -> Option<ConnectionId> {
    let mut candidates: Vec<&Arc<Connection>> = inbound
        .iter()
        .filter(|conn| !conn.is_disconnect_requested() && !conn.permissions().no_ban)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    // Longest-connected half is protected.
    candidates.sort_by_key(|conn| conn.age_millis(now));
    let unprotected = candidates.len() / 2;
    if unprotected == 0 {
        return None;
    }
    candidates.truncate(unprotected);

    // Among the rest, drop the most silent peer.
    candidates
        .into_iter()
        .max_by_key(|conn| (conn.idle_millis(now), conn.id().0))
        .map(|conn| conn.id())
}

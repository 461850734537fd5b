//! Scoped access to pool-owned connections.

use std::ops::Deref;
use std::sync::Arc;

use crate::domain::connection::Connection;

/// A counted lease on a connection.
///
/// The pool is the sole owner of connection lifetime; every other component
/// works through a lease. While at least one lease is out, the pool keeps
/// the connection parked in the draining set instead of finalizing it. The
/// count is released on drop, so every exit path (including panics
/// unwinding) gives the lease back.
pub struct ConnectionLease {
    conn: Arc<Connection>,
}

impl ConnectionLease {
    pub(crate) fn new(conn: Arc<Connection>) -> Self {
        conn.acquire_lease();
        Self { conn }
    }
}

impl Deref for ConnectionLease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Clone for ConnectionLease {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.conn))
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.conn.release_lease();
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionLease").field(&self.conn.id()).finish()
    }
}

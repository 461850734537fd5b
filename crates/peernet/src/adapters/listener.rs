//! TCP listener set.
//!
//! Sockets are prepared through `socket2` so reuse-address and v6-only are
//! applied before `bind`, then handed to tokio nonblocking. With no explicit
//! bind endpoints the set binds wildcard IPv6 and wildcard IPv4 at the
//! configured port; v6-only keeps the two wildcards from colliding. Binding
//! nothing at all while listening was requested is a hard startup failure.

use std::io;
use std::net::SocketAddr;

use futures::FutureExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::domain::config::{BindEndpoint, ListenConfig};
use crate::domain::errors::StartupError;
use crate::domain::types::{Endpoint, PermissionFlags};

/// One accepted socket, not yet admitted to the pool.
pub struct AcceptedSocket {
    pub stream: TcpStream,
    pub remote: Endpoint,
    pub permissions: PermissionFlags,
}

struct BoundListener {
    endpoint: Endpoint,
    permissions: PermissionFlags,
    listener: TcpListener,
}

/// The set of bound listening sockets. Empty when listening is disabled.
pub struct ListenerSet {
    listeners: Vec<BoundListener>,
}

impl ListenerSet {
    /// Binds every configured endpoint. Individual failures are logged and
    /// tolerated; zero successful binds with listening enabled is fatal.
    pub fn bind(config: &ListenConfig) -> Result<Self, StartupError> {
        if !config.enabled {
            return Ok(Self {
                listeners: Vec::new(),
            });
        }

        let targets: Vec<BindEndpoint> = if config.bind.is_empty() {
            vec![
                BindEndpoint::plain(Endpoint::wildcard_v6(config.port)),
                BindEndpoint::plain(Endpoint::wildcard_v4(config.port)),
            ]
        } else {
            config.bind.clone()
        };

        let mut listeners = Vec::new();
        let mut last_error = String::from("no bind endpoints configured");
        for target in &targets {
            match bind_one(target.endpoint, config.backlog) {
                Ok(listener) => {
                    let local = listener
                        .local_addr()
                        .map(Endpoint::from)
                        .unwrap_or(target.endpoint);
                    info!(endpoint = %local, "listening");
                    listeners.push(BoundListener {
                        endpoint: local,
                        permissions: target.permissions,
                        listener,
                    });
                }
                Err(err) => {
                    warn!(endpoint = %target.endpoint, error = %err, "bind failed");
                    last_error = err.to_string();
                }
            }
        }

        if listeners.is_empty() {
            return Err(StartupError::NoListenEndpoint { last: last_error });
        }
        Ok(Self { listeners })
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.listeners.iter().map(|l| l.endpoint).collect()
    }

    /// Drains every connection already completed by the platform. Never
    /// blocks; called each I/O tick.
    pub fn accept_ready(&self) -> Vec<AcceptedSocket> {
        let mut accepted = Vec::new();
        for bound in &self.listeners {
            loop {
                match bound.listener.accept().now_or_never() {
                    Some(Ok((stream, remote))) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            debug!(%remote, error = %err, "set_nodelay failed");
                        }
                        debug!(%remote, local = %bound.endpoint, "accepted");
                        accepted.push(AcceptedSocket {
                            stream,
                            remote: Endpoint::from(remote),
                            permissions: bound.permissions,
                        });
                    }
                    Some(Err(err)) => {
                        // Transient per-accept failures (e.g. the peer reset
                        // before we got to it) must not stop the listener.
                        debug!(local = %bound.endpoint, error = %err, "accept failed");
                        break;
                    }
                    None => break,
                }
            }
        }
        accepted
    }
}

fn bind_one(endpoint: Endpoint, backlog: i32) -> io::Result<TcpListener> {
    let addr: SocketAddr = endpoint.to_socket_addr();
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    TcpListener::from_std(socket.into())
}

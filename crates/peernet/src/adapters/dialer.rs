//! Outbound TCP dialing.
//!
//! Dials are bounded by the configured timeout and every platform error is
//! normalized to a `DialFailure` so the connector can log and move on
//! without inspecting `io::Error` internals. Established streams get
//! nodelay plus a conservative keepalive (first probe after 60s idle, 30s
//! between probes) so half-dead peers are noticed even when the protocol
//! above is quiet.

use std::io;
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::domain::errors::DialFailure;
use crate::domain::types::Endpoint;

const KEEPALIVE_IDLE: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Dials endpoints on behalf of the connector flows.
#[derive(Debug, Clone, Copy)]
pub struct Dialer {
    timeout: Duration,
}

impl Dialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn dial(&self, endpoint: Endpoint) -> Result<TcpStream, DialFailure> {
        let addr = endpoint.to_socket_addr();
        let socket = if addr.is_ipv6() {
            TcpSocket::new_v6()
        } else {
            TcpSocket::new_v4()
        }
        .map_err(|err| DialFailure::from_io(&err))?;

        let stream = match tokio::time::timeout(self.timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(DialFailure::from_io(&err)),
            Err(_) => return Err(DialFailure::TimedOut),
        };

        match tune_stream(stream) {
            Ok(stream) => Ok(stream),
            Err(err) => {
                debug!(%endpoint, error = %err, "socket tuning failed");
                Err(DialFailure::from_io(&err))
            }
        }
    }
}

/// Applies nodelay and keepalive. Keepalive needs a round trip through
/// `socket2` because tokio does not expose it directly.
fn tune_stream(stream: TcpStream) -> io::Result<TcpStream> {
    stream.set_nodelay(true)?;
    let socket = socket2::Socket::from(stream.into_std()?);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL);
    socket.set_tcp_keepalive(&keepalive)?;
    TcpStream::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_reaches_a_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dialer = Dialer::new(Duration::from_secs(2));

        let dialed = dialer.dial(Endpoint::from(addr));
        let (stream, (accepted, _)) = tokio::join!(dialed, async {
            listener.accept().await.unwrap()
        });
        let stream = stream.unwrap();
        assert_eq!(
            stream.peer_addr().unwrap().port(),
            accepted.local_addr().unwrap().port()
        );
    }

    #[tokio::test]
    async fn test_refused_dial_is_normalized() {
        // Bind then drop to find a port with nothing behind it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = Dialer::new(Duration::from_secs(2));
        let outcome = dialer.dial(Endpoint::from(addr)).await;
        assert_eq!(outcome.unwrap_err(), DialFailure::Refused);
    }

    #[tokio::test]
    async fn test_unroutable_dial_times_out() {
        // RFC 5737 TEST-NET-1, guaranteed unrouted.
        let dialer = Dialer::new(Duration::from_millis(100));
        let outcome = dialer
            .dial(Endpoint::new("192.0.2.1".parse().unwrap(), 9333))
            .await;
        let err = outcome.unwrap_err();
        assert!(
            matches!(err, DialFailure::TimedOut | DialFailure::Unreachable),
            "unexpected failure kind: {err:?}"
        );
    }
}

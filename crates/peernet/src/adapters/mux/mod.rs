//! Event multiplexer strategies.
//!
//! Two interchangeable implementations of the same port: the
//! readiness-driven strategy for platforms with a working reactor, and a
//! bounded scanning fallback. `select_multiplexer` picks one at startup by
//! probing the readiness path on a loopback socket.

mod readiness;
mod scan;

pub use readiness::ReadinessMultiplexer;
pub use scan::ScanMultiplexer;

use std::time::Duration;

use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::domain::config::MultiplexerStrategy;
use crate::ports::outbound::EventMultiplexer;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Exercises reactor-driven readiness on a loopback pair. A fresh connected
/// socket must report writable almost immediately; anything else means the
/// readiness path cannot be trusted here.
async fn readiness_probe() -> bool {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(_) => return false,
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    let stream = match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        _ => return false,
    };
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, stream.ready(Interest::WRITABLE)).await,
        Ok(Ok(ready)) if ready.is_writable()
    )
}

/// Chooses the poll strategy once, at startup.
pub async fn select_multiplexer(
    strategy: MultiplexerStrategy,
    scan_max_sockets: usize,
) -> Box<dyn EventMultiplexer> {
    let selected: Box<dyn EventMultiplexer> = match strategy {
        MultiplexerStrategy::Readiness => Box::new(ReadinessMultiplexer::new()),
        MultiplexerStrategy::Scan => Box::new(ScanMultiplexer::new(scan_max_sockets)),
        MultiplexerStrategy::Auto => {
            if readiness_probe().await {
                Box::new(ReadinessMultiplexer::new())
            } else {
                warn!("readiness probe failed, falling back to bounded scanning");
                Box::new(ScanMultiplexer::new(scan_max_sockets))
            }
        }
    };
    info!(strategy = selected.name(), "multiplexer selected");
    selected
}

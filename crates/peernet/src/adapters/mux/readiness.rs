//! Readiness-driven multiplexer.
//!
//! Registers every interested socket with the runtime reactor and waits for
//! the first readiness event, then sweeps up whatever else completed in the
//! same instant. Scales with the number of *ready* sockets per tick, not the
//! number of open ones, so it carries an unbounded peer set.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::io::{Interest, Ready};

use crate::domain::types::ConnectionId;
use crate::ports::outbound::{EventMultiplexer, PollReport, StreamInterest};

type ReadyFuture = Pin<Box<dyn Future<Output = (ConnectionId, std::io::Result<Ready>)> + Send>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReadinessMultiplexer;

impl ReadinessMultiplexer {
    pub fn new() -> Self {
        Self
    }
}

fn record(report: &mut PollReport, id: ConnectionId, outcome: std::io::Result<Ready>) {
    match outcome {
        Ok(ready) => {
            if ready.is_error() {
                report.errored.push(id);
            }
            // Closed halves are surfaced as readiness so the read/write
            // paths observe the EOF or the reset themselves.
            if ready.is_readable() || ready.is_read_closed() {
                report.readable.push(id);
            }
            if ready.is_writable() || ready.is_write_closed() {
                report.writable.push(id);
            }
        }
        Err(_) => report.errored.push(id),
    }
}

#[async_trait]
impl EventMultiplexer for ReadinessMultiplexer {
    fn name(&self) -> &'static str {
        "readiness"
    }

    async fn poll(&self, interest: &[StreamInterest], timeout: Duration) -> PollReport {
        let mut report = PollReport::default();
        if interest.is_empty() {
            tokio::time::sleep(timeout).await;
            return report;
        }

        let mut pending: FuturesUnordered<ReadyFuture> = FuturesUnordered::new();
        for item in interest {
            let mut wanted = Interest::ERROR;
            if item.read {
                wanted = wanted | Interest::READABLE;
            }
            if item.write {
                wanted = wanted | Interest::WRITABLE;
            }
            let id = item.id;
            let socket = item.socket.clone();
            pending.push(Box::pin(async move {
                let outcome = socket.ready(wanted).await;
                (id, outcome)
            }));
        }

        match tokio::time::timeout(timeout, pending.next()).await {
            Err(_) | Ok(None) => return report,
            Ok(Some((id, outcome))) => record(&mut report, id, outcome),
        }

        // Anything else that completed in the same moment is free to take.
        while let Some(Some((id, outcome))) = pending.next().now_or_never() {
            record(&mut report, id, outcome);
        }
        report
    }
}

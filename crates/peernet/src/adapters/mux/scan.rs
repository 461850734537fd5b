//! Bounded scanning multiplexer.
//!
//! Fallback for environments where reactor registration misbehaves. Probes
//! sockets in fixed-size windows, sleeping a short slice between rounds
//! until the tick timeout runs out. Each round advances the window so every
//! socket is visited even when the interest set is larger than the window;
//! the rotation also keeps one busy region from shadowing the rest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::Interest;
use tokio::time::Instant;

use crate::ports::outbound::{EventMultiplexer, PollReport, StreamInterest};

const SCAN_SLICE: Duration = Duration::from_millis(5);

pub struct ScanMultiplexer {
    max_sockets: usize,
    cursor: AtomicUsize,
}

impl ScanMultiplexer {
    pub fn new(max_sockets: usize) -> Self {
        Self {
            max_sockets: max_sockets.max(1),
            cursor: AtomicUsize::new(0),
        }
    }

    fn probe_round(&self, interest: &[StreamInterest], report: &mut PollReport) {
        let window = self.max_sockets.min(interest.len());
        let start = self.cursor.fetch_add(window, Ordering::Relaxed);
        for slot in 0..window {
            let item = &interest[(start + slot) % interest.len()];
            let mut wanted = Interest::ERROR;
            if item.read {
                wanted = wanted | Interest::READABLE;
            }
            if item.write {
                wanted = wanted | Interest::WRITABLE;
            }
            match item.socket.ready(wanted).now_or_never() {
                Some(Ok(ready)) => {
                    if ready.is_error() {
                        report.errored.push(item.id);
                    }
                    if ready.is_readable() || ready.is_read_closed() {
                        report.readable.push(item.id);
                    }
                    if ready.is_writable() || ready.is_write_closed() {
                        report.writable.push(item.id);
                    }
                }
                Some(Err(_)) => report.errored.push(item.id),
                None => {}
            }
        }
    }
}

#[async_trait]
impl EventMultiplexer for ScanMultiplexer {
    fn name(&self) -> &'static str {
        "scan"
    }

    async fn poll(&self, interest: &[StreamInterest], timeout: Duration) -> PollReport {
        let deadline = Instant::now() + timeout;
        let mut report = PollReport::default();
        if interest.is_empty() {
            tokio::time::sleep(timeout).await;
            return report;
        }

        loop {
            self.probe_round(interest, &mut report);
            if !report.is_empty() {
                return report;
            }
            let now = Instant::now();
            if now >= deadline {
                return report;
            }
            tokio::time::sleep(SCAN_SLICE.min(deadline - now)).await;
        }
    }
}

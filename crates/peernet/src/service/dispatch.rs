//! Message dispatch flow.
//!
//! Hands complete inbound frames to the protocol handler, one frame per
//! peer per pass so a chatty peer cannot monopolize the flow. Sleeps only
//! when no peer has queued frames and the handler reports no pending
//! outbound work; the socket flow's wakeup cuts the sleep short.

use std::sync::Arc;

use tracing::info;

use crate::domain::shutdown::{ShutdownListener, ShutdownStage};
use crate::service::context::NetContext;

pub(crate) async fn dispatch_flow(ctx: Arc<NetContext>, mut shutdown: ShutdownListener) {
    info!("dispatch flow started");
    while !shutdown.message_processing_stopped() {
        let mut more_work = false;
        for lease in ctx.pool.lease_active() {
            if shutdown.message_processing_stopped() {
                break;
            }
            if lease.is_disconnect_requested() {
                continue;
            }
            if let Some(frame) = lease.pop_inbound_frame() {
                let more = ctx.handler.process_inbound(lease.id(), &frame).await;
                more_work |= more || lease.has_inbound_frames();
            }
        }
        if shutdown.message_processing_stopped() {
            break;
        }

        let outbound_pending = ctx
            .pool
            .lease_active()
            .iter()
            .any(|lease| ctx.handler.has_outbound_work(lease.id()));
        if more_work || outbound_pending {
            tokio::task::yield_now().await;
            continue;
        }
        tokio::select! {
            _ = ctx.dispatch_wakeup.notified() => {}
            _ = tokio::time::sleep(ctx.config.timeouts.dispatch_idle) => {}
            _ = shutdown.reached(ShutdownStage::MessageProcessingStopped) => break,
        }
    }
    info!("dispatch flow stopped");
}

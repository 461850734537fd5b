//! Socket I/O flow.
//!
//! One tick: accept whatever the listeners completed, poll the multiplexer
//! over every live socket, move bytes for the ready ones, then run pool
//! maintenance. The poll timeout doubles as the tick period, so maintenance
//! and the shutdown check run even on a silent network. All per-peer
//! failures stay per-peer; nothing here aborts the loop.

use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::listener::{AcceptedSocket, ListenerSet};
use crate::domain::errors::PeerIoError;
use crate::domain::framing::extract_frames;
use crate::domain::pool::AdmitResult;
use crate::domain::shutdown::ShutdownListener;
use crate::domain::types::{ConnectionId, DisconnectReason, Timestamp};
use crate::ports::outbound::{EventMultiplexer, StreamInterest};
use crate::service::context::NetContext;

/// Upper bound on one receive pass per readable socket per tick, so a
/// firehose peer cannot monopolize the flow.
const READ_CHUNK: usize = 0x10000;

pub(crate) async fn io_flow(
    ctx: Arc<NetContext>,
    listeners: ListenerSet,
    mux: Box<dyn EventMultiplexer>,
    shutdown: ShutdownListener,
) {
    info!(
        strategy = mux.name(),
        listeners = listeners.endpoints().len(),
        "socket flow started"
    );
    while !shutdown.network_io_stopped() {
        tick(&ctx, &listeners, mux.as_ref()).await;
    }
    info!("socket flow stopped");
}

async fn tick(ctx: &NetContext, listeners: &ListenerSet, mux: &dyn EventMultiplexer) {
    let now = ctx.now();

    if ctx.is_listening_enabled() && ctx.is_network_active() {
        for accepted in listeners.accept_ready() {
            admit(ctx, accepted, now);
        }
    }

    let mut interest = Vec::new();
    for lease in ctx.pool.lease_active() {
        if lease.is_disconnect_requested() {
            continue;
        }
        if let Some(socket) = lease.socket() {
            interest.push(StreamInterest {
                id: lease.id(),
                socket,
                read: true,
                write: lease.has_queued_send(),
            });
        }
    }

    let report = mux.poll(&interest, ctx.config.timeouts.io_poll).await;

    for id in &report.errored {
        ctx.pool.request_disconnect(*id, DisconnectReason::IoError);
    }
    for id in &report.readable {
        drive_read(ctx, *id, now);
    }
    for id in &report.writable {
        drive_write(ctx, *id, now);
    }

    let maintenance = ctx.pool.maintain(now, ctx.is_network_active());
    if !maintenance.destroyed.is_empty() {
        ctx.settle_destroyed(maintenance.destroyed).await;
    }
}

fn admit(ctx: &NetContext, accepted: AcceptedSocket, now: Timestamp) {
    let AcceptedSocket {
        stream,
        remote,
        permissions,
    } = accepted;
    match ctx
        .pool
        .admit_inbound(Some(Arc::new(stream)), remote, permissions, now)
    {
        AdmitResult::Rejected => {
            debug!(%remote, "inbound refused, every slot is protected");
        }
        AdmitResult::Accepted(_) | AdmitResult::AcceptedAfterEviction { .. } => {}
    }
}

/// One bounded receive pass. EOF and errors condemn only this connection.
fn drive_read(ctx: &NetContext, id: ConnectionId, now: Timestamp) {
    let lease = match ctx.pool.lease(id) {
        Some(lease) => lease,
        None => return,
    };
    if lease.is_disconnect_requested() {
        return;
    }
    let socket = match lease.socket() {
        Some(socket) => socket,
        None => return,
    };

    let mut chunk = vec![0u8; READ_CHUNK];
    match socket.try_read(&mut chunk) {
        Ok(0) => {
            lease.request_disconnect(DisconnectReason::RemoteClosed);
        }
        Ok(n) => {
            lease.note_received(n, now);
            let extracted = {
                let mut accum = lease.recv_accum.lock();
                accum.extend_from_slice(&chunk[..n]);
                extract_frames(&mut accum, ctx.config.max_frame_size)
            };
            match extracted {
                Ok(frames) => {
                    if !frames.is_empty() {
                        lease.push_inbound_frames(frames);
                        ctx.dispatch_wakeup.notify_one();
                    }
                }
                Err(kind @ PeerIoError::OversizedFrame) => {
                    warn!(peer = %id, error = %kind, "framing violation");
                    lease.mark_misbehaving();
                    lease.request_disconnect(DisconnectReason::Misbehavior);
                }
                Err(kind) => {
                    warn!(peer = %id, error = %kind, "receive failed");
                    lease.request_disconnect(DisconnectReason::IoError);
                }
            }
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
        Err(err) => {
            debug!(peer = %id, error = %err, "read failed");
            lease.request_disconnect(DisconnectReason::IoError);
        }
    }
}

/// Flushes queued frames until the kernel pushes back.
fn drive_write(ctx: &NetContext, id: ConnectionId, now: Timestamp) {
    let lease = match ctx.pool.lease(id) {
        Some(lease) => lease,
        None => return,
    };
    if lease.is_disconnect_requested() {
        return;
    }
    let socket = match lease.socket() {
        Some(socket) => socket,
        None => return,
    };

    let mut failed = false;
    {
        let mut guard = lease.send.lock();
        let send = &mut *guard;
        loop {
            let front_len;
            let written;
            {
                let front = match send.queue.front() {
                    Some(front) => front,
                    None => break,
                };
                front_len = front.len();
                match socket.try_write(&front[send.offset..]) {
                    Ok(n) => written = n,
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        debug!(peer = %id, error = %err, "write failed");
                        failed = true;
                        break;
                    }
                }
            }
            lease.note_sent(written, now);
            send.offset += written;
            if send.offset >= front_len {
                send.queue.pop_front();
                send.offset = 0;
            } else {
                // Partial write: the kernel buffer is full, try next tick.
                break;
            }
        }
    }
    if failed {
        lease.request_disconnect(DisconnectReason::IoError);
    }
}

//! Outbound connector and manual-target flows.
//!
//! - One `DialPolicy` decision per tick; at most one automatic dial.
//! - Admission permits are acquired before the dial and travel into the
//!   pool with the new connection.
//! - Manual targets are redialed on their own cadence and never count
//!   against the automatic precedence order.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use crate::domain::connector::{DialAction, DialPlan, DialPolicy, DialPurpose};
use crate::domain::shutdown::{ShutdownListener, ShutdownStage};
use crate::domain::types::{ConnectionClass, DisconnectReason, Endpoint};
use crate::ports::outbound::AddressFilter;
use crate::service::context::NetContext;

/// Draws from the address source before a tick gives up on dialing.
const PICK_ATTEMPTS: usize = 10;

/// Automatic outbound loop. Each tick runs collision resolution, asks the
/// policy for an action, and performs it. Exits when network I/O stops.
pub(crate) async fn connector_flow(
    ctx: Arc<NetContext>,
    anchors: Vec<Endpoint>,
    mut shutdown: ShutdownListener,
) {
    let mut policy = DialPolicy::new(
        ctx.config.limits.clone(),
        ctx.config.connect_only.clone(),
        &ctx.config.timeouts,
    );
    policy.load_anchors(anchors);
    let mut rng = StdRng::from_entropy();
    info!(anchors = policy.pending_anchors(), "connector flow started");

    while !shutdown.network_io_stopped() {
        tokio::select! {
            _ = tokio::time::sleep(ctx.config.timeouts.connector_tick) => {}
            _ = shutdown.reached(ShutdownStage::NetworkIoStopped) => break,
        }
        if !ctx.is_network_active() {
            continue;
        }

        ctx.address_source.resolve_tried_collisions();

        let counts = ctx.pool.counts();
        let action = policy.decide(
            ctx.now(),
            &counts,
            |endpoint| ctx.pool.is_connected(endpoint),
            ctx.is_tip_stale(),
            &mut rng,
        );
        match action {
            DialAction::Idle => {}
            DialAction::RefreshFullRelay => refresh_full_relay(&ctx),
            DialAction::Dial(plan) => dial_step(&ctx, plan, &mut shutdown).await,
        }
    }
    info!("connector flow stopped");
}

/// Evict the longest-lived full-relay peer so the fill step can replace it
/// with a fresh one. Runs only while the local tip is stale.
fn refresh_full_relay(ctx: &NetContext) {
    let Some(id) = ctx.pool.oldest_full_relay() else {
        return;
    };
    if ctx.pool.request_disconnect(id, DisconnectReason::StaleTipReplaced) {
        info!(peer = %id, "replacing oldest full-relay peer; local tip is stale");
    }
}

/// Resolve a target, take an admission permit, dial, and register the
/// connection. Shared by the connector, manual, and bootstrap flows.
pub(crate) async fn dial_step(
    ctx: &Arc<NetContext>,
    plan: DialPlan,
    shutdown: &mut ShutdownListener,
) {
    let Some(endpoint) = select_target(ctx, &plan) else {
        debug!(purpose = plan.purpose.label(), "no dialable address this tick");
        return;
    };
    let Some(permit) = acquire_admission(ctx, plan.class, shutdown).await else {
        return;
    };

    ctx.address_source.mark_attempt(&endpoint, ctx.now());
    let outcome = tokio::select! {
        outcome = ctx.dialer.dial(endpoint) => outcome,
        _ = shutdown.reached(ShutdownStage::NetworkIoStopped) => {
            debug!(%endpoint, "dial abandoned; network I/O stopping");
            return;
        }
    };
    match outcome {
        Ok(stream) => {
            let conn = ctx.pool.insert_outbound(
                Some(Arc::new(stream)),
                endpoint,
                plan.class,
                Some(permit),
                ctx.now(),
                plan.purpose == DialPurpose::TipProbe,
            );
            info!(
                peer = %conn.id(),
                %endpoint,
                class = plan.class.label(),
                purpose = plan.purpose.label(),
                "outbound connection established"
            );
        }
        Err(kind) => {
            // Permit released on drop; the address stays eligible for a
            // later tick.
            warn!(
                %endpoint,
                purpose = plan.purpose.label(),
                error = %kind,
                "outbound dial failed"
            );
        }
    }
}

/// Pinned targets are taken as-is; policy picks go through the address
/// source and are filtered against the live pool and local networks.
fn select_target(ctx: &NetContext, plan: &DialPlan) -> Option<Endpoint> {
    if let Some(endpoint) = plan.target {
        if ctx.pool.is_connected(&endpoint) {
            return None;
        }
        return Some(endpoint);
    }
    let filter = match plan.purpose {
        DialPurpose::Feeler => AddressFilter::Untested,
        _ => AddressFilter::Outbound,
    };
    for _ in 0..PICK_ATTEMPTS {
        let candidate = ctx.address_source.pick_address(filter)?;
        if ctx.pool.is_connected(&candidate) {
            continue;
        }
        if candidate.is_local() && !ctx.config.allow_local {
            continue;
        }
        return Some(candidate);
    }
    None
}

/// Take a permit from the class's semaphore, or bail out once shutdown
/// begins or the semaphore has been closed by the terminal stage.
async fn acquire_admission(
    ctx: &Arc<NetContext>,
    class: ConnectionClass,
    shutdown: &mut ShutdownListener,
) -> Option<OwnedSemaphorePermit> {
    let semaphore = if class.uses_manual_semaphore() {
        Arc::clone(&ctx.manual_admission)
    } else {
        Arc::clone(&ctx.general_admission)
    };
    tokio::select! {
        acquired = semaphore.acquire_owned() => acquired.ok(),
        _ = shutdown.reached(ShutdownStage::NetworkIoStopped) => None,
    }
}

/// Redials every unconnected manual target each pass. Targets use the
/// manual semaphore, so a full automatic set never blocks them.
pub(crate) async fn manual_flow(ctx: Arc<NetContext>, mut shutdown: ShutdownListener) {
    info!(
        targets = ctx.manual_target_list().len(),
        "manual-target flow started"
    );
    while !shutdown.network_io_stopped() {
        if ctx.is_network_active() {
            manual_pass(&ctx, &mut shutdown).await;
        }
        tokio::select! {
            _ = tokio::time::sleep(ctx.config.timeouts.manual_retry) => {}
            _ = shutdown.reached(ShutdownStage::NetworkIoStopped) => break,
        }
    }
    info!("manual-target flow stopped");
}

async fn manual_pass(ctx: &Arc<NetContext>, shutdown: &mut ShutdownListener) {
    for endpoint in ctx.manual_target_list() {
        if shutdown.network_io_stopped() || !ctx.is_network_active() {
            return;
        }
        if ctx.pool.is_connected(&endpoint) {
            continue;
        }
        let plan = DialPlan {
            class: ConnectionClass::Manual,
            purpose: DialPurpose::Manual,
            target: Some(endpoint),
        };
        dial_step(ctx, plan, shutdown).await;
    }
}

//! Seed bootstrapping flow.
//!
//! Queries the configured seed hosts in shuffled order, spacing queries so
//! a node that can fill its outbound set from the existing address book
//! never touches the seed infrastructure. Resolution happens off the
//! connector loop; a slow or dead seed delays nothing else.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::seeds::SeedResolver;
use crate::domain::connector::{DialPlan, DialPurpose};
use crate::domain::shutdown::{ShutdownListener, ShutdownStage};
use crate::domain::types::ConnectionClass;
use crate::ports::outbound::AddressProvenance;
use crate::service::connector::dial_step;
use crate::service::context::NetContext;

/// Handshaken relay-outbound peers that make seeding unnecessary.
const SEED_OUTBOUND_PEER_THRESHOLD: usize = 2;

/// Poll slice while waiting out the spacing between seed queries.
const SEED_WAIT_SLICE: Duration = Duration::from_millis(500);

pub(crate) async fn seed_flow(
    ctx: Arc<NetContext>,
    resolver: SeedResolver,
    mut shutdown: ShutdownListener,
) {
    let seeds = ctx.config.seeds.clone();
    if seeds.hosts.is_empty() {
        debug!("no seed hosts configured; bootstrap skipped");
        return;
    }
    if ctx.address_source.known_count() >= seeds.sufficient_addresses {
        info!(
            known = ctx.address_source.known_count(),
            "address book already populated; seed bootstrap skipped"
        );
        return;
    }

    let mut hosts = seeds.hosts.clone();
    hosts.shuffle(&mut StdRng::from_entropy());
    info!(seeds = hosts.len(), "seed bootstrap started");

    for host in hosts {
        // An empty book queries the first seed immediately; otherwise give
        // the connector a window to reach peers without seed help.
        let known = ctx.address_source.known_count();
        if known > 0 {
            let spacing = if known > seeds.many_addresses_threshold {
                seeds.long_delay
            } else {
                seeds.short_delay
            };
            if !wait_for_slot(&ctx, spacing, &mut shutdown).await {
                return;
            }
        }
        if shutdown.network_io_stopped() {
            return;
        }
        if ctx.address_source.known_count() >= seeds.sufficient_addresses {
            info!("address book filled while seeding; remaining seeds skipped");
            return;
        }

        if seeds.use_addr_fetch {
            harvest_via_addr_fetch(&ctx, &resolver, &host, &mut shutdown).await;
        } else {
            let endpoints = resolver.resolve(&host).await;
            let added = ctx.address_source.add(&endpoints, AddressProvenance::Seed);
            info!(
                seed = %host,
                resolved = endpoints.len(),
                added,
                "seed addresses loaded"
            );
        }
    }
    info!("seed bootstrap complete");
}

/// Waits out one inter-seed spacing. Returns false when the flow should
/// stop early: enough relay peers came up on their own, or shutdown began.
async fn wait_for_slot(
    ctx: &NetContext,
    spacing: Duration,
    shutdown: &mut ShutdownListener,
) -> bool {
    let deadline = Instant::now() + spacing;
    loop {
        if ctx.pool.handshaken_relay_outbound() >= SEED_OUTBOUND_PEER_THRESHOLD {
            info!("relay peers available; remaining seeds skipped");
            return false;
        }
        if shutdown.network_io_stopped() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let step = SEED_WAIT_SLICE.min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            _ = shutdown.reached(ShutdownStage::NetworkIoStopped) => return false,
        }
    }
}

/// Degraded mode: instead of loading resolved addresses directly, connect
/// to one resolved endpoint as an addr-fetch peer and let gossip fill the
/// book. Used where seed resolution results cannot be trusted wholesale.
async fn harvest_via_addr_fetch(
    ctx: &Arc<NetContext>,
    resolver: &SeedResolver,
    host: &str,
    shutdown: &mut ShutdownListener,
) {
    let endpoints = resolver.resolve(host).await;
    let Some(target) = endpoints.into_iter().next() else {
        warn!(seed = %host, "seed resolution failed; no addr-fetch target");
        return;
    };
    info!(seed = %host, endpoint = %target, "dialing seed for address harvest");
    let plan = DialPlan {
        class: ConnectionClass::AddrFetch,
        purpose: DialPurpose::AddrFetch,
        target: Some(target),
    };
    dial_step(ctx, plan, shutdown).await;
}

//! Service assembly and lifecycle.
//!
//! `start` validates configuration, opens listeners, selects a multiplexer,
//! loads persisted state, and spawns the worker flows. `stop` walks the
//! shutdown stages in order and is safe to call more than once.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::clock::SystemTimeSource;
use crate::adapters::listener::ListenerSet;
use crate::adapters::mux::select_multiplexer;
use crate::adapters::persist::{
    load_addresses_or_reset, save_addresses, save_anchors, take_anchors, ADDRESS_DB_FILE,
    ANCHORS_FILE,
};
use crate::adapters::seeds::SeedResolver;
use crate::domain::config::NetConfig;
use crate::domain::errors::NetError;
use crate::domain::shutdown::ShutdownStage;
use crate::domain::types::Endpoint;
use crate::ports::inbound::NetworkControl;
use crate::ports::outbound::{AddressSource, ProtocolHandler, TimeSource};
use crate::service::bootstrap::seed_flow;
use crate::service::connector::{connector_flow, manual_flow};
use crate::service::context::NetContext;
use crate::service::dispatch::dispatch_flow;
use crate::service::io::io_flow;

/// Running connection manager.
///
/// Owns the worker flows; everything else is shared through the context.
/// Dropping the service without calling [`NetService::stop`] aborts the
/// flows without the staged teardown, so callers should stop explicitly.
pub struct NetService {
    ctx: Arc<NetContext>,
    listen_endpoints: Vec<Endpoint>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl NetService {
    /// Start with the system clock.
    pub async fn start(
        config: NetConfig,
        handler: Arc<dyn ProtocolHandler>,
        address_source: Arc<dyn AddressSource>,
    ) -> Result<Self, NetError> {
        Self::start_with_clock(config, handler, address_source, Arc::new(SystemTimeSource)).await
    }

    /// Start with an explicit clock. Tests drive a fixed source.
    pub async fn start_with_clock(
        config: NetConfig,
        handler: Arc<dyn ProtocolHandler>,
        address_source: Arc<dyn AddressSource>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, NetError> {
        config.validate()?;
        let listeners = ListenerSet::bind(&config.listen)?;
        let listen_endpoints = listeners.endpoints();
        let mux = select_multiplexer(config.multiplexer, config.scan_max_sockets).await;

        let anchors = match &config.data_dir {
            Some(dir) => {
                let state = load_addresses_or_reset(&dir.join(ADDRESS_DB_FILE));
                address_source.import_state(state);
                take_anchors(&dir.join(ANCHORS_FILE))
            }
            None => Vec::new(),
        };

        let ctx = NetContext::new(config, handler, address_source, clock);
        let resolver = SeedResolver::new(ctx.config.seeds.port, ctx.config.seeds.max_per_seed);

        let handles = vec![
            tokio::spawn(io_flow(
                Arc::clone(&ctx),
                listeners,
                mux,
                ctx.sequencer.subscribe(),
            )),
            tokio::spawn(connector_flow(
                Arc::clone(&ctx),
                anchors,
                ctx.sequencer.subscribe(),
            )),
            tokio::spawn(manual_flow(Arc::clone(&ctx), ctx.sequencer.subscribe())),
            tokio::spawn(dispatch_flow(Arc::clone(&ctx), ctx.sequencer.subscribe())),
            tokio::spawn(seed_flow(
                Arc::clone(&ctx),
                resolver,
                ctx.sequencer.subscribe(),
            )),
        ];
        info!("network service started");
        Ok(Self {
            ctx,
            listen_endpoints,
            handles: Mutex::new(handles),
        })
    }

    /// The control surface, shareable with protocol code.
    pub fn control(&self) -> Arc<dyn NetworkControl> {
        Arc::clone(&self.ctx) as Arc<dyn NetworkControl>
    }

    /// Addresses actually bound, with OS-assigned ports resolved.
    pub fn listen_endpoints(&self) -> &[Endpoint] {
        &self.listen_endpoints
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &Arc<NetContext> {
        &self.ctx
    }

    /// Staged teardown. Message processing stops first, then network I/O,
    /// then every remaining connection is drained and state is persisted.
    /// Calling this again after completion does nothing.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() && self.ctx.sequencer.stage() == ShutdownStage::FullyStopped {
            return;
        }
        info!("network service stopping");

        self.ctx.sequencer.advance(ShutdownStage::MessageProcessingStopped);

        // Anchors must be read off the live pool before connections start
        // going away.
        let anchors = self.ctx.pool.anchor_candidates();

        self.ctx.sequencer.advance(ShutdownStage::NetworkIoStopped);
        for handle in handles {
            let _ = handle.await;
        }

        let destroyed = self.ctx.pool.drain_all(self.ctx.now());
        self.ctx.settle_destroyed(destroyed).await;

        self.persist_state(&anchors);

        self.ctx.sequencer.advance(ShutdownStage::FullyStopped);
        info!("network service stopped");
    }

    fn persist_state(&self, anchors: &[Endpoint]) {
        let Some(dir) = self.ctx.config.data_dir.as_deref() else {
            return;
        };
        self.write_anchors(dir, anchors);
        let state = self.ctx.address_source.export_state();
        if let Err(error) = save_addresses(&dir.join(ADDRESS_DB_FILE), &state) {
            warn!(%error, "address database write failed");
        }
    }

    fn write_anchors(&self, dir: &Path, anchors: &[Endpoint]) {
        if let Err(error) = save_anchors(&dir.join(ANCHORS_FILE), anchors) {
            warn!(%error, "anchor capture failed");
        } else {
            info!(anchors = anchors.len(), "anchors captured");
        }
    }
}

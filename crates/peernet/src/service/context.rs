//! Shared service state.
//!
//! One `NetContext` is built per manager and shared by every worker flow.
//! It owns the pool, the admission semaphores and the shutdown sequencer;
//! the flows own nothing and borrow everything from here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tracing::info;

use crate::adapters::dialer::Dialer;
use crate::domain::config::NetConfig;
use crate::domain::pool::{ConnectionPool, DestructionRecord};
use crate::domain::shutdown::ShutdownSequencer;
use crate::domain::types::{Endpoint, Timestamp};
use crate::ports::outbound::{AddressSource, ProtocolHandler, TimeSource};

pub struct NetContext {
    pub(crate) config: NetConfig,
    pub(crate) pool: ConnectionPool,
    pub(crate) address_source: Arc<dyn AddressSource>,
    pub(crate) handler: Arc<dyn ProtocolHandler>,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) dialer: Dialer,
    pub(crate) general_admission: Arc<Semaphore>,
    pub(crate) manual_admission: Arc<Semaphore>,
    pub(crate) sequencer: ShutdownSequencer,
    /// Wakes the dispatch flow when new inbound frames arrive.
    pub(crate) dispatch_wakeup: Notify,
    network_active: AtomicBool,
    listening_enabled: AtomicBool,
    tip_stale: AtomicBool,
    manual_targets: Mutex<Vec<Endpoint>>,
}

impl NetContext {
    pub(crate) fn new(
        config: NetConfig,
        handler: Arc<dyn ProtocolHandler>,
        address_source: Arc<dyn AddressSource>,
        clock: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let general_admission = Arc::new(Semaphore::new(
            config.limits.general_semaphore_capacity(),
        ));
        let manual_admission = Arc::new(Semaphore::new(config.limits.max_manual));
        let sequencer = ShutdownSequencer::new(
            Arc::clone(&general_admission),
            Arc::clone(&manual_admission),
        );
        Arc::new(Self {
            pool: ConnectionPool::new(config.limits.clone(), config.timeouts.clone()),
            dialer: Dialer::new(config.timeouts.dial),
            manual_targets: Mutex::new(config.manual_targets.clone()),
            listening_enabled: AtomicBool::new(config.listen.enabled),
            network_active: AtomicBool::new(true),
            tip_stale: AtomicBool::new(false),
            dispatch_wakeup: Notify::new(),
            general_admission,
            manual_admission,
            sequencer,
            address_source,
            handler,
            clock,
            config,
        })
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn is_network_active(&self) -> bool {
        self.network_active.load(Ordering::SeqCst)
    }

    pub(crate) fn is_listening_enabled(&self) -> bool {
        self.listening_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_tip_stale(&self) -> bool {
        self.tip_stale.load(Ordering::SeqCst)
    }

    pub(crate) fn store_network_active(&self, active: bool) {
        self.network_active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn store_listening(&self, enabled: bool) {
        self.listening_enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn store_tip_stale(&self, stale: bool) {
        self.tip_stale.store(stale, Ordering::SeqCst);
    }

    pub(crate) fn manual_target_list(&self) -> Vec<Endpoint> {
        self.manual_targets.lock().clone()
    }

    pub(crate) fn push_manual_target(&self, endpoint: Endpoint) -> bool {
        let mut targets = self.manual_targets.lock();
        if targets.contains(&endpoint) {
            return false;
        }
        targets.push(endpoint);
        true
    }

    /// Post-maintenance settlement, run outside the pool lock: the handler
    /// hears about each destruction exactly once, and clean outbound peers
    /// are recorded as successes in the address source.
    pub(crate) async fn settle_destroyed(&self, destroyed: Vec<DestructionRecord>) {
        let now = self.now();
        for record in destroyed {
            info!(
                peer = %record.id,
                endpoint = %record.endpoint,
                class = %record.class,
                reason = record.reason.map(|r| r.label()).unwrap_or("unknown"),
                "connection destroyed"
            );
            self.handler.finalize(record.id).await;
            if record.records_success() {
                self.address_source.mark_connected(&record.endpoint, now);
            }
        }
    }
}

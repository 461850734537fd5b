//! Staged shutdown state machine.
//!
//! Teardown ordering is load-bearing: message processing must quiesce before
//! socket I/O is torn down, otherwise a connection could be finalized while a
//! dispatch pass still holds bytes for it. The sequencer makes that ordering a
//! state invariant instead of a call-site convention. Stages only move
//! forward; skipping ahead walks through every intermediate stage so an
//! observer never sees them out of order.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::info;

/// Shutdown stages in their strict order. `Ord` follows teardown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownStage {
    Running,
    MessageProcessingStopped,
    NetworkIoStopped,
    FullyStopped,
}

impl ShutdownStage {
    fn next(self) -> Option<ShutdownStage> {
        match self {
            ShutdownStage::Running => Some(ShutdownStage::MessageProcessingStopped),
            ShutdownStage::MessageProcessingStopped => Some(ShutdownStage::NetworkIoStopped),
            ShutdownStage::NetworkIoStopped => Some(ShutdownStage::FullyStopped),
            ShutdownStage::FullyStopped => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShutdownStage::Running => "running",
            ShutdownStage::MessageProcessingStopped => "message-processing-stopped",
            ShutdownStage::NetworkIoStopped => "network-io-stopped",
            ShutdownStage::FullyStopped => "fully-stopped",
        }
    }
}

impl std::fmt::Display for ShutdownStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Drives the staged teardown and owns the broadcast side of the stage
/// signal.
///
/// The terminal stage closes both admission semaphores. Closing wakes every
/// parked acquirer with an error and rejects later acquisitions without ever
/// minting a permit, so the wakeup is bounded by the configured capacity no
/// matter how often the terminal stage is requested.
pub struct ShutdownSequencer {
    stage_tx: watch::Sender<ShutdownStage>,
    general_admission: Arc<Semaphore>,
    manual_admission: Arc<Semaphore>,
}

impl ShutdownSequencer {
    pub fn new(general_admission: Arc<Semaphore>, manual_admission: Arc<Semaphore>) -> Self {
        let (stage_tx, _) = watch::channel(ShutdownStage::Running);
        Self {
            stage_tx,
            general_admission,
            manual_admission,
        }
    }

    pub fn stage(&self) -> ShutdownStage {
        *self.stage_tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            stage_rx: self.stage_tx.subscribe(),
        }
    }

    /// Advances to `target`, passing through intermediate stages in order.
    /// Requests at or below the current stage are no-ops. Returns the stage
    /// in effect afterwards.
    pub fn advance(&self, target: ShutdownStage) -> ShutdownStage {
        let mut current = self.stage();
        while current < target {
            let next = match current.next() {
                Some(next) => next,
                None => break,
            };
            info!(stage = %next, "shutdown stage entered");
            self.stage_tx.send_replace(next);
            if next == ShutdownStage::FullyStopped {
                self.general_admission.close();
                self.manual_admission.close();
            }
            current = next;
        }
        current
    }
}

/// Read side of the stage signal, one per worker flow.
#[derive(Clone)]
pub struct ShutdownListener {
    stage_rx: watch::Receiver<ShutdownStage>,
}

impl ShutdownListener {
    pub fn stage(&self) -> ShutdownStage {
        *self.stage_rx.borrow()
    }

    pub fn message_processing_stopped(&self) -> bool {
        self.stage() >= ShutdownStage::MessageProcessingStopped
    }

    pub fn network_io_stopped(&self) -> bool {
        self.stage() >= ShutdownStage::NetworkIoStopped
    }

    /// Resolves once the stage reaches `at_least`. A dropped sequencer counts
    /// as fully stopped so waiters never hang on a dead signal.
    pub async fn reached(&mut self, at_least: ShutdownStage) {
        let _ = self.stage_rx.wait_for(|stage| *stage >= at_least).await;
    }

    /// Resolves on the next stage change, or immediately if the sequencer is
    /// gone. Meant for `select!` arms that race I/O against shutdown.
    pub async fn changed(&mut self) {
        let _ = self.stage_rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequencer(general: usize, manual: usize) -> (ShutdownSequencer, Arc<Semaphore>, Arc<Semaphore>) {
        let general = Arc::new(Semaphore::new(general));
        let manual = Arc::new(Semaphore::new(manual));
        let seq = ShutdownSequencer::new(Arc::clone(&general), Arc::clone(&manual));
        (seq, general, manual)
    }

    #[test]
    fn test_stages_are_strictly_ordered() {
        assert!(ShutdownStage::Running < ShutdownStage::MessageProcessingStopped);
        assert!(ShutdownStage::MessageProcessingStopped < ShutdownStage::NetworkIoStopped);
        assert!(ShutdownStage::NetworkIoStopped < ShutdownStage::FullyStopped);
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let (seq, _, _) = sequencer(2, 1);
        assert_eq!(seq.advance(ShutdownStage::NetworkIoStopped), ShutdownStage::NetworkIoStopped);
        assert_eq!(
            seq.advance(ShutdownStage::MessageProcessingStopped),
            ShutdownStage::NetworkIoStopped
        );
        assert_eq!(seq.stage(), ShutdownStage::NetworkIoStopped);
    }

    #[test]
    fn test_skipping_ahead_lands_on_target() {
        let (seq, general, manual) = sequencer(2, 1);
        assert_eq!(seq.advance(ShutdownStage::FullyStopped), ShutdownStage::FullyStopped);
        assert!(general.is_closed());
        assert!(manual.is_closed());
    }

    #[test]
    fn test_terminal_stage_is_idempotent_and_capacity_bounded() {
        let (seq, general, manual) = sequencer(3, 2);
        seq.advance(ShutdownStage::FullyStopped);
        seq.advance(ShutdownStage::FullyStopped);
        // Closing twice must not mint permits beyond the initial capacity.
        assert_eq!(general.available_permits(), 3);
        assert_eq!(manual.available_permits(), 2);
        assert!(general.is_closed());
        assert_eq!(seq.stage(), ShutdownStage::FullyStopped);
    }

    #[tokio::test]
    async fn test_terminal_stage_unblocks_parked_acquirers() {
        let (seq, general, _) = sequencer(1, 1);
        let held = general
            .clone()
            .try_acquire_owned()
            .unwrap();

        let waiter = tokio::spawn({
            let general = Arc::clone(&general);
            async move { general.acquire_owned().await.is_err() }
        });
        tokio::task::yield_now().await;

        seq.advance(ShutdownStage::FullyStopped);
        assert!(waiter.await.unwrap(), "parked acquirer must wake with an error");
        drop(held);
    }

    #[tokio::test]
    async fn test_reached_resolves_in_stage_order() {
        let (seq, _, _) = sequencer(1, 1);
        let mut listener = seq.subscribe();
        assert!(!listener.message_processing_stopped());

        let waiter = tokio::spawn({
            let mut listener = seq.subscribe();
            async move {
                listener.reached(ShutdownStage::NetworkIoStopped).await;
                listener.stage()
            }
        });
        tokio::task::yield_now().await;

        seq.advance(ShutdownStage::MessageProcessingStopped);
        assert!(listener.message_processing_stopped());
        assert!(!listener.network_io_stopped());

        seq.advance(ShutdownStage::NetworkIoStopped);
        let seen = waiter.await.unwrap();
        assert!(seen >= ShutdownStage::NetworkIoStopped);
    }
}

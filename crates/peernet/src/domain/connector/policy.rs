//! Outbound dial policy.
//!
//! Each connector tick produces at most one action, chosen by a fixed
//! precedence where the first match wins:
//!
//! 1. operator connect-only targets, to the exclusion of everything else;
//! 2. anchors, once, while the block-relay set has room;
//! 3. fill full-relay up to its cap;
//! 4. fill block-relay up to its cap;
//! 5. stale tip: displace the oldest full-relay peer so the fill step
//!    refreshes the outbound view (cooldown-limited);
//! 6. Poisson-scheduled short-lived tip probe;
//! 7. Poisson-scheduled feeler;
//! 8. idle.
//!
//! The policy is pure bookkeeping: sockets, semaphores, and the address
//! source belong to the caller.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;

use crate::domain::config::{ConnectionLimits, TimeoutConfig};
use crate::domain::connector::schedule::PoissonTimer;
use crate::domain::pool::PoolCounts;
use crate::domain::types::{ConnectionClass, Endpoint, Timestamp};

/// Why a dial is being made; steers address selection and insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialPurpose {
    /// Operator-configured connect-only target.
    ConnectOnly,
    /// Anchor redial at startup.
    Anchor,
    /// Filling a relay class to its cap.
    Fill,
    /// Short-lived block-relay probe cross-checking tip freshness.
    TipProbe,
    /// Address liveness test.
    Feeler,
    /// Operator-maintained manual target.
    Manual,
    /// Gossip harvest when seed resolution is unavailable.
    AddrFetch,
}

impl DialPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            DialPurpose::ConnectOnly => "connect-only",
            DialPurpose::Anchor => "anchor",
            DialPurpose::Fill => "fill",
            DialPurpose::TipProbe => "tip-probe",
            DialPurpose::Feeler => "feeler",
            DialPurpose::Manual => "manual",
            DialPurpose::AddrFetch => "addr-fetch",
        }
    }
}

/// One dial decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPlan {
    pub class: ConnectionClass,
    pub purpose: DialPurpose,
    /// Fixed target for connect-only and anchor dials; `None` means the
    /// address source picks.
    pub target: Option<Endpoint>,
}

/// Outcome of one policy tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialAction {
    Dial(DialPlan),
    /// Displace the oldest full-relay peer; the resulting vacancy is
    /// refilled by the fill step on a later tick.
    RefreshFullRelay,
    Idle,
}

pub struct DialPolicy {
    limits: ConnectionLimits,
    connect_only: Vec<Endpoint>,
    anchors: VecDeque<Endpoint>,
    tip_probe_timer: PoissonTimer,
    feeler_timer: PoissonTimer,
    stale_refresh_cooldown: Duration,
    last_stale_refresh: Option<Timestamp>,
}

impl DialPolicy {
    pub fn new(
        limits: ConnectionLimits,
        connect_only: Vec<Endpoint>,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            limits,
            connect_only,
            anchors: VecDeque::new(),
            tip_probe_timer: PoissonTimer::new(timeouts.extra_probe_interval),
            feeler_timer: PoissonTimer::new(timeouts.feeler_interval),
            stale_refresh_cooldown: timeouts.extra_probe_interval,
            last_stale_refresh: None,
        }
    }

    /// Seed the startup anchor queue. Called once, before the first tick;
    /// the cap was applied when the anchors file was read.
    pub fn load_anchors(&mut self, anchors: Vec<Endpoint>) {
        self.anchors = anchors.into_iter().collect();
    }

    pub fn pending_anchors(&self) -> usize {
        self.anchors.len()
    }

    /// Decide this tick's action.
    pub fn decide<R, F>(
        &mut self,
        now: Timestamp,
        counts: &PoolCounts,
        is_connected: F,
        tip_stale: bool,
        rng: &mut R,
    ) -> DialAction
    where
        R: Rng + ?Sized,
        F: Fn(&Endpoint) -> bool,
    {
        // 1. Connect-only mode pins the outbound set to the operator's
        // list; nothing else ever dials.
        if !self.connect_only.is_empty() {
            for target in &self.connect_only {
                if !is_connected(target) {
                    return DialAction::Dial(DialPlan {
                        class: ConnectionClass::Manual,
                        purpose: DialPurpose::ConnectOnly,
                        target: Some(*target),
                    });
                }
            }
            return DialAction::Idle;
        }

        // 2. Anchors, while the block-relay set still has room.
        while let Some(anchor) = self.anchors.front().copied() {
            if counts.outbound_block_relay >= self.limits.max_outbound_block_relay {
                self.anchors.clear();
                break;
            }
            self.anchors.pop_front();
            if is_connected(&anchor) {
                continue;
            }
            return DialAction::Dial(DialPlan {
                class: ConnectionClass::OutboundBlockOnly,
                purpose: DialPurpose::Anchor,
                target: Some(anchor),
            });
        }

        // 3. Fill full-relay.
        if counts.outbound_full < self.limits.max_outbound_full {
            return DialAction::Dial(DialPlan {
                class: ConnectionClass::OutboundFull,
                purpose: DialPurpose::Fill,
                target: None,
            });
        }

        // 4. Fill block-relay.
        if counts.outbound_block_relay < self.limits.max_outbound_block_relay {
            return DialAction::Dial(DialPlan {
                class: ConnectionClass::OutboundBlockOnly,
                purpose: DialPurpose::Fill,
                target: None,
            });
        }

        // 5. Stale tip: rotate the oldest full-relay peer out.
        if tip_stale && counts.outbound_full > 0 && self.stale_cooldown_passed(now) {
            self.last_stale_refresh = Some(now);
            return DialAction::RefreshFullRelay;
        }

        // 6. Tip probe, one at a time.
        if counts.tip_probes == 0 && self.tip_probe_timer.fire(now, rng) {
            return DialAction::Dial(DialPlan {
                class: ConnectionClass::OutboundBlockOnly,
                purpose: DialPurpose::TipProbe,
                target: None,
            });
        }

        // 7. Feeler, one at a time.
        if counts.feeler == 0 && self.feeler_timer.fire(now, rng) {
            return DialAction::Dial(DialPlan {
                class: ConnectionClass::Feeler,
                purpose: DialPurpose::Feeler,
                target: None,
            });
        }

        DialAction::Idle
    }

    fn stale_cooldown_passed(&self, now: Timestamp) -> bool {
        match self.last_stale_refresh {
            None => true,
            Some(last) => now.millis_since(last) >= self.stale_refresh_cooldown.as_millis() as u64,
        }
    }

    #[cfg(test)]
    pub(crate) fn probe_timers_next(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        (self.tip_probe_timer.next_at(), self.feeler_timer.next_at())
    }
}

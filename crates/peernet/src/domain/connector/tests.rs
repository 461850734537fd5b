//! Tests for the outbound dial precedence.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::domain::config::NetConfig;
use crate::domain::pool::PoolCounts;
use crate::domain::types::{ConnectionClass, Endpoint, Timestamp};

fn ep(n: u8) -> Endpoint {
    Endpoint::new(format!("10.0.1.{n}").parse().unwrap(), 9333)
}

fn policy(connect_only: Vec<Endpoint>) -> DialPolicy {
    let config = NetConfig::for_testing();
    DialPolicy::new(config.limits, connect_only, &config.timeouts)
}

fn counts(full: usize, block: usize) -> PoolCounts {
    PoolCounts {
        outbound_full: full,
        outbound_block_relay: block,
        ..PoolCounts::default()
    }
}

fn not_connected(_: &Endpoint) -> bool {
    false
}

// =============================================================================
// TEST GROUP 1: Connect-only mode
// =============================================================================

#[test]
fn test_connect_only_pins_the_outbound_set() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut policy = policy(vec![ep(1), ep(2)]);
    let now = Timestamp::from_millis(1_000);

    // Empty caps would normally trigger the fill step; connect-only wins.
    let action = policy.decide(now, &counts(0, 0), not_connected, false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::Manual,
            purpose: DialPurpose::ConnectOnly,
            target: Some(ep(1)),
        })
    );

    // With the first target up, the second is dialed.
    let connected: HashSet<Endpoint> = [ep(1)].into_iter().collect();
    let action = policy.decide(now, &counts(0, 0), |e| connected.contains(e), false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::Manual,
            purpose: DialPurpose::ConnectOnly,
            target: Some(ep(2)),
        })
    );

    // Both up: idle, never automatic dialing.
    let connected: HashSet<Endpoint> = [ep(1), ep(2)].into_iter().collect();
    let action = policy.decide(now, &counts(0, 0), |e| connected.contains(e), true, &mut rng);
    assert_eq!(action, DialAction::Idle);
}

// =============================================================================
// TEST GROUP 2: Anchors
// =============================================================================

#[test]
fn test_anchors_dialed_before_fill() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut policy = policy(Vec::new());
    policy.load_anchors(vec![ep(10), ep(11)]);
    let now = Timestamp::from_millis(1_000);

    let action = policy.decide(now, &counts(0, 0), not_connected, false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::OutboundBlockOnly,
            purpose: DialPurpose::Anchor,
            target: Some(ep(10)),
        })
    );
}

#[test]
fn test_leftover_anchors_dropped_once_block_relay_is_full() {
    // Test limits allow a single block-relay peer; the second anchor has
    // nowhere to go and must not linger.
    let mut rng = StdRng::seed_from_u64(3);
    let mut policy = policy(Vec::new());
    policy.load_anchors(vec![ep(10), ep(11)]);
    let now = Timestamp::from_millis(1_000);

    let action = policy.decide(now, &counts(0, 1), not_connected, false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::OutboundFull,
            purpose: DialPurpose::Fill,
            target: None,
        })
    );
    assert_eq!(policy.pending_anchors(), 0);
}

#[test]
fn test_connected_anchor_is_skipped() {
    let mut rng = StdRng::seed_from_u64(4);
    let mut policy = policy(Vec::new());
    policy.load_anchors(vec![ep(10), ep(11)]);
    let now = Timestamp::from_millis(1_000);

    let connected: HashSet<Endpoint> = [ep(10)].into_iter().collect();
    let action = policy.decide(now, &counts(0, 0), |e| connected.contains(e), false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::OutboundBlockOnly,
            purpose: DialPurpose::Anchor,
            target: Some(ep(11)),
        })
    );
}

// =============================================================================
// TEST GROUP 3: Fill precedence
// =============================================================================

#[test]
fn test_fill_precedence_case_table() {
    // Test limits: full cap 3, block-relay cap 1.
    let cases: Vec<((usize, usize), Option<ConnectionClass>)> = vec![
        ((0, 0), Some(ConnectionClass::OutboundFull)),
        ((2, 0), Some(ConnectionClass::OutboundFull)),
        ((2, 1), Some(ConnectionClass::OutboundFull)),
        ((3, 0), Some(ConnectionClass::OutboundBlockOnly)),
        // Both caps met: nothing to fill; the first tick only arms the
        // probe timers.
        ((3, 1), None),
    ];

    for ((full, block), expected) in cases {
        let mut rng = StdRng::seed_from_u64(5);
        let mut policy = policy(Vec::new());
        let action = policy.decide(
            Timestamp::from_millis(1_000),
            &counts(full, block),
            not_connected,
            false,
            &mut rng,
        );
        match expected {
            Some(class) => assert_eq!(
                action,
                DialAction::Dial(DialPlan {
                    class,
                    purpose: DialPurpose::Fill,
                    target: None,
                }),
                "counts ({full}, {block})"
            ),
            None => assert_eq!(action, DialAction::Idle, "counts ({full}, {block})"),
        }
    }
}

// =============================================================================
// TEST GROUP 4: Stale-tip refresh
// =============================================================================

#[test]
fn test_stale_tip_refresh_is_cooldown_limited() {
    let config = NetConfig::for_testing();
    let cooldown = config.timeouts.extra_probe_interval;
    let mut rng = StdRng::seed_from_u64(6);
    let mut policy = policy(Vec::new());
    let at_caps = counts(3, 1);
    let start = Timestamp::from_millis(1_000);

    let action = policy.decide(start, &at_caps, not_connected, true, &mut rng);
    assert_eq!(action, DialAction::RefreshFullRelay);

    // Immediately after, the cooldown suppresses another displacement.
    let action = policy.decide(start, &at_caps, not_connected, true, &mut rng);
    assert_ne!(action, DialAction::RefreshFullRelay);

    // Once the cooldown passes the refresh fires again.
    let later = start.saturating_add(cooldown).saturating_add(cooldown);
    let action = policy.decide(later, &at_caps, not_connected, true, &mut rng);
    assert_eq!(action, DialAction::RefreshFullRelay);
}

#[test]
fn test_refresh_needs_an_existing_full_relay_peer() {
    let config = NetConfig::for_testing();
    let limits = crate::domain::config::ConnectionLimits {
        max_outbound_full: 0,
        max_outbound_block_relay: 0,
        ..config.limits
    };
    let mut rng = StdRng::seed_from_u64(7);
    let mut policy = DialPolicy::new(limits, Vec::new(), &config.timeouts);

    let action = policy.decide(
        Timestamp::from_millis(1_000),
        &counts(0, 0),
        not_connected,
        true,
        &mut rng,
    );
    assert_eq!(action, DialAction::Idle);
}

// =============================================================================
// TEST GROUP 5: Probe scheduling
// =============================================================================

#[test]
fn test_tip_probe_and_feeler_fire_after_their_draws() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut policy = policy(Vec::new());
    let at_caps = counts(3, 1);
    let start = Timestamp::from_millis(1_000);

    // First consult at caps arms both timers.
    assert_eq!(
        policy.decide(start, &at_caps, not_connected, false, &mut rng),
        DialAction::Idle
    );
    let (probe_at, feeler_at) = policy.probe_timers_next();
    let due = probe_at
        .unwrap()
        .max(feeler_at.unwrap())
        .saturating_add(std::time::Duration::from_secs(1));

    // Past both draws, the tip probe outranks the feeler.
    let action = policy.decide(due, &at_caps, not_connected, false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::OutboundBlockOnly,
            purpose: DialPurpose::TipProbe,
            target: None,
        })
    );

    // With the probe in flight, the feeler gets its turn.
    let with_probe = PoolCounts {
        tip_probes: 1,
        ..at_caps
    };
    let action = policy.decide(due, &with_probe, not_connected, false, &mut rng);
    assert_eq!(
        action,
        DialAction::Dial(DialPlan {
            class: ConnectionClass::Feeler,
            purpose: DialPurpose::Feeler,
            target: None,
        })
    );

    // One of each at a time.
    let with_both = PoolCounts {
        tip_probes: 1,
        feeler: 1,
        ..at_caps
    };
    assert_eq!(
        policy.decide(due, &with_both, not_connected, false, &mut rng),
        DialAction::Idle
    );
}

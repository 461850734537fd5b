//! In-memory address source.
//!
//! Two-table layout: `new` holds addresses we have only heard about, `tried`
//! holds addresses that completed a handshake at least once. Promotion from
//! new to tried is deferred to `resolve_tried_collisions` so a full tried
//! table displaces its stalest entry instead of silently dropping the
//! newcomer. Selection is random, tried-biased for regular outbound slots
//! and new-biased for feelers.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::domain::types::{Endpoint, Timestamp};
use crate::ports::outbound::{
    AddressBookState, AddressEntry, AddressFilter, AddressProvenance, AddressSource,
};

const NEW_TABLE_CAP: usize = 16_384;
const TRIED_TABLE_CAP: usize = 4_096;

#[derive(Debug, Clone, Copy, Default)]
struct AddressRecord {
    last_success_millis: u64,
    attempts: u32,
}

struct BookInner {
    new: HashMap<Endpoint, AddressRecord>,
    tried: HashMap<Endpoint, AddressRecord>,
    /// Endpoints that earned promotion but have not been moved yet.
    pending_promotions: Vec<Endpoint>,
    rng: StdRng,
}

impl BookInner {
    fn random_key(&mut self, from_tried: bool) -> Option<Endpoint> {
        let table = if from_tried { &self.tried } else { &self.new };
        if table.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..table.len());
        table.keys().nth(index).copied()
    }
}

/// Shared-state address book; every method locks internally.
pub struct AddressBook {
    new_cap: usize,
    tried_cap: usize,
    inner: Mutex<BookInner>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::with_caps(NEW_TABLE_CAP, TRIED_TABLE_CAP)
    }

    pub fn with_caps(new_cap: usize, tried_cap: usize) -> Self {
        Self {
            new_cap: new_cap.max(1),
            tried_cap: tried_cap.max(1),
            inner: Mutex::new(BookInner {
                new: HashMap::new(),
                tried: HashMap::new(),
                pending_promotions: Vec::new(),
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Deterministic selection order for tests.
    pub fn seeded(seed: u64) -> Self {
        let book = Self::new();
        book.inner.lock().rng = StdRng::seed_from_u64(seed);
        book
    }

    pub fn tried_count(&self) -> usize {
        self.inner.lock().tried.len()
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSource for AddressBook {
    fn pick_address(&self, filter: AddressFilter) -> Option<Endpoint> {
        let mut inner = self.inner.lock();
        let (primary_tried, bias) = match filter {
            AddressFilter::Outbound => (true, 0.67),
            AddressFilter::Untested => (false, 0.9),
        };
        let has_new = !inner.new.is_empty();
        let has_tried = !inner.tried.is_empty();
        let from_tried = match (has_new, has_tried) {
            (false, false) => return None,
            (true, false) => false,
            (false, true) => true,
            (true, true) => {
                let pick_primary = inner.rng.gen_bool(bias);
                if primary_tried {
                    pick_primary
                } else {
                    !pick_primary
                }
            }
        };
        inner.random_key(from_tried)
    }

    fn mark_connected(&self, endpoint: &Endpoint, at: Timestamp) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(record) = inner.tried.get_mut(endpoint) {
            record.last_success_millis = at.as_millis();
            record.attempts = 0;
            return;
        }
        if let Some(record) = inner.new.get_mut(endpoint) {
            record.last_success_millis = at.as_millis();
            record.attempts = 0;
            if !inner.pending_promotions.contains(endpoint) {
                inner.pending_promotions.push(*endpoint);
            }
        }
    }

    fn mark_attempt(&self, endpoint: &Endpoint, _at: Timestamp) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let record = if inner.tried.contains_key(endpoint) {
            inner.tried.get_mut(endpoint)
        } else {
            inner.new.get_mut(endpoint)
        };
        if let Some(record) = record {
            record.attempts = record.attempts.saturating_add(1);
        }
    }

    fn add(&self, endpoints: &[Endpoint], provenance: AddressProvenance) -> usize {
        let mut inner = self.inner.lock();
        let mut added = 0;
        for endpoint in endpoints {
            if inner.new.contains_key(endpoint) || inner.tried.contains_key(endpoint) {
                continue;
            }
            if inner.new.len() >= self.new_cap {
                // Random eviction keeps the table churning instead of
                // freezing its earliest content forever.
                if let Some(victim) = inner.random_key(false) {
                    inner.new.remove(&victim);
                }
            }
            inner.new.insert(*endpoint, AddressRecord::default());
            added += 1;
        }
        if added > 0 {
            debug!(added, ?provenance, "addresses merged");
        }
        added
    }

    fn resolve_tried_collisions(&self) {
        let mut inner = self.inner.lock();
        let pending = std::mem::take(&mut inner.pending_promotions);
        for endpoint in pending {
            let record = match inner.new.remove(&endpoint) {
                Some(record) => record,
                None => continue,
            };
            if inner.tried.len() >= self.tried_cap {
                // Displace the stalest tried entry back to new; the proven
                // newcomer wins the slot.
                let stalest = inner
                    .tried
                    .iter()
                    .min_by_key(|(_, r)| r.last_success_millis)
                    .map(|(e, _)| *e);
                if let Some(stale) = stalest {
                    if let Some(old) = inner.tried.remove(&stale) {
                        inner.new.insert(stale, old);
                    }
                }
            }
            inner.tried.insert(endpoint, record);
        }
    }

    fn known_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.new.len() + inner.tried.len()
    }

    fn export_state(&self) -> AddressBookState {
        let inner = self.inner.lock();
        let to_entries = |table: &HashMap<Endpoint, AddressRecord>| {
            table
                .iter()
                .map(|(endpoint, record)| AddressEntry {
                    endpoint: *endpoint,
                    last_success_millis: record.last_success_millis,
                    attempts: record.attempts,
                })
                .collect()
        };
        AddressBookState {
            new: to_entries(&inner.new),
            tried: to_entries(&inner.tried),
        }
    }

    fn import_state(&self, state: AddressBookState) {
        let mut inner = self.inner.lock();
        inner.new.clear();
        inner.tried.clear();
        inner.pending_promotions.clear();
        for entry in state.new {
            inner.new.insert(
                entry.endpoint,
                AddressRecord {
                    last_success_millis: entry.last_success_millis,
                    attempts: entry.attempts,
                },
            );
        }
        for entry in state.tried {
            inner.tried.insert(
                entry.endpoint,
                AddressRecord {
                    last_success_millis: entry.last_success_millis,
                    attempts: entry.attempts,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(n: u8) -> Endpoint {
        Endpoint::new(format!("10.2.0.{n}").parse().unwrap(), 9333)
    }

    #[test]
    fn test_add_deduplicates_across_tables() {
        let book = AddressBook::seeded(1);
        assert_eq!(book.add(&[ep(1), ep(2)], AddressProvenance::Seed), 2);
        assert_eq!(book.add(&[ep(1)], AddressProvenance::Gossip), 0);

        book.mark_connected(&ep(1), Timestamp::from_millis(500));
        book.resolve_tried_collisions();
        assert_eq!(book.add(&[ep(1)], AddressProvenance::Gossip), 0);
        assert_eq!(book.known_count(), 2);
    }

    #[test]
    fn test_success_promotes_via_collision_resolution() {
        let book = AddressBook::seeded(2);
        book.add(&[ep(1)], AddressProvenance::Seed);
        book.mark_connected(&ep(1), Timestamp::from_millis(1_000));
        assert_eq!(book.tried_count(), 0, "promotion is deferred");

        book.resolve_tried_collisions();
        assert_eq!(book.tried_count(), 1);
        assert_eq!(book.known_count(), 1);
    }

    #[test]
    fn test_full_tried_table_displaces_stalest_entry() {
        let book = AddressBook::with_caps(16, 2);
        for (i, at) in [(1u8, 100u64), (2, 200)] {
            book.add(&[ep(i)], AddressProvenance::Seed);
            book.mark_connected(&ep(i), Timestamp::from_millis(at));
            book.resolve_tried_collisions();
        }
        assert_eq!(book.tried_count(), 2);

        book.add(&[ep(3)], AddressProvenance::Seed);
        book.mark_connected(&ep(3), Timestamp::from_millis(300));
        book.resolve_tried_collisions();

        // ep(1) had the oldest success; it is back in new, ep(3) is tried.
        assert_eq!(book.tried_count(), 2);
        assert_eq!(book.known_count(), 3);
        let state = book.export_state();
        assert!(state.tried.iter().any(|e| e.endpoint == ep(3)));
        assert!(state.new.iter().any(|e| e.endpoint == ep(1)));
    }

    #[test]
    fn test_outbound_picks_lean_tried() {
        let book = AddressBook::seeded(3);
        book.add(&[ep(1)], AddressProvenance::Seed);
        book.mark_connected(&ep(1), Timestamp::from_millis(100));
        book.resolve_tried_collisions();
        book.add(&[ep(2)], AddressProvenance::Seed);

        let mut tried_hits = 0;
        for _ in 0..200 {
            if book.pick_address(AddressFilter::Outbound) == Some(ep(1)) {
                tried_hits += 1;
            }
        }
        assert!(tried_hits > 100, "tried table should dominate: {tried_hits}");
    }

    #[test]
    fn test_untested_picks_lean_new() {
        let book = AddressBook::seeded(4);
        book.add(&[ep(1)], AddressProvenance::Seed);
        book.mark_connected(&ep(1), Timestamp::from_millis(100));
        book.resolve_tried_collisions();
        book.add(&[ep(2)], AddressProvenance::Seed);

        let mut new_hits = 0;
        for _ in 0..200 {
            if book.pick_address(AddressFilter::Untested) == Some(ep(2)) {
                new_hits += 1;
            }
        }
        assert!(new_hits > 150, "new table should dominate: {new_hits}");
    }

    #[test]
    fn test_pick_from_empty_book_is_none() {
        let book = AddressBook::seeded(5);
        assert_eq!(book.pick_address(AddressFilter::Outbound), None);
        assert_eq!(book.pick_address(AddressFilter::Untested), None);
    }

    #[test]
    fn test_attempts_reset_on_success() {
        let book = AddressBook::seeded(6);
        book.add(&[ep(1)], AddressProvenance::Seed);
        book.mark_attempt(&ep(1), Timestamp::from_millis(10));
        book.mark_attempt(&ep(1), Timestamp::from_millis(20));
        let state = book.export_state();
        assert_eq!(state.new[0].attempts, 2);

        book.mark_connected(&ep(1), Timestamp::from_millis(30));
        let state = book.export_state();
        assert_eq!(state.new[0].attempts, 0);
        assert_eq!(state.new[0].last_success_millis, 30);
    }

    #[test]
    fn test_state_round_trip() {
        let book = AddressBook::seeded(7);
        book.add(&[ep(1), ep(2), ep(3)], AddressProvenance::Seed);
        book.mark_connected(&ep(2), Timestamp::from_millis(900));
        book.resolve_tried_collisions();

        let restored = AddressBook::seeded(8);
        restored.import_state(book.export_state());
        assert_eq!(restored.known_count(), 3);
        assert_eq!(restored.tried_count(), 1);
    }

    #[test]
    fn test_new_table_cap_evicts_rather_than_grows() {
        let book = AddressBook::with_caps(4, 4);
        let targets: Vec<Endpoint> = (1..=8).map(ep).collect();
        book.add(&targets, AddressProvenance::Gossip);
        assert_eq!(book.known_count(), 4);
    }
}

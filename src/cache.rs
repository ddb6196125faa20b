//! Bounded, fully associative cache keyed by page number.
//!
//! Both the TLB and the physical frame table are instances of
//! [`AssociativeCache`]; they differ only in payload and in how their callers
//! interpret a miss.

use std::fmt;

use serde::Serialize;

use crate::error::ConfigError;
use crate::policy::{EvictionPolicy, Evictor, ReplacementState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSlot<P> {
    pub key: u64,
    pub payload: P,
    pub valid: bool,
    pub inserted_at: u64,
    pub last_used_at: u64,
    pub referenced: bool,
}

impl<P> ReplacementState for CacheSlot<P> {
    fn inserted_at(&self) -> u64 {
        self.inserted_at
    }

    fn last_used_at(&self) -> u64 {
        self.last_used_at
    }

    fn referenced(&self) -> bool {
        self.referenced
    }

    fn clear_reference(&mut self) {
        self.referenced = false;
    }
}

/// Outcome of a single [`AssociativeCache::access`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult<P> {
    pub hit: bool,
    pub key: u64,
    pub payload: P,
    pub evicted: Option<u64>,
    pub slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub accesses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot<P> {
    pub index: usize,
    pub key: Option<u64>,
    pub payload: Option<P>,
    pub valid: bool,
    pub inserted_at: u64,
    pub last_used_at: u64,
    pub referenced: bool,
}

/// Everything a presenter needs to draw the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot<P> {
    pub policy: EvictionPolicy,
    pub capacity: usize,
    pub clock_hand: usize,
    pub slots: Vec<SlotSnapshot<P>>,
    pub stats: CacheStats,
}

impl<P: fmt::Display> fmt::Display for CacheSnapshot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} entries, {} replacement", self.capacity, self.policy)?;
        writeln!(f, "INDEX   KEY             PAYLOAD         VALID   LAST USED")?;
        writeln!(f, "{}", "-".repeat(64))?;
        for s in &self.slots {
            match (s.key, &s.payload) {
                (Some(key), Some(payload)) if s.valid => {
                    let key = format!("{:#x}", key);
                    let payload = payload.to_string();
                    writeln!(f, "{:<7} {:<15} {:<15} YES     {}", s.index, key, payload, s.last_used_at)?;
                }
                _ => writeln!(f, "{:<7} (empty)         -               NO      -", s.index)?,
            }
        }
        writeln!(f, "{}", "-".repeat(64))?;
        write!(
            f,
            "Hits: {}  Misses: {}  Total: {}  Hit Rate: {:.2}%",
            self.stats.hits, self.stats.misses, self.stats.accesses, self.stats.hit_rate
        )
    }
}

#[derive(Debug)]
pub struct AssociativeCache<P> {
    slots: Vec<CacheSlot<P>>,
    evictor: Evictor,
    counter: u64,
    // Recency clock for slot stamps; only `flush` rewinds it.
    stamp: u64,
    hits: u64,
    misses: u64,
}

impl<P: Clone + Default> AssociativeCache<P> {
    pub fn new(capacity: usize, evictor: Evictor) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        Ok(AssociativeCache {
            slots: vec![CacheSlot::default(); capacity],
            evictor,
            counter: 0,
            stamp: 0,
            hits: 0,
            misses: 0,
        })
    }

    pub fn with_policy(capacity: usize, policy: EvictionPolicy, seed: Option<u64>) -> Result<Self, ConfigError> {
        Self::new(capacity, Evictor::new(policy, seed))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.evictor.policy()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn slots(&self) -> &[CacheSlot<P>] {
        &self.slots
    }

    pub fn valid_count(&self) -> usize {
        self.slots.iter().filter(|s| s.valid).count()
    }

    /// Slot index holding `key`, without touching any bookkeeping
    pub fn position(&self, key: u64) -> Option<usize> {
        self.slots.iter().position(|s| s.valid && s.key == key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.position(key).is_some()
    }

    /// Percentage of accesses that hit; 0 before the first access.
    pub fn hit_rate(&self) -> f64 {
        let total = self.accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }

    fn tick(&mut self) -> u64 {
        self.counter += 1;
        self.stamp += 1;
        self.stamp
    }

    fn touch(&mut self, idx: usize) {
        let now = self.tick();
        let slot = &mut self.slots[idx];
        slot.last_used_at = now;
        slot.referenced = true;
    }

    /// Search for `key`. Counts a hit or a miss; never inserts.
    pub fn lookup(&mut self, key: u64) -> Option<P> {
        self.lookup_slot(key).map(|idx| self.slots[idx].payload.clone())
    }

    fn lookup_slot(&mut self, key: u64) -> Option<usize> {
        match self.position(key) {
            Some(idx) => {
                self.hits += 1;
                self.touch(idx);
                log::trace!("hit key={:#x} slot={}", key, idx);
                Some(idx)
            }
            None => {
                self.misses += 1;
                log::trace!("miss key={:#x}", key);
                None
            }
        }
    }

    /// Store `key -> payload`, evicting if the cache is full.
    ///
    /// Returns the key that was pushed out, if any. An existing `key` is
    /// refreshed in place and never causes an eviction.
    pub fn insert(&mut self, key: u64, payload: P) -> Option<u64> {
        self.place(key, payload).1
    }

    fn place(&mut self, key: u64, payload: P) -> (usize, Option<u64>) {
        if let Some(idx) = self.position(key) {
            self.slots[idx].payload = payload;
            self.touch(idx);
            return (idx, None);
        }

        let (idx, evicted) = match self.slots.iter().position(|s| !s.valid) {
            Some(free) => (free, None),
            None => {
                let victim = self.evictor.select_victim(&mut self.slots);
                let old = &self.slots[victim];
                let evicted = old.valid.then_some(old.key);
                (victim, evicted)
            }
        };

        if let Some(old) = evicted {
            log::debug!(
                "{} evicted key={:#x} from slot {} for key={:#x}",
                self.evictor.policy(),
                old,
                idx,
                key
            );
        }

        let now = self.tick();
        self.slots[idx] = CacheSlot {
            key,
            payload,
            valid: true,
            inserted_at: now,
            last_used_at: now,
            referenced: true,
        };
        (idx, evicted)
    }

    /// Lookup, and on a miss insert `payload_if_miss`.
    pub fn access(&mut self, key: u64, payload_if_miss: P) -> AccessResult<P> {
        if let Some(slot) = self.lookup_slot(key) {
            return AccessResult {
                hit: true,
                key,
                payload: self.slots[slot].payload.clone(),
                evicted: None,
                slot,
            };
        }

        let (slot, evicted) = self.place(key, payload_if_miss);
        AccessResult {
            hit: false,
            key,
            payload: self.slots[slot].payload.clone(),
            evicted,
            slot,
        }
    }

    /// Drop `key` if present. Counters are untouched.
    pub fn invalidate(&mut self, key: u64) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.slots[idx] = CacheSlot::default();
                true
            }
            None => false,
        }
    }

    /// Empty every slot and zero all statistics and the Clock hand.
    pub fn flush(&mut self) {
        self.slots.fill(CacheSlot::default());
        self.evictor.reset();
        self.stamp = 0;
        self.reset_stats();
        log::debug!("flushed {} slots", self.slots.len());
    }

    /// Zero hits, misses and the access counter; contents stay.
    ///
    /// Slot stamps are untouched, so surviving entries keep their relative
    /// insertion and recency order.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.counter = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            accesses: self.accesses(),
            hit_rate: self.hit_rate(),
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot<P> {
        let slots = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, s)| SlotSnapshot {
                index,
                key: s.valid.then_some(s.key),
                payload: s.valid.then(|| s.payload.clone()),
                valid: s.valid,
                inserted_at: s.inserted_at,
                last_used_at: s.last_used_at,
                referenced: s.referenced,
            })
            .collect();

        CacheSnapshot {
            policy: self.policy(),
            capacity: self.capacity(),
            clock_hand: self.evictor.clock_hand(),
            slots,
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn cache(capacity: usize, policy: EvictionPolicy) -> AssociativeCache<u64> {
        AssociativeCache::with_policy(capacity, policy, Some(7)).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = AssociativeCache::<u64>::with_policy(0, EvictionPolicy::Lru, None).unwrap_err();
        assert_eq!(err, ConfigError::InvalidCapacity(0));
    }

    #[test]
    fn test_lookup_miss_does_not_insert() {
        let mut c = cache(2, EvictionPolicy::Lru);
        assert_eq!(c.lookup(5), None);
        assert_eq!(c.misses(), 1);
        assert_eq!(c.valid_count(), 0);
    }

    #[test]
    fn test_lookup_hit_updates_recency() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.insert(5, 50);
        assert_eq!(c.counter(), 1);
        assert_eq!(c.lookup(5), Some(50));
        assert_eq!(c.hits(), 1);
        assert_eq!(c.counter(), 2);
        assert_eq!(c.slots()[0].last_used_at, 2);
        assert_eq!(c.slots()[0].inserted_at, 1);
    }

    #[test]
    fn test_insert_fills_free_slots_in_order() {
        let mut c = cache(3, EvictionPolicy::Lru);
        assert_eq!(c.insert(1, 10), None);
        assert_eq!(c.insert(2, 20), None);
        assert_eq!(c.position(1), Some(0));
        assert_eq!(c.position(2), Some(1));
    }

    #[test]
    fn test_insert_existing_key_refreshes() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.insert(1, 10);
        c.insert(2, 20);
        assert_eq!(c.insert(1, 11), None);
        assert_eq!(c.valid_count(), 2);
        assert_eq!(c.lookup(1), Some(11));
        // 1 was refreshed, so 2 is now least recently used
        assert_eq!(c.insert(3, 30), Some(2));
    }

    #[test]
    fn test_fifo_evicts_first_inserted_despite_hits() {
        let mut c = cache(3, EvictionPolicy::Fifo);
        c.access(1, 1);
        c.access(2, 2);
        c.access(3, 3);
        assert!(c.access(1, 1).hit);
        assert!(c.access(1, 1).hit);
        let r = c.access(4, 4);
        assert!(!r.hit);
        assert_eq!(r.evicted, Some(1));
        assert_eq!(r.slot, 0);
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        // A(miss), B(miss), A(hit), C(miss) -> evicts B
        let (a, b, c_key) = (0xa, 0xb, 0xc);
        let mut c = cache(2, EvictionPolicy::Lru);
        assert!(!c.access(a, 1).hit);
        assert!(!c.access(b, 2).hit);
        assert!(c.access(a, 1).hit);
        let r = c.access(c_key, 3);
        assert!(!r.hit);
        assert_eq!(r.evicted, Some(b));
        assert!(c.contains(a));
        assert!(!c.contains(b));
    }

    #[test]
    fn test_clock_gives_second_chance() {
        let mut c = cache(3, EvictionPolicy::Clock);
        c.access(1, 1);
        c.access(2, 2);
        c.access(3, 3);
        // every bit set: first lap clears all, victim is slot 0
        assert_eq!(c.access(4, 4).evicted, Some(1));
        // 4 was loaded with its bit set; 2 and 3 are clear, hand is at 1
        c.access(3, 3);
        assert_eq!(c.access(5, 5).evicted, Some(2));
        // hand at 2: slot 2 (key 3) referenced -> cleared, slot 0 (key 4) referenced -> cleared,
        // slot 1 (key 5) referenced -> cleared, slot 2 now clear
        assert_eq!(c.access(6, 6).evicted, Some(3));
    }

    #[test]
    fn test_access_reports_payload() {
        let mut c = cache(2, EvictionPolicy::Lru);
        let miss = c.access(9, 90);
        assert_eq!(miss, AccessResult { hit: false, key: 9, payload: 90, evicted: None, slot: 0 });
        // payload on a hit comes from the cache, not the argument
        let hit = c.access(9, 999);
        assert_eq!(hit, AccessResult { hit: true, key: 9, payload: 90, evicted: None, slot: 0 });
    }

    #[test]
    fn test_invalidate() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.access(1, 1);
        assert!(c.invalidate(1));
        assert!(!c.invalidate(1));
        assert_eq!(c.valid_count(), 0);
        assert_eq!(c.misses(), 1);
        // freed slot is reused without eviction
        c.access(2, 2);
        c.access(3, 3);
        assert_eq!(c.insert(4, 4), Some(2));
    }

    #[test]
    fn test_flush_resets_everything() {
        let mut c = cache(2, EvictionPolicy::Clock);
        c.access(1, 1);
        c.access(2, 2);
        c.access(3, 3);
        c.flush();
        assert_eq!(c.valid_count(), 0);
        assert_eq!(c.hits(), 0);
        assert_eq!(c.misses(), 0);
        assert_eq!(c.counter(), 0);
        assert_eq!(c.snapshot().clock_hand, 0);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut c = cache(3, EvictionPolicy::Lru);
        for k in 0..5 {
            c.access(k, k);
        }
        c.flush();
        let once = c.snapshot();
        c.flush();
        assert_eq!(c.snapshot(), once);
    }

    #[test]
    fn test_reset_stats_keeps_contents() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.access(1, 1);
        c.access(1, 1);
        c.reset_stats();
        assert_eq!(c.hits(), 0);
        assert_eq!(c.misses(), 0);
        assert_eq!(c.counter(), 0);
        assert!(c.contains(1));
        assert_eq!(c.hit_rate(), 0.0);
    }

    #[test]
    fn test_reset_stats_keeps_lru_order() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.access(1, 1);
        c.access(2, 2);
        c.access(1, 1);
        c.reset_stats();
        // 1 was used after 2, and the reset does not change that
        assert_eq!(c.access(3, 3).evicted, Some(2));
    }

    #[test]
    fn test_reset_stats_keeps_fifo_order() {
        let mut c = cache(3, EvictionPolicy::Fifo);
        for k in [1, 2, 3, 4] {
            c.access(k, k);
        }
        // 4 replaced 1 in slot 0 but is the newest entry
        c.reset_stats();
        assert_eq!(c.access(5, 5).evicted, Some(2));
        assert_eq!(c.access(6, 6).evicted, Some(3));
        assert_eq!(c.access(7, 7).evicted, Some(4));
    }

    #[test]
    fn test_reset_stats_then_flush_rewinds_stamps() {
        let mut c = cache(2, EvictionPolicy::Lru);
        c.access(1, 1);
        c.access(2, 2);
        c.reset_stats();
        c.access(3, 3);
        assert_eq!(c.counter(), 1);
        assert!(c.slots().iter().all(|s| s.last_used_at > 0));

        c.flush();
        c.access(4, 4);
        assert_eq!(c.slots()[0].inserted_at, 1);
    }

    #[test]
    fn test_hit_rate() {
        let mut c = cache(4, EvictionPolicy::Lru);
        assert_eq!(c.hit_rate(), 0.0);
        c.access(1, 1);
        c.access(1, 1);
        c.access(1, 1);
        c.access(2, 2);
        assert!((c.hit_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut c = cache(3, EvictionPolicy::Fifo);
        c.access(0x10, 0x99);
        let snap = c.snapshot();
        assert_eq!(snap.capacity, 3);
        assert_eq!(snap.policy, EvictionPolicy::Fifo);
        assert_eq!(snap.slots.len(), 3);
        assert_eq!(snap.slots[0].key, Some(0x10));
        assert_eq!(snap.slots[0].payload, Some(0x99));
        assert_eq!(snap.slots[1].key, None);
        assert!(!snap.slots[1].valid);
        assert_eq!(snap.stats.misses, 1);

        let text = snap.to_string();
        assert!(text.contains("0x10"));
        assert!(text.contains("(empty)"));
        assert!(text.contains("FIFO"));
    }

    fn policy_strategy() -> impl Strategy<Value = EvictionPolicy> {
        prop_oneof![
            Just(EvictionPolicy::Lru),
            Just(EvictionPolicy::Fifo),
            Just(EvictionPolicy::Random),
            Just(EvictionPolicy::Clock),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_capacity_and_uniqueness_hold(
            capacity in 1usize..9,
            policy in policy_strategy(),
            keys in proptest::collection::vec(0u64..16, 0..100),
        ) {
            let mut c = AssociativeCache::<u64>::with_policy(capacity, policy, Some(1)).unwrap();
            for k in keys {
                let r = c.access(k, k * 10);
                prop_assert_eq!(r.key, k);
                prop_assert!(r.slot < capacity);
                prop_assert!(c.valid_count() <= capacity);

                let mut seen = HashSet::new();
                for s in c.slots().iter().filter(|s| s.valid) {
                    prop_assert!(seen.insert(s.key), "duplicate key {:#x}", s.key);
                }
                prop_assert!(c.contains(k));
            }
        }

        #[test]
        fn prop_hit_rate_bounded(
            policy in policy_strategy(),
            keys in proptest::collection::vec(0u64..8, 0..64),
        ) {
            let mut c = AssociativeCache::<u64>::with_policy(3, policy, Some(3)).unwrap();
            for k in keys {
                c.access(k, k);
            }
            let rate = c.hit_rate();
            prop_assert!((0.0..=100.0).contains(&rate));
            if c.accesses() == 0 {
                prop_assert_eq!(rate, 0.0);
            }
            prop_assert_eq!(c.accesses(), c.hits() + c.misses());
        }
    }
}

//! Replacement policies for a full fixed-capacity slot array.
//!
//! [`Evictor`] is only consulted once every slot holds a valid entry; free
//! slots are always filled first by the cache itself.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Serialize, Serializer};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Fifo,
    Random,
    Clock,
}

impl EvictionPolicy {
    pub const ALL: [EvictionPolicy; 4] = [
        EvictionPolicy::Lru,
        EvictionPolicy::Fifo,
        EvictionPolicy::Random,
        EvictionPolicy::Clock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Random => "Random",
            EvictionPolicy::Clock => "Clock",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Same spelling in JSON as in the text tables
impl Serialize for EvictionPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "random" | "rand" => Ok(EvictionPolicy::Random),
            "clock" | "second-chance" => Ok(EvictionPolicy::Clock),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Per-slot bookkeeping a policy reads when choosing a victim.
pub trait ReplacementState {
    fn inserted_at(&self) -> u64;
    fn last_used_at(&self) -> u64;
    fn referenced(&self) -> bool;
    fn clear_reference(&mut self);
}

/// A policy together with the state it carries between evictions:
/// the Clock hand and the random source.
pub struct Evictor {
    policy: EvictionPolicy,
    clock_hand: usize,
    rng: Box<dyn RngCore + Send>,
}

impl Evictor {
    /// `seed` makes Random reproducible; `None` seeds from the OS.
    pub fn new(policy: EvictionPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(policy, rng)
    }

    /// Use a caller-supplied random source for the Random policy
    pub fn with_rng<R: RngCore + Send + 'static>(policy: EvictionPolicy, rng: R) -> Self {
        Evictor {
            policy,
            clock_hand: 0,
            rng: Box::new(rng),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn clock_hand(&self) -> usize {
        self.clock_hand
    }

    pub fn reset(&mut self) {
        self.clock_hand = 0;
    }

    /// Choose the slot to replace. `slots` must be non-empty.
    ///
    /// Clock clears reference bits as it passes them.
    pub fn select_victim<S: ReplacementState>(&mut self, slots: &mut [S]) -> usize {
        debug_assert!(!slots.is_empty());
        match self.policy {
            EvictionPolicy::Lru => min_index_by(slots, |s| s.last_used_at()),
            EvictionPolicy::Fifo => min_index_by(slots, |s| s.inserted_at()),
            EvictionPolicy::Random => self.rng.gen_range(0..slots.len()),
            EvictionPolicy::Clock => self.sweep(slots).0,
        }
    }

    /// Second-chance sweep from the hand. Returns the victim and the number
    /// of slots inspected, which never exceeds `2 * slots.len()`.
    pub(crate) fn sweep<S: ReplacementState>(&mut self, slots: &mut [S]) -> (usize, usize) {
        let n = slots.len();
        let mut hand = self.clock_hand % n;

        for step in 1..=2 * n {
            if !slots[hand].referenced() {
                self.clock_hand = (hand + 1) % n;
                return (hand, step);
            }
            slots[hand].clear_reference();
            hand = (hand + 1) % n;
        }

        // A full lap clears every bit, so the loop always returns before here.
        self.clock_hand = (hand + 1) % n;
        (hand, 2 * n)
    }
}

impl fmt::Debug for Evictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evictor")
            .field("policy", &self.policy)
            .field("clock_hand", &self.clock_hand)
            .finish_non_exhaustive()
    }
}

// First minimum wins, so ties go to the lowest index.
fn min_index_by<S, F: Fn(&S) -> u64>(slots: &[S], key: F) -> usize {
    slots
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| key(s))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

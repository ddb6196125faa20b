//! Translation lookaside buffer built on [`AssociativeCache`].

use std::fmt;

use serde::Serialize;

use crate::cache::{AccessResult, AssociativeCache, CacheSnapshot};
use crate::constants::{MAX_TLB_ENTRIES, SYNTHETIC_PFN_MASK};
use crate::error::ConfigError;
use crate::policy::{EvictionPolicy, Evictor};
use crate::translation::{self, AddressSpaceReader, PageIndices};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TlbEntry {
    pub pfn: u64,
    pub dirty: bool,
}

impl fmt::Display for TlbEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}{}", self.pfn, if self.dirty { " D" } else { "" })
    }
}

/// Where the frame number in a [`TlbAccess`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PfnSource {
    /// Already cached (hit)
    Cached,
    /// Given by the caller
    Supplied,
    /// Read from the process's page tables
    PageTable,
    /// Made up from the VPN; not a real translation
    Synthetic,
}

/// Demonstration-only frame for a VPN with no known translation.
pub fn synthetic_pfn(vpn: u64) -> u64 {
    vpn & SYNTHETIC_PFN_MASK
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlbAccess {
    pub virtual_addr: u64,
    pub vpn: u64,
    pub indices: PageIndices,
    pub hit: bool,
    pub entry: TlbEntry,
    pub physical_addr: u64,
    pub evicted: Option<u64>,
    pub slot: usize,
    pub source: PfnSource,
}

impl TlbAccess {
    fn new(va: u64, r: AccessResult<TlbEntry>, source: PfnSource) -> Self {
        TlbAccess {
            virtual_addr: va,
            vpn: r.key,
            indices: PageIndices::from_raw(va),
            hit: r.hit,
            entry: r.payload,
            physical_addr: translation::compose(r.payload.pfn, translation::page_offset(va)),
            evicted: r.evicted,
            slot: r.slot,
            source: if r.hit { PfnSource::Cached } else { source },
        }
    }
}

impl fmt::Display for TlbAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hit {
            return write!(f, "[TLB HIT] VPN {:#x} -> PFN {:#x} (slot {})", self.vpn, self.entry.pfn, self.slot);
        }
        write!(f, "[TLB MISS] VPN {:#x} -> PFN {:#x}", self.vpn, self.entry.pfn)?;
        if self.source == PfnSource::Synthetic {
            write!(f, " (simulated)")?;
        }
        match self.evicted {
            Some(old) => write!(f, ", evicted VPN {:#x} from slot {}", old, self.slot),
            None => write!(f, ", inserted into slot {}", self.slot),
        }
    }
}

#[derive(Debug)]
pub struct TlbSimulator {
    cache: AssociativeCache<TlbEntry>,
}

impl TlbSimulator {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Result<Self, ConfigError> {
        Self::with_evictor(capacity, Evictor::new(policy, None))
    }

    pub fn with_seed(capacity: usize, policy: EvictionPolicy, seed: u64) -> Result<Self, ConfigError> {
        Self::with_evictor(capacity, Evictor::new(policy, Some(seed)))
    }

    pub fn with_evictor(capacity: usize, evictor: Evictor) -> Result<Self, ConfigError> {
        if capacity > MAX_TLB_ENTRIES {
            return Err(ConfigError::CapacityTooLarge {
                what: "TLB",
                got: capacity,
                max: MAX_TLB_ENTRIES,
            });
        }
        let cache = AssociativeCache::new(capacity, evictor)?;
        log::debug!("TLB configured: {} entries, {}", capacity, cache.policy());
        Ok(TlbSimulator { cache })
    }

    /// Translate `va` through the TLB, filling it on a miss.
    ///
    /// Without a caller-supplied `pfn` a miss is filled with
    /// [`synthetic_pfn`], which is not a real translation.
    pub fn access(&mut self, va: u64, pfn: Option<u64>) -> TlbAccess {
        self.access_resolved(va, |vpn| match pfn {
            Some(pfn) => (pfn, PfnSource::Supplied),
            None => (synthetic_pfn(vpn), PfnSource::Synthetic),
        })
    }

    /// Like [`access`](Self::access) but resolves misses through `reader`,
    /// falling back to a synthetic frame when the page is not resident.
    pub fn access_with(&mut self, va: u64, reader: &dyn AddressSpaceReader) -> TlbAccess {
        self.access_resolved(va, |vpn| match translation::walk(va, reader) {
            Ok(walk) if walk.is_mapped() => (walk.entry.pfn, PfnSource::PageTable),
            Ok(_) => (synthetic_pfn(vpn), PfnSource::Synthetic),
            Err(e) => {
                log::debug!("falling back to synthetic PFN for {:#x}: {}", va, e);
                (synthetic_pfn(vpn), PfnSource::Synthetic)
            }
        })
    }

    fn access_resolved<F>(&mut self, va: u64, resolve: F) -> TlbAccess
    where
        F: FnOnce(u64) -> (u64, PfnSource),
    {
        let vpn = translation::vpn(va);
        if self.cache.contains(vpn) {
            let r = self.cache.access(vpn, TlbEntry::default());
            return TlbAccess::new(va, r, PfnSource::Cached);
        }

        let (pfn, source) = resolve(vpn);
        let r = self.cache.access(vpn, TlbEntry { pfn, dirty: false });
        TlbAccess::new(va, r, source)
    }

    /// Probe without filling on a miss
    pub fn lookup(&mut self, va: u64) -> Option<TlbEntry> {
        self.cache.lookup(translation::vpn(va))
    }

    pub fn insert(&mut self, vpn: u64, pfn: u64, dirty: bool) -> Option<u64> {
        self.cache.insert(vpn, TlbEntry { pfn, dirty })
    }

    pub fn invalidate(&mut self, vpn: u64) -> bool {
        self.cache.invalidate(vpn)
    }

    pub fn flush(&mut self) {
        self.cache.flush();
    }

    pub fn reset_stats(&mut self) {
        self.cache.reset_stats();
    }

    pub fn hits(&self) -> u64 {
        self.cache.hits()
    }

    pub fn misses(&self) -> u64 {
        self.cache.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.cache.policy()
    }

    pub fn cache(&self) -> &AssociativeCache<TlbEntry> {
        &self.cache
    }

    pub fn snapshot(&self) -> CacheSnapshot<TlbEntry> {
        self.cache.snapshot()
    }
}

//! Simulator instances owned by one client session.
//!
//! `configure_*` returns a [`Shared`] handle; every later operation goes
//! through it, so concurrent requests on one instance are serialized.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::CacheSnapshot;
use crate::constants::{DEFAULT_PAGING_FRAMES, DEFAULT_TLB_ENTRIES};
use crate::error::{Result, SimError};
use crate::paging::{PageAccess, PagingSimulator, ResidentPage};
use crate::policy::EvictionPolicy;
use crate::tlb::{TlbAccess, TlbEntry, TlbSimulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimConfig {
    pub capacity: usize,
    pub policy: EvictionPolicy,
    /// Fixes the Random policy's victim sequence
    pub seed: Option<u64>,
}

impl SimConfig {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        SimConfig { capacity, policy, seed: None }
    }

    pub fn tlb_default() -> Self {
        Self::new(DEFAULT_TLB_ENTRIES, EvictionPolicy::Lru)
    }

    pub fn paging_default() -> Self {
        Self::new(DEFAULT_PAGING_FRAMES, EvictionPolicy::Lru)
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn build_tlb(&self) -> Result<TlbSimulator> {
        let tlb = match self.seed {
            Some(s) => TlbSimulator::with_seed(self.capacity, self.policy, s)?,
            None => TlbSimulator::new(self.capacity, self.policy)?,
        };
        Ok(tlb)
    }

    pub fn build_paging(&self) -> Result<PagingSimulator> {
        let paging = match self.seed {
            Some(s) => PagingSimulator::with_seed(self.capacity, self.policy, s)?,
            None => PagingSimulator::new(self.capacity, self.policy)?,
        };
        Ok(paging)
    }
}

/// A simulator behind a lock, cheap to clone across threads
#[derive(Debug)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Shared(Arc::new(Mutex::new(inner)))
    }

    /// Run `f` with exclusive access to the simulator
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut *guard)
    }
}

#[derive(Debug, Default)]
pub struct Session {
    tlb: Option<Shared<TlbSimulator>>,
    paging: Option<Shared<PagingSimulator>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a TLB, replacing any previous one. On error the old one stays.
    pub fn configure_tlb(&mut self, config: SimConfig) -> Result<Shared<TlbSimulator>> {
        let handle = Shared::new(config.build_tlb()?);
        self.tlb = Some(handle.clone());
        log::info!("TLB initialized with {} entries ({})", config.capacity, config.policy);
        Ok(handle)
    }

    pub fn configure_paging(&mut self, config: SimConfig) -> Result<Shared<PagingSimulator>> {
        let handle = Shared::new(config.build_paging()?);
        self.paging = Some(handle.clone());
        log::info!("paging initialized with {} frames ({})", config.capacity, config.policy);
        Ok(handle)
    }

    pub fn tlb(&self) -> Result<&Shared<TlbSimulator>> {
        self.tlb.as_ref().ok_or(SimError::NotInitialized("TLB"))
    }

    pub fn paging(&self) -> Result<&Shared<PagingSimulator>> {
        self.paging.as_ref().ok_or(SimError::NotInitialized("paging"))
    }

    pub fn tlb_access(&self, va: u64, pfn: Option<u64>) -> Result<TlbAccess> {
        Ok(self.tlb()?.with(|t| t.access(va, pfn)))
    }

    pub fn tlb_lookup(&self, va: u64) -> Result<Option<TlbEntry>> {
        Ok(self.tlb()?.with(|t| t.lookup(va)))
    }

    pub fn tlb_invalidate(&self, vpn: u64) -> Result<bool> {
        Ok(self.tlb()?.with(|t| t.invalidate(vpn)))
    }

    pub fn tlb_flush(&self) -> Result<()> {
        self.tlb()?.with(TlbSimulator::flush);
        Ok(())
    }

    pub fn tlb_reset_stats(&self) -> Result<()> {
        self.tlb()?.with(TlbSimulator::reset_stats);
        Ok(())
    }

    pub fn tlb_inspect(&self) -> Result<CacheSnapshot<TlbEntry>> {
        Ok(self.tlb()?.with(|t| t.snapshot()))
    }

    pub fn paging_access(&self, vpn: u64) -> Result<PageAccess> {
        Ok(self.paging()?.with(|p| p.access(vpn)))
    }

    pub fn paging_sequence(&self, vpns: &[u64]) -> Result<Vec<PageAccess>> {
        Ok(self.paging()?.with(|p| p.run_sequence(vpns)))
    }

    pub fn paging_flush(&self) -> Result<()> {
        self.paging()?.with(PagingSimulator::flush);
        Ok(())
    }

    pub fn paging_reset_stats(&self) -> Result<()> {
        self.paging()?.with(PagingSimulator::reset_stats);
        Ok(())
    }

    pub fn paging_inspect(&self) -> Result<CacheSnapshot<ResidentPage>> {
        Ok(self.paging()?.with(|p| p.snapshot()))
    }
}

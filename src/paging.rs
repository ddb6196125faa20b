//! Demand paging over a fixed set of physical frames.
//!
//! Every fault is resolvable: the page is always brought in, evicting a
//! resident page when no frame is free.

use std::fmt;

use serde::Serialize;

use crate::cache::{AccessResult, AssociativeCache, CacheSnapshot};
use crate::constants::MAX_PAGING_FRAMES;
use crate::error::ConfigError;
use crate::policy::{EvictionPolicy, Evictor};

/// The VPN currently held by a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResidentPage(pub u64);

impl fmt::Display for ResidentPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageAccess {
    pub vpn: u64,
    pub fault: bool,
    pub frame: usize,
    /// Page pushed out of `frame` to make room
    pub evicted: Option<u64>,
}

impl From<AccessResult<ResidentPage>> for PageAccess {
    fn from(r: AccessResult<ResidentPage>) -> Self {
        PageAccess {
            vpn: r.key,
            fault: !r.hit,
            frame: r.slot,
            evicted: r.evicted,
        }
    }
}

impl fmt::Display for PageAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.fault, self.evicted) {
            (false, _) => write!(f, "[PAGE HIT] VPN {:#x} found in Frame {}", self.vpn, self.frame),
            (true, Some(old)) => write!(
                f,
                "[PAGE FAULT] VPN {:#x} not in memory, evicted VPN {:#x} from Frame {}",
                self.vpn, old, self.frame
            ),
            (true, None) => write!(
                f,
                "[PAGE FAULT] VPN {:#x} not in memory, loaded into Frame {}",
                self.vpn, self.frame
            ),
        }
    }
}

#[derive(Debug)]
pub struct PagingSimulator {
    frames: AssociativeCache<ResidentPage>,
}

impl PagingSimulator {
    pub fn new(frames: usize, policy: EvictionPolicy) -> Result<Self, ConfigError> {
        Self::with_evictor(frames, Evictor::new(policy, None))
    }

    pub fn with_seed(frames: usize, policy: EvictionPolicy, seed: u64) -> Result<Self, ConfigError> {
        Self::with_evictor(frames, Evictor::new(policy, Some(seed)))
    }

    pub fn with_evictor(frames: usize, evictor: Evictor) -> Result<Self, ConfigError> {
        if frames > MAX_PAGING_FRAMES {
            return Err(ConfigError::CapacityTooLarge {
                what: "paging",
                got: frames,
                max: MAX_PAGING_FRAMES,
            });
        }
        let frames = AssociativeCache::new(frames, evictor)?;
        log::debug!("paging configured: {} frames, {}", frames.capacity(), frames.policy());
        Ok(PagingSimulator { frames })
    }

    pub fn access(&mut self, vpn: u64) -> PageAccess {
        let access = PageAccess::from(self.frames.access(vpn, ResidentPage(vpn)));
        if let Some(old) = access.evicted {
            log::debug!("page fault on {:#x} replaced {:#x} in frame {}", vpn, old, access.frame);
        }
        access
    }

    /// Apply `vpns` one after another, in order, duplicates included.
    pub fn run_sequence(&mut self, vpns: &[u64]) -> Vec<PageAccess> {
        vpns.iter().map(|&vpn| self.access(vpn)).collect()
    }

    /// Frame currently holding `vpn`
    pub fn frame_of(&self, vpn: u64) -> Option<usize> {
        self.frames.position(vpn)
    }

    pub fn page_faults(&self) -> u64 {
        self.frames.misses()
    }

    pub fn page_hits(&self) -> u64 {
        self.frames.hits()
    }

    pub fn hit_rate(&self) -> f64 {
        self.frames.hit_rate()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.capacity()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.frames.policy()
    }

    pub fn resident(&self) -> usize {
        self.frames.valid_count()
    }

    pub fn flush(&mut self) {
        self.frames.flush();
    }

    pub fn reset_stats(&mut self) {
        self.frames.reset_stats();
    }

    pub fn snapshot(&self) -> CacheSnapshot<ResidentPage> {
        self.frames.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(frames: usize, policy: EvictionPolicy) -> PagingSimulator {
        PagingSimulator::with_seed(frames, policy, 5).unwrap()
    }

    #[test]
    fn test_frame_limits() {
        assert!(matches!(
            PagingSimulator::new(0, EvictionPolicy::Fifo),
            Err(ConfigError::InvalidCapacity(0))
        ));
        assert!(matches!(
            PagingSimulator::new(MAX_PAGING_FRAMES + 1, EvictionPolicy::Fifo),
            Err(ConfigError::CapacityTooLarge { what: "paging", .. })
        ));
    }

    #[test]
    fn test_fifo_documented_scenario() {
        // 4 frames, FIFO: 0x1..0x5 all fault, 0x5 evicts 0x1 from frame 0
        let mut p = sim(4, EvictionPolicy::Fifo);
        let results = p.run_sequence(&[0x1, 0x2, 0x3, 0x4, 0x5]);

        assert!(results.iter().all(|r| r.fault));
        assert_eq!(results[0].frame, 0);
        assert_eq!(results[4].evicted, Some(0x1));
        assert_eq!(results[4].frame, 0);

        // 0x1 is gone, so it faults again and pushes out 0x2
        let again = p.access(0x1);
        assert!(again.fault);
        assert_eq!(again.evicted, Some(0x2));
        assert_eq!(again.frame, 1);
        assert_eq!(p.page_faults(), 6);
        assert_eq!(p.page_hits(), 0);
    }

    #[test]
    fn test_fifo_capacity_three() {
        let mut p = sim(3, EvictionPolicy::Fifo);
        let r = p.run_sequence(&[1, 2, 3, 1, 4]);
        assert!(!r[3].fault);
        assert_eq!(r[4].evicted, Some(1));
    }

    #[test]
    fn test_sequence_keeps_order_and_duplicates() {
        let mut p = sim(2, EvictionPolicy::Lru);
        let r = p.run_sequence(&[7, 7, 8, 7, 9]);
        assert_eq!(r.len(), 5);
        assert_eq!(r.iter().map(|a| a.vpn).collect::<Vec<_>>(), vec![7, 7, 8, 7, 9]);
        assert_eq!(r.iter().map(|a| a.fault).collect::<Vec<_>>(), vec![true, false, true, false, true]);
        assert_eq!(r[4].evicted, Some(8));
        assert_eq!(p.page_hits(), 2);
        assert_eq!(p.page_faults(), 3);
    }

    #[test]
    fn test_clock_sequence() {
        let mut p = sim(3, EvictionPolicy::Clock);
        let r = p.run_sequence(&[1, 2, 3, 4, 1]);
        // all referenced at the first eviction: full lap, frame 0 goes
        assert_eq!(r[3].evicted, Some(1));
        assert_eq!(r[3].frame, 0);
        // hand at frame 1 with a clear bit
        assert_eq!(r[4].evicted, Some(2));
        assert_eq!(r[4].frame, 1);
    }

    #[test]
    fn test_random_never_fails() {
        let mut p = sim(4, EvictionPolicy::Random);
        let vpns: Vec<u64> = (0..50).map(|i| (i * 7) % 13).collect();
        let r = p.run_sequence(&vpns);
        assert_eq!(r.len(), 50);
        assert_eq!(p.resident(), 4);
        assert_eq!(p.page_hits() + p.page_faults(), 50);
        // the page just touched is always resident
        assert_eq!(p.frame_of(vpns[49]), Some(r[49].frame));
    }

    #[test]
    fn test_flush_and_reset() {
        let mut p = sim(2, EvictionPolicy::Lru);
        p.run_sequence(&[1, 1, 2]);
        p.reset_stats();
        assert_eq!(p.page_hits(), 0);
        assert_eq!(p.resident(), 2);

        p.flush();
        assert_eq!(p.resident(), 0);
        assert_eq!(p.page_faults(), 0);
        assert!(p.access(1).fault);
    }

    #[test]
    fn test_reset_keeps_replacement_order() {
        let mut p = sim(3, EvictionPolicy::Fifo);
        p.run_sequence(&[1, 2, 3, 4]);
        p.reset_stats();
        // 2 is the oldest resident page; 4 arrived last
        assert_eq!(p.access(5).evicted, Some(2));

        let mut p = sim(2, EvictionPolicy::Lru);
        p.run_sequence(&[1, 2, 1]);
        p.reset_stats();
        assert_eq!(p.access(3).evicted, Some(2));
    }

    #[test]
    fn test_display_messages() {
        let mut p = sim(1, EvictionPolicy::Lru);
        assert!(p.access(0x10).to_string().contains("loaded into Frame 0"));
        assert!(p.access(0x10).to_string().starts_with("[PAGE HIT]"));
        assert!(p.access(0x20).to_string().contains("evicted VPN 0x10"));
    }

    #[test]
    fn test_snapshot_payload_is_resident_vpn() {
        let mut p = sim(2, EvictionPolicy::Lru);
        p.access(0xabc);
        let snap = p.snapshot();
        assert_eq!(snap.slots[0].payload, Some(ResidentPage(0xabc)));
        assert!(snap.to_string().contains("0xabc"));
    }
}

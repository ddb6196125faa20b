pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

// x86_64 4-level paging: 9 index bits per level
pub const INDEX_BITS: u32 = 9;
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

pub const PT_SHIFT: u32 = PAGE_SHIFT;
pub const PD_SHIFT: u32 = PT_SHIFT + INDEX_BITS;
pub const PDPT_SHIFT: u32 = PD_SHIFT + INDEX_BITS;
pub const PML4_SHIFT: u32 = PDPT_SHIFT + INDEX_BITS;

/// Only bits 47..0 of a virtual address are consumed by the walk.
pub const VA_BITS: u32 = PML4_SHIFT + INDEX_BITS;

/// Synthetic PFNs handed out by the TLB when no real translation is known.
pub const SYNTHETIC_PFN_MASK: u64 = 0xF_FFFF;

// /proc/<pid>/pagemap word layout
pub const PM_PRESENT: u64 = 1 << 63;
pub const PM_SWAPPED: u64 = 1 << 62;
pub const PM_FILE: u64 = 1 << 61;
pub const PM_SOFT_DIRTY: u64 = 1 << 55;
pub const PM_PFN_MASK: u64 = (1 << 55) - 1;

pub const MAX_TLB_ENTRIES: usize = 256;
pub const DEFAULT_TLB_ENTRIES: usize = 16;

pub const MAX_PAGING_FRAMES: usize = 64;
pub const DEFAULT_PAGING_FRAMES: usize = 4;

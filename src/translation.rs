use serde::Serialize;

use crate::constants::*;
use crate::error::{Result, SimError};

/// The decomposed components of a 64-bit virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageIndices {
    pub pml4: u16,
    pub pdpt: u16,
    pub pd: u16,
    pub pt: u16,
    pub offset: u16,
}

impl PageIndices {
    /// Decompose a raw VA into its components.
    ///
    /// Total over `u64`: bits above 47 are ignored rather than rejected.
    pub fn from_raw(va: u64) -> Self {
        PageIndices {
            pml4: ((va >> PML4_SHIFT) & INDEX_MASK) as u16,
            pdpt: ((va >> PDPT_SHIFT) & INDEX_MASK) as u16,
            pd: ((va >> PD_SHIFT) & INDEX_MASK) as u16,
            pt: ((va >> PT_SHIFT) & INDEX_MASK) as u16,
            offset: (va & PAGE_OFFSET_MASK) as u16,
        }
    }

    /// Reassemble the canonical-low VA these indices were taken from
    pub fn to_raw(&self) -> u64 {
        ((self.pml4 as u64) << PML4_SHIFT)
            | ((self.pdpt as u64) << PDPT_SHIFT)
            | ((self.pd as u64) << PD_SHIFT)
            | ((self.pt as u64) << PT_SHIFT)
            | self.offset as u64
    }
}

impl std::fmt::Display for PageIndices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(pml4={}, pdpt={}, pd={}, pt={}, offset={:#05x})",
            self.pml4, self.pdpt, self.pd, self.pt, self.offset
        )
    }
}

pub fn decompose(va: u64) -> PageIndices {
    PageIndices::from_raw(va)
}

/// `(pfn << 12) | offset`; offsets past the page are masked, not rejected.
#[inline]
pub fn compose(pfn: u64, offset: u64) -> u64 {
    (pfn << PAGE_SHIFT) | (offset & PAGE_OFFSET_MASK)
}

#[inline]
pub fn vpn(va: u64) -> u64 {
    va >> PAGE_SHIFT
}

#[inline]
pub fn page_offset(va: u64) -> u64 {
    va & PAGE_OFFSET_MASK
}

/// The low 48 bits of `va` in binary, grouped as PML4 PDPT PD PT offset.
pub fn format_binary(va: u64) -> String {
    let mut out = String::with_capacity(VA_BITS as usize + 4);
    for bit in (0..VA_BITS).rev() {
        out.push(if va & (1 << bit) != 0 { '1' } else { '0' });
        if bit == PML4_SHIFT || bit == PDPT_SHIFT || bit == PD_SHIFT || bit == PT_SHIFT {
            out.push(' ');
        }
    }
    out
}

/// One decoded word of `/proc/<pid>/pagemap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PagemapEntry {
    pub present: bool,
    pub swapped: bool,
    pub file_backed: bool,
    pub soft_dirty: bool,
    /// Frame number; zero unless `present`
    pub pfn: u64,
    /// Swap offset; zero unless `swapped`
    pub swap_offset: u64,
}

impl PagemapEntry {
    pub fn from_raw(word: u64) -> Self {
        let present = word & PM_PRESENT != 0;
        let swapped = word & PM_SWAPPED != 0;
        let low = word & PM_PFN_MASK;

        PagemapEntry {
            present,
            swapped,
            file_backed: word & PM_FILE != 0,
            soft_dirty: word & PM_SOFT_DIRTY != 0,
            pfn: if present { low } else { 0 },
            swap_offset: if !present && swapped { low } else { 0 },
        }
    }
}

/// Supplies the real mapping for a virtual address.
///
/// Implemented outside this crate by whatever reads `/proc/<pid>/pagemap`.
pub trait AddressSpaceReader {
    fn read_entry(&self, va: u64) -> std::result::Result<PagemapEntry, String>;
}

/// Why a walk ended without a physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unmapped {
    NotPresent,
    Swapped { offset: u64 },
}

impl std::fmt::Display for Unmapped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unmapped::NotPresent => write!(f, "page not present (not yet accessed)"),
            Unmapped::Swapped { offset } => write!(f, "page swapped out (swap offset {:#x})", offset),
        }
    }
}

/// Outcome of walking one virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWalk {
    pub virtual_addr: u64,
    pub vpn: u64,
    pub indices: PageIndices,
    pub entry: PagemapEntry,
    pub physical_addr: Option<u64>,
    pub unmapped: Option<Unmapped>,
}

impl PageWalk {
    pub fn is_mapped(&self) -> bool {
        self.physical_addr.is_some()
    }
}

impl std::fmt::Display for PageWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = &self.indices;
        writeln!(f, "Virtual Address: {:#018x}", self.virtual_addr)?;
        writeln!(f, "Binary (48-bit): {}", format_binary(self.virtual_addr))?;
        writeln!(f, "  Bits 47-39: PML4 index = {}", i.pml4)?;
        writeln!(f, "  Bits 38-30: PDPT index = {}", i.pdpt)?;
        writeln!(f, "  Bits 29-21: PD index   = {}", i.pd)?;
        writeln!(f, "  Bits 20-12: PT index   = {}", i.pt)?;
        writeln!(f, "  Bits 11-0:  offset     = {:#05x} ({} bytes)", i.offset, i.offset)?;
        match (self.physical_addr, self.unmapped) {
            (Some(pa), _) => write!(
                f,
                "Physical Address = ({:#x} << 12) | {:#05x} = {:#018x}",
                self.entry.pfn, i.offset, pa
            ),
            (None, Some(why)) => write!(f, "Physical Address: UNAVAILABLE ({})", why),
            (None, None) => write!(f, "Physical Address: UNAVAILABLE"),
        }
    }
}

/// Decompose `va` and resolve it through `reader`
pub fn walk(va: u64, reader: &dyn AddressSpaceReader) -> Result<PageWalk> {
    let indices = PageIndices::from_raw(va);
    let entry = reader.read_entry(va).map_err(SimError::Walk)?;

    let (physical_addr, unmapped) = if entry.present {
        (Some(compose(entry.pfn, indices.offset as u64)), None)
    } else if entry.swapped {
        (None, Some(Unmapped::Swapped { offset: entry.swap_offset }))
    } else {
        (None, Some(Unmapped::NotPresent))
    };

    Ok(PageWalk {
        virtual_addr: va,
        vpn: vpn(va),
        indices,
        entry,
        physical_addr,
        unmapped,
    })
}

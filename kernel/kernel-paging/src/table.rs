//! Typed tables, indices, and the recursive-alias address math.

use crate::entry::PageEntry;
use kernel_addresses::VirtualAddress;

/// Entries per page directory and per page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// The directory slot holding the recursive self-map.
pub const RECURSIVE_SLOT: PdIndex = PdIndex::new(1023);

/// Index into the page directory (derived from VA bits `[31:22]`).
///
/// Strongly typed to avoid mixing with the table level. Range is `0..1024`
/// (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PdIndex(u16);

/// Index into a page table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PtIndex(u16);

impl PdIndex {
    /// Extract the directory index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn from_va(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < ENTRIES_PER_TABLE as u16);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

impl PtIndex {
    /// Extract the table index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn from_va(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < ENTRIES_PER_TABLE as u16);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Split a virtual address into its two translation indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from_va(va), PtIndex::from_va(va))
}

/// The virtual alias of the page directory itself, courtesy of the recursive
/// slot: both index fields select slot 1023, so the walk lands back on the
/// directory page.
#[inline]
#[must_use]
pub const fn directory_alias() -> VirtualAddress {
    VirtualAddress::new(0xFFFF_F000)
}

/// The virtual alias of the page table behind directory slot `pd`: the first
/// index field selects the recursive slot (directory-as-table), the second
/// selects `pd` within it.
#[inline]
#[must_use]
pub const fn table_alias(pd: PdIndex) -> VirtualAddress {
    VirtualAddress::new((0x3FF << 22) | (pd.as_u32() << 12))
}

/// The page directory: 1024 entries, 4 KiB-aligned, one per address space.
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

/// A page table: 1024 entries, 4 KiB-aligned, mapping one 4 MiB span.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageEntry::new(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`. Caller handles any required TLB maintenance
    /// when changing live mappings.
    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageEntry::new(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PtIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`. Caller handles any required TLB maintenance
    /// when changing live mappings.
    #[inline]
    pub const fn set(&mut self, i: PtIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }
}

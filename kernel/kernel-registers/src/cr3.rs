#[cfg(feature = "asm")]
use crate::{LoadRegister, StoreRegister};
use bitfield_struct::bitfield;
use kernel_addresses::PhysicalAddress;

/// CR3 — Page-Directory Base Register.
///
/// Holds the physical base address of the page directory and cache-control
/// flags for directory walks. Assumes standard 4 KiB alignment. Writing CR3
/// also flushes the entire (non-global) TLB, which is the only whole-TLB
/// flush this architecture has.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2 — Reserved (must be 0).
    #[bits(3, default = 0)]
    _reserved_0_2: u8,

    /// Bit 3 — PWT: Page-level Write-Through for directory accesses.
    pub pwt: bool,

    /// Bit 4 — PCD: Page-level Cache Disable for directory accesses.
    pub pcd: bool,

    /// Bits 5–11 — Reserved (must be 0 when written).
    #[bits(7, default = 0)]
    _reserved_5_11: u8,

    /// Bits 12–31 — Page-directory physical base >> 12.
    ///
    /// The directory is 4 KiB-aligned, so only the upper 20 bits are stored.
    #[bits(20)]
    directory_base_4k: u32,
}

impl Cr3 {
    /// Create a `Cr3` value from a page-directory physical base address.
    ///
    /// `directory_phys` must be 4 KiB-aligned.
    #[must_use]
    pub fn from_directory(directory_phys: PhysicalAddress) -> Self {
        debug_assert!(
            directory_phys.is_frame_aligned(),
            "page directory base must be 4K-aligned"
        );
        Self::new().with_directory_base_4k(directory_phys.as_u32() >> 12)
    }

    /// The full physical address of the page-directory base.
    #[must_use]
    pub const fn directory_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.directory_base_4k() << 12)
    }
}

#[cfg(feature = "asm")]
impl LoadRegister for Cr3 {
    unsafe fn load() -> Self {
        let mut cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(feature = "asm")]
impl StoreRegister for Cr3 {
    unsafe fn store(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

use bitfield_struct::bitfield;
use kernel_addresses::Frame;

/// A single 32-bit page-directory or page-table entry in its raw bitfield
/// form.
///
/// This models the common superset of fields found at both paging levels
/// (PDE and PTE). An entry either points to a **page table** (PDE) or
/// directly maps a **physical frame** (PTE); the interpretation is positional,
/// the bit layout identical.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|----------|
/// | 0     | `P` (present)   | Valid entry if set; clear faults on access |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (PTE only) |
/// | 7     | `PS`/`PAT`      | Large page (PDE) / attribute (PTE); unused here |
/// | 8     | `G`             | Global (PTE only) |
/// | 9–11  | OS avail        | Reserved for OS use, written as 0 |
/// | 12–31 | `addr`          | Upper 20 bits of the target physical address |
///
/// The four combinations the kernel writes have named constructors:
/// [`kernel_rw`](Self::kernel_rw) (`0b011`),
/// [`kernel_rw_absent`](Self::kernel_rw_absent) (`0b010`),
/// [`user_absent`](Self::user_absent) (`0b100`) and
/// [`user_rw`](Self::user_rw) (`0b111`).
#[bitfield(u32)]
pub struct PageEntry {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid page table or maps a valid frame.
    /// Clear means any access through this entry raises a page fault.
    pub present: bool,

    /// Writable (RW, bit 1). Clear for read-only.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6) — PTE only. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a PDE; PAT in a PTE. This kernel maps only
    /// 4 KiB pages and always writes 0.
    pub large_page: bool,

    /// Global (G, bit 8) — PTE only. Not used by this kernel.
    pub global_translation: bool,

    /// OS-available (bits 9..=11), written as 0.
    #[bits(3, default = 0)]
    _os_available: u8,

    /// Physical address bits [31:12] (bits 12..=31).
    ///
    /// The frame number of the target: page table for a PDE, mapped frame
    /// for a PTE.
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntry {
    /// Present, writable, supervisor (`0b011`): the kernel identity map, page
    /// tables in the directory, and the recursive slot.
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Writable, supervisor, **not present** (`0b010`): directory slots with
    /// no page table behind them yet.
    #[must_use]
    pub const fn kernel_rw_absent() -> Self {
        Self::new().with_writable(true)
    }

    /// User, **not present** (`0b100`): fresh page-table entries awaiting a
    /// fault; the user bit records whom the mapping will belong to.
    #[must_use]
    pub const fn user_absent() -> Self {
        Self::new().with_user_access(true)
    }

    /// Present, writable, user (`0b111`): lazily installed user mappings.
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// The target frame.
    #[must_use]
    pub const fn frame(self) -> Frame {
        Frame::new(self.frame_bits())
    }

    /// This entry retargeted at `frame`.
    #[must_use]
    pub const fn with_frame(self, frame: Frame) -> Self {
        self.with_frame_bits(frame.number())
    }
}

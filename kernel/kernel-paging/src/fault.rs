//! The page-fault dispatch contract.

use bitfield_struct::bitfield;

/// The error code the CPU pushes for exception vector 14.
#[bitfield(u32)]
pub struct PageFaultErrorCode {
    /// Bit 0 — set: protection violation on a *present* page; clear: the
    /// page was not present.
    pub page_present: bool,

    /// Bit 1 — set: the faulting access was a write; clear: a read.
    pub write: bool,

    /// Bit 2 — set: the fault originated in user mode.
    pub user_mode: bool,

    /// Bits 3–31 — reserved-bit violation and later-architecture flags, none
    /// of which this kernel inspects.
    #[bits(29, default = 0)]
    _rest: u32,
}

/// The register snapshot the exception dispatcher hands to the fault handler.
///
/// Only the error code matters to the memory manager; the faulting address
/// itself is read from CR2.
#[derive(Debug, Clone, Copy)]
pub struct FaultSnapshot {
    pub error_code: PageFaultErrorCode,
}

impl FaultSnapshot {
    #[must_use]
    pub const fn new(error_code: PageFaultErrorCode) -> Self {
        Self { error_code }
    }

    /// A not-present fault, as the CPU raises for a clear present bit.
    #[must_use]
    pub const fn not_present(write: bool) -> Self {
        Self::new(PageFaultErrorCode::new().with_write(write))
    }

    /// A protection fault on a present page.
    #[must_use]
    pub const fn protection(write: bool) -> Self {
        Self::new(
            PageFaultErrorCode::new()
                .with_page_present(true)
                .with_write(write),
        )
    }
}

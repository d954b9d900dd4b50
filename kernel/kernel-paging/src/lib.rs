//! # Two-Level Paging and Virtual Memory Pools
//!
//! Minimal 32-bit (4 KiB pages, two-level) paging for a teaching kernel.
//!
//! ## What you get
//! - A 32-bit page-directory/page-table [entry](PageEntry) with the four flag
//!   combinations the kernel actually writes.
//! - 4 KiB-aligned [`PageDirectory`]/[`PageTable`] wrappers with typed
//!   [`PdIndex`]/[`PtIndex`] helpers.
//! - An [`AddressSpace`] owning a page directory: eager identity mapping of
//!   the low kernel region, a recursive self-map for MMU-enabled edits,
//!   page-fault handling that installs user mappings lazily, and page release.
//! - A [`VmPool`] allocating logical address regions on top of an address
//!   space, with its bookkeeping inside its own first page.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PDE  |  PTE  | Offset |
//! ```
//!
//! The CPU uses the two index fields to walk two levels of tables, each with
//! 1024 entries of 4 bytes.
//!
//! ```text
//!  Page Directory → Page Table → Physical Frame
//!   │                │
//!   │                └───► PTE (Page Table Entry) → maps one 4 KiB page
//!   └────────────────────► PDE (Page Directory Entry) → selects a page table
//! ```
//!
//! ## The recursive self-map
//!
//! Directory slot 1023 points back at the directory itself. Walking any
//! address in the top 4 MiB therefore resolves *through the directory twice*,
//! which turns page tables into plain virtual memory:
//!
//! - `0xFFFF_F000` aliases the page directory.
//! - `0xFFC0_0000 | (pde << 12)` aliases the page table for slot `pde`.
//!
//! These aliases are the only way MMU-enabled code edits the tables; they are
//! installed at construction, before paging is switched on, precisely so the
//! fault handler can rely on them.
//!
//! ## Hardware seams
//!
//! All machine access goes through three small traits so the same code runs
//! on the bare metal and under hosted tests: [`PhysMapper`] (re-exported from
//! `kernel-frames`), [`VirtMapper`], and [`ControlRegs`], bundled as
//! [`Machine`]. The `asm` feature provides `BareMachine` for the real thing;
//! tests drive a software machine with an in-memory frame store and a
//! software page walker.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod address_space;
mod entry;
mod fault;
mod table;
mod vm_pool;

pub use crate::address_space::{AddressSpace, MAX_VM_WINDOWS, PagingError, VmWindow};
pub use crate::entry::PageEntry;
pub use crate::fault::{FaultSnapshot, PageFaultErrorCode};
pub use crate::table::{
    ENTRIES_PER_TABLE, PageDirectory, PageTable, PdIndex, PtIndex, RECURSIVE_SLOT,
    directory_alias, split_indices, table_alias,
};
pub use crate::vm_pool::{MAX_VM_REGIONS, VmPool, VmPoolError, VmRegion};

pub use kernel_frames::PhysMapper;

use kernel_addresses::VirtualAddress;
use kernel_registers::{Cr0, Cr3};

/// Converts virtual addresses to usable pointers in the *current* address
/// space.
///
/// Only the MMU-enabled page-table edit paths use this: the recursive aliases
/// and the virtual-memory-pool bookkeeping page are meaningful solely under
/// translation. On the bare machine this is a pointer cast; tests perform a
/// software walk of the live tables.
pub trait VirtMapper {
    /// Convert a *virtual* address to a usable mutable reference.
    ///
    /// # Safety
    /// `va` must be mapped writable in the current address space and the
    /// bytes there must be valid for `T`.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;
}

/// The control-register contract the paging code consumes: the paging enable
/// bit, the faulting address, and the directory base.
pub trait ControlRegs {
    fn read_cr0(&self) -> Cr0;

    /// # Safety
    /// Toggling CR0 bits changes the execution environment; the caller must
    /// guarantee the new state is survivable (for PG: a valid CR3 and an
    /// identity mapping of the executing code).
    unsafe fn write_cr0(&self, value: Cr0);

    fn read_cr2(&self) -> VirtualAddress;

    /// # Safety
    /// The value must point at a valid page directory; every mapping the
    /// executing code relies on must exist in the new tree.
    unsafe fn write_cr3(&self, value: Cr3);
}

/// Everything the address space needs from the platform.
pub trait Machine: PhysMapper + VirtMapper + ControlRegs {}

impl<T: PhysMapper + VirtMapper + ControlRegs> Machine for T {}

/// The real machine: physical and virtual addresses are plain pointers (the
/// kernel region is identity-mapped) and control registers are accessed with
/// `mov`. Must only be used in ring 0 on a 32-bit x86 CPU.
#[cfg(feature = "asm")]
pub struct BareMachine;

#[cfg(feature = "asm")]
mod bare {
    use super::{BareMachine, ControlRegs, VirtMapper};
    use kernel_addresses::{PhysicalAddress, VirtualAddress};
    use kernel_frames::PhysMapper;
    use kernel_registers::{Cr0, Cr2, Cr3, LoadRegister, StoreRegister};

    impl PhysMapper for BareMachine {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            unsafe { &mut *(pa.as_usize() as *mut T) }
        }
    }

    impl VirtMapper for BareMachine {
        unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
            unsafe { &mut *(va.as_usize() as *mut T) }
        }
    }

    impl ControlRegs for BareMachine {
        fn read_cr0(&self) -> Cr0 {
            unsafe { Cr0::load() }
        }

        unsafe fn write_cr0(&self, value: Cr0) {
            unsafe { value.store() }
        }

        fn read_cr2(&self) -> VirtualAddress {
            unsafe { Cr2::load() }.fault_address()
        }

        unsafe fn write_cr3(&self, value: Cr3) {
            unsafe { value.store() }
        }
    }
}

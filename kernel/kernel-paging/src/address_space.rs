//! # The Address Space
//!
//! An [`AddressSpace`] owns one page directory and drives everything that
//! happens to it: eager identity mapping of the low kernel region at
//! construction, activation via CR3, lazy fault-driven user mappings, and
//! page release.
//!
//! ## Lifecycle
//!
//! ```ignore
//! let aspace = AddressSpace::new(&machine, &registry, kernel, process, KERNEL_SHARED_SIZE)?;
//! unsafe {
//!     aspace.load();           // CR3 := directory
//!     aspace.enable_paging();  // CR0.PG := 1
//! }
//! // from here on, accesses outside the shared region fault in lazily
//! ```
//!
//! ## Invariants
//!
//! - Directory slot 1023 always maps the directory itself
//!   (`kernel_rw`-flagged), installed before paging is enabled. All
//!   MMU-enabled table edits go through the resulting aliases and therefore
//!   touch only memory that is already mapped, so a fault cannot nest inside
//!   the fault handler.
//! - Installing a mapping for a previously absent address needs no TLB flush
//!   (there is no stale entry); removing one does, and
//!   [`free_page`](AddressSpace::free_page) reloads CR3 for exactly that
//!   reason.

use crate::entry::PageEntry;
use crate::fault::FaultSnapshot;
use crate::table::{
    ENTRIES_PER_TABLE, PageDirectory, PageTable, PdIndex, PtIndex, RECURSIVE_SLOT,
    directory_alias, split_indices, table_alias,
};
use crate::Machine;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_addresses::{Frame, PhysicalAddress, VirtualAddress};
use kernel_frames::{FramePoolError, FrameRegistry, PoolHandle};
use kernel_info::memory::TABLE_SPAN;
use kernel_registers::Cr3;
use spin::Mutex;

/// Upper bound on VM pools registered with one address space.
pub const MAX_VM_WINDOWS: usize = 8;

/// The address range a virtual memory pool answers for.
///
/// The window check is deliberately permissive: any address inside the
/// declared range is accepted, allocated region or not, because the fault
/// handler only ever backs addresses that would fault again anyway.
#[derive(Debug, Clone, Copy)]
pub struct VmWindow {
    pub base: VirtualAddress,
    pub size: u32,
}

impl VmWindow {
    /// `true` iff `base <= addr <= base + size` (upper bound inclusive).
    #[must_use]
    pub fn covers(&self, addr: VirtualAddress) -> bool {
        addr >= self.base
            && u64::from(addr.as_u32()) <= u64::from(self.base.as_u32()) + u64::from(self.size)
    }
}

struct VmWindows {
    slots: [Option<VmWindow>; MAX_VM_WINDOWS],
    len: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PagingError {
    #[error("backing frame allocation failed: {0}")]
    FrameAlloc(#[from] FramePoolError),

    #[error("too many virtual memory pools registered")]
    TooManyPools,
}

/// One address space: a page directory, the pools backing it, and the VM
/// pools registered with it.
pub struct AddressSpace<'m, M: Machine> {
    machine: &'m M,
    registry: &'m FrameRegistry<'m, M>,
    process_pool: PoolHandle,
    directory: Frame,
    shared_size: u32,
    paging_enabled: AtomicBool,
    vm_windows: Mutex<VmWindows>,
}

impl<'m, M: Machine> AddressSpace<'m, M> {
    /// Build a fresh address space.
    ///
    /// The directory comes from the kernel pool; one page table per 4 MiB of
    /// `shared_size` comes from the process pool and is filled with identity
    /// mappings (`kernel_rw`), so the kernel keeps running across the paging
    /// switch. Every other directory slot is `kernel_rw_absent`, except the
    /// top slot, which self-maps the directory.
    pub fn new(
        machine: &'m M,
        registry: &'m FrameRegistry<'m, M>,
        kernel_pool: PoolHandle,
        process_pool: PoolHandle,
        shared_size: u32,
    ) -> Result<Self, PagingError> {
        assert!(
            shared_size > 0 && shared_size % TABLE_SPAN == 0,
            "shared region must be a whole number of page tables"
        );

        let directory_frame = registry.alloc_frames(kernel_pool, 1)?;
        let directory: &mut PageDirectory =
            unsafe { machine.phys_to_mut(directory_frame.base()) };

        let shared_tables = shared_size / TABLE_SPAN;
        for t in 0..shared_tables {
            let table_frame = registry.alloc_frames(process_pool, 1)?;
            let table: &mut PageTable = unsafe { machine.phys_to_mut(table_frame.base()) };
            for i in 0..ENTRIES_PER_TABLE as u32 {
                let target = Frame::new(t * ENTRIES_PER_TABLE as u32 + i);
                table.set(
                    PtIndex::new(i as u16),
                    PageEntry::kernel_rw().with_frame(target),
                );
            }
            directory.set(
                PdIndex::new(t as u16),
                PageEntry::kernel_rw().with_frame(table_frame),
            );
        }

        for slot in shared_tables as usize..ENTRIES_PER_TABLE - 1 {
            directory.set(PdIndex::new(slot as u16), PageEntry::kernel_rw_absent());
        }

        // The self-map that makes the directory and every live page table
        // editable after paging is on.
        directory.set(
            RECURSIVE_SLOT,
            PageEntry::kernel_rw().with_frame(directory_frame),
        );

        log::debug!(
            "address space set up: directory at frame {directory_frame}, \
             {shared_tables} shared tables"
        );

        Ok(Self {
            machine,
            registry,
            process_pool,
            directory: directory_frame,
            shared_size,
            paging_enabled: AtomicBool::new(false),
            vm_windows: Mutex::new(VmWindows {
                slots: [None; MAX_VM_WINDOWS],
                len: 0,
            }),
        })
    }

    /// Make this the active address space by loading CR3 with the directory
    /// base.
    ///
    /// Reloading CR3 is also the whole-TLB flush on this architecture, so
    /// mapping-removal paths call this on the already-active space.
    ///
    /// # Safety
    /// Every mapping the executing code relies on must exist in this tree.
    pub unsafe fn load(&self) {
        unsafe {
            self.machine
                .write_cr3(Cr3::from_directory(self.directory.base()));
        }
    }

    /// Set CR0.PG. The space must have been [`load`](Self::load)ed first.
    ///
    /// # Safety
    /// The executing code, stack, and exception handlers must be mapped in
    /// the active tree (the identity-mapped shared region covers them).
    pub unsafe fn enable_paging(&self) {
        let cr0 = self.machine.read_cr0().with_pg_paging(true);
        unsafe { self.machine.write_cr0(cr0) };
        self.paging_enabled.store(true, Ordering::Relaxed);
        log::info!("paging enabled");
    }

    /// Register the window of a virtual memory pool. Once any window is
    /// registered, faults outside every window become fatal.
    pub fn register_window(&self, window: VmWindow) -> Result<(), PagingError> {
        let mut windows = self.vm_windows.lock();
        if windows.len == MAX_VM_WINDOWS {
            return Err(PagingError::TooManyPools);
        }
        let len = windows.len;
        windows.slots[len] = Some(window);
        windows.len += 1;
        log::debug!("registered vm pool window at {}", window.base);
        Ok(())
    }

    /// Page-fault entry point, called by the exception dispatcher for
    /// vector 14.
    ///
    /// Protection faults are logged and otherwise ignored. A not-present
    /// fault allocates the missing translation level (the page table if the
    /// directory slot is empty, otherwise the backing frame) and returns;
    /// the faulting access re-executes and either succeeds or faults once
    /// more for the next level.
    pub fn handle_fault(&self, snapshot: &FaultSnapshot) {
        let fault_addr = self.machine.read_cr2();

        if snapshot.error_code.page_present() {
            log::warn!("protection fault at {fault_addr}; mapping unchanged");
            return;
        }

        log::trace!("page fault at {fault_addr}");

        {
            let windows = self.vm_windows.lock();
            let legitimate = windows.len == 0
                || windows.slots[..windows.len]
                    .iter()
                    .flatten()
                    .any(|w| w.covers(fault_addr));
            if !legitimate {
                log::error!("page fault at {fault_addr} outside every registered vm pool");
                panic!("illegitimate page fault at {fault_addr}");
            }
        }

        if let Err(err) = self.map_missing(fault_addr) {
            log::error!("cannot back {fault_addr}: {err}");
            panic!("out of frames handling page fault at {fault_addr}");
        }
    }

    /// Release the frame behind one mapped page.
    ///
    /// Clears the present bit, returns the frame to its pool, and reloads
    /// CR3 so no stale translation survives. A page that was never mapped is
    /// left alone.
    pub fn free_page(&self, page: VirtualAddress) {
        let (pd_index, pt_index) = split_indices(page);

        let directory: &mut PageDirectory =
            unsafe { self.machine.virt_to_mut(directory_alias()) };
        if !directory.get(pd_index).present() {
            return;
        }

        let table: &mut PageTable = unsafe { self.machine.virt_to_mut(table_alias(pd_index)) };
        let entry = table.get(pt_index);
        if !entry.present() {
            return;
        }

        self.registry.release(entry.frame());
        table.set(pt_index, entry.with_present(false));

        // The mapping was live; flush the TLB by reloading CR3.
        unsafe { self.load() };
        log::trace!("freed page {page}");
    }

    /// Walk this space's tables for `va`.
    ///
    /// Works with paging on or off because it reads the tables through their
    /// physical addresses.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let directory: &PageDirectory = unsafe { self.machine.phys_to_mut(self.directory.base()) };
        let pde = directory.get(PdIndex::from_va(va));
        if !pde.present() {
            return None;
        }

        let table: &PageTable = unsafe { self.machine.phys_to_mut(pde.frame().base()) };
        let pte = table.get(PtIndex::from_va(va));
        if !pte.present() {
            return None;
        }

        Some(pte.frame().base() + va.page_offset())
    }

    /// Fault `va` in without an MMU access: allocate missing translation
    /// levels one at a time, exactly as the fault handler would, until the
    /// address translates. Used to bootstrap structures that live in lazily
    /// mapped memory.
    pub fn touch(&self, va: VirtualAddress) -> Result<(), PagingError> {
        while self.translate(va).is_none() {
            self.map_missing(va)?;
        }
        Ok(())
    }

    /// One lazy-mapping step for a not-present fault at `va`, editing the
    /// tables through the recursive aliases.
    fn map_missing(&self, va: VirtualAddress) -> Result<(), PagingError> {
        debug_assert!(
            self.paging_enabled.load(Ordering::Relaxed),
            "lazy mapping requires the recursive aliases, i.e. paging"
        );

        let pd_index = PdIndex::from_va(va);
        let directory: &mut PageDirectory =
            unsafe { self.machine.virt_to_mut(directory_alias()) };

        if !directory.get(pd_index).present() {
            // No page table behind this slot yet: install one and mark all
            // of its entries user-but-absent. The PTE itself is installed
            // when the access re-faults.
            let table_frame = self.registry.alloc_frames(self.process_pool, 1)?;
            directory.set(pd_index, PageEntry::kernel_rw().with_frame(table_frame));

            let table: &mut PageTable =
                unsafe { self.machine.virt_to_mut(table_alias(pd_index)) };
            for i in 0..ENTRIES_PER_TABLE {
                table.set(PtIndex::new(i as u16), PageEntry::user_absent());
            }
            log::trace!(
                "installed page table for directory slot {}",
                pd_index.as_usize()
            );
        } else {
            let frame = self.registry.alloc_frames(self.process_pool, 1)?;
            let table: &mut PageTable =
                unsafe { self.machine.virt_to_mut(table_alias(pd_index)) };
            table.set(PtIndex::from_va(va), PageEntry::user_rw().with_frame(frame));
            log::trace!("mapped page {} to frame {frame}", va.page_base());
        }

        Ok(())
    }

    /// The frame holding this space's page directory.
    #[must_use]
    pub const fn directory_frame(&self) -> Frame {
        self.directory
    }

    /// Bytes of low memory this space identity-maps eagerly.
    #[must_use]
    pub const fn shared_size(&self) -> u32 {
        self.shared_size
    }

    pub(crate) const fn machine(&self) -> &'m M {
        self.machine
    }
}

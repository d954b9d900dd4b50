//! A software machine for driving the paging code on the host: an in-memory
//! frame store over the real pool layout, control-register cells, and a
//! two-level software walker standing in for the MMU. The faulting-access
//! helpers re-drive `handle_fault` exactly like hardware re-executes a
//! faulting instruction.

#![allow(dead_code)]

use core::cell::Cell;
use kernel_addresses::{FRAME_SIZE, Frame, PhysicalAddress, VirtualAddress};
use kernel_frames::{FramePool, FrameRegistry, PhysMapper, PoolHandle};
use kernel_info::memory::{
    KERNEL_POOL_N_FRAMES, KERNEL_POOL_START_FRAME, MEM_HOLE_N_FRAMES, MEM_HOLE_START_FRAME,
    PROCESS_POOL_N_FRAMES, PROCESS_POOL_START_FRAME,
};
use kernel_paging::{AddressSpace, ControlRegs, FaultSnapshot, PageEntry, VirtMapper};
use kernel_registers::{Cr0, Cr3};

#[repr(align(4096))]
struct RawFrame([u8; FRAME_SIZE as usize]);

pub struct TestMachine {
    frames: Vec<RawFrame>,
    base: Frame,
    cr0: Cell<u32>,
    cr2: Cell<u32>,
    cr3: Cell<u32>,
    cr3_writes: Cell<u32>,
}

impl TestMachine {
    /// Physical memory behind both pools: frames 512..8192 (2 MiB..32 MiB).
    pub fn whole_machine() -> Self {
        let n_frames = (KERNEL_POOL_N_FRAMES + PROCESS_POOL_N_FRAMES) as usize;
        let mut frames = Vec::with_capacity(n_frames);
        frames.resize_with(n_frames, || RawFrame([0; FRAME_SIZE as usize]));
        Self {
            frames,
            base: Frame::new(KERNEL_POOL_START_FRAME),
            cr0: Cell::new(0),
            cr2: Cell::new(0),
            cr3: Cell::new(0),
            cr3_writes: Cell::new(0),
        }
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_usize() - self.base.base().as_usize();
        assert!(
            offset < self.frames.len() * FRAME_SIZE as usize,
            "physical access at {pa} outside the test store"
        );
        unsafe { self.frames.as_ptr().cast::<u8>().cast_mut().add(offset) }
    }

    pub fn read_phys_u32(&self, pa: PhysicalAddress) -> u32 {
        unsafe { self.byte_ptr(pa).cast::<u32>().read() }
    }

    fn read_entry(&self, table: PhysicalAddress, index: u32) -> PageEntry {
        PageEntry::from_bits(self.read_phys_u32(table + index * 4))
    }

    /// Software MMU: the two-level walk through the live CR3 tree.
    pub fn walk(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let directory = Cr3::from_bits(self.cr3.get()).directory_phys();

        let pde = self.read_entry(directory, va.as_u32() >> 22);
        if !pde.present() {
            return None;
        }
        let pte = self.read_entry(pde.frame().base(), (va.as_u32() >> 12) & 0x3FF);
        if !pte.present() {
            return None;
        }
        Some(pte.frame().base() + va.page_offset())
    }

    pub fn set_cr2(&self, va: VirtualAddress) {
        self.cr2.set(va.as_u32());
    }

    pub fn cr3_write_count(&self) -> u32 {
        self.cr3_writes.get()
    }
}

impl PhysMapper for TestMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
    }
}

impl VirtMapper for TestMachine {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = self
            .walk(va)
            .unwrap_or_else(|| panic!("virtual access at {va} is unmapped"));
        unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
    }
}

impl ControlRegs for TestMachine {
    fn read_cr0(&self) -> Cr0 {
        Cr0::from_bits(self.cr0.get())
    }

    unsafe fn write_cr0(&self, value: Cr0) {
        self.cr0.set(value.into_bits());
    }

    fn read_cr2(&self) -> VirtualAddress {
        VirtualAddress::new(self.cr2.get())
    }

    unsafe fn write_cr3(&self, value: Cr3) {
        self.cr3.set(value.into_bits());
        self.cr3_writes.set(self.cr3_writes.get() + 1);
    }
}

/// The machine's real pool layout: a self-hosted kernel pool, a process pool
/// with its state map in kernel frames, and the 1 MiB hole at 15 MiB.
pub fn build_pools<'m>(
    machine: &'m TestMachine,
    registry: &FrameRegistry<'m, TestMachine>,
) -> (PoolHandle, PoolHandle) {
    let kernel = registry.register(FramePool::new(
        machine,
        Frame::new(KERNEL_POOL_START_FRAME),
        KERNEL_POOL_N_FRAMES,
        None,
    ));

    let n_info = FramePool::<TestMachine>::info_frames_needed(PROCESS_POOL_N_FRAMES);
    let info = registry.alloc_frames(kernel, n_info).unwrap();
    let process = registry.register(FramePool::new(
        machine,
        Frame::new(PROCESS_POOL_START_FRAME),
        PROCESS_POOL_N_FRAMES,
        Some(info),
    ));
    registry.reserve_region(process, Frame::new(MEM_HOLE_START_FRAME), MEM_HOLE_N_FRAMES);

    (kernel, process)
}

/// Perform a faulting write the way the CPU would: try to translate, let the
/// fault handler install the missing level, and retry. Two handled faults
/// (page table, then page) always suffice.
pub fn write_u32(
    machine: &TestMachine,
    aspace: &AddressSpace<'_, TestMachine>,
    va: VirtualAddress,
    value: u32,
) {
    for _ in 0..3 {
        if let Some(pa) = machine.walk(va) {
            unsafe { machine.byte_ptr(pa).cast::<u32>().write(value) };
            return;
        }
        machine.set_cr2(va);
        aspace.handle_fault(&FaultSnapshot::not_present(true));
    }
    panic!("write to {va} still faults after two handled faults");
}

/// The read counterpart of [`write_u32`].
pub fn read_u32(
    machine: &TestMachine,
    aspace: &AddressSpace<'_, TestMachine>,
    va: VirtualAddress,
) -> u32 {
    for _ in 0..3 {
        if let Some(pa) = machine.walk(va) {
            return machine.read_phys_u32(pa);
        }
        machine.set_cr2(va);
        aspace.handle_fault(&FaultSnapshot::not_present(false));
    }
    panic!("read from {va} still faults after two handled faults");
}

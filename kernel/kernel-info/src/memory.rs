//! # Physical Memory Layout

use kernel_addresses::{FRAME_SIZE, MIB, PAGE_SIZE};

/// First frame of the kernel frame pool (pool starts at 2 MiB).
pub const KERNEL_POOL_START_FRAME: u32 = (2 * MIB) / FRAME_SIZE;

/// Number of frames in the kernel pool (2 MiB worth).
pub const KERNEL_POOL_N_FRAMES: u32 = (2 * MIB) / FRAME_SIZE;

/// First frame of the process frame pool (pool starts at 4 MiB).
pub const PROCESS_POOL_START_FRAME: u32 = (4 * MIB) / FRAME_SIZE;

/// Number of frames in the process pool (28 MiB worth).
pub const PROCESS_POOL_N_FRAMES: u32 = (28 * MIB) / FRAME_SIZE;

/// First frame of the hole in physical memory at 15 MiB.
///
/// The machine has 1 MiB of address space with no RAM behind it there; the
/// bring-up sequence punches it out of the process pool before any
/// allocation happens.
pub const MEM_HOLE_START_FRAME: u32 = (15 * MIB) / FRAME_SIZE;

/// Number of frames covered by the memory hole (1 MiB worth).
pub const MEM_HOLE_N_FRAMES: u32 = MIB / FRAME_SIZE;

/// Bytes of low memory the kernel identity-maps eagerly at address-space
/// construction. Kernel text, data, stacks and the BIOS area all live below
/// this line, which is what keeps the kernel running across the paging
/// switch.
pub const KERNEL_SHARED_SIZE: u32 = 4 * MIB;

/// Bytes of virtual memory covered by one page table (1024 pages).
pub const TABLE_SPAN: u32 = 1024 * PAGE_SIZE;

const _: () = {
    // Pools must not overlap and the kernel pool must directly precede the
    // process pool.
    assert!(KERNEL_POOL_START_FRAME + KERNEL_POOL_N_FRAMES == PROCESS_POOL_START_FRAME);
    // The hole lies strictly inside the process pool.
    assert!(MEM_HOLE_START_FRAME >= PROCESS_POOL_START_FRAME);
    assert!(
        MEM_HOLE_START_FRAME + MEM_HOLE_N_FRAMES
            <= PROCESS_POOL_START_FRAME + PROCESS_POOL_N_FRAMES
    );
    // The eagerly shared region is a whole number of page tables.
    assert!(KERNEL_SHARED_SIZE % TABLE_SPAN == 0);
    // Everything the pools govern sits below the shared line or is reached
    // through page faults; the pools themselves must fit in 32-bit space.
    assert!(KERNEL_SHARED_SIZE / FRAME_SIZE == PROCESS_POOL_START_FRAME);
};

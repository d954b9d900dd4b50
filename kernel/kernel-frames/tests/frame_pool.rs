//! End-to-end frame pool scenarios over the machine's real layout: a kernel
//! pool at 2 MiB, a process pool at 4 MiB with its state map in kernel
//! frames, and the 1 MiB hole at 15 MiB.

use kernel_addresses::{FRAME_SIZE, Frame, PhysicalAddress};
use kernel_frames::{FramePool, FramePoolError, FrameRegistry, FrameState, PhysMapper, PoolHandle};
use kernel_info::memory::{
    KERNEL_POOL_N_FRAMES, KERNEL_POOL_START_FRAME, MEM_HOLE_N_FRAMES, MEM_HOLE_START_FRAME,
    PROCESS_POOL_N_FRAMES, PROCESS_POOL_START_FRAME,
};

#[repr(align(4096))]
struct RawFrame([u8; FRAME_SIZE as usize]);

/// In-memory stand-in for physical RAM from the kernel pool's base up.
struct TestRam {
    frames: Vec<RawFrame>,
    base: Frame,
}

impl TestRam {
    fn new(base: Frame, n_frames: u32) -> Self {
        let mut frames = Vec::with_capacity(n_frames as usize);
        frames.resize_with(n_frames as usize, || RawFrame([0; FRAME_SIZE as usize]));
        Self { frames, base }
    }

    /// Covers both pools: frames 512..8192 (2 MiB..32 MiB).
    fn whole_machine() -> Self {
        Self::new(
            Frame::new(KERNEL_POOL_START_FRAME),
            KERNEL_POOL_N_FRAMES + PROCESS_POOL_N_FRAMES,
        )
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_usize() - self.base.base().as_usize();
        assert!(offset < self.frames.len() * FRAME_SIZE as usize);
        unsafe { self.frames.as_ptr().cast::<u8>().cast_mut().add(offset) }
    }
}

impl PhysMapper for TestRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
    }
}

fn kernel_pool(ram: &TestRam) -> FramePool<'_, TestRam> {
    FramePool::new(
        ram,
        Frame::new(KERNEL_POOL_START_FRAME),
        KERNEL_POOL_N_FRAMES,
        None,
    )
}

#[test]
fn kernel_pool_single_frame_churn() {
    let ram = TestRam::whole_machine();
    let mut pool = kernel_pool(&ram);
    assert_eq!(pool.free_frames(), 511);

    let frame = pool.alloc_frames(1).unwrap();
    assert_eq!(frame, Frame::new(513));
    assert_eq!(pool.free_frames(), 510);

    pool.release(frame);
    assert_eq!(pool.free_frames(), 511);

    // The self-hosted info frame stays head-of-sequence; everything else is
    // free again.
    assert_eq!(
        pool.frame_state(Frame::new(512)),
        FrameState::HeadOfSequence
    );
    for i in 1..KERNEL_POOL_N_FRAMES {
        assert_eq!(
            pool.frame_state(Frame::new(KERNEL_POOL_START_FRAME + i)),
            FrameState::Free
        );
    }
}

#[test]
fn contiguous_allocation_of_500_then_1000() {
    let ram = TestRam::whole_machine();
    let mut pool = kernel_pool(&ram);

    let run = pool.alloc_frames(500).unwrap();
    assert_eq!(run, Frame::new(513));
    assert_eq!(pool.free_frames(), 11);

    assert_eq!(
        pool.alloc_frames(1000),
        Err(FramePoolError::OutOfFrames {
            requested: 1000,
            available: 11
        })
    );

    pool.release(run);
    assert_eq!(pool.free_frames(), 511);
}

#[test]
fn process_pool_with_hole() {
    let ram = TestRam::whole_machine();
    let registry = FrameRegistry::new();

    let kernel = registry.register(kernel_pool(&ram));
    let n_info = FramePool::<TestRam>::info_frames_needed(PROCESS_POOL_N_FRAMES);
    let info = registry.alloc_frames(kernel, n_info).unwrap();

    let process = registry.register(FramePool::new(
        &ram,
        Frame::new(PROCESS_POOL_START_FRAME),
        PROCESS_POOL_N_FRAMES,
        Some(info),
    ));
    registry.reserve_region(process, Frame::new(MEM_HOLE_START_FRAME), MEM_HOLE_N_FRAMES);

    let free_after_hole = PROCESS_POOL_N_FRAMES - MEM_HOLE_N_FRAMES;
    assert_eq!(registry.free_frames(process), free_after_hole);

    // Enough frames in total, but the hole splits the pool so no run of 6000
    // exists.
    assert!(matches!(
        registry.alloc_frames(process, 6000),
        Err(FramePoolError::Fragmented { requested: 6000 })
    ));
    assert_eq!(registry.free_frames(process), free_after_hole);

    let run = registry.alloc_frames(process, 100).unwrap();
    assert!(run.number() < MEM_HOLE_START_FRAME);

    registry.release(run);
    assert_eq!(registry.free_frames(process), free_after_hole);
}

/// Depth-first allocate/fill/verify/release churn: each level claims
/// `(depth % 4) + 1` frames, fills them with its depth, recurses, and only
/// then verifies its own frames survived everything the deeper levels did.
fn churn(ram: &TestRam, registry: &FrameRegistry<'_, TestRam>, handle: PoolHandle, depth: u32) {
    if depth == 0 {
        return;
    }

    let n_frames = depth % 4 + 1;
    let first = registry.alloc_frames(handle, n_frames).unwrap();
    let len = (n_frames * FRAME_SIZE) as usize;
    let bytes = unsafe { std::slice::from_raw_parts_mut(ram.byte_ptr(first.base()), len) };

    bytes.fill(depth as u8);
    churn(ram, registry, handle, depth - 1);
    assert!(
        bytes.iter().all(|&b| b == depth as u8),
        "frames at {first} were clobbered below depth {depth}"
    );

    registry.release(first);
}

#[test]
fn recursive_memory_churn_restores_the_pool() {
    let ram = TestRam::whole_machine();
    let registry = FrameRegistry::new();
    let kernel = registry.register(kernel_pool(&ram));

    let initial_free = registry.free_frames(kernel);
    churn(&ram, &registry, kernel, 32);
    assert_eq!(registry.free_frames(kernel), initial_free);
}

#[test]
fn release_of_an_unowned_frame_is_ignored() {
    let ram = TestRam::whole_machine();
    let registry = FrameRegistry::new();
    let kernel = registry.register(kernel_pool(&ram));

    // Frame 100 is below every pool; the registry walk falls off the end.
    registry.release(Frame::new(100));
    assert_eq!(registry.free_frames(kernel), 511);
}

#[test]
fn release_dispatches_to_the_owning_pool() {
    let ram = TestRam::whole_machine();
    let registry = FrameRegistry::new();

    let kernel = registry.register(kernel_pool(&ram));
    let info = registry.alloc_frames(kernel, 1).unwrap();
    let process = registry.register(FramePool::new(
        &ram,
        Frame::new(PROCESS_POOL_START_FRAME),
        PROCESS_POOL_N_FRAMES,
        Some(info),
    ));

    let kernel_run = registry.alloc_frames(kernel, 3).unwrap();
    let process_run = registry.alloc_frames(process, 5).unwrap();
    let kernel_free = registry.free_frames(kernel);
    let process_free = registry.free_frames(process);

    registry.release(process_run);
    assert_eq!(registry.free_frames(kernel), kernel_free);
    assert_eq!(registry.free_frames(process), process_free + 5);

    registry.release(kernel_run);
    assert_eq!(registry.free_frames(kernel), kernel_free + 3);
}

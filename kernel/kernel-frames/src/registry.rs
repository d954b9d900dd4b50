//! The process-wide pool registry.
//!
//! When a run of frames is released, the caller usually knows nothing but the
//! first frame number. The registry owns every constructed pool, in
//! construction order, and routes a release to the pool whose frame range
//! contains the number.

use crate::pool::{FramePool, FramePoolError};
use crate::state::FrameState;
use crate::PhysMapper;
use kernel_addresses::Frame;
use spin::Mutex;

/// Upper bound on simultaneously registered pools. The machine has a kernel
/// pool and a process pool; the bound leaves headroom without a heap.
pub const MAX_POOLS: usize = 4;

/// Identifies a registered pool. Handles stay valid for the registry's
/// lifetime; pools are never unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle(usize);

struct Pools<'m, M: PhysMapper> {
    slots: [Option<FramePool<'m, M>>; MAX_POOLS],
    len: usize,
}

/// Owns the frame pools and serializes access to them.
///
/// The page-fault handler allocates frames while ordinary kernel code may be
/// mid-operation on the same pool, so the pools sit behind a spin mutex even
/// on this single-CPU machine.
pub struct FrameRegistry<'m, M: PhysMapper> {
    pools: Mutex<Pools<'m, M>>,
}

impl<'m, M: PhysMapper> FrameRegistry<'m, M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: Mutex::new(Pools {
                slots: [const { None }; MAX_POOLS],
                len: 0,
            }),
        }
    }

    /// Take ownership of `pool`; the returned handle addresses it from now
    /// on. Panics when the registry is full.
    pub fn register(&self, pool: FramePool<'m, M>) -> PoolHandle {
        let mut pools = self.pools.lock();
        assert!(pools.len < MAX_POOLS, "frame pool registry is full");

        let handle = PoolHandle(pools.len);
        log::debug!(
            "registered {:?} pool at frame {} as pool #{}",
            pool.kind(),
            pool.base_frame(),
            handle.0
        );
        let len = pools.len;
        pools.slots[len] = Some(pool);
        pools.len += 1;
        handle
    }

    /// Allocate a contiguous run from the pool behind `handle`.
    pub fn alloc_frames(&self, handle: PoolHandle, n_frames: u32) -> Result<Frame, FramePoolError> {
        self.with_pool(handle, |pool| pool.alloc_frames(n_frames))
    }

    /// Punch a hole into the pool behind `handle` (see
    /// [`FramePool::reserve_region`]).
    pub fn reserve_region(&self, handle: PoolHandle, first: Frame, n_frames: u32) {
        self.with_pool(handle, |pool| pool.reserve_region(first, n_frames));
    }

    /// Release the run whose head is `first` through whichever pool governs
    /// that frame. A frame no pool governs is quietly ignored.
    pub fn release(&self, first: Frame) {
        let mut pools = self.pools.lock();
        for pool in pools.slots.iter_mut().flatten() {
            if pool.contains(first) {
                pool.release(first);
                return;
            }
        }
        log::debug!("release of frame {first} which no pool governs");
    }

    #[must_use]
    pub fn free_frames(&self, handle: PoolHandle) -> u32 {
        self.with_pool(handle, |pool| pool.free_frames())
    }

    #[must_use]
    pub fn frame_state(&self, handle: PoolHandle, frame: Frame) -> FrameState {
        self.with_pool(handle, |pool| pool.frame_state(frame))
    }

    fn with_pool<R>(&self, handle: PoolHandle, f: impl FnOnce(&mut FramePool<'m, M>) -> R) -> R {
        let mut pools = self.pools.lock();
        let pool = pools.slots[handle.0].as_mut().expect("stale pool handle");
        f(pool)
    }
}

impl<'m, M: PhysMapper> Default for FrameRegistry<'m, M> {
    fn default() -> Self {
        Self::new()
    }
}

//! The contiguous frame pool.

use crate::PhysMapper;
use crate::state::{FrameState, FrameStates, STATE_BYTES};
use kernel_addresses::{FRAME_SIZE, Frame};
use kernel_info::memory::KERNEL_POOL_START_FRAME;

/// Frames whose state fits into one info frame: four per byte.
pub(crate) const FRAMES_PER_INFO_FRAME: u32 = FRAME_SIZE * 4;

/// Which physical region a pool governs.
///
/// Derived from the pool's base frame at construction; the kernel pool is the
/// one anchored at [`KERNEL_POOL_START_FRAME`], everything else belongs to
/// processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Kernel,
    Process,
}

impl PoolKind {
    fn classify(base: Frame) -> Self {
        if base.number() == KERNEL_POOL_START_FRAME {
            Self::Kernel
        } else {
            Self::Process
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FramePoolError {
    /// The pool does not have enough free frames, regardless of layout.
    #[error("requested {requested} frames but only {available} are free")]
    OutOfFrames { requested: u32, available: u32 },

    /// Enough frames are free but no contiguous run of the requested length
    /// exists (external fragmentation). Pool state is unchanged.
    #[error("no contiguous run of {requested} free frames")]
    Fragmented { requested: u32 },
}

/// A pool of physically contiguous 4 KiB frames.
///
/// The pool's state map lives inside a frame: either one donated by another
/// pool (`info_frame = Some(..)`) or, when `info_frame` is `None`, the pool's
/// own first frame, which is then permanently allocated to the pool itself.
///
/// An allocation of `n` frames is recorded as one head-of-sequence entry
/// followed by `n - 1` used entries, so [`release`](FramePool::release) can
/// reconstruct the run length from the first frame number alone.
pub struct FramePool<'m, M: PhysMapper> {
    mapper: &'m M,
    base: Frame,
    n_frames: u32,
    n_free: u32,
    info_frame: Frame,
    kind: PoolKind,
}

impl<'m, M: PhysMapper> FramePool<'m, M> {
    /// Build a pool over `n_frames` frames starting at `base`.
    ///
    /// Panics if the state map would not fit into a single info frame.
    pub fn new(mapper: &'m M, base: Frame, n_frames: u32, info_frame: Option<Frame>) -> Self {
        assert!(
            n_frames <= FRAMES_PER_INFO_FRAME,
            "state map must fit one frame"
        );

        let self_hosted = info_frame.is_none();
        let kind = PoolKind::classify(base);
        let mut pool = Self {
            mapper,
            base,
            n_frames,
            n_free: n_frames,
            info_frame: info_frame.unwrap_or(base),
            kind,
        };

        let mut states = pool.states();
        states.fill_free();
        if self_hosted {
            // The first frame holds the state map and is its own run.
            states.set(0, FrameState::HeadOfSequence);
            drop(states);
            pool.n_free -= 1;
        }

        log::debug!(
            "{:?} frame pool over frames {}..{} initialized ({} free)",
            pool.kind,
            pool.base,
            pool.base + pool.n_frames,
            pool.n_free
        );
        pool
    }

    /// Number of info frames needed to manage `n_frames` frames.
    #[must_use]
    pub const fn info_frames_needed(n_frames: u32) -> u32 {
        n_frames.div_ceil(FRAMES_PER_INFO_FRAME)
    }

    /// Allocate a contiguous run of `n_frames` frames, first fit at the
    /// lowest address. On [`FramePoolError::Fragmented`] the pool state is
    /// unchanged.
    pub fn alloc_frames(&mut self, n_frames: u32) -> Result<Frame, FramePoolError> {
        assert!(n_frames > 0, "empty allocation");
        if self.n_free < n_frames {
            log::warn!(
                "{:?} pool cannot allocate {} frames, only {} free",
                self.kind,
                n_frames,
                self.n_free
            );
            return Err(FramePoolError::OutOfFrames {
                requested: n_frames,
                available: self.n_free,
            });
        }

        let Some(start) = self.states().find_free_run(n_frames) else {
            log::warn!(
                "{:?} pool externally fragmented: no run of {} free frames",
                self.kind,
                n_frames
            );
            return Err(FramePoolError::Fragmented {
                requested: n_frames,
            });
        };

        self.claim_run(start, n_frames);
        let first = self.base + start;
        log::trace!("allocated {n_frames} frames at {first}");
        Ok(first)
    }

    /// Mark the run starting at `first` allocated without searching.
    ///
    /// Trusted-operator call used by bring-up to punch holes over physical
    /// regions with no RAM behind them. Only the head frame is checked: if it
    /// is not free the call logs and leaves the pool unchanged.
    pub fn reserve_region(&mut self, first: Frame, n_frames: u32) {
        let index = first - self.base;
        debug_assert!(index + n_frames <= self.n_frames);

        if self.states().get(index) != FrameState::Free {
            log::warn!("cannot reserve frames at {first}: already allocated");
            return;
        }
        self.claim_run(index, n_frames);
        log::debug!("reserved {n_frames} frames at {first}");
    }

    /// Release the run whose head is `first`.
    ///
    /// If `first` is not the head of a sequence the call logs an error and
    /// changes nothing. Otherwise the head and every trailing `Used` frame
    /// become free again; the walk stops at the first free frame, the next
    /// head, or the end of the pool.
    pub fn release(&mut self, first: Frame) {
        let index = first - self.base;
        debug_assert!(index < self.n_frames);

        let mut states = self.states();
        if states.get(index) != FrameState::HeadOfSequence {
            log::error!("release of frame {first} which is not the head of a sequence");
            return;
        }

        states.set(index, FrameState::Free);
        let mut released = 1;
        let mut i = index + 1;
        while i < self.n_frames && states.get(i) == FrameState::Used {
            states.set(i, FrameState::Free);
            released += 1;
            i += 1;
        }
        drop(states);

        self.n_free += released;
        log::trace!("released {released} frames at {first}");
    }

    /// `true` if `frame` lies in the range this pool governs.
    #[must_use]
    pub fn contains(&self, frame: Frame) -> bool {
        frame >= self.base && frame.number() < self.base.number() + self.n_frames
    }

    /// Allocation state of one governed frame, for diagnostics and tests.
    #[must_use]
    pub fn frame_state(&self, frame: Frame) -> FrameState {
        let index = frame - self.base;
        assert!(index < self.n_frames, "frame {frame} outside pool");
        self.states().get(index)
    }

    #[must_use]
    pub const fn base_frame(&self) -> Frame {
        self.base
    }

    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.n_frames
    }

    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.n_free
    }

    #[must_use]
    pub const fn kind(&self) -> PoolKind {
        self.kind
    }

    fn claim_run(&mut self, start: u32, n_frames: u32) {
        let mut states = self.states();
        states.set(start, FrameState::HeadOfSequence);
        for i in start + 1..start + n_frames {
            states.set(i, FrameState::Used);
        }
        drop(states);
        self.n_free -= n_frames;
    }

    fn states(&self) -> FrameStates<'_> {
        // The state map occupies the whole info frame; frames the pool hands
        // out never overlap it.
        let bytes = unsafe {
            self.mapper
                .phys_to_mut::<[u8; STATE_BYTES]>(self.info_frame.base())
        };
        FrameStates::new(bytes, self.n_frames)
    }
}

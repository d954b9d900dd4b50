use crate::{Frame, PAGE_SIZE};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// A thin wrapper around `u32` that denotes **physical** addresses (host RAM).
/// Like [`VirtualAddress`](crate::VirtualAddress), this type carries intent
/// and prevents accidental VA↔PA mix-ups.
///
/// ### Notes
/// - Page-directory and page-table entries store a **frame-aligned** physical
///   base (low 12 bits cleared) plus per-entry flag bits; use
///   [`Frame::containing`] to reason about base vs. offset explicitly.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The frame containing this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Frame {
        Frame::containing(self)
    }

    /// The offset of this address within its frame (`0..PAGE_SIZE`).
    #[inline]
    #[must_use]
    pub const fn frame_offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    /// `true` if this address sits on a frame boundary.
    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.frame_offset() == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.checked_add(rhs).expect("PhysicalAddress add"))
    }
}

impl AddAssign<u32> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

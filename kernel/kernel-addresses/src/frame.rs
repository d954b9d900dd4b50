use crate::{PAGE_SHIFT, PhysicalAddress};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// A 4 KiB physical frame, identified by its frame number.
///
/// The frame number is the physical base address divided by the frame size,
/// so `Frame::new(512)` is the frame starting at 2 MiB.
///
/// ### Examples
/// ```rust
/// # use kernel_addresses::*;
/// let f = Frame::new(512);
/// assert_eq!(f.base(), PhysicalAddress::new(0x0020_0000));
/// assert_eq!(f + 1, Frame::new(513));
/// assert_eq!(Frame::new(513) - Frame::new(512), 1);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Frame(u32);

impl Frame {
    #[inline]
    #[must_use]
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// The frame containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.as_u32() >> PAGE_SHIFT)
    }

    /// The frame number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    /// The physical base address of this frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << PAGE_SHIFT)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({} @ {})", self.0, self.base())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u32> for Frame {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.checked_add(rhs).expect("Frame add"))
    }
}

impl AddAssign<u32> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<Self> for Frame {
    type Output = u32;

    /// Number of frames between `rhs` and `self`; panics if `rhs > self`.
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0.checked_sub(rhs.0).expect("Frame sub")
    }
}

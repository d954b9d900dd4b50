//! # Virtual Memory Pools
//!
//! A [`VmPool`] hands out logical address regions from a fixed window of the
//! virtual address space. Allocation maps nothing: pages fault in on first
//! access, which is why the pool registers its window with the address
//! space; the fault handler asks the windows whether a faulting address is
//! legitimate.
//!
//! The region table lives *inside the pool's own first page*. Writing it at
//! construction is the pool's first, self-inflicted page fault, resolved by
//! the same lazy-mapping path as any other; the address space must therefore
//! be loaded and paging enabled before a pool can be built.

use crate::Machine;
use crate::address_space::{AddressSpace, PagingError, VmWindow};
use kernel_addresses::{PAGE_SIZE, VirtualAddress};

/// Region descriptors fitting in the bookkeeping page.
pub const MAX_VM_REGIONS: usize = PAGE_SIZE as usize / size_of::<VmRegion>();

/// One allocated region: a page-multiple byte range.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmRegion {
    pub base: VirtualAddress,
    pub size: u32,
}

/// The bookkeeping page: region 0 describes the page itself.
#[repr(C, align(4096))]
struct RegionTable {
    regions: [VmRegion; MAX_VM_REGIONS],
}

#[derive(Debug, thiserror::Error)]
pub enum VmPoolError {
    #[error("region table is full ({MAX_VM_REGIONS} regions)")]
    RegionTableFull,

    #[error("allocation of {requested} bytes does not fit the pool window")]
    OutOfSpace { requested: u32 },

    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// A pool of logical addresses over `[base, base + size)`.
///
/// Regions are allocated back to back, each a whole number of pages; the
/// first region is always the bookkeeping page itself.
pub struct VmPool<'a, 'm, M: Machine> {
    address_space: &'a AddressSpace<'m, M>,
    base: VirtualAddress,
    size: u32,
    n_regions: usize,
}

impl<'a, 'm, M: Machine> VmPool<'a, 'm, M> {
    /// Create a pool over `size` bytes at `base` and register it with
    /// `address_space`.
    ///
    /// Faults in the bookkeeping page and writes region 0 into it. Requires
    /// `address_space` to be active with paging enabled.
    pub fn new(
        address_space: &'a AddressSpace<'m, M>,
        base: VirtualAddress,
        size: u32,
    ) -> Result<Self, VmPoolError> {
        assert!(base.is_page_aligned(), "pool base must be page aligned");
        assert!(
            size >= PAGE_SIZE && size % PAGE_SIZE == 0,
            "pool size must be a positive page multiple"
        );

        // Register first: backing the bookkeeping page already goes through
        // the legitimacy check.
        address_space.register_window(VmWindow { base, size })?;
        address_space.touch(base)?;

        let mut pool = Self {
            address_space,
            base,
            size,
            n_regions: 0,
        };
        pool.regions()[0] = VmRegion {
            base,
            size: PAGE_SIZE,
        };
        pool.n_regions = 1;

        log::debug!("vm pool over [{base}, {}) initialized", base + size);
        Ok(pool)
    }

    /// Allocate a region of at least `size` bytes, rounded up to whole
    /// pages, directly after the last region.
    ///
    /// Returns the region's base address. No page is mapped here; each page
    /// faults in on first access.
    pub fn allocate(&mut self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        assert!(size > 0, "empty allocation");

        if self.n_regions == MAX_VM_REGIONS {
            return Err(VmPoolError::RegionTableFull);
        }

        let pages = size.div_ceil(PAGE_SIZE);
        let bytes = u64::from(pages) * u64::from(PAGE_SIZE);

        let regions = self.regions();
        let last = regions[self.n_regions - 1];
        let region_base = last.base + last.size;

        let window_end = u64::from(self.base.as_u32()) + u64::from(self.size);
        if u64::from(region_base.as_u32()) + bytes > window_end {
            return Err(VmPoolError::OutOfSpace { requested: size });
        }

        regions[self.n_regions] = VmRegion {
            base: region_base,
            size: bytes as u32,
        };
        self.n_regions += 1;

        log::trace!("allocated region [{region_base}, {})", region_base + bytes as u32);
        Ok(region_base)
    }

    /// Release the region beginning at `start`: free every page it covers
    /// (mapped or not) and drop its descriptor.
    ///
    /// Panics if `start` begins no region; the bookkeeping region cannot be
    /// released.
    pub fn release(&mut self, start: VirtualAddress) {
        let index = (0..self.n_regions)
            .find(|&i| self.regions()[i].base == start)
            .unwrap_or_else(|| panic!("release of {start} which begins no region"));
        assert!(index != 0, "release of the pool's bookkeeping region");

        let region = self.regions()[index];
        let mut page = region.base;
        let end = region.base + region.size;
        while page < end {
            self.address_space.free_page(page);
            page += PAGE_SIZE;
        }

        let regions = self.regions();
        for i in index..self.n_regions - 1 {
            regions[i] = regions[i + 1];
        }
        self.n_regions -= 1;

        log::debug!("released region at {start}");
    }

    /// `true` iff `addr` lies inside this pool's window (upper bound
    /// inclusive), allocated or not.
    #[must_use]
    pub fn covers(&self, addr: VirtualAddress) -> bool {
        VmWindow {
            base: self.base,
            size: self.size,
        }
        .covers(addr)
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of regions, the bookkeeping page included.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.n_regions
    }

    fn regions(&self) -> &'a mut [VmRegion; MAX_VM_REGIONS] {
        // The bookkeeping page is kept mapped from construction onwards.
        let table: &mut RegionTable =
            unsafe { self.address_space.machine().virt_to_mut(self.base) };
        &mut table.regions
    }
}

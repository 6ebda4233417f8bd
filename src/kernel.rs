use std::{ptr::NonNull, sync::OnceLock};

use tracing::{debug, trace};

use crate::{
    error::ArenaError,
    list::{List, RegionId},
    region::{Bucket, Region},
    utils::Words,
};

/// Virtual memory page size of the computer. This is usually 4096.
/// We can't know the value at compile time, so it is computed once on first use.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The internal data structure of the arena. Here is where we keep every
/// [`Region`] and the three bucket lists that partition them, as well as
/// the low level memory requests and platform-dependant stuff.
///
/// Regions live in a slab (`regions`) and are addressed by [`RegionId`].
/// Each region is linked into exactly one of the bucket lists:
///
/// ```text
///  start          +--------+    +--------+    +--------+
///  -------------> | Region | -> | Region | -> | Region |
///                 +--------+    +--------+    +--------+
///  low_memory     +--------+
///  -------------> | Region |
///                 +--------+
///  not_allocable  +--------+    +--------+
///  -------------> | Region | -> | Region |
///                 +--------+    +--------+
/// ```
#[derive(Debug, Default)]
pub(crate) struct Kernel {
    /// Every region owned by the arena, indexed by [`RegionId`].
    regions: Vec<Region>,
    /// Bucket lists, indexed by [`Bucket::index`].
    lists: [List; Bucket::COUNT],
}

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a Pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    // SAFETY: querying the page size has no preconditions.
    *PAGE_SIZE.get_or_init(|| unsafe { Kernel::page_size() })
}

/// Wrapper to use [`Kernel::request_memory`]
///
/// **SAFETY**: `len` must be a non-zero multiple of [`page_size`].
#[inline]
pub(crate) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::request_memory(len) }
}

/// Wrapper to use [`Kernel::return_memory`]
///
/// **SAFETY**: `addr` and `len` must describe a mapping previously returned
/// by [`request_memory`] that has not been returned yet.
#[inline]
pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) {
    unsafe { Kernel::return_memory(addr, len) }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    return None;
                }

                NonNull::new(addr.cast::<u8>())
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr.cast::<c_void>(), len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use crate::kernel::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                if let Err(err) = Memory::VirtualFree(addr.cast::<c_void>(), 0, Memory::MEM_RELEASE) {
                    tracing::warn!(%err, "VirtualFree failed");
                }
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

impl Kernel {
    /// This function maps a new [`Region`] of `capacity` words and stores it
    /// in the slab. The region is not linked into any list yet; callers must
    /// [`Kernel::push`] it right away.
    ///
    /// The arena is left untouched when the mapping can't be obtained.
    pub(crate) fn create_region(
        &mut self,
        capacity: Words,
        dedicated: bool,
    ) -> Result<RegionId, ArenaError> {
        let region = Region::new(capacity, dedicated)?;
        let id = RegionId(self.regions.len());

        debug!(
            region = id.0,
            capacity = capacity.get(),
            mapped = region.mapped_len(),
            dedicated,
            "mapped new region"
        );

        self.regions.push(region);

        Ok(id)
    }

    #[inline]
    pub(crate) fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0]
    }

    #[inline]
    pub(crate) fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.0]
    }

    #[inline]
    pub(crate) fn list(&self, bucket: Bucket) -> &List {
        &self.lists[bucket.index()]
    }

    #[inline]
    pub(crate) fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Pushes region `id` at the front of `bucket`'s list.
    pub(crate) fn push(&mut self, bucket: Bucket, id: RegionId) {
        let Self { regions, lists } = self;

        lists[bucket.index()].push_front(id, regions);
        regions[id.0].set_bucket(bucket);
    }

    /// Pops the head of `bucket`'s list. Only that list is inspected.
    pub(crate) fn pop(&mut self, bucket: Bucket) -> Option<RegionId> {
        let Self { regions, lists } = self;

        lists[bucket.index()].pop_front(regions)
    }

    /// Splices region `id` out of the list that currently owns it and pushes
    /// it at the front of `bucket`'s list. Migrating to the bucket the region
    /// is already in moves it to the front.
    pub(crate) fn migrate(&mut self, id: RegionId, bucket: Bucket) {
        let from = self.regions[id.0].bucket();

        let Self { regions, lists } = self;
        lists[from.index()].remove(id, regions);

        trace!(region = id.0, ?from, to = ?bucket, "region migrated");

        self.push(bucket, id);
    }

    /// Returns the first region on the start list, in list order, with at
    /// least `size` free words. First-fit, not best-fit.
    ///
    /// Empty regions are skipped: after a reset they stand in for regions
    /// that would otherwise be mapped, see [`Kernel::spare`]. Dedicated
    /// regions are skipped as well.
    pub(crate) fn first_fit(&self, size: Words) -> Option<RegionId> {
        self.list(Bucket::Start).iter(&self.regions).find(|&id| {
            let region = &self.regions[id.0];
            !region.is_dedicated() && !region.used().is_zero() && region.remaining() >= size
        })
    }

    /// Returns the first empty region on the start list that was created with
    /// exactly `capacity` words and the same `dedicated` flag.
    ///
    /// Such regions only exist after a reset. Handing them out where a new
    /// region would be mapped makes a replayed allocation sequence land on
    /// the same offsets without mapping anything new.
    pub(crate) fn spare(&self, capacity: Words, dedicated: bool) -> Option<RegionId> {
        self.list(Bucket::Start).iter(&self.regions).find(|&id| {
            let region = &self.regions[id.0];
            region.is_dedicated() == dedicated
                && region.used().is_zero()
                && region.capacity() == capacity
        })
    }

    /// Empties every region and moves low-memory and then not-allocable
    /// regions back to the front of the start list.
    pub(crate) fn reset(&mut self) {
        for region in &mut self.regions {
            region.clear();
        }

        for bucket in [Bucket::LowMemory, Bucket::NotAllocable] {
            while let Some(id) = self.pop(bucket) {
                self.push(Bucket::Start, id);
            }
            debug_assert!(self.list(bucket).is_empty());
        }

        debug!(regions = self.regions.len(), "arena reset");
    }

    /// Returns every region's memory to the OS and forgets all lists.
    pub(crate) fn release(&mut self) {
        let released = self.regions.len();

        // Dropping a region unmaps its memory.
        self.regions.clear();
        self.lists = Default::default();

        if released > 0 {
            debug!(regions = released, "arena released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_with(count: usize, bucket: Bucket) -> (Kernel, Vec<RegionId>) {
        let mut kernel = Kernel::default();
        let ids = (0..count)
            .map(|_| {
                let id = kernel.create_region(Words(64), false).unwrap();
                kernel.push(bucket, id);
                id
            })
            .collect();

        (kernel, ids)
    }

    fn ids(kernel: &Kernel, bucket: Bucket) -> Vec<RegionId> {
        kernel.list(bucket).iter(kernel.regions()).collect()
    }

    #[test]
    fn page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn pop_only_looks_at_its_own_list() {
        let (mut kernel, regions) = kernel_with(2, Bucket::Start);

        // Low memory is empty, start is not.
        assert_eq!(None, kernel.pop(Bucket::LowMemory));
        assert_eq!(Some(regions[1]), kernel.pop(Bucket::Start));
        assert_eq!(Some(regions[0]), kernel.pop(Bucket::Start));
        assert_eq!(None, kernel.pop(Bucket::Start));
    }

    #[test]
    fn migrating_the_head_keeps_the_rest_reachable() {
        let (mut kernel, regions) = kernel_with(3, Bucket::Start);
        // Start is [2, 1, 0]
        kernel.migrate(regions[2], Bucket::LowMemory);

        assert_eq!(vec![regions[1], regions[0]], ids(&kernel, Bucket::Start));
        assert_eq!(vec![regions[2]], ids(&kernel, Bucket::LowMemory));
        assert_eq!(Bucket::LowMemory, kernel.region(regions[2]).bucket());
    }

    #[test]
    fn migrating_an_interior_region_relinks_neighbours() {
        let (mut kernel, regions) = kernel_with(3, Bucket::Start);
        kernel.migrate(regions[1], Bucket::NotAllocable);

        assert_eq!(vec![regions[2], regions[0]], ids(&kernel, Bucket::Start));
        assert_eq!(vec![regions[1]], ids(&kernel, Bucket::NotAllocable));
    }

    #[test]
    fn first_fit_picks_earliest_region_in_list_order() {
        let (mut kernel, regions) = kernel_with(3, Bucket::Start);
        // Start is [2, 1, 0]; make the head too full.
        kernel.region_mut(regions[2]).bump(Words(60));
        kernel.region_mut(regions[1]).bump(Words(10));
        kernel.region_mut(regions[0]).bump(Words(1));

        assert_eq!(Some(regions[1]), kernel.first_fit(Words(10)));
        assert_eq!(Some(regions[1]), kernel.first_fit(Words(54)));
        assert_eq!(Some(regions[0]), kernel.first_fit(Words(63)));
        assert_eq!(None, kernel.first_fit(Words(64)));
    }

    #[test]
    fn first_fit_skips_empty_and_dedicated_regions() {
        let (mut kernel, regions) = kernel_with(2, Bucket::Start);
        let dedicated = kernel.create_region(Words(64), true).unwrap();
        kernel.push(Bucket::Start, dedicated);
        // Start is [dedicated, 1, 0]; only region 0 has been used.
        kernel.region_mut(regions[0]).bump(Words(4));

        assert_eq!(Some(regions[0]), kernel.first_fit(Words(1)));
        assert_eq!(None, kernel.first_fit(Words(61)));
    }

    #[test]
    fn spare_matches_capacity_and_kind() {
        let (mut kernel, regions) = kernel_with(2, Bucket::Start);
        let dedicated = kernel.create_region(Words(100), true).unwrap();
        kernel.push(Bucket::Start, dedicated);
        // Start is [dedicated, 1, 0].
        kernel.region_mut(regions[1]).bump(Words(1));

        assert_eq!(Some(regions[0]), kernel.spare(Words(64), false));
        assert_eq!(None, kernel.spare(Words(100), false));
        assert_eq!(Some(dedicated), kernel.spare(Words(100), true));
        assert_eq!(None, kernel.spare(Words(64), true));
    }

    #[test]
    fn migrating_within_a_bucket_moves_to_the_front() {
        let (mut kernel, regions) = kernel_with(3, Bucket::Start);
        kernel.migrate(regions[0], Bucket::Start);

        assert_eq!(vec![regions[0], regions[2], regions[1]], ids(&kernel, Bucket::Start));
        assert_eq!(3, kernel.list(Bucket::Start).len());
    }

    #[test]
    fn reset_moves_everything_back_to_start() {
        let (mut kernel, regions) = kernel_with(3, Bucket::Start);
        kernel.region_mut(regions[0]).bump(Words(40));
        kernel.migrate(regions[0], Bucket::LowMemory);
        kernel.region_mut(regions[1]).bump(Words(64));
        kernel.migrate(regions[1], Bucket::NotAllocable);

        kernel.reset();

        assert!(kernel.list(Bucket::LowMemory).is_empty());
        assert!(kernel.list(Bucket::NotAllocable).is_empty());
        assert_eq!(vec![regions[1], regions[0], regions[2]], ids(&kernel, Bucket::Start));
        assert!(kernel.regions().iter().all(|region| region.used().is_zero()));
        assert!(kernel.regions().iter().all(|region| region.bucket() == Bucket::Start));
    }

    #[test]
    fn release_forgets_every_region() {
        let (mut kernel, _) = kernel_with(2, Bucket::NotAllocable);

        kernel.release();

        assert!(kernel.regions().is_empty());
        assert!(kernel.list(Bucket::NotAllocable).is_empty());
        assert_eq!(None, kernel.first_fit(Words(1)));
    }
}

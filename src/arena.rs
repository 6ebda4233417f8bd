use std::{
    alloc::{handle_alloc_error, Layout},
    cell::RefCell,
    ptr::{self, NonNull},
    slice, str,
};

use tracing::error;

use crate::{
    config::{ArenaConfig, OomPolicy},
    error::ArenaError,
    kernel::Kernel,
    list::RegionId,
    region::Bucket,
    utils::{Words, WORD_SIZE},
};

/// Region based allocator.
///
/// Memory is requested from the OS in large regions and
/// handed out by bumping a counter inside them. Individual allocations are
/// never freed: the whole arena is either [`reset`](Arena::reset), which
/// keeps the regions for reuse, or [`free`](Arena::free)d.
///
/// Regions are sorted into three buckets depending on how much room they
/// have left:
///
/// ```text
///              remaining < low_memory_threshold
///   +-------+ ---------------------------------> +------------+
///   | start |                                    | low_memory |
///   +-------+                                    +------------+
///       |                                               |
///       | remaining < not_allocable_threshold           | remaining < not_allocable_threshold
///       |             +---------------+                 |
///       +-----------> | not_allocable | <---------------+
///                     +---------------+
/// ```
///
/// Allocation goes through a shared reference, while [`Arena::reset`] and
/// [`Arena::free`] need exclusive access. The borrow checker therefore
/// guarantees that no reference obtained from the `alloc_*` helpers outlives
/// the memory it points to. Raw pointers returned by [`Arena::allocate`] are
/// valid until the next reset, free or drop of the arena.
///
/// The arena is not `Sync`. Wrap it in a lock to share it between threads.
#[derive(Debug, Default)]
pub struct Arena {
    config: ArenaConfig,
    kernel: RefCell<Kernel>,
}

/// Snapshot of the arena's regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Total number of regions.
    pub regions: usize,
    /// Regions in the start list.
    pub start_regions: usize,
    /// Regions in the low-memory list.
    pub low_memory_regions: usize,
    /// Regions in the not-allocable list, dedicated ones included.
    pub not_allocable_regions: usize,
    /// Sum of every region's capacity.
    pub capacity: Words,
    /// Sum of every region's used words.
    pub used: Words,
}

impl ArenaStats {
    /// Number of regions in `bucket`.
    pub fn regions_in(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Start => self.start_regions,
            Bucket::LowMemory => self.low_memory_regions,
            Bucket::NotAllocable => self.not_allocable_regions,
        }
    }
}

impl Arena {
    /// Creates an empty arena with the default configuration. No memory is
    /// requested until the first allocation.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            config,
            kernel: RefCell::default(),
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Allocates `size_bytes` of uninitialized, word aligned memory.
    ///
    /// Returns `Ok(None)` for zero sized requests, without touching any
    /// region. The request is rounded up to whole words and then routed:
    ///
    /// 1. Requests larger than the region capacity get a dedicated region of
    ///    exactly their size, which goes straight to not-allocable. Dedicated
    ///    regions never serve any other request.
    /// 2. Small requests (up to the not-allocable threshold) drain the head
    ///    of the low-memory list first.
    /// 3. Everything else takes the first partially used region of the start
    ///    list with enough room, or a new region if there is none.
    ///
    /// Regions emptied by [`Arena::reset`] are handed out before anything new
    /// is mapped, in the place of a new region. Replaying the same sequence
    /// of requests after a reset therefore yields the same offsets inside
    /// the regions and maps nothing.
    ///
    /// Afterwards the region that served the request is moved to the bucket
    /// its remaining capacity calls for.
    ///
    /// Failing to obtain memory from the OS follows the configured
    /// [`OomPolicy`].
    pub fn allocate(&self, size_bytes: usize) -> Result<Option<NonNull<u8>>, ArenaError> {
        if size_bytes == 0 {
            return Ok(None);
        }

        let size = Words::from_bytes(size_bytes);
        let mut kernel = self.kernel.borrow_mut();

        if size > self.config.region_capacity() {
            let id = self.acquire(&mut kernel, size, true, Bucket::NotAllocable)?;

            return Ok(Some(kernel.region_mut(id).bump(size)));
        }

        let low_memory_head = kernel
            .list(Bucket::LowMemory)
            .first()
            .filter(|_| size <= self.config.not_allocable_threshold());

        let id = match low_memory_head {
            Some(id) => id,
            None => match kernel.first_fit(size) {
                Some(id) => id,
                None => {
                    let capacity = self.config.region_capacity();
                    self.acquire(&mut kernel, capacity, false, Bucket::Start)?
                }
            },
        };

        let ptr = kernel.region_mut(id).bump(size);
        self.reclassify(&mut kernel, id);

        Ok(Some(ptr))
    }

    /// Grows the allocation at `ptr` from `old_size` to `new_size` bytes.
    ///
    /// Shrinking (`new_size <= old_size`) is a no-op that returns `ptr`
    /// as is. Otherwise a new block is allocated, the first `old_size` bytes
    /// are copied into it and the new block is returned. The old block stays
    /// allocated until the arena is reset. A `None` pointer behaves like
    /// [`Arena::allocate`].
    ///
    /// # Safety
    ///
    /// If `ptr` is `Some`, it must be valid for reading `old_size` bytes.
    pub unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, ArenaError> {
        if new_size <= old_size {
            return Ok(ptr);
        }

        let new_ptr = self.allocate(new_size)?;

        if let (Some(src), Some(dst)) = (ptr, new_ptr) {
            // SAFETY: the caller guarantees `src` is readable for `old_size`
            // bytes, `dst` was just allocated with room for `new_size > old_size`
            // bytes and can't overlap any live allocation.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), old_size) };
        }

        Ok(new_ptr)
    }

    /// Forgets every allocation while keeping the regions mapped. All
    /// regions go back to the start list with their whole capacity free.
    pub fn reset(&mut self) {
        self.kernel.get_mut().reset();
    }

    /// Returns every region to the OS. The arena can be used again
    /// afterwards as if it was just created.
    pub fn free(&mut self) {
        self.kernel.get_mut().release();
    }

    pub fn stats(&self) -> ArenaStats {
        let kernel = self.kernel.borrow();

        kernel.regions().iter().fold(
            ArenaStats {
                regions: kernel.regions().len(),
                start_regions: kernel.list(Bucket::Start).len(),
                low_memory_regions: kernel.list(Bucket::LowMemory).len(),
                not_allocable_regions: kernel.list(Bucket::NotAllocable).len(),
                ..ArenaStats::default()
            },
            |mut stats, region| {
                stats.capacity += region.capacity();
                stats.used += region.used();
                stats
            },
        )
    }

    /// Copies `bytes` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy(&self, bytes: &[u8]) -> Result<&mut [u8], ArenaError> {
        let Some(ptr) = self.allocate(bytes.len())? else {
            return Ok(&mut []);
        };

        // SAFETY: `ptr` points to `bytes.len()` freshly allocated bytes that
        // nothing else references, and they live as long as `&self` because
        // resetting or freeing requires `&mut self`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), bytes.len()))
        }
    }

    /// Copies `s` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, s: &str) -> Result<&mut str, ArenaError> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;

        // SAFETY: the bytes were copied verbatim from a `str`.
        Ok(unsafe { str::from_utf8_unchecked_mut(bytes) })
    }

    /// Puts a region of `capacity` words at the front of `bucket`: an empty
    /// one left over by a reset if there is one, a newly mapped one otherwise.
    fn acquire(
        &self,
        kernel: &mut Kernel,
        capacity: Words,
        dedicated: bool,
        bucket: Bucket,
    ) -> Result<RegionId, ArenaError> {
        let id = match kernel.spare(capacity, dedicated) {
            Some(id) => {
                kernel.migrate(id, bucket);
                id
            }
            None => {
                let id = self.grow(kernel, capacity, dedicated)?;
                kernel.push(bucket, id);
                id
            }
        };

        Ok(id)
    }

    /// Maps a new region of `capacity` words, applying the OOM policy on failure.
    fn grow(
        &self,
        kernel: &mut Kernel,
        capacity: Words,
        dedicated: bool,
    ) -> Result<RegionId, ArenaError> {
        match kernel.create_region(capacity, dedicated) {
            Ok(id) => Ok(id),
            Err(err) => match self.config.oom_policy() {
                OomPolicy::ReturnError => Err(err),
                OomPolicy::Abort => {
                    error!(%err, capacity = capacity.get(), "arena could not map a region");

                    let bytes = capacity.to_bytes().unwrap_or(usize::MAX);
                    let layout = Layout::from_size_align(bytes, WORD_SIZE)
                        .unwrap_or_else(|_| Layout::new::<usize>());
                    handle_alloc_error(layout)
                }
            },
        }
    }

    /// Moves region `id` forward to the bucket its remaining capacity calls for.
    fn reclassify(&self, kernel: &mut Kernel, id: RegionId) {
        let region = kernel.region(id);
        let target = self.config.classify(region.remaining());

        if target > region.bucket() {
            kernel.migrate(id, target);
        }
    }

    /// Region that handed out `ptr` and the byte offset inside it.
    #[cfg(test)]
    fn locate(&self, ptr: NonNull<u8>) -> Option<(RegionId, usize)> {
        let kernel = self.kernel.borrow();

        kernel
            .regions()
            .iter()
            .enumerate()
            .find_map(|(id, region)| region.offset_of(ptr).map(|offset| (RegionId(id), offset)))
    }

    #[cfg(test)]
    fn bucket_of(&self, id: RegionId) -> Bucket {
        self.kernel.borrow().region(id).bucket()
    }

    #[cfg(test)]
    fn capacity_of(&self, id: RegionId) -> Words {
        self.kernel.borrow().region(id).capacity()
    }
}

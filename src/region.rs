use std::ptr::NonNull;

use crate::{
    error::ArenaError,
    kernel::{page_size, request_memory, return_memory},
    list::{Linked, Links},
    utils::{align, Words, WORD_SIZE},
};

/// The three roles a [`Region`] can play. Every region is linked into the
/// list of exactly one bucket.
///
/// Buckets are ordered: during normal operation a region only ever moves
/// forward, `Start` -> `LowMemory` -> `NotAllocable`, and only a reset
/// brings it back to `Start`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// Fresh regions with plenty of room left.
    #[default]
    Start,
    /// Regions with little room left, reserved for small requests.
    LowMemory,
    /// Exhausted regions (and dedicated oversized ones), kept only so
    /// their memory can be returned later.
    NotAllocable,
}

impl Bucket {
    pub(crate) const COUNT: usize = 3;

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// A contiguous block of memory obtained from the OS in which allocations
/// are served by bumping `used`.
///
/// ```text
/// base                        base + used              base + capacity
///  |                               |                          |
///  v                               v                          v
///  +-------------------------------+--------------------------+----------+
///  |        handed out words       |     remaining words      | page pad |
///  +-------------------------------+--------------------------+----------+
///  <-------------------------------- mapped_len ------------------------->
/// ```
///
/// The mapping is rounded up to whole pages, but only `capacity` words are
/// ever handed out. The region owns the mapping and returns it to the OS
/// when dropped.
#[derive(Debug)]
pub(crate) struct Region {
    /// Start of the mapping. Page aligned, therefore word aligned.
    base: NonNull<u8>,
    /// Size of the mapping in bytes.
    mapped_len: usize,
    /// Usable words. Never changes after creation.
    capacity: Words,
    /// Words already handed out.
    used: Words,
    /// Bucket whose list currently owns the region.
    bucket: Bucket,
    /// Created for a single oversized request. Never serves anything else.
    dedicated: bool,
    /// Neighbours inside that list.
    links: Links,
}

// SAFETY: the region is the only owner of its mapping, so moving it to
// another thread moves the whole ownership along with it.
unsafe impl Send for Region {}

impl Region {
    /// Maps a new empty region able to hold `capacity` words.
    pub(crate) fn new(capacity: Words, dedicated: bool) -> Result<Self, ArenaError> {
        let bytes = capacity
            .to_bytes()
            .ok_or(ArenaError::CapacityOverflow { words: capacity.get() })?;

        // Zero sized mappings are not allowed, so we ask for at least one page.
        let mapped_len = align(bytes.max(1), page_size())
            .ok_or(ArenaError::CapacityOverflow { words: capacity.get() })?;

        // SAFETY: `mapped_len` is a non-zero multiple of the page size.
        let base = unsafe { request_memory(mapped_len) }
            .ok_or(ArenaError::OutOfMemory { bytes: mapped_len })?;

        debug_assert_eq!(0, base.as_ptr() as usize % WORD_SIZE);

        Ok(Self {
            base,
            mapped_len,
            capacity,
            used: Words::ZERO,
            bucket: Bucket::default(),
            dedicated,
            links: Links::default(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> Words {
        self.capacity
    }

    #[inline]
    pub(crate) fn used(&self) -> Words {
        self.used
    }

    /// Words that can still be handed out.
    #[inline]
    pub(crate) fn remaining(&self) -> Words {
        self.capacity - self.used
    }

    #[inline]
    pub(crate) fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    #[inline]
    pub(crate) fn bucket(&self) -> Bucket {
        self.bucket
    }

    #[inline]
    pub(crate) fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    #[inline]
    pub(crate) fn set_bucket(&mut self, bucket: Bucket) {
        self.bucket = bucket;
    }

    /// Hands out the next `size` words of the region.
    ///
    /// The caller must make sure that `size <= self.remaining()`.
    pub(crate) fn bump(&mut self, size: Words) -> NonNull<u8> {
        assert!(
            size <= self.remaining(),
            "region overflow: {size} requested, {} left",
            self.remaining()
        );

        // SAFETY: `used + size <= capacity`, so the offset stays inside the mapping.
        let ptr = unsafe { self.base.add(self.used.get() * WORD_SIZE) };
        self.used += size;

        ptr
    }

    /// Forgets every allocation. The memory stays mapped.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.used = Words::ZERO;
    }

    /// Returns the byte offset of `ptr` inside the handed out part of the
    /// region, or `None` if it points elsewhere.
    #[cfg(test)]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let start = self.base.as_ptr() as usize;
        let offset = (ptr.as_ptr() as usize).checked_sub(start)?;

        (offset < self.used.get() * WORD_SIZE).then_some(offset)
    }
}

impl Linked for Region {
    #[inline]
    fn links(&self) -> &Links {
        &self.links
    }

    #[inline]
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `base` and `mapped_len` describe the mapping obtained in
        // `Region::new`, which is returned exactly once, here.
        unsafe { return_memory(self.base.as_ptr(), self.mapped_len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_region_is_empty() {
        let region = Region::new(Words(100), false).unwrap();

        assert_eq!(Words(100), region.capacity());
        assert_eq!(Words::ZERO, region.used());
        assert_eq!(Words(100), region.remaining());
        assert_eq!(Bucket::Start, region.bucket());
        assert!(!region.is_dedicated());
        assert_eq!(0, region.mapped_len() % page_size());
        assert!(region.mapped_len() >= 100 * WORD_SIZE);
    }

    #[test]
    fn bump_hands_out_consecutive_words() {
        let mut region = Region::new(Words(16), false).unwrap();

        let first = region.bump(Words(3));
        let second = region.bump(Words(5));

        assert_eq!(Some(0), region.offset_of(first));
        assert_eq!(Some(3 * WORD_SIZE), region.offset_of(second));
        assert_eq!(Words(8), region.remaining());
    }

    #[test]
    fn bumped_memory_is_writable() {
        let mut region = Region::new(Words(4), false).unwrap();
        let ptr = region.bump(Words(4)).cast::<usize>();

        unsafe {
            for i in 0..4 {
                ptr.add(i).write(i * 10);
            }
            assert_eq!(30, ptr.add(3).read());
        }
        assert!(region.remaining().is_zero());
    }

    #[test]
    #[should_panic(expected = "region overflow")]
    fn bump_past_capacity_panics() {
        let mut region = Region::new(Words(2), false).unwrap();
        region.bump(Words(3));
    }

    #[test]
    fn clear_makes_the_whole_capacity_available_again() {
        let mut region = Region::new(Words(8), true).unwrap();
        let first = region.bump(Words(8));

        region.clear();

        assert_eq!(Words(8), region.remaining());
        assert_eq!(None, region.offset_of(first));
        assert_eq!(first, region.bump(Words(1)));
        assert!(region.is_dedicated());
    }

    #[test]
    fn unrepresentable_capacity_is_rejected() {
        let err = Region::new(Words(usize::MAX), false).unwrap_err();

        assert!(matches!(err, ArenaError::CapacityOverflow { .. }));
    }
}

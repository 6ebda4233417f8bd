//! Growable array of `Copy` values that lives inside an [`Arena`].

use std::{
    fmt, mem,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
};

use crate::{
    arena::Arena,
    error::ArenaError,
    utils::{INIT_CAP, WORD_SIZE},
};

/// Growable array whose storage is allocated in an [`Arena`].
///
/// Works like [`StringBuilder`](crate::StringBuilder) for any `Copy` element:
/// capacity doubles starting from [`INIT_CAP`] elements and every growth goes
/// through [`Arena::reallocate`], leaving the old storage in the arena until
/// it is reset. Elements are never dropped, hence the `Copy` bound.
///
/// Arena memory is word aligned, so element types with a stricter alignment
/// are rejected at compile time.
pub struct ArenaVec<'a, T: Copy> {
    arena: &'a Arena,
    data: Option<NonNull<T>>,
    len: usize,
    capacity: usize,
}

impl<'a, T: Copy> ArenaVec<'a, T> {
    /// Empty array. Nothing is allocated until the first push.
    pub fn new_in(arena: &'a Arena) -> Self {
        const { assert!(mem::align_of::<T>() <= WORD_SIZE, "arena memory is only word aligned") };

        // Zero sized elements never need storage.
        let (data, capacity) = if mem::size_of::<T>() == 0 {
            (Some(NonNull::dangling()), usize::MAX)
        } else {
            (None, 0)
        };

        Self {
            arena,
            data,
            len: 0,
            capacity,
        }
    }

    /// Empty array with room for exactly `capacity` elements.
    pub fn with_capacity_in(capacity: usize, arena: &'a Arena) -> Result<Self, ArenaError> {
        let mut vec = Self::new_in(arena);
        if capacity > vec.capacity {
            vec.grow_to(capacity)?;
        }

        Ok(vec)
    }

    /// Array holding a copy of `values`, with room for at least [`INIT_CAP`] elements.
    pub fn from_slice_in(values: &[T], arena: &'a Arena) -> Result<Self, ArenaError> {
        let mut vec = Self::with_capacity_in(INIT_CAP.max(values.len()), arena)?;
        vec.extend_from_slice(values)?;

        Ok(vec)
    }

    /// Copies the elements into a new array in the same arena.
    pub fn try_clone(&self) -> Result<Self, ArenaError> {
        Self::from_slice_in(self.as_slice(), self.arena)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        match self.data {
            // SAFETY: the first `len` elements were initialised by a push and
            // the arena can't be reset while `self` borrows it.
            Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.data {
            // SAFETY: as in `as_slice`, and `&mut self` makes the access unique.
            Some(data) => unsafe { slice::from_raw_parts_mut(data.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    pub fn push(&mut self, value: T) -> Result<(), ArenaError> {
        self.reserve(1)?;

        if let Some(data) = self.data {
            // SAFETY: `reserve` made room for one more element.
            unsafe { data.add(self.len).write(value) };
        }
        self.len += 1;

        Ok(())
    }

    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), ArenaError> {
        self.reserve(values.len())?;

        if let Some(data) = self.data {
            // SAFETY: `reserve` made room for `values.len()` more elements.
            unsafe {
                data.add(self.len)
                    .as_ptr()
                    .copy_from_nonoverlapping(values.as_ptr(), values.len());
            }
        }
        self.len += values.len();

        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        let last = *self.as_slice().last()?;
        self.len -= 1;

        Some(last)
    }

    /// Forgets every element. The storage stays reserved for later pushes.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Makes room for `additional` more elements, doubling the capacity
    /// (starting at [`INIT_CAP`]) until they fit.
    pub fn reserve(&mut self, additional: usize) -> Result<(), ArenaError> {
        let needed = self.len.checked_add(additional).ok_or(ArenaError::CapacityOverflow {
            words: usize::MAX,
        })?;
        if needed <= self.capacity {
            return Ok(());
        }

        let mut capacity = self.capacity.max(INIT_CAP);
        while capacity < needed {
            capacity = capacity.checked_mul(2).unwrap_or(needed);
        }

        self.grow_to(capacity)
    }

    /// Moves the elements to a new block able to hold `capacity` of them.
    fn grow_to(&mut self, capacity: usize) -> Result<(), ArenaError> {
        let element = mem::size_of::<T>();
        let new_size = capacity
            .checked_mul(element)
            .ok_or(ArenaError::CapacityOverflow { words: usize::MAX })?;

        // SAFETY: `data` holds `capacity` elements, the first `len` of them
        // initialised, and `len * element` fits because `capacity * element` did.
        let data = unsafe {
            self.arena
                .reallocate(self.data.map(NonNull::cast), self.len * element, new_size)?
        };
        self.data = data.map(NonNull::cast);
        self.capacity = capacity;

        Ok(())
    }
}

impl<T: Copy> Deref for ArenaVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Copy> DerefMut for ArenaVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for ArenaVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

//! This file contains the helper functions and units for the allocator.
//! These are pieces that don't particularly belong to any concrete module of the program.

use std::{fmt, mem, ops::{Add, AddAssign, Sub}};

/// Size of the allocation unit in bytes. Every capacity and usage counter in
/// the arena is expressed in words of this size.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// Initial capacity of the growable arena buffers once they need storage:
/// bytes for a `StringBuilder`, elements for an `ArenaVec`.
pub const INIT_CAP: usize = 128;

/// It aligns `to_be_aligned` using `aligment`, which has to be a power of two.
///
/// Returns `None` if the aligned value does not fit in a `usize`.
/// This method is used to round region mappings up to a multiple of the
/// page size, see `kernel::page_size`.
pub fn align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    debug_assert!(aligment.is_power_of_two());
    Some(to_be_aligned.checked_add(aligment - 1)? & !(aligment - 1))
}

/// A number of allocation units (words).
///
/// Byte counts are converted into `Words` once, at the allocate boundary,
/// so every internal computation happens in whole words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Words(pub usize);

impl Words {
    pub const ZERO: Self = Self(0);

    /// Rounds `bytes` up to the number of whole words needed to hold them.
    #[inline]
    pub const fn from_bytes(bytes: usize) -> Self {
        Self(bytes.div_ceil(WORD_SIZE))
    }

    /// Number of bytes covered by this many words, if representable.
    #[inline]
    pub const fn to_bytes(self) -> Option<usize> {
        self.0.checked_mul(WORD_SIZE)
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Words {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Words {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Words {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Words {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} words", self.0)
    }
}

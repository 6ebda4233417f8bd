//! Growable byte string that lives inside an [`Arena`].

use std::{
    ffi::CStr,
    fmt,
    fs::File,
    io::Read,
    path::Path,
    ptr::NonNull,
    slice, str,
};

use crate::{arena::Arena, error::ArenaError, utils::INIT_CAP};

/// Chunk size used by [`StringBuilder::read_entire_file`].
const READ_CHUNK: usize = 32 * 1024;

/// Growable byte string whose storage is allocated in an [`Arena`].
///
/// Growing never frees the old storage: it stays in the arena until the
/// arena is reset. Capacity doubles starting from [`INIT_CAP`], so the
/// wasted space is bounded by the final capacity.
///
/// Content is not required to be UTF-8, see [`StringBuilder::to_str`].
pub struct StringBuilder<'a> {
    arena: &'a Arena,
    data: Option<NonNull<u8>>,
    len: usize,
    capacity: usize,
}

impl<'a> StringBuilder<'a> {
    /// Empty builder. Nothing is allocated until the first push.
    pub fn new_in(arena: &'a Arena) -> Self {
        Self {
            arena,
            data: None,
            len: 0,
            capacity: 0,
        }
    }

    /// Builder holding a copy of `s`, with room for at least [`INIT_CAP`] bytes.
    pub fn from_str_in(s: &str, arena: &'a Arena) -> Result<Self, ArenaError> {
        Self::from_bytes_in(s.as_bytes(), arena)
    }

    pub fn from_bytes_in(bytes: &[u8], arena: &'a Arena) -> Result<Self, ArenaError> {
        let capacity = INIT_CAP.max(bytes.len());
        let data = arena.allocate(capacity)?;

        let mut builder = Self {
            arena,
            data,
            len: 0,
            capacity,
        };
        builder.push_bytes(bytes)?;

        Ok(builder)
    }

    /// Copies the content into a new builder in the same arena.
    pub fn try_clone(&self) -> Result<Self, ArenaError> {
        Self::from_bytes_in(self.as_bytes(), self.arena)
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

    pub fn as_bytes(&self) -> &[u8] {
        match self.data {
            // SAFETY: the first `len` bytes were initialised by a push and the
            // arena can't be reset while `self` borrows it.
            Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// The content as a string slice, if it is valid UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        str::from_utf8(self.as_bytes()).ok()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), ArenaError> {
        self.reserve(bytes.len())?;

        if let Some(data) = self.data {
            // SAFETY: `reserve` made room for `bytes.len()` more bytes.
            unsafe {
                data.add(self.len)
                    .as_ptr()
                    .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            }
        }
        self.len += bytes.len();

        Ok(())
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), ArenaError> {
        self.push_bytes(s.as_bytes())
    }

    pub fn push(&mut self, c: char) -> Result<(), ArenaError> {
        self.push_str(c.encode_utf8(&mut [0; 4]))
    }

    /// Appends the whole content of the file at `path`, returning the number
    /// of bytes read.
    pub fn read_entire_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ArenaError> {
        let mut file = File::open(path)?;
        let mut chunk = vec![0; READ_CHUNK];
        let mut total = 0;

        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }

            self.push_bytes(&chunk[..read])?;
            total += read;
        }

        Ok(total)
    }

    /// NUL terminated view of the content. The terminator is stored after
    /// the content but is not counted in [`StringBuilder::len`], so further
    /// pushes overwrite it.
    ///
    /// The view ends at the first NUL byte if the content contains any.
    pub fn as_c_str(&mut self) -> Result<&CStr, ArenaError> {
        self.push_bytes(&[0])?;
        self.len -= 1;

        let with_nul = match self.data {
            // SAFETY: the push above initialised `len + 1` bytes of `data`.
            Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len + 1) },
            None => &[0u8][..],
        };

        Ok(CStr::from_bytes_until_nul(with_nul).unwrap_or_default())
    }

    /// Makes room for `additional` more bytes, doubling the capacity
    /// (starting at [`INIT_CAP`]) until they fit.
    fn reserve(&mut self, additional: usize) -> Result<(), ArenaError> {
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

        // SAFETY: `data` holds `capacity` bytes, the first `len` of them initialised.
        self.data = unsafe { self.arena.reallocate(self.data, self.len, capacity)? };
        self.capacity = capacity;

        Ok(())
    }
}

impl fmt::Write for StringBuilder<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for StringBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringBuilder")
            .field("content", &String::from_utf8_lossy(self.as_bytes()))
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

//! Region based (arena) memory allocator.
//!
//! Memory is requested from the operating system in large regions
//! (`mmap` on unix, `VirtualAlloc` on windows) and handed out by bumping a
//! counter inside them. There is no per-object free: an [`Arena`] is either
//! [`reset`](Arena::reset), keeping its regions for reuse, or
//! [`free`](Arena::free)d, returning them to the OS.
//!
//! ```text
//! +-----------------------------------------------+      +-----------------------------------------------+
//! |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +----------+ |
//! | Region | | alloc | -> | alloc | -> | alloc |  | ---> | Region | | alloc | -> | alloc | -> | free ... | |
//! |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +----------+ |
//! +-----------------------------------------------+      +-----------------------------------------------+
//! ```
//!
//! Regions are tracked in three buckets (start, low-memory and not-allocable)
//! depending on how much room they have left, see [`Arena::allocate`] for the
//! routing rules and [`ArenaConfig`] for the size classes.
//!
//! [`StringBuilder`] and [`ArenaVec`] are growable buffers whose storage
//! lives in an arena.
//!
//! ```
//! use arenalloc::{Arena, StringBuilder};
//!
//! let mut arena = Arena::new();
//!
//! let ptr = arena.allocate(64)?.expect("non zero request");
//! assert_eq!(0, ptr.as_ptr() as usize % arenalloc::WORD_SIZE);
//!
//! let mut greeting = StringBuilder::from_str_in("hello", &arena)?;
//! greeting.push_str(", arena")?;
//! assert_eq!(Some("hello, arena"), greeting.to_str());
//! drop(greeting);
//!
//! arena.reset();
//! assert_eq!(0, arena.stats().used.get());
//! # Ok::<(), arenalloc::ArenaError>(())
//! ```

mod arena;
mod config;
mod error;
mod kernel;
mod list;
mod region;
mod string;
mod utils;
mod vec;

pub use arena::{Arena, ArenaStats};
pub use config::{
    ArenaConfig, OomPolicy, DEFAULT_REGION_CAPACITY, LOW_MEMORY_THRESHOLD, NOT_ALLOCABLE_THRESHOLD,
};
pub use error::ArenaError;
pub use region::Bucket;
pub use string::StringBuilder;
pub use utils::{Words, INIT_CAP, WORD_SIZE};
pub use vec::ArenaVec;

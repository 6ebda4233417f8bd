//! Arena error types

use thiserror::Error;

/// Errors surfaced by the arena.
///
/// Memory exhaustion only reaches the caller when the arena is configured
/// with [`crate::OomPolicy::ReturnError`]; the default policy aborts.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The operating system refused to map a new region.
    #[error("out of memory: could not map {bytes} bytes for a new region")]
    OutOfMemory { bytes: usize },

    /// The requested number of words does not fit in the address space.
    #[error("capacity overflow: {words} words cannot be represented in bytes")]
    CapacityOverflow { words: usize },

    /// The configuration thresholds are inconsistent.
    #[error("invalid arena configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// Reading into an arena backed buffer failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArenaError {
    /// Whether this error means that memory could not be obtained.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::CapacityOverflow { .. })
    }
}

//! Arena tuning knobs.

use crate::{error::ArenaError, region::Bucket, utils::Words};

/// Words in a freshly created pooled region (64 KiB with 8 byte words).
pub const DEFAULT_REGION_CAPACITY: Words = Words(8 * 1024);
/// Regions with fewer free words than this are demoted to low-memory
/// (2 KiB with 8 byte words).
pub const LOW_MEMORY_THRESHOLD: Words = Words(256);
/// Regions with fewer free words than this are demoted to not-allocable.
/// It is also the largest request a low-memory region may still serve
/// (256 bytes with 8 byte words).
pub const NOT_ALLOCABLE_THRESHOLD: Words = Words(32);

/// What to do when the operating system can't give us a new region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OomPolicy {
    /// Log the failure and terminate through [`std::alloc::handle_alloc_error`].
    #[default]
    Abort,
    /// Hand the failure back to the caller as an [`ArenaError`].
    ReturnError,
}

/// Size classes and failure policy of an [`crate::Arena`].
///
/// All sizes are expressed in words (see [`crate::WORD_SIZE`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    region_capacity: Words,
    low_memory_threshold: Words,
    not_allocable_threshold: Words,
    oom_policy: OomPolicy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            region_capacity: DEFAULT_REGION_CAPACITY,
            low_memory_threshold: LOW_MEMORY_THRESHOLD,
            not_allocable_threshold: NOT_ALLOCABLE_THRESHOLD,
            oom_policy: OomPolicy::default(),
        }
    }
}

impl ArenaConfig {
    /// Builds a configuration with custom size classes.
    ///
    /// The thresholds must satisfy
    /// `0 < not_allocable_threshold <= low_memory_threshold <= region_capacity`.
    pub fn new(
        region_capacity: Words,
        low_memory_threshold: Words,
        not_allocable_threshold: Words,
    ) -> Result<Self, ArenaError> {
        if not_allocable_threshold.is_zero() {
            return Err(ArenaError::InvalidConfig {
                reason: "not-allocable threshold must be at least one word",
            });
        }
        if not_allocable_threshold > low_memory_threshold {
            return Err(ArenaError::InvalidConfig {
                reason: "not-allocable threshold exceeds low-memory threshold",
            });
        }
        if low_memory_threshold > region_capacity {
            return Err(ArenaError::InvalidConfig {
                reason: "low-memory threshold exceeds region capacity",
            });
        }

        Ok(Self {
            region_capacity,
            low_memory_threshold,
            not_allocable_threshold,
            oom_policy: OomPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_oom_policy(mut self, oom_policy: OomPolicy) -> Self {
        self.oom_policy = oom_policy;
        self
    }

    pub fn region_capacity(&self) -> Words {
        self.region_capacity
    }

    pub fn low_memory_threshold(&self) -> Words {
        self.low_memory_threshold
    }

    pub fn not_allocable_threshold(&self) -> Words {
        self.not_allocable_threshold
    }

    pub fn oom_policy(&self) -> OomPolicy {
        self.oom_policy
    }

    /// Bucket a pooled region belongs to once only `remaining` words are left.
    pub(crate) fn classify(&self, remaining: Words) -> Bucket {
        if remaining < self.not_allocable_threshold {
            Bucket::NotAllocable
        } else if remaining < self.low_memory_threshold {
            Bucket::LowMemory
        } else {
            Bucket::Start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_the_constants() {
        let config = ArenaConfig::default();

        assert_eq!(DEFAULT_REGION_CAPACITY, config.region_capacity());
        assert_eq!(LOW_MEMORY_THRESHOLD, config.low_memory_threshold());
        assert_eq!(NOT_ALLOCABLE_THRESHOLD, config.not_allocable_threshold());
        assert_eq!(OomPolicy::Abort, config.oom_policy());
    }

    #[rstest]
    #[case(Words(1024), Words(256), Words(0))]
    #[case(Words(1024), Words(32), Words(256))]
    #[case(Words(128), Words(256), Words(32))]
    fn inconsistent_thresholds_are_rejected(
        #[case] capacity: Words,
        #[case] low: Words,
        #[case] not_allocable: Words,
    ) {
        let err = ArenaConfig::new(capacity, low, not_allocable).unwrap_err();

        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn policy_can_be_overridden() {
        let config = ArenaConfig::default().with_oom_policy(OomPolicy::ReturnError);

        assert_eq!(OomPolicy::ReturnError, config.oom_policy());
    }

    #[rstest]
    #[case(Words(1024), Bucket::Start)]
    #[case(Words(256), Bucket::Start)]
    #[case(Words(255), Bucket::LowMemory)]
    #[case(Words(124), Bucket::LowMemory)]
    #[case(Words(32), Bucket::LowMemory)]
    #[case(Words(31), Bucket::NotAllocable)]
    #[case(Words(0), Bucket::NotAllocable)]
    fn remaining_words_pick_the_bucket(#[case] remaining: Words, #[case] bucket: Bucket) {
        let config = ArenaConfig::new(Words(1024), Words(256), Words(32)).unwrap();

        assert_eq!(bucket, config.classify(remaining));
    }
}

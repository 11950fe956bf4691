//! Complexity levels that scale random value magnitude and size.

use serde::{Deserialize, Serialize};

/// A complexity level in `[Complexity::MIN, Complexity::MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Complexity(u32);

impl Complexity {
    /// Lowest level.
    pub const MIN: u32 = 1;
    /// Highest level.
    pub const MAX: u32 = 8;

    /// Clamp `level` into range.
    pub const fn new(level: u32) -> Self {
        if level < Self::MIN {
            Self(Self::MIN)
        } else if level > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(level)
        }
    }

    /// Level used by random case `index` (0-based) under `cap`.
    pub fn for_index(index: usize, cap: u32) -> Self {
        let level = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        Self::new(level.min(cap))
    }

    pub const fn level(self) -> u32 {
        self.0
    }

    /// `base` raised to the level, saturating.
    pub const fn power(self, base: u64) -> u64 {
        base.saturating_pow(self.0)
    }

    /// Level for the elements of a nested container: halves per nesting
    /// level so deep structures stay small.
    pub const fn nested(self) -> Self {
        Self::new(self.0.div_ceil(2))
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

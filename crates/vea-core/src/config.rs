//! Tunables (spec §6): block size, the large/small strategy switch, the
//! per-reservation cap, and the aging window.
//!
//! The spec frames these as compile-time constants. We keep them as a
//! runtime `VeaConfig` instead (see `DESIGN.md`) so property tests and
//! `vea-sim` can shrink `aging_window` to milliseconds without recompiling,
//! while `VeaConfig::default()` still reproduces the spec's suggested values.

use std::time::Duration;

/// Default block size: 4 KiB.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default large-extent threshold: 16 MiB worth of default-size blocks.
pub const DEFAULT_LARGE_THRESHOLD_BLOCKS: u32 = (16 << 20) / DEFAULT_BLOCK_SIZE;

/// Default per-reservation cap: 128 MiB worth of default-size blocks.
pub const DEFAULT_MAX_EXTENT_BLOCKS: u32 = (128 << 20) / DEFAULT_BLOCK_SIZE;

/// Default aging window. Production deployments should tune this to the
/// longest in-flight read they need to protect against; tests and `vea-sim`
/// override it via [`VeaConfig::with_aging_window`].
pub const DEFAULT_AGING_WINDOW: Duration = Duration::from_secs(10);

/// Runtime configuration for a `VeaSpace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VeaConfig {
    /// Block size in bytes; must be a power of two.
    pub block_size: u32,
    /// Reservations of at least this many blocks use the largest-free-extent
    /// strategy instead of best-fit (spec §4.3).
    pub large_threshold: u32,
    /// Upper bound on a single reservation; larger requests fail `TooLarge`.
    pub max_extent_blocks: u32,
    /// Minimum lifetime of an aging extent before it can be reused.
    pub aging_window: Duration,
}

impl VeaConfig {
    /// Builds a config, panicking on combinations that can never be valid
    /// regardless of device geometry (mirrors the teacher's `Config::new`
    /// const-time assertions for internally-inconsistent configuration).
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is not a power of two, or if
    /// `large_threshold > max_extent_blocks`.
    pub const fn new(
        block_size: u32,
        large_threshold: u32,
        max_extent_blocks: u32,
        aging_window: Duration,
    ) -> Self {
        assert!(block_size.is_power_of_two(), "block_size must be a power of two");
        assert!(
            large_threshold <= max_extent_blocks,
            "large_threshold must not exceed max_extent_blocks"
        );
        Self {
            block_size,
            large_threshold,
            max_extent_blocks,
            aging_window,
        }
    }

    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub const fn with_large_threshold(mut self, large_threshold: u32) -> Self {
        self.large_threshold = large_threshold;
        self
    }

    pub const fn with_max_extent_blocks(mut self, max_extent_blocks: u32) -> Self {
        self.max_extent_blocks = max_extent_blocks;
        self
    }

    pub const fn with_aging_window(mut self, aging_window: Duration) -> Self {
        self.aging_window = aging_window;
        self
    }
}

impl Default for VeaConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_BLOCK_SIZE,
            DEFAULT_LARGE_THRESHOLD_BLOCKS,
            DEFAULT_MAX_EXTENT_BLOCKS,
            DEFAULT_AGING_WINDOW,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_self_consistent() {
        let c = VeaConfig::default();
        assert!(c.block_size.is_power_of_two());
        assert!(c.large_threshold <= c.max_extent_blocks);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_block_size() {
        VeaConfig::new(4095, 1, 1, Duration::from_secs(1));
    }
}

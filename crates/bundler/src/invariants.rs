//! Debug assertion macros for bundler invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release
//! builds pay nothing for them.

// =============================================================================
// Bundle bounds
// =============================================================================

/// Assert that the open bundle respects both per-bundle bounds after an add.
///
/// **Invariant**: `bundle.size ≤ bundle_byte_limit ∧ bundle.len ≤ bundle_count_threshold`
///
/// Used in: `Bundler::add()` after appending
macro_rules! debug_assert_bundle_bounded {
    ($bundle:expr, $config:expr) => {
        debug_assert!(
            $bundle.size() <= $config.bundle_byte_limit
                && $bundle.len() <= $config.bundle_count_threshold,
            "bundle bound violated: {} items / {} units (limits {} items / {} units)",
            $bundle.len(),
            $bundle.size(),
            $config.bundle_count_threshold,
            $config.bundle_byte_limit
        )
    };
}

// =============================================================================
// Backlog bound
// =============================================================================

/// Assert that the backlog never exceeds the buffered limit.
///
/// **Invariant**: `buffered ≤ buffered_byte_limit`
///
/// Used in: `Bundler::add()` after accepting an item
macro_rules! debug_assert_backlog_bounded {
    ($buffered:expr, $limit:expr) => {
        debug_assert!(
            $buffered <= $limit,
            "backlog bound violated: {} units buffered, limit {}",
            $buffered,
            $limit
        )
    };
}

/// Assert that a released size was previously accounted.
///
/// **Invariant**: `released ≤ buffered` (no counter underflow)
///
/// Used in: `Shared::release()` after a handler returns
macro_rules! debug_assert_release_accounted {
    ($released:expr, $buffered:expr) => {
        debug_assert!(
            $released <= $buffered,
            "releasing {} units but only {} are buffered",
            $released,
            $buffered
        )
    };
}

/// Assert that the open bundle is never left at or above a flush threshold.
///
/// Used in: `Bundler::add()` on return
macro_rules! debug_assert_below_thresholds {
    ($bundle:expr, $config:expr) => {
        debug_assert!(
            $bundle.len() < $config.bundle_count_threshold
                && $bundle.size() < $config.bundle_byte_threshold,
            "open bundle left at a flush threshold: {} items / {} units",
            $bundle.len(),
            $bundle.size()
        )
    };
}

pub(crate) use debug_assert_backlog_bounded;
pub(crate) use debug_assert_below_thresholds;
pub(crate) use debug_assert_bundle_bounded;
pub(crate) use debug_assert_release_accounted;

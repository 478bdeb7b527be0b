//! Bundling thresholds.

use crate::error::BundlerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and limits that decide when a bundle is flushed and how much
/// may be buffered. Sizes are in caller-defined units (see `Bundler::add`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Number of items at which a bundle is flushed.
    ///
    /// Default: 100
    pub bundle_count_threshold: usize,

    /// Accumulated size at which a bundle is flushed before the delay elapses.
    ///
    /// Default: 1000
    pub bundle_byte_threshold: usize,

    /// Hard cap on the size of a single bundle. An item larger than this is
    /// rejected outright.
    ///
    /// Default: 1000
    pub bundle_byte_limit: usize,

    /// Hard cap on the total size of accepted items not yet handled.
    ///
    /// Default: 10000
    pub buffered_byte_limit: usize,

    /// Maximum time a non-empty bundle stays open.
    ///
    /// Default: 2s
    pub delay_threshold: Duration,

    /// Maximum number of bundles being handled at once.
    ///
    /// Default: 1
    pub handler_limit: usize,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            bundle_count_threshold: 100,
            bundle_byte_threshold: 1000,
            bundle_byte_limit: 1000,
            buffered_byte_limit: 10_000,
            delay_threshold: Duration::from_secs(2),
            handler_limit: 1,
        }
    }
}

impl BundlerConfig {
    /// Sets the count threshold.
    pub fn with_bundle_count_threshold(mut self, count: usize) -> Self {
        self.bundle_count_threshold = count;
        self
    }

    /// Sets the byte threshold.
    pub fn with_bundle_byte_threshold(mut self, size: usize) -> Self {
        self.bundle_byte_threshold = size;
        self
    }

    /// Sets the per-bundle byte limit.
    pub fn with_bundle_byte_limit(mut self, size: usize) -> Self {
        self.bundle_byte_limit = size;
        self
    }

    /// Sets the backlog limit.
    pub fn with_buffered_byte_limit(mut self, size: usize) -> Self {
        self.buffered_byte_limit = size;
        self
    }

    /// Sets the delay threshold.
    pub fn with_delay_threshold(mut self, delay: Duration) -> Self {
        self.delay_threshold = delay;
        self
    }

    /// Sets how many bundles may be handled concurrently.
    pub fn with_handler_limit(mut self, limit: usize) -> Self {
        self.handler_limit = limit;
        self
    }

    /// Checks that every threshold can be satisfied.
    pub fn validate(&self) -> Result<(), BundlerError> {
        if self.bundle_count_threshold == 0 {
            return Err(BundlerError::InvalidConfig(
                "bundle_count_threshold must be at least 1".into(),
            ));
        }
        if self.bundle_byte_threshold == 0 || self.bundle_byte_limit == 0 {
            return Err(BundlerError::InvalidConfig(
                "bundle byte threshold and limit must be at least 1".into(),
            ));
        }
        if self.bundle_byte_threshold > self.bundle_byte_limit {
            return Err(BundlerError::InvalidConfig(format!(
                "bundle_byte_threshold ({}) exceeds bundle_byte_limit ({})",
                self.bundle_byte_threshold, self.bundle_byte_limit
            )));
        }
        if self.buffered_byte_limit == 0 {
            return Err(BundlerError::InvalidConfig(
                "buffered_byte_limit must be at least 1".into(),
            ));
        }
        if self.delay_threshold.is_zero() {
            return Err(BundlerError::InvalidConfig(
                "delay_threshold must be non-zero".into(),
            ));
        }
        if self.handler_limit == 0 {
            return Err(BundlerError::InvalidConfig(
                "handler_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

//! Counters describing bundler activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a bundle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// `bundle_count_threshold` reached.
    Count,
    /// `bundle_byte_threshold` reached.
    Bytes,
    /// The next item would have pushed the bundle past `bundle_byte_limit`.
    Limit,
    /// `delay_threshold` elapsed.
    Delay,
    /// `flush()` or `shutdown()` was called.
    Explicit,
}

/// Thread-safe bundler metrics.
///
/// Plain statistical counters: every access uses `Ordering::Relaxed`
/// because no control flow depends on them.
#[derive(Debug, Default)]
pub struct BundlerMetrics {
    items_added: AtomicU64,
    overflows: AtomicU64,
    oversized: AtomicU64,
    count_flushes: AtomicU64,
    byte_flushes: AtomicU64,
    limit_flushes: AtomicU64,
    delay_flushes: AtomicU64,
    explicit_flushes: AtomicU64,
    bundles_handled: AtomicU64,
    inflight_handlers: AtomicU64,
}

impl BundlerMetrics {
    pub fn items_added(&self) -> u64 {
        self.items_added.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn oversized(&self) -> u64 {
        self.oversized.load(Ordering::Relaxed)
    }

    /// Bundles closed for the given reason.
    pub fn flushes(&self, trigger: FlushTrigger) -> u64 {
        self.counter(trigger).load(Ordering::Relaxed)
    }

    /// Bundles closed for any reason.
    pub fn total_flushes(&self) -> u64 {
        [
            FlushTrigger::Count,
            FlushTrigger::Bytes,
            FlushTrigger::Limit,
            FlushTrigger::Delay,
            FlushTrigger::Explicit,
        ]
        .into_iter()
        .map(|t| self.flushes(t))
        .sum()
    }

    /// Bundles whose handler has returned.
    pub fn bundles_handled(&self) -> u64 {
        self.bundles_handled.load(Ordering::Relaxed)
    }

    /// Handler tasks currently running. Never exceeds `handler_limit`;
    /// bundles waiting for a permit are not counted.
    pub fn inflight_handlers(&self) -> u64 {
        self.inflight_handlers.load(Ordering::Relaxed)
    }

    pub(crate) fn record_added(&self) {
        self.items_added.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oversized(&self) {
        self.oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, trigger: FlushTrigger) {
        self.counter(trigger).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handler_started(&self) {
        self.inflight_handlers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handler_finished(&self) {
        self.inflight_handlers.fetch_sub(1, Ordering::Relaxed);
        self.bundles_handled.fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, trigger: FlushTrigger) -> &AtomicU64 {
        match trigger {
            FlushTrigger::Count => &self.count_flushes,
            FlushTrigger::Bytes => &self.byte_flushes,
            FlushTrigger::Limit => &self.limit_flushes,
            FlushTrigger::Delay => &self.delay_flushes,
            FlushTrigger::Explicit => &self.explicit_flushes,
        }
    }
}

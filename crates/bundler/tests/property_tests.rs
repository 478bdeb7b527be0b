//! Property-based tests for bundle boundaries and backlog accounting.
//!
//! Each case drives a real `Bundler` on a fresh current-thread runtime and
//! compares the bundles its handler receives with a sequential model of the
//! closing rules.

use bundler::{Bundle, BundleHandler, Bundler, BundlerConfig};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Recording(Arc<Mutex<Vec<Vec<(usize, usize)>>>>);

impl BundleHandler<(usize, usize)> for Recording {
    async fn handle(&self, bundle: Bundle<(usize, usize)>) {
        self.0.lock().unwrap().push(bundle.into_items());
    }
}

/// Sequential model of where bundle boundaries fall.
fn expected_bundles(sizes: &[usize], config: &BundlerConfig) -> Vec<Vec<(usize, usize)>> {
    let mut bundles = Vec::new();
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut open_size = 0;

    for (index, &size) in sizes.iter().enumerate() {
        if !open.is_empty() && open_size + size > config.bundle_byte_limit {
            bundles.push(std::mem::take(&mut open));
            open_size = 0;
        }
        open.push((index, size));
        open_size += size;
        if open.len() >= config.bundle_count_threshold || open_size >= config.bundle_byte_threshold
        {
            bundles.push(std::mem::take(&mut open));
            open_size = 0;
        }
    }
    if !open.is_empty() {
        bundles.push(open);
    }
    bundles
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn arb_config() -> impl Strategy<Value = BundlerConfig> {
    (1usize..20, 1usize..40, 0usize..20).prop_map(|(count, threshold, headroom)| {
        BundlerConfig::default()
            .with_bundle_count_threshold(count)
            .with_bundle_byte_threshold(threshold)
            .with_bundle_byte_limit(threshold + headroom)
            .with_buffered_byte_limit(usize::MAX)
            .with_delay_threshold(Duration::from_secs(3600))
    })
}

proptest! {
    /// Bundle boundaries depend only on thresholds and item sizes, and each
    /// bundle keeps acceptance order.
    #[test]
    fn prop_bundle_boundaries_are_deterministic(
        config in arb_config(),
        raw_sizes in prop::collection::vec(1usize..60, 0..200),
    ) {
        let sizes: Vec<usize> = raw_sizes
            .into_iter()
            .map(|s| s.min(config.bundle_byte_limit))
            .collect();
        let expected = expected_bundles(&sizes, &config);

        let handled = Arc::new(Mutex::new(Vec::new()));
        runtime().block_on(async {
            let bundler = Bundler::new(config.clone(), Recording(Arc::clone(&handled))).unwrap();
            for (index, &size) in sizes.iter().enumerate() {
                bundler.add((index, size), size).unwrap();
            }
            bundler.shutdown().await;
        });

        let handled = handled.lock().unwrap().clone();
        prop_assert_eq!(&handled, &expected);
        for bundle in &handled {
            let size: usize = bundle.iter().map(|(_, s)| s).sum();
            prop_assert!(size <= config.bundle_byte_limit);
            prop_assert!(bundle.len() <= config.bundle_count_threshold);
        }
    }

    /// No add fails with overflow while the cumulative size stays within the
    /// backlog limit, even if nothing has been handled yet.
    #[test]
    fn prop_no_overflow_within_buffered_limit(
        raw_sizes in prop::collection::vec(1usize..50, 1..100),
        slack in 0usize..50,
    ) {
        let total: usize = raw_sizes.iter().sum();
        let config = BundlerConfig::default()
            .with_bundle_count_threshold(7)
            .with_bundle_byte_threshold(50)
            .with_bundle_byte_limit(50)
            .with_buffered_byte_limit(total + slack)
            .with_delay_threshold(Duration::from_secs(3600));

        let handled = Arc::new(Mutex::new(Vec::new()));
        let results = runtime().block_on(async {
            let bundler = Bundler::new(config, Recording(Arc::clone(&handled))).unwrap();
            let results: Vec<_> = raw_sizes
                .iter()
                .enumerate()
                .map(|(index, &size)| bundler.add((index, size), size))
                .collect();
            bundler.shutdown().await;
            results
        });

        for result in results {
            prop_assert!(result.is_ok(), "unexpected error: {:?}", result);
        }
        let handled_items: usize = handled.lock().unwrap().iter().map(Vec::len).sum();
        prop_assert_eq!(handled_items, raw_sizes.len());
    }

    /// Any item larger than the per-bundle limit is rejected.
    #[test]
    fn prop_oversized_always_rejected(
        limit in 1usize..100,
        excess in 1usize..100,
        prefill in 0usize..10,
    ) {
        let config = BundlerConfig::default()
            .with_bundle_byte_threshold(limit)
            .with_bundle_byte_limit(limit)
            .with_delay_threshold(Duration::from_secs(3600));

        let handled = Arc::new(Mutex::new(Vec::new()));
        let rejected = runtime().block_on(async {
            let bundler = Bundler::new(config, Recording(Arc::clone(&handled))).unwrap();
            for i in 0..prefill {
                bundler.add((i, 1), 1).unwrap();
            }
            let result = bundler.add((usize::MAX, limit + excess), limit + excess);
            bundler.shutdown().await;
            result
        });

        let is_oversized = matches!(rejected, Err(bundler::BundlerError::OversizedItem { .. }));
        prop_assert!(is_oversized);
    }
}

//! Bounded Item Bundling
//!
//! Groups items into bundles and hands each closed bundle to an async
//! [`BundleHandler`]. A bundle is closed as soon as any of these holds:
//!
//! - it reaches `bundle_count_threshold` items,
//! - its accumulated size reaches `bundle_byte_threshold`,
//! - the next item would push it past `bundle_byte_limit`,
//! - `delay_threshold` has passed since its first item was added.
//!
//! The total size of items accepted but not yet handled (the backlog) is
//! capped by `buffered_byte_limit`. [`Bundler::add`] rejects an item that
//! would cross the cap with [`BundlerError::Overflow`] instead of queueing
//! it, which leaves the caller free to degrade however it sees fit, usually
//! by sending the item directly.
//!
//! # Example
//!
//! ```ignore
//! use bundler::{Bundle, BundleHandler, Bundler, BundlerConfig};
//!
//! struct Upload;
//!
//! impl BundleHandler<Vec<u8>> for Upload {
//!     async fn handle(&self, bundle: Bundle<Vec<u8>>) {
//!         if let Err(e) = post(bundle.into_items()).await {
//!             tracing::error!(error = %e, "upload failed");
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bundler = Bundler::new(BundlerConfig::default(), Upload).unwrap();
//!     bundler.add(b"payload".to_vec(), 1).unwrap();
//!     bundler.shutdown().await;
//! }
//! ```

mod bundle;
mod bundler;
mod config;
mod error;
mod handler;
mod invariants;
mod metrics;

pub use bundle::Bundle;
pub use bundler::Bundler;
pub use config::BundlerConfig;
pub use error::BundlerError;
pub use handler::{BundleHandler, BundleHandlerBoxed};
pub use metrics::{BundlerMetrics, FlushTrigger};

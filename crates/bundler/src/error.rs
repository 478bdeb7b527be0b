//! Error types for bundler operations.

use thiserror::Error;

/// Errors returned by [`Bundler`](crate::Bundler) construction and `add`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundlerError {
    /// Accepting the item would push the backlog above `buffered_byte_limit`.
    #[error("bundler overflow: {buffered} units buffered, cannot accept {size} more (limit {limit})")]
    Overflow {
        size: usize,
        buffered: usize,
        limit: usize,
    },

    /// The item alone is larger than `bundle_byte_limit` and can never be bundled.
    #[error("item of {size} units exceeds the bundle byte limit of {limit}")]
    OversizedItem { size: usize, limit: usize },

    /// A threshold or limit is unusable.
    #[error("invalid bundler configuration: {0}")]
    InvalidConfig(String),

    /// The bundler has been shut down.
    #[error("bundler is shut down")]
    Closed,

    /// `Bundler::new` was called outside a tokio runtime.
    #[error("no tokio runtime available to run the flush dispatcher")]
    NoRuntime,
}

impl BundlerError {
    /// Returns `true` for backlog overflow, the one error the caller is
    /// expected to handle by sending the item directly.
    #[inline]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }

    /// Returns `true` if adding the same item later may succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_classification() {
        let overflow = BundlerError::Overflow {
            size: 2,
            buffered: 9_999,
            limit: 10_000,
        };
        assert!(overflow.is_overflow());
        assert!(overflow.is_retryable());

        let oversized = BundlerError::OversizedItem {
            size: 2_000,
            limit: 1_000,
        };
        assert!(!oversized.is_overflow());
        assert!(!oversized.is_retryable());
        assert!(!BundlerError::Closed.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = BundlerError::OversizedItem {
            size: 2_000,
            limit: 1_000,
        };
        assert_eq!(
            err.to_string(),
            "item of 2000 units exceeds the bundle byte limit of 1000"
        );
    }
}

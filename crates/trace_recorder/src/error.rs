use bundler::BundlerError;
use thiserror::Error;

/// Errors returned while building a [`Recorder`](crate::Recorder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// The project id is empty.
    #[error("invalid project id: must not be empty")]
    InvalidProjectId,

    /// The fallback timeout is zero.
    #[error("invalid fallback timeout: must be greater than zero")]
    InvalidFallbackTimeout,

    #[error(transparent)]
    Bundler(#[from] BundlerError),
}

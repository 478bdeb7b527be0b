//! Sink for failures that cannot be returned to a caller.

use std::fmt;

/// Receives human-readable descriptions of failed uploads and dropped
/// records.
///
/// Called from the flush pipeline and from `record_span`, so implementations
/// must be cheap and must not block.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, args: fmt::Arguments<'_>);
}

/// Default reporter: one `tracing::error!` event per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, args: fmt::Arguments<'_>) {
        tracing::error!(target: "trace_recorder", "{}", args);
    }
}

impl<F> ErrorReporter for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn report(&self, args: fmt::Arguments<'_>) {
        self(args);
    }
}

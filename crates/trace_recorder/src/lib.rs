//! Span Recorder for Cloud Trace
//!
//! Turns finished spans into Cloud Trace records and uploads them in
//! bundles. The pieces, in the order a span passes through them:
//!
//! - [`RecordConverter`]: pure span to [`Trace`] conversion, with well-known
//!   tag keys renamed through an injectable [`LabelMap`].
//! - [`bundler::Bundler`]: groups traces by count, size and age, and caps
//!   how much may wait for upload.
//! - [`TraceSink`]: the transport; one call per bundle.
//! - [`ErrorReporter`]: where failed uploads and dropped spans end up, since
//!   nothing is ever returned to the instrumentation.
//!
//! [`Recorder`] wires them together. When the backlog is full it uploads the
//! span directly instead of queueing it, so an overloaded process pays in
//! latency rather than memory.
//!
//! # Example
//!
//! ```ignore
//! use trace_recorder::{RawSpan, Recorder, RecorderOptions, StdoutSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let recorder = Recorder::new(RecorderOptions::new("my-project"), StdoutSink::new(true))?;
//!
//!     let span = RawSpan::new(1, 2, 0, "GET /", std::time::SystemTime::now(), Default::default())
//!         .with_tag("http.method", "GET")
//!         .with_tag("http.status_code", 200);
//!     recorder.record_span(span).await;
//!
//!     recorder.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod convert;
pub mod error;
pub mod options;
pub mod record;
pub mod recorder;
pub mod reporter;
pub mod sink;
pub mod span;

pub use convert::{LabelMap, RecordConverter};
pub use error::RecorderError;
pub use options::RecorderOptions;
pub use record::{PatchTracesRequest, SpanKind, Timestamp, Trace, TraceSpan, Traces};
pub use recorder::{Recorder, SpanRecorder};
pub use reporter::{ErrorReporter, TracingReporter};
pub use sink::{JsonFileSink, NullSink, SinkError, StdoutSink, TraceSink, TraceSinkBoxed};
pub use span::{FieldValue, LogField, LogRecord, RawSpan, SpanContext, TagValue};

pub use bundler::{BundlerConfig, BundlerMetrics};

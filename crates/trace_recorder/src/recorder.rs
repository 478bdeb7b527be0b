//! The recorder façade.
//!
//! ```text
//!  record_span ─▶ RecordConverter ─▶ Bundler::add ──▶ UploadHandler ─▶ TraceSink
//!                                        │
//!                                   Overflow ─▶ direct upload (bounded by the
//!                                               fallback timeout)
//! ```
//!
//! Nothing that goes wrong after conversion reaches the instrumentation: a
//! failed upload or a dropped record goes to the [`ErrorReporter`].

use crate::convert::RecordConverter;
use crate::error::RecorderError;
use crate::options::{RecorderOptions, Sizer};
use crate::record::{PatchTracesRequest, Trace};
use crate::reporter::ErrorReporter;
use crate::sink::{SinkError, TraceSink, TraceSinkBoxed};
use crate::span::RawSpan;
use bundler::{Bundle, BundleHandler, Bundler, BundlerError, BundlerMetrics};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Instrumentation-facing seam: anything that accepts finished spans.
pub trait SpanRecorder: Send + Sync {
    /// Takes ownership of a finished span. Never fails from the caller's
    /// point of view.
    fn record_span(&self, span: RawSpan) -> impl Future<Output = ()> + Send;
}

/// Uploads each closed bundle as one request.
struct UploadHandler {
    project_id: String,
    sink: Arc<dyn TraceSinkBoxed>,
    reporter: Arc<dyn ErrorReporter>,
}

impl BundleHandler<Trace> for UploadHandler {
    async fn handle(&self, bundle: Bundle<Trace>) {
        let count = bundle.len();
        let request = PatchTracesRequest::new(self.project_id.clone(), bundle.into_items());

        match self.sink.send_boxed(request).await {
            Ok(()) => tracing::debug!(traces = count, sink = self.sink.name(), "uploaded bundle"),
            Err(e) => self.reporter.report(format_args!(
                "failed to upload {count} traces to the Cloud Trace server: {e}"
            )),
        }
    }
}

/// Converts finished spans, bundles them and uploads the bundles.
pub struct Recorder {
    converter: RecordConverter,
    bundler: Bundler<Trace>,
    sink: Arc<dyn TraceSinkBoxed>,
    reporter: Arc<dyn ErrorReporter>,
    sizer: Sizer,
    fallback_timeout: Duration,
}

impl Recorder {
    /// Creates a recorder uploading through `sink`.
    ///
    /// Must be called inside a tokio runtime; the bundler's dispatcher is
    /// spawned on it.
    pub fn new<S>(options: RecorderOptions, sink: S) -> Result<Self, RecorderError>
    where
        S: TraceSink + 'static,
    {
        Self::with_boxed_sink(options, Arc::new(sink))
    }

    /// Creates a recorder around an already type-erased sink.
    pub fn with_boxed_sink(
        options: RecorderOptions,
        sink: Arc<dyn TraceSinkBoxed>,
    ) -> Result<Self, RecorderError> {
        options.validate()?;
        let RecorderOptions {
            project_id,
            reporter,
            bundler: bundler_config,
            label_map,
            sizer,
            fallback_timeout,
        } = options;

        let handler = UploadHandler {
            project_id: project_id.clone(),
            sink: Arc::clone(&sink),
            reporter: Arc::clone(&reporter),
        };
        let bundler = Bundler::new(bundler_config, handler)?;

        tracing::debug!(project = %project_id, sink = sink.name(), "trace recorder started");

        Ok(Self {
            converter: RecordConverter::new(project_id, label_map),
            bundler,
            sink,
            reporter,
            sizer,
            fallback_timeout,
        })
    }

    /// Converts `span` and queues it for upload. Unsampled spans are
    /// ignored.
    ///
    /// Returns as soon as the trace is queued. When the backlog is full the
    /// trace is uploaded directly instead, and this waits for that upload
    /// for at most the fallback timeout.
    pub async fn record_span(&self, span: RawSpan) {
        if !span.context.sampled {
            tracing::trace!(span_id = span.context.span_id, "skipping unsampled span");
            return;
        }
        let trace = self.converter.convert(&span);
        let size = (self.sizer)(&trace);

        match self.bundler.add(trace, size) {
            Ok(()) => {}
            Err(BundlerError::Overflow {
                buffered, limit, ..
            }) => {
                tracing::warn!(
                    buffered,
                    limit,
                    span_id = span.context.span_id,
                    "trace upload bundle too full, uploading immediately"
                );
                // Conversion is pure, so the trace moved into `add` is rebuilt.
                let trace = self.converter.convert(&span);
                if let Err(e) = self.upload_direct(trace).await {
                    self.reporter.report(format_args!("error uploading trace: {e}"));
                }
            }
            Err(e) => {
                self.reporter.report(format_args!(
                    "dropping span {:016x} of trace {:016x}: {e}",
                    span.context.span_id, span.context.trace_id
                ));
            }
        }
    }

    async fn upload_direct(&self, trace: Trace) -> Result<(), SinkError> {
        let request = PatchTracesRequest::new(self.converter.project_id(), vec![trace]);
        tokio::time::timeout(self.fallback_timeout, self.sink.send_boxed(request))
            .await
            .map_err(|_| SinkError::Timeout)?
    }

    /// Uploads the open bundle and waits for every queued trace to be
    /// handled.
    pub async fn flush(&self) {
        self.bundler.flush().await;
    }

    /// Uploads everything queued and stops accepting spans. Spans recorded
    /// afterwards are reported and dropped.
    pub async fn shutdown(&self) {
        self.bundler.shutdown().await;
        tracing::debug!(project = %self.converter.project_id(), "trace recorder shut down");
    }

    pub fn project_id(&self) -> &str {
        self.converter.project_id()
    }

    /// Size of traces queued but not yet uploaded.
    pub fn buffered(&self) -> usize {
        self.bundler.buffered()
    }

    pub fn metrics(&self) -> &BundlerMetrics {
        self.bundler.metrics()
    }
}

impl SpanRecorder for Recorder {
    async fn record_span(&self, span: RawSpan) {
        Recorder::record_span(self, span).await;
    }
}

use crate::record::PatchTracesRequest;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Error types for uploads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Transport-layer error (network, gRPC, HTTP, file I/O)
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Upload did not finish in time
    #[error("upload timed out")]
    Timeout,
}

/// Destination for trace uploads.
///
/// One call carries one request; the recorder never retries, so a sink that
/// wants retries implements them itself.
pub trait TraceSink: Send + Sync {
    /// Uploads one request.
    fn send(&self, request: PatchTracesRequest)
        -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Returns the sink name for debugging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`TraceSink`] for dynamic dispatch.
pub trait TraceSinkBoxed: Send + Sync {
    /// Uploads one request (boxed future for object safety).
    fn send_boxed(
        &self,
        request: PatchTracesRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Returns the sink name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any TraceSink can be used as TraceSinkBoxed
impl<S: TraceSink> TraceSinkBoxed for S {
    fn send_boxed(
        &self,
        request: PatchTracesRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(self.send(request))
    }

    fn name(&self) -> &str {
        TraceSink::name(self)
    }
}

/// Prints uploads to stdout
pub struct StdoutSink {
    verbose: bool,
}

impl StdoutSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TraceSink for StdoutSink {
    async fn send(&self, request: PatchTracesRequest) -> Result<(), SinkError> {
        println!(
            "=== Uploading {} traces to project {} ===",
            request.len(),
            request.project_id
        );
        if self.verbose {
            for trace in &request.traces.traces {
                for span in &trace.spans {
                    println!(
                        "Span: trace_id={} span_id={:016x} parent={:016x} name={} kind={:?} labels={}",
                        trace.trace_id,
                        span.span_id,
                        span.parent_span_id,
                        span.name,
                        span.kind,
                        span.labels.len()
                    );
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Appends each request to a file as one JSON line.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TraceSink for JsonFileSink {
    async fn send(&self, request: PatchTracesRequest) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_vec(&request).map_err(|e| SinkError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        file.write_all(&line)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Discards every request
pub struct NullSink;

impl NullSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for NullSink {
    async fn send(&self, _request: PatchTracesRequest) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Trace, TraceSpan};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn request(trace_id: &str) -> PatchTracesRequest {
        PatchTracesRequest::new(
            "p",
            vec![Trace {
                project_id: "p".into(),
                trace_id: trace_id.into(),
                spans: vec![TraceSpan {
                    span_id: 1,
                    kind: Default::default(),
                    name: "op".into(),
                    start_time: Default::default(),
                    end_time: Default::default(),
                    parent_span_id: 0,
                    labels: BTreeMap::new(),
                }],
            }],
        )
    }

    #[tokio::test]
    async fn test_json_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.jsonl");

        let sink = JsonFileSink::new(&path);
        sink.send(request("a")).await.unwrap();
        sink.send(request("b")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<PatchTracesRequest> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![request("a"), request("b")]);
    }

    #[tokio::test]
    async fn test_json_file_sink_reports_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("missing").join("traces.jsonl"));
        let err = sink.send(request("a")).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }

    #[tokio::test]
    async fn test_boxed_dispatch() {
        let sinks: Vec<Arc<dyn TraceSinkBoxed>> =
            vec![Arc::new(NullSink::new()), Arc::new(StdoutSink::new(false))];
        for sink in &sinks {
            assert!(sink.send_boxed(request("a")).await.is_ok());
        }
        assert_eq!(sinks[0].name(), "null");
        assert_eq!(sinks[1].name(), "stdout");
    }
}

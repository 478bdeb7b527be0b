use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};
use trace_recorder::{
    BundlerConfig, JsonFileSink, LabelMap, PatchTracesRequest, RawSpan, Recorder, RecorderError,
    RecorderOptions, SinkError, SpanKind, Timestamp, Trace, TraceSink, TraceSinkBoxed, TraceSpan,
};

/// Sink that keeps every request it receives.
#[derive(Default)]
struct MockSink {
    requests: Mutex<Vec<PatchTracesRequest>>,
}

impl MockSink {
    fn requests(&self) -> Vec<PatchTracesRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TraceSink for MockSink {
    async fn send(&self, request: PatchTracesRequest) -> Result<(), SinkError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Sink that rejects everything.
struct FailingSink;

impl TraceSink for FailingSink {
    async fn send(&self, _request: PatchTracesRequest) -> Result<(), SinkError> {
        Err(SinkError::Transport("connection refused".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Sink that never answers in reasonable time.
struct StalledSink;

impl TraceSink for StalledSink {
    async fn send(&self, _request: PatchTracesRequest) -> Result<(), SinkError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Collects reporter output.
#[derive(Clone, Default)]
struct Reports(Arc<Mutex<Vec<String>>>);

impl Reports {
    fn reporter(&self) -> impl Fn(fmt::Arguments<'_>) + Send + Sync + 'static {
        let reports = Arc::clone(&self.0);
        move |args: fmt::Arguments<'_>| reports.lock().unwrap().push(args.to_string())
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn test_span(span_id: u64) -> RawSpan {
    RawSpan::new(
        1,
        span_id,
        9,
        "test/operation",
        UNIX_EPOCH + Duration::from_secs(1_480_425_868),
        Duration::from_secs(5),
    )
    .with_tag("foo", 10)
    .with_tag("bar", "foo")
}

#[tokio::test]
async fn test_record_span_uploads_immediately_when_backlog_full() {
    let reports = Reports::default();
    let sink = Arc::new(MockSink::default());
    let options = RecorderOptions::new("test_project")
        .with_reporter(reports.reporter())
        // Smaller than one trace, so every span takes the direct path.
        .with_bundler_config(BundlerConfig::default().with_buffered_byte_limit(1));
    let recorder =
        Recorder::with_boxed_sink(options, Arc::clone(&sink) as Arc<dyn TraceSinkBoxed>).unwrap();

    recorder.record_span(test_span(10)).await;

    assert!(reports.all().is_empty(), "reporter should not be called");
    assert_eq!(
        sink.requests(),
        vec![PatchTracesRequest::new(
            "test_project",
            vec![Trace {
                project_id: "test_project".into(),
                trace_id: "00000000000000010000000000000001".into(),
                spans: vec![TraceSpan {
                    span_id: 10,
                    kind: SpanKind::SpanKindUnspecified,
                    name: "test/operation".into(),
                    start_time: Timestamp {
                        seconds: 1_480_425_868,
                        nanos: 0,
                    },
                    end_time: Timestamp {
                        seconds: 1_480_425_873,
                        nanos: 0,
                    },
                    parent_span_id: 9,
                    labels: BTreeMap::from([
                        ("foo".to_string(), "10".to_string()),
                        ("bar".to_string(), "foo".to_string()),
                    ]),
                }],
            }],
        )]
    );
    assert_eq!(recorder.buffered(), 0);
    assert_eq!(recorder.metrics().overflows(), 1);
}

#[test]
fn test_missing_project_id() {
    let result = Recorder::new(RecorderOptions::default(), MockSink::default());
    assert!(matches!(result, Err(RecorderError::InvalidProjectId)));
}

#[tokio::test]
async fn test_failed_upload_reported_once_per_bundle() {
    let reports = Reports::default();
    let options = RecorderOptions::new("test_project")
        .with_reporter(reports.reporter())
        .with_bundler_config(BundlerConfig::default().with_bundle_count_threshold(3));
    let recorder = Recorder::new(options, FailingSink).unwrap();

    for id in 0..7 {
        recorder.record_span(test_span(id)).await;
    }
    recorder.flush().await;

    let reports = reports.all();
    assert_eq!(reports.len(), 3, "one report per bundle: {reports:?}");
    assert!(reports[0].starts_with("failed to upload 3 traces"));
    assert!(reports[1].starts_with("failed to upload 3 traces"));
    assert!(reports[2].starts_with("failed to upload 1 traces"));
    assert!(reports[2].contains("connection refused"));
    assert_eq!(recorder.metrics().items_added(), 7);
    assert_eq!(recorder.buffered(), 0);
}

#[tokio::test]
async fn test_overflow_falls_back_then_recovers() {
    let sink = Arc::new(MockSink::default());
    let options = RecorderOptions::new("p").with_bundler_config(
        BundlerConfig::default()
            .with_buffered_byte_limit(4)
            .with_delay_threshold(Duration::from_secs(3600)),
    );
    let recorder =
        Recorder::with_boxed_sink(options, Arc::clone(&sink) as Arc<dyn TraceSinkBoxed>).unwrap();

    // Two traces fill the backlog; the third goes out on its own.
    for id in 1..=3 {
        recorder.record_span(test_span(id)).await;
    }
    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].traces.traces[0].spans[0].span_id, 3);

    recorder.flush().await;
    let requests = sink.requests();
    assert_eq!(requests.len(), 2);
    let bundled: Vec<u64> = requests[1]
        .traces
        .traces
        .iter()
        .map(|t| t.spans[0].span_id)
        .collect();
    assert_eq!(bundled, vec![1, 2]);

    // Backlog is free again, so the next span is queued.
    recorder.record_span(test_span(4)).await;
    assert_eq!(recorder.buffered(), 2);
    assert_eq!(recorder.metrics().overflows(), 1);
    recorder.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fallback_upload_is_bounded_by_timeout() {
    let reports = Reports::default();
    let options = RecorderOptions::new("p")
        .with_reporter(reports.reporter())
        .with_fallback_timeout(Duration::from_secs(2))
        .with_bundler_config(BundlerConfig::default().with_buffered_byte_limit(1));
    let recorder = Recorder::new(options, StalledSink).unwrap();

    let started = tokio::time::Instant::now();
    recorder.record_span(test_span(1)).await;

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    assert_eq!(reports.all(), vec!["error uploading trace: upload timed out"]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_bundle_uploaded_after_delay() {
    let sink = Arc::new(MockSink::default());
    let options = RecorderOptions::new("p")
        .with_bundler_config(BundlerConfig::default().with_delay_threshold(Duration::from_secs(2)));
    let recorder =
        Recorder::with_boxed_sink(options, Arc::clone(&sink) as Arc<dyn TraceSinkBoxed>).unwrap();

    recorder.record_span(test_span(1)).await;
    recorder.record_span(test_span(2)).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(sink.requests().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].len(), 2);
}

#[tokio::test]
async fn test_label_map_applied_end_to_end() {
    let sink = Arc::new(MockSink::default());
    let options = RecorderOptions::new("p")
        .with_label_map(LabelMap::new([("bar", "renamed/bar")]));
    let recorder =
        Recorder::with_boxed_sink(options, Arc::clone(&sink) as Arc<dyn TraceSinkBoxed>).unwrap();

    recorder
        .record_span(test_span(1).with_tag("http.method", "GET"))
        .await;
    recorder.shutdown().await;

    let labels = &sink.requests()[0].traces.traces[0].spans[0].labels;
    assert_eq!(labels.get("renamed/bar").unwrap(), "foo");
    // Not part of the injected map.
    assert_eq!(labels.get("http.method").unwrap(), "GET");
}

#[tokio::test]
async fn test_json_file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traces.jsonl");

    let recorder = Recorder::new(RecorderOptions::new("p"), JsonFileSink::new(&path)).unwrap();
    recorder.record_span(test_span(1)).await;
    recorder.record_span(test_span(2)).await;
    recorder.shutdown().await;

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let request: PatchTracesRequest = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(request.project_id, "p");
    assert_eq!(request.len(), 2);
}

#[tokio::test]
async fn test_unsampled_spans_never_reach_sink() {
    let sink = Arc::new(MockSink::default());
    let options = RecorderOptions::new("p");
    let recorder =
        Recorder::with_boxed_sink(options, Arc::clone(&sink) as Arc<dyn TraceSinkBoxed>).unwrap();

    recorder.record_span(test_span(1).with_sampled(false)).await;
    recorder.record_span(test_span(2)).await;
    recorder.record_span(test_span(3).with_sampled(false)).await;
    recorder.shutdown().await;

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    let span_ids: Vec<u64> = requests[0]
        .traces
        .traces
        .iter()
        .map(|t| t.spans[0].span_id)
        .collect();
    assert_eq!(span_ids, vec![2]);
}

//! # Trace Recorder Demo
//!
//! Several producer tasks record HTTP-ish spans through one [`Recorder`]
//! whose sink is a simulated backend with latency and occasional failures.
//! The bundling thresholds are deliberately small so every path shows up in
//! a short run: count and size flushes, delay flushes between bursts, and
//! backlog overflow falling back to direct uploads.
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (4 producers, 50 spans each)
//! cargo run -p trace_recorder --bin demo -- --quick
//!
//! # Full mode (8 producers, 500 spans each), print every upload
//! cargo run -p trace_recorder --bin demo -- --verbose
//!
//! # Write every upload as a JSON line instead of simulating a backend
//! cargo run -p trace_recorder --bin demo -- --out traces.jsonl
//!
//! # Show the recorder's own debug logging
//! RUST_LOG=trace_recorder=debug,bundler=trace cargo run -p trace_recorder --bin demo
//! ```

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use trace_recorder::{
    BundlerConfig, FieldValue, JsonFileSink, LogField, LogRecord, PatchTracesRequest, RawSpan,
    Recorder, RecorderOptions, SinkError, TraceSink, TraceSinkBoxed,
};

const OPERATIONS: &[(&str, &str)] = &[
    ("GET", "/api/users"),
    ("GET", "/api/orders"),
    ("POST", "/api/orders"),
    ("PUT", "/api/users/profile"),
    ("DELETE", "/api/sessions"),
];

/// Backend stand-in with configurable latency and failure rate.
struct SimulatedBackend {
    failure_rate: f64,
    latency: Duration,
    verbose: bool,
    uploads: AtomicU64,
    failures: AtomicU64,
    traces: AtomicU64,
}

impl SimulatedBackend {
    fn new(failure_rate: f64, latency: Duration, verbose: bool) -> Self {
        Self {
            failure_rate,
            latency,
            verbose,
            uploads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            traces: AtomicU64::new(0),
        }
    }
}

impl TraceSink for SimulatedBackend {
    async fn send(&self, request: PatchTracesRequest) -> Result<(), SinkError> {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let fail = rand::thread_rng().gen_bool(self.failure_rate);
        if fail {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(SinkError::Transport("503 Service Unavailable".into()));
        }

        self.traces.fetch_add(request.len() as u64, Ordering::Relaxed);
        if self.verbose {
            println!(
                "   uploaded {:>3} traces ({} spans) to {}",
                request.len(),
                request.span_count(),
                request.project_id
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Builds one server span with a random shape.
fn random_span(trace_id: u64, span_id: u64) -> RawSpan {
    let mut rng = rand::thread_rng();
    let (method, path) = OPERATIONS[rng.gen_range(0..OPERATIONS.len())];
    let duration = Duration::from_micros(rng.gen_range(200..50_000));
    let status = if rng.gen_bool(0.1) { 500 } else { 200 };
    let start = SystemTime::now() - duration;

    let mut span = RawSpan::new(trace_id, span_id, 0, format!("{method} {path}"), start, duration)
        .with_tag("span.kind", "server")
        .with_tag("http.method", method)
        .with_tag("http.url", path)
        .with_tag("http.status_code", status)
        .with_tag("peer.hostname", "demo.local")
        .with_tag("sampling.priority", 0.5);

    if rng.gen_bool(0.3) {
        span = span.with_log(LogRecord::new(
            start + duration / 2,
            vec![
                LogField::new("event", "cache_miss"),
                LogField::new("key", FieldValue::Int(rng.gen_range(0..1000))),
            ],
        ));
    }
    if status == 500 {
        span = span.with_tag("error", true);
    }
    span
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let quick = args.iter().any(|a| a == "--quick");
    let out = args
        .iter()
        .position(|a| a == "--out")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let (producers, spans_per_producer) = if quick { (4u64, 50u64) } else { (8, 500) };

    let bundler_config = BundlerConfig::default()
        .with_bundle_count_threshold(25)
        .with_bundle_byte_threshold(40)
        .with_bundle_byte_limit(40)
        .with_buffered_byte_limit(200)
        .with_delay_threshold(Duration::from_millis(100))
        .with_handler_limit(2);

    println!("Trace recorder demo");
    println!("   Mode: {}", if quick { "quick" } else { "full" });
    println!("   Producers: {producers}");
    println!("   Spans per producer: {spans_per_producer}");
    println!("   Bundler: {bundler_config:?}");
    println!();

    let backend = Arc::new(SimulatedBackend::new(0.05, Duration::from_millis(20), verbose));
    let sink: Arc<dyn TraceSinkBoxed> = match &out {
        Some(path) => {
            println!("   Writing uploads to {path}\n");
            Arc::new(JsonFileSink::new(path))
        }
        None => Arc::clone(&backend) as Arc<dyn TraceSinkBoxed>,
    };

    let failed_reports = Arc::new(AtomicU64::new(0));
    let options = RecorderOptions::new("demo-project")
        .with_bundler_config(bundler_config)
        .with_fallback_timeout(Duration::from_millis(500))
        .with_reporter({
            let failed_reports = Arc::clone(&failed_reports);
            move |args: std::fmt::Arguments<'_>| {
                failed_reports.fetch_add(1, Ordering::Relaxed);
                tracing::error!("{}", args);
            }
        });
    let recorder = Arc::new(Recorder::with_boxed_sink(options, sink)?);

    let started = Instant::now();
    let mut tasks = tokio::task::JoinSet::new();
    for producer in 0..producers {
        let recorder = Arc::clone(&recorder);
        tasks.spawn(async move {
            for i in 0..spans_per_producer {
                let id = (producer << 32) | (i + 1);
                let span = random_span(id, id);
                recorder.record_span(span).await;

                // Bursts separated by pauses long enough for delay flushes.
                if i % 100 == 99 {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result?;
    }
    let generation_time = started.elapsed();

    recorder.shutdown().await;
    let total_time = started.elapsed();

    let metrics = recorder.metrics();
    println!("Results");
    println!("   Total time:            {total_time:>10.2?}");
    println!("   Generation time:       {generation_time:>10.2?}");
    println!("   Spans recorded:        {:>10}", producers * spans_per_producer);
    println!("   Spans bundled:         {:>10}", metrics.items_added());
    println!("   Overflow fallbacks:    {:>10}", metrics.overflows());
    println!("   Bundles flushed:       {:>10}", metrics.total_flushes());
    println!("   Bundles handled:       {:>10}", metrics.bundles_handled());
    println!("   Reported failures:     {:>10}", failed_reports.load(Ordering::Relaxed));
    if out.is_none() {
        println!(
            "   Backend uploads:       {:>10} ({} failed, {} traces stored)",
            backend.uploads.load(Ordering::Relaxed),
            backend.failures.load(Ordering::Relaxed),
            backend.traces.load(Ordering::Relaxed)
        );
    }

    Ok(())
}

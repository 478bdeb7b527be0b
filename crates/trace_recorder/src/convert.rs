//! Span to Cloud Trace record conversion.
//!
//! Conversion is a pure, total function: every span yields a [`Trace`].
//! Labels are built in three passes:
//!
//! 1. string and integer tags are stringified, every other tag is dropped;
//! 2. well-known tag keys are renamed through the converter's [`LabelMap`];
//! 3. each log event becomes an `event_<index>` label holding its RFC 3339
//!    timestamp followed by its fields as space-separated `key=value` pairs.

use crate::record::{unix_nanos, SpanKind, Timestamp, Trace, TraceSpan};
use crate::span::{LogRecord, RawSpan, TagValue};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Tag carrying the opentracing span kind.
pub const SPAN_KIND_TAG: &str = "span.kind";

/// Ordered set of label key renames.
///
/// Renames are applied in declaration order. A rename moves the value from
/// the source key to the target key and overwrites whatever the target held,
/// so when two sources share a target the later entry wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    renames: Vec<(String, String)>,
}

impl LabelMap {
    /// Builds a map from `(source, target)` pairs.
    pub fn new<I, K, V>(renames: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            renames: renames
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A map that renames nothing.
    pub fn empty() -> Self {
        Self {
            renames: Vec::new(),
        }
    }

    /// Opentracing HTTP tags to Cloud Trace's native HTTP labels.
    pub fn cloud_trace() -> Self {
        Self::new([
            ("peer.hostname", "trace.cloud.google.com/http/host"),
            ("http.method", "trace.cloud.google.com/http/method"),
            ("http.status_code", "trace.cloud.google.com/http/status_code"),
            ("http.url", "trace.cloud.google.com/http/url"),
        ])
    }

    /// Renames keys of `labels` in place.
    pub fn apply(&self, labels: &mut BTreeMap<String, String>) {
        for (source, target) in &self.renames {
            if let Some(value) = labels.remove(source) {
                labels.insert(target.clone(), value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::cloud_trace()
    }
}

/// Converts captured spans into traces for one project.
#[derive(Debug, Clone)]
pub struct RecordConverter {
    project_id: String,
    label_map: LabelMap,
}

impl RecordConverter {
    pub fn new(project_id: impl Into<String>, label_map: LabelMap) -> Self {
        Self {
            project_id: project_id.into(),
            label_map,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Converts one span into a single-span trace.
    pub fn convert(&self, span: &RawSpan) -> Trace {
        let start = unix_nanos(span.start);
        let end = start + span.duration.as_nanos() as i128;

        let mut labels = convert_tags(&span.tags);
        self.label_map.apply(&mut labels);
        add_logs(&mut labels, &span.logs);

        Trace {
            project_id: self.project_id.clone(),
            trace_id: format_trace_id(span.context.trace_id),
            spans: vec![TraceSpan {
                span_id: span.context.span_id,
                kind: span_kind(&span.tags),
                name: span.operation.clone(),
                start_time: Timestamp::from_unix_nanos(start),
                end_time: Timestamp::from_unix_nanos(end),
                parent_span_id: span.parent_span_id,
                labels,
            }],
        }
    }
}

/// Cloud Trace wants 32 hex characters; the 64-bit id fills both halves.
pub fn format_trace_id(trace_id: u64) -> String {
    format!("{trace_id:016x}{trace_id:016x}")
}

/// Stringifies string and integer tags and drops the rest.
pub fn convert_tags(tags: &HashMap<String, TagValue>) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|(key, value)| match value {
            TagValue::String(s) => Some((key.clone(), s.clone())),
            TagValue::Int(i) => Some((key.clone(), i.to_string())),
            TagValue::Float(_) | TagValue::Bool(_) => None,
        })
        .collect()
}

/// Reads the span kind from the `span.kind` tag.
pub fn span_kind(tags: &HashMap<String, TagValue>) -> SpanKind {
    match tags.get(SPAN_KIND_TAG) {
        Some(TagValue::String(kind)) if kind == "server" => SpanKind::RpcServer,
        Some(TagValue::String(kind)) if kind == "client" => SpanKind::RpcClient,
        _ => SpanKind::SpanKindUnspecified,
    }
}

fn add_logs(labels: &mut BTreeMap<String, String>, logs: &[LogRecord]) {
    for (index, log) in logs.iter().enumerate() {
        labels.insert(format!("event_{index}"), render_log(log));
    }
}

fn render_log(log: &LogRecord) -> String {
    let mut rendered =
        DateTime::<Utc>::from(log.timestamp).to_rfc3339_opts(SecondsFormat::AutoSi, true);
    for field in &log.fields {
        // Writing to a String cannot fail.
        let _ = write!(rendered, " {}={}", field.key, field.value);
    }
    rendered
}

//! Cloud Trace v1 record types.
//!
//! Serialized in the JSON shape of the `projects.patchTraces` REST call, so a
//! sink can post a [`PatchTracesRequest`] body as-is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Point in time as whole seconds plus a non-negative sub-second remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    /// Splits nanoseconds since the Unix epoch. Pre-epoch instants keep
    /// `nanos` in `0..1e9` by borrowing from `seconds`.
    pub fn from_unix_nanos(nanos: i128) -> Self {
        Self {
            seconds: nanos.div_euclid(NANOS_PER_SEC) as i64,
            nanos: nanos.rem_euclid(NANOS_PER_SEC) as i32,
        }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_unix_nanos(unix_nanos(time))
    }
}

/// Signed nanoseconds between the Unix epoch and `time`.
pub(crate) fn unix_nanos(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos() as i128,
        Err(before) => -(before.duration().as_nanos() as i128),
    }
}

/// Span kind as understood by Cloud Trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    #[default]
    SpanKindUnspecified,
    RpcServer,
    RpcClient,
}

/// One span of a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpan {
    pub span_id: u64,
    pub kind: SpanKind,
    pub name: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// 0 for root spans
    pub parent_span_id: u64,
    pub labels: BTreeMap<String, String>,
}

/// A trace as sent to Cloud Trace. The recorder emits one trace per span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub project_id: String,
    /// 32 lower-case hex characters
    pub trace_id: String,
    pub spans: Vec<TraceSpan>,
}

/// List wrapper required by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traces {
    pub traces: Vec<Trace>,
}

/// Body of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTracesRequest {
    pub project_id: String,
    pub traces: Traces,
}

impl PatchTracesRequest {
    pub fn new(project_id: impl Into<String>, traces: Vec<Trace>) -> Self {
        Self {
            project_id: project_id.into(),
            traces: Traces { traces },
        }
    }

    /// Number of traces in the request.
    pub fn len(&self) -> usize {
        self.traces.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.traces.is_empty()
    }

    /// Number of spans across all traces.
    pub fn span_count(&self) -> usize {
        self.traces.traces.iter().map(|t| t.spans.len()).sum()
    }
}

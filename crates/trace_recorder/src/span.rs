use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Identity of a span within its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Trace identifier (64-bit)
    pub trace_id: u64,
    /// Span identifier (64-bit)
    pub span_id: u64,
    /// Unsampled spans are dropped by the recorder without being uploaded
    pub sampled: bool,
}

/// A finished span as captured by tracing instrumentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub context: SpanContext,
    /// Parent span identifier (0 if root span)
    pub parent_span_id: u64,
    /// Operation name
    pub operation: String,
    pub start: SystemTime,
    pub duration: Duration,
    pub tags: HashMap<String, TagValue>,
    /// Timestamped events, in the order they were logged
    pub logs: Vec<LogRecord>,
}

/// Tag value types. Only strings and integers become labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A timestamped event logged on a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    pub fields: Vec<LogField>,
}

/// One key/value pair of a log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogField {
    pub key: String,
    pub value: FieldValue,
}

/// Value of a log field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl LogField {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl LogRecord {
    pub fn new(timestamp: SystemTime, fields: Vec<LogField>) -> Self {
        Self { timestamp, fields }
    }
}

impl RawSpan {
    /// Creates a span with no tags or logs.
    pub fn new(
        trace_id: u64,
        span_id: u64,
        parent_span_id: u64,
        operation: impl Into<String>,
        start: SystemTime,
        duration: Duration,
    ) -> Self {
        Self {
            context: SpanContext {
                trace_id,
                span_id,
                sampled: true,
            },
            parent_span_id,
            operation: operation.into(),
            start,
            duration,
            tags: HashMap::new(),
            logs: Vec::new(),
        }
    }

    /// Adds a tag, replacing any previous value under the same key.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Marks the span as sampled or not.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.context.sampled = sampled;
        self
    }

    /// Appends a log event.
    pub fn with_log(mut self, log: LogRecord) -> Self {
        self.logs.push(log);
        self
    }

    /// Returns `true` if the span has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_span_id == 0
    }

    /// End of the span.
    pub fn end(&self) -> SystemTime {
        self.start + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_480_425_868);
        let span = RawSpan::new(1, 10, 9, "test/operation", start, Duration::from_secs(5))
            .with_tag("foo", 10)
            .with_tag("bar", "foo");

        assert!(!span.is_root());
        assert!(span.context.sampled);
        assert!(!span.clone().with_sampled(false).context.sampled);
        assert_eq!(span.tags.get("foo"), Some(&TagValue::Int(10)));
        assert_eq!(span.tags.get("bar"), Some(&TagValue::String("foo".into())));
        assert_eq!(span.end(), start + Duration::from_secs(5));
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::from("done").to_string(), "done");
        assert_eq!(FieldValue::from(42).to_string(), "42");
        assert_eq!(FieldValue::from(1.5).to_string(), "1.5");
        assert_eq!(FieldValue::from(true).to_string(), "true");
    }
}

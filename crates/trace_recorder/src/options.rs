//! Recorder construction options.

use crate::convert::LabelMap;
use crate::error::RecorderError;
use crate::record::Trace;
use crate::reporter::{ErrorReporter, TracingReporter};
use bundler::BundlerConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Computes the backlog size of one trace.
pub type Sizer = Arc<dyn Fn(&Trace) -> usize + Send + Sync>;

/// Units charged per trace by the default sizer: one for the trace, one for
/// its span.
pub const DEFAULT_TRACE_SIZE: usize = 2;

/// Settings for a [`Recorder`](crate::Recorder).
#[derive(Clone)]
pub struct RecorderOptions {
    pub(crate) project_id: String,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    pub(crate) bundler: BundlerConfig,
    pub(crate) label_map: LabelMap,
    pub(crate) sizer: Sizer,
    pub(crate) fallback_timeout: Duration,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            reporter: Arc::new(TracingReporter),
            bundler: BundlerConfig::default(),
            label_map: LabelMap::cloud_trace(),
            sizer: Arc::new(|_: &Trace| DEFAULT_TRACE_SIZE),
            fallback_timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for RecorderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderOptions")
            .field("project_id", &self.project_id)
            .field("bundler", &self.bundler)
            .field("label_map", &self.label_map)
            .field("fallback_timeout", &self.fallback_timeout)
            .finish_non_exhaustive()
    }
}

impl RecorderOptions {
    /// Options for `project_id` with every other setting at its default.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::default().with_project(project_id)
    }

    /// Sets the project traces are uploaded to.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Sets where upload failures and dropped records are reported.
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Replaces the bundling thresholds.
    pub fn with_bundler_config(mut self, config: BundlerConfig) -> Self {
        self.bundler = config;
        self
    }

    /// Replaces the label renames applied during conversion.
    pub fn with_label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = label_map;
        self
    }

    /// Sets how much of the backlog each trace occupies.
    pub fn with_sizer(mut self, sizer: impl Fn(&Trace) -> usize + Send + Sync + 'static) -> Self {
        self.sizer = Arc::new(sizer);
        self
    }

    /// Bounds the direct upload made when the backlog is full.
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn bundler_config(&self) -> &BundlerConfig {
        &self.bundler
    }

    pub fn fallback_timeout(&self) -> Duration {
        self.fallback_timeout
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.project_id.is_empty() {
            return Err(RecorderError::InvalidProjectId);
        }
        if self.fallback_timeout.is_zero() {
            return Err(RecorderError::InvalidFallbackTimeout);
        }
        self.bundler.validate()?;
        Ok(())
    }
}

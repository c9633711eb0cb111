//! Probe results and source snapshots.

use serde::{Deserialize, Serialize};

use super::enums::ConnectionState;
use super::frame::FrameDimensions;
use super::source_id::SourceId;
use crate::surface::truncate_diagnostic;

/// Classified outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum TestOutcome {
    /// The decoder connected and exited cleanly.
    Success,
    /// The probe failed; carries a bounded description.
    Failure(String),
    /// The probe was not attempted.
    Skipped(String),
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Success)
    }
}

/// Result of `ConnectionTester::test` for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub source_id: SourceId,
    pub outcome: TestOutcome,
    /// Decoder diagnostics, truncated to the configured bound.
    pub diagnostic_excerpt: String,
}

impl ConnectionTestResult {
    pub fn success(source_id: SourceId) -> Self {
        Self {
            source_id,
            outcome: TestOutcome::Success,
            diagnostic_excerpt: String::new(),
        }
    }

    /// Failure whose message and excerpt are both cut to `max_chars`.
    pub fn failure(source_id: SourceId, message: &str, diagnostics: &str, max_chars: usize) -> Self {
        Self {
            source_id,
            outcome: TestOutcome::Failure(truncate_diagnostic(message, max_chars)),
            diagnostic_excerpt: truncate_diagnostic(diagnostics, max_chars),
        }
    }

    pub fn skipped(source_id: SourceId, reason: impl Into<String>) -> Self {
        Self {
            source_id,
            outcome: TestOutcome::Skipped(reason.into()),
            diagnostic_excerpt: String::new(),
        }
    }

    /// One-line summary such as "Camera 1: connection successful".
    pub fn summary(&self) -> String {
        match &self.outcome {
            TestOutcome::Success => format!("{}: connection successful", self.source_id),
            TestOutcome::Failure(message) => format!("{}: error - {}", self.source_id, message),
            TestOutcome::Skipped(reason) => format!("{}: {}", self.source_id, reason),
        }
    }
}

/// Point-in-time view of one camera slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSource {
    pub id: SourceId,
    pub name: String,
    pub address: String,
    pub connection_state: ConnectionState,
    /// Dimensions of the live run, if any.
    pub frame_dimensions: Option<FrameDimensions>,
    pub current_fps: f64,
    pub total_frames: u64,
    pub has_live_handle: bool,
}

impl CameraSource {
    pub fn is_configured(&self) -> bool {
        !self.address.is_empty()
    }
}

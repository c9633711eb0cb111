//! Interfaces to the presentation side.
//!
//! The core never renders anything itself. It pushes frames, FPS values and
//! status messages into a [`DisplaySurface`] and asks an [`OperatorConsole`]
//! for new addresses.

use serde::{Deserialize, Serialize};

use crate::models::{FrameBuffer, Severity, SourceId};

/// Default bound for any text surfaced to the display.
pub const DEFAULT_STATUS_MAX_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// Receives everything the core wants shown.
///
/// Called from the read-loop thread and from probe threads, so
/// implementations must be thread-safe. `render_frame` borrows the frame for
/// the duration of the call only.
pub trait DisplaySurface: Send + Sync {
    /// Draw one decoded frame for `source`.
    fn render_frame(&self, source: SourceId, frame: &FrameBuffer);

    /// Latest throughput estimate for `source`.
    fn update_fps(&self, source: SourceId, fps: f64);

    /// Show a status line.
    fn show_status(&self, status: &StatusMessage);
}

/// Asks the operator for a new source address.
pub trait OperatorConsole {
    /// Returns the entered text, or None when the operator cancels.
    fn request_address(&self, source: SourceId, current: &str) -> Option<String>;
}

/// Surface that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl DisplaySurface for NullSurface {
    fn render_frame(&self, _source: SourceId, _frame: &FrameBuffer) {}

    fn update_fps(&self, _source: SourceId, _fps: f64) {}

    fn show_status(&self, _status: &StatusMessage) {}
}

/// A bounded status line with a severity marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub severity: Severity,
    pub text: String,
}

impl StatusMessage {
    /// Build a message, cutting `text` to `max_chars`.
    pub fn new(severity: Severity, text: impl AsRef<str>, max_chars: usize) -> Self {
        Self {
            severity,
            text: truncate_diagnostic(text.as_ref(), max_chars),
        }
    }

    pub fn info(text: impl AsRef<str>) -> Self {
        Self::new(Severity::Info, text, DEFAULT_STATUS_MAX_CHARS)
    }

    pub fn success(text: impl AsRef<str>) -> Self {
        Self::new(Severity::Success, text, DEFAULT_STATUS_MAX_CHARS)
    }

    pub fn error(text: impl AsRef<str>) -> Self {
        Self::new(Severity::Error, text, DEFAULT_STATUS_MAX_CHARS)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity.tag(), self.text)
    }
}

/// Title text shown above a feed, e.g. "Camera 1 - FPS: 25.0".
pub fn fps_label(name: &str, fps: f64) -> String {
    format!("{} - FPS: {:.1}", name, fps)
}

/// Cut `text` to at most `max_chars` characters.
///
/// Longer text keeps its head and ends in "...", with the ellipsis counted
/// inside the bound. Cuts on char boundaries.
pub fn truncate_diagnostic(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_chars <= ellipsis_len {
        return text.chars().take(max_chars).collect();
    }

    let mut out: String = text.chars().take(max_chars - ellipsis_len).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Normalize operator input into an address.
///
/// Returns None for cancelled or blank input ("no change").
pub fn normalize_address(input: Option<String>) -> Option<String> {
    input
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

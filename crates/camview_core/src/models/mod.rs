//! Data models for camview.
//!
//! - Source identification (SourceId)
//! - Lifecycle enums for sources and sessions
//! - Raw frames and their dimensions
//! - Throughput statistics
//! - Probe results and source snapshots

mod enums;
mod frame;
mod results;
mod source_id;
mod stats;

pub use enums::{ConnectionState, SessionMode, SessionState, Severity};
pub use frame::{FrameBuffer, FrameDimensions, CHANNELS};
pub use results::{CameraSource, ConnectionTestResult, TestOutcome};
pub use source_id::{SourceId, MAX_SOURCES};
pub use stats::{ThroughputStats, DEFAULT_FPS_WINDOW};

//! Error types for sources, probes and sessions.
//!
//! Errors carry the camera they belong to so a single status line can name
//! the failing source: Session → Source → Detail.

use std::io;

use thiserror::Error;

use crate::models::{FrameDimensions, SourceId};

/// Rejected configuration. Raised before any process is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required source has no address.
    #[error("{source_id}: no address configured")]
    MissingAddress { source_id: SourceId },

    /// Frame size with a zero side.
    #[error("{source_id}: invalid frame size {dimensions}")]
    InvalidDimensions {
        source_id: SourceId,
        dimensions: FrameDimensions,
    },
}

/// Failure to bring a source (or a whole session) up.
#[derive(Error, Debug)]
pub enum StartError {
    /// The decoder process could not be created.
    #[error("{source_id}: failed to start decoder: {detail}")]
    SpawnFailed { source_id: SourceId, detail: String },

    /// The decoder started but its output pipe was not available.
    #[error("{source_id}: decoder output pipe unavailable")]
    PipeUnavailable { source_id: SourceId },

    /// `start` was called on a source that already streams.
    #[error("{source_id}: already streaming")]
    AlreadyStreaming { source_id: SourceId },

    /// The source configuration was rejected before anything was spawned.
    #[error(transparent)]
    Rejected(#[from] ConfigError),

    /// A later source failed after earlier ones started; those were rolled back.
    #[error("{failed} failed after {} started: {detail}", started_names(.started))]
    PartialStart {
        started: Vec<SourceId>,
        failed: SourceId,
        detail: String,
    },
}

fn started_names(started: &[SourceId]) -> String {
    started
        .iter()
        .map(|s| s.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StartError {
    /// Create a spawn failed error.
    pub fn spawn_failed(source_id: SourceId, detail: impl Into<String>) -> Self {
        Self::SpawnFailed {
            source_id,
            detail: detail.into(),
        }
    }

    /// The source that could not be started.
    pub fn source_id(&self) -> SourceId {
        match self {
            StartError::SpawnFailed { source_id, .. }
            | StartError::PipeUnavailable { source_id }
            | StartError::AlreadyStreaming { source_id } => *source_id,
            StartError::PartialStart { failed, .. } => *failed,
            StartError::Rejected(ConfigError::MissingAddress { source_id })
            | StartError::Rejected(ConfigError::InvalidDimensions { source_id, .. }) => *source_id,
        }
    }

    /// Wrap a single-source failure as a partial start of a multi-source run.
    pub fn after_partial_start(self, started: Vec<SourceId>) -> Self {
        if started.is_empty() {
            return self;
        }
        let failed = self.source_id();
        Self::PartialStart {
            started,
            failed,
            detail: self.to_string(),
        }
    }
}

/// Terminal condition of a frame read.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The pipe closed, before or in the middle of a frame.
    #[error("stream ended")]
    StreamEnded,

    /// Any other I/O failure.
    #[error("I/O fault: {0}")]
    IoFault(String),
}

impl ReadError {
    /// Classify an I/O error from the pipe.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => ReadError::StreamEnded,
            _ => ReadError::IoFault(err.to_string()),
        }
    }
}

/// Probe failure. Never returned to callers; folded into a test result.
#[derive(Error, Debug)]
pub enum TestError {
    #[error("failed to start probe: {0}")]
    Spawn(String),

    #[error("failed to communicate with probe: {0}")]
    Communication(String),

    #[error("probe timed out after {secs:.1}s")]
    TimedOut { secs: f64 },
}

/// Cleanup step that did not go as planned. Logged, never escalated.
#[derive(Error, Debug)]
pub enum ShutdownFault {
    #[error("termination request failed: {0}")]
    TerminateFailed(String),

    #[error("process did not exit within {millis}ms")]
    GraceExpired { millis: u128 },

    #[error("failed to query process status: {0}")]
    StatusUnavailable(String),
}

/// Error returned by session commands.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Start(#[from] StartError),

    /// The command needs a different session mode.
    #[error("'{command}' is not available in {mode} mode")]
    UnsupportedInMode { command: String, mode: String },

    /// The session has no such camera slot.
    #[error("{0} is not part of this session")]
    UnknownSource(SourceId),
}

/// Result type for session commands.
pub type SessionResult<T> = Result<T, SessionError>;

//! Boundary to the external decoding process.
//!
//! The core talks to decoders only through [`DecoderBackend`]. The real
//! backend spawns `ffmpeg`; tests plug in an in-memory one.
//!
//! # Usage
//!
//! ```ignore
//! use camview_core::decoder::{shutdown_process, DecoderBackend, FfmpegBackend, StreamRequest};
//!
//! let backend = FfmpegBackend::default();
//! let mut process = backend.spawn_stream(&request)?;
//! let pipe = process.take_output();
//! // ... read frames from pipe ...
//! shutdown_process(process, grace, "Camera 1");
//! ```

mod args;
mod ffmpeg;

use std::io::{self, Read};
use std::thread;
use std::time::{Duration, Instant};

pub use args::{DecoderArgs, DecoderTuning, DEFAULT_CONNECT_TIMEOUT};
pub use ffmpeg::{FfmpegBackend, FfmpegProbe, FfmpegStream};

use crate::errors::ShutdownFault;
use crate::models::{FrameDimensions, SourceId};

/// Default time a stopping decoder gets to exit on its own.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(1500);

/// How often exit status is polled while waiting.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Parameters for a streaming decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub source_id: SourceId,
    pub address: String,
    pub dimensions: FrameDimensions,
    pub tuning: DecoderTuning,
}

/// Parameters for a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub source_id: SourceId,
    pub address: String,
    pub tuning: DecoderTuning,
    pub probe_duration: Duration,
}

/// Exit status of a finished process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, None when killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Spawns decoding processes.
pub trait DecoderBackend: Send + Sync {
    /// Start a decoder that writes raw frames to its output pipe.
    fn spawn_stream(&self, request: &StreamRequest) -> io::Result<Box<dyn DecoderProcess>>;

    /// Start a decoder that discards its output and reports diagnostics.
    fn spawn_probe(&self, request: &ProbeRequest) -> io::Result<Box<dyn ProbeProcess>>;
}

/// A running streaming decoder.
///
/// Implementations must release the process when dropped without
/// [`shutdown_process`] having been called.
pub trait DecoderProcess: Send {
    /// OS process id, if there is one.
    fn id(&self) -> Option<u32>;

    /// Hand out the frame pipe. Returns None on the second call.
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Drop every pipe end this handle still holds.
    fn close_pipes(&mut self);

    /// Ask the process to exit.
    fn terminate(&mut self) -> io::Result<()>;

    /// Force the process to exit and wait for it to be reaped.
    fn kill(&mut self) -> io::Result<()>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Most recent diagnostic line the decoder wrote, if any.
    fn last_diagnostic(&self) -> Option<String>;
}

/// A running probe decoder.
pub trait ProbeProcess: Send {
    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Force the probe to exit.
    fn kill(&mut self) -> io::Result<()>;

    /// Everything the probe wrote to its diagnostic stream.
    ///
    /// Call after the process has exited or been killed.
    fn take_diagnostics(&mut self) -> String;
}

/// Release a decoder on any exit path.
///
/// Closes its pipes, requests termination, waits up to `grace` for it to
/// exit and force-kills it afterwards. Faults are logged and returned for
/// inspection but never stop the cleanup; the handle is always dropped.
pub fn shutdown_process(
    mut process: Box<dyn DecoderProcess>,
    grace: Duration,
    label: &str,
) -> Option<ShutdownFault> {
    let pid = process.id();
    tracing::debug!("[Decoder] {} shutting down (pid {:?})", label, pid);

    process.close_pipes();

    let mut fault = None;
    if let Err(e) = process.terminate() {
        let f = ShutdownFault::TerminateFailed(e.to_string());
        tracing::warn!("[Decoder] {}: {}", label, f);
        fault = Some(f);
    }

    let deadline = Instant::now() + grace;
    loop {
        match process.try_wait() {
            Ok(Some(exit)) => {
                tracing::debug!("[Decoder] {} exited with code {:?}", label, exit.code);
                return fault;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
                let f = ShutdownFault::GraceExpired {
                    millis: grace.as_millis(),
                };
                tracing::warn!("[Decoder] {}: {}, killing", label, f);
                if let Err(e) = process.kill() {
                    tracing::warn!("[Decoder] {}: kill failed: {}", label, e);
                }
                return Some(f);
            }
            Err(e) => {
                let f = ShutdownFault::StatusUnavailable(e.to_string());
                tracing::warn!("[Decoder] {}: {}", label, f);
                let _ = process.kill();
                return Some(f);
            }
        }
    }
}

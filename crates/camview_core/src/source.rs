//! One camera source: its decoder process, state and throughput.
//!
//! A source keeps the process handle so `stop()` can be called from any
//! thread. The frame pipe moves into a [`StreamHandle`] owned by whoever
//! runs the read loop; terminating the process closes the pipe and wakes
//! a blocked read.

use std::io::{self, Read};
use std::time::Duration;

use parking_lot::Mutex;

use crate::decoder::{shutdown_process, DecoderBackend, DecoderProcess, DecoderTuning, StreamRequest};
use crate::errors::{ConfigError, ReadError, StartError};
use crate::models::{
    CameraSource, ConnectionState, FrameBuffer, FrameDimensions, SourceId, ThroughputStats,
};

/// Per-run options for [`StreamSource::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub dimensions: FrameDimensions,
    pub tuning: DecoderTuning,
    /// Time the decoder gets to exit when stopped.
    pub stop_grace: Duration,
}

/// Owns the frame pipe of one run and reads fixed-size frames from it.
pub struct StreamHandle {
    source_id: SourceId,
    dimensions: FrameDimensions,
    pipe: Box<dyn Read + Send>,
}

impl StreamHandle {
    pub fn new(source_id: SourceId, dimensions: FrameDimensions, pipe: Box<dyn Read + Send>) -> Self {
        Self {
            source_id,
            dimensions,
            pipe,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    /// Block until one full frame has arrived.
    ///
    /// A pipe that closes before the frame is complete, including one that
    /// delivered part of a frame, yields `StreamEnded`.
    pub fn read_frame(&mut self) -> Result<FrameBuffer, ReadError> {
        let len = self.dimensions.frame_len();
        let mut data = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            match self.pipe.read(&mut data[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        tracing::debug!(
                            "[Source] {} pipe closed after {} of {} bytes",
                            self.source_id,
                            filled,
                            len
                        );
                    }
                    return Err(ReadError::StreamEnded);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::from_io(&e)),
            }
        }

        FrameBuffer::from_bytes(self.dimensions, data)
            .ok_or_else(|| ReadError::IoFault("frame size mismatch".to_string()))
    }
}

struct SourceInner {
    address: String,
    state: ConnectionState,
    process: Option<Box<dyn DecoderProcess>>,
    dimensions: Option<FrameDimensions>,
    stop_grace: Duration,
}

/// A configured camera slot.
///
/// `start` and `stop` serialize on a per-source lock; stats sit behind
/// their own lock so the read loop never waits on a stop in progress.
pub struct StreamSource {
    id: SourceId,
    name: String,
    inner: Mutex<SourceInner>,
    stats: Mutex<ThroughputStats>,
}

impl StreamSource {
    pub fn new(id: SourceId, fps_window: Duration) -> Self {
        Self {
            id,
            name: id.display_name(),
            inner: Mutex::new(SourceInner {
                address: String::new(),
                state: ConnectionState::Unconfigured,
                process: None,
                dimensions: None,
                stop_grace: crate::decoder::DEFAULT_STOP_GRACE,
            }),
            stats: Mutex::new(ThroughputStats::new(fps_window)),
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> String {
        self.inner.lock().address.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Whether a decoder process is currently owned.
    pub fn has_live_handle(&self) -> bool {
        self.inner.lock().process.is_some()
    }

    pub fn current_fps(&self) -> f64 {
        self.stats.lock().current_fps()
    }

    /// Replace the address. Takes effect on the next start.
    pub fn set_address(&self, address: &str) {
        let address = address.trim().to_string();
        let mut inner = self.inner.lock();
        if inner.process.is_none() {
            inner.state = if address.is_empty() {
                ConnectionState::Unconfigured
            } else {
                ConnectionState::Idle
            };
        }
        tracing::debug!("[Source] {} address set to '{}'", self.name, address);
        inner.address = address;
    }

    /// Spawn the decoder and hand back the frame pipe.
    pub fn start(
        &self,
        backend: &dyn DecoderBackend,
        options: &StreamOptions,
    ) -> Result<StreamHandle, StartError> {
        let mut inner = self.inner.lock();

        if inner.address.is_empty() {
            return Err(ConfigError::MissingAddress { source_id: self.id }.into());
        }
        if inner.process.is_some() || inner.state == ConnectionState::Streaming {
            return Err(StartError::AlreadyStreaming { source_id: self.id });
        }
        if !options.dimensions.is_valid() {
            return Err(ConfigError::InvalidDimensions {
                source_id: self.id,
                dimensions: options.dimensions,
            }
            .into());
        }

        let previous = inner.state;
        inner.state = ConnectionState::Connecting;

        let request = StreamRequest {
            source_id: self.id,
            address: inner.address.clone(),
            dimensions: options.dimensions,
            tuning: options.tuning.clone(),
        };

        tracing::info!(
            "[Source] {} connecting to {} at {}",
            self.name,
            request.address,
            request.dimensions
        );

        let mut process = match backend.spawn_stream(&request) {
            Ok(p) => p,
            Err(e) => {
                inner.state = previous;
                tracing::error!("[Source] {} failed to spawn decoder: {}", self.name, e);
                return Err(StartError::spawn_failed(self.id, e.to_string()));
            }
        };

        let Some(pipe) = process.take_output() else {
            tracing::error!("[Source] {} decoder has no output pipe", self.name);
            shutdown_process(process, options.stop_grace, &self.name);
            inner.state = previous;
            return Err(StartError::PipeUnavailable { source_id: self.id });
        };

        inner.process = Some(process);
        inner.dimensions = Some(options.dimensions);
        inner.stop_grace = options.stop_grace;
        inner.state = ConnectionState::Streaming;
        self.stats.lock().reset();

        tracing::info!("[Source] {} streaming", self.name);
        Ok(StreamHandle::new(self.id, options.dimensions, pipe))
    }

    /// Read one frame through `handle` and account for it.
    pub fn read_frame(&self, handle: &mut StreamHandle) -> Result<FrameBuffer, ReadError> {
        let frame = handle.read_frame()?;
        self.stats.lock().record_frame();
        Ok(frame)
    }

    /// Release the decoder. No-op when nothing is running.
    pub fn stop(&self) {
        self.release(false);
    }

    /// Release the decoder after its read loop died; the source ends `Failed`.
    pub fn fail(&self) {
        self.release(true);
    }

    fn release(&self, failed: bool) {
        let mut inner = self.inner.lock();
        let Some(process) = inner.process.take() else {
            if failed && inner.state != ConnectionState::Unconfigured {
                inner.state = ConnectionState::Failed;
            }
            return;
        };

        inner.state = ConnectionState::Stopping;
        tracing::info!("[Source] {} stopping", self.name);
        shutdown_process(process, inner.stop_grace, &self.name);

        inner.dimensions = None;
        inner.state = if failed {
            ConnectionState::Failed
        } else if inner.address.is_empty() {
            ConnectionState::Unconfigured
        } else {
            ConnectionState::Idle
        };
        tracing::info!("[Source] {} {}", self.name, inner.state);
    }

    /// Last diagnostic line from the running decoder, if any.
    pub fn last_diagnostic(&self) -> Option<String> {
        self.inner
            .lock()
            .process
            .as_ref()
            .and_then(|p| p.last_diagnostic())
    }

    /// Mark the source as probing, unless it is busy streaming.
    ///
    /// Returns true when the state was changed and must be restored with
    /// [`StreamSource::end_testing`].
    pub(crate) fn begin_testing(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ConnectionState::Idle | ConnectionState::Failed => {
                inner.state = ConnectionState::Testing;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn end_testing(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Testing {
            inner.state = if inner.address.is_empty() {
                ConnectionState::Unconfigured
            } else {
                ConnectionState::Idle
            };
        }
    }

    pub fn snapshot(&self) -> CameraSource {
        let inner = self.inner.lock();
        let stats = self.stats.lock();
        CameraSource {
            id: self.id,
            name: self.name.clone(),
            address: inner.address.clone(),
            connection_state: inner.state,
            frame_dimensions: inner.dimensions,
            current_fps: stats.current_fps(),
            total_frames: stats.total_frames(),
            has_live_handle: inner.process.is_some(),
        }
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    fn handle_over(bytes: Vec<u8>, chunk: usize) -> StreamHandle {
        StreamHandle::new(
            SourceId::PRIMARY,
            FrameDimensions::new(2, 2),
            Box::new(Trickle {
                data: Cursor::new(bytes),
                chunk,
            }),
        )
    }

    #[test]
    fn reads_whole_frames_across_short_reads() {
        let bytes: Vec<u8> = (0..24).collect();
        let mut handle = handle_over(bytes, 5);
        let first = handle.read_frame().unwrap();
        assert_eq!(first.as_bytes(), &(0..12).collect::<Vec<u8>>()[..]);
        let second = handle.read_frame().unwrap();
        assert_eq!(second.pixel(0, 0), Some([12, 13, 14]));
        assert!(matches!(handle.read_frame(), Err(ReadError::StreamEnded)));
    }

    #[test]
    fn partial_frame_then_close_is_stream_end() {
        let mut handle = handle_over(vec![1; 7], 3);
        assert!(matches!(handle.read_frame(), Err(ReadError::StreamEnded)));
    }

    #[test]
    fn other_errors_are_io_faults() {
        let mut handle = StreamHandle::new(SourceId::PRIMARY, FrameDimensions::new(2, 2), Box::new(Failing));
        assert!(matches!(handle.read_frame(), Err(ReadError::IoFault(_))));
    }

    #[test]
    fn address_controls_configured_state() {
        let source = StreamSource::new(SourceId::PRIMARY, Duration::from_millis(500));
        assert_eq!(source.state(), ConnectionState::Unconfigured);
        source.set_address("  rtsp://cam/1 ");
        assert_eq!(source.address(), "rtsp://cam/1");
        assert_eq!(source.state(), ConnectionState::Idle);
        source.set_address("");
        assert_eq!(source.state(), ConnectionState::Unconfigured);
    }

    #[test]
    fn stop_without_run_is_noop() {
        let source = StreamSource::new(SourceId::SECONDARY, Duration::from_millis(500));
        source.set_address("rtsp://cam/2");
        source.stop();
        source.stop();
        assert_eq!(source.state(), ConnectionState::Idle);
        assert!(!source.has_live_handle());
    }
}

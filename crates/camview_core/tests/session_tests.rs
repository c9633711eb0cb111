//! Session behavior against an in-memory decoder.

use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use camview_core::config::CameraSettings;
use camview_core::decoder::{
    DecoderBackend, DecoderProcess, ProbeProcess, ProbeRequest, ProcessExit, StreamRequest,
};
use camview_core::models::{
    ConnectionState, FrameBuffer, FrameDimensions, SessionMode, SessionState, Severity, SourceId,
    TestOutcome,
};
use camview_core::surface::{DisplaySurface, OperatorConsole, StatusMessage};
use camview_core::{ConfigError, SessionError, StartError, StreamSession};

const PRIMARY_DIMS: FrameDimensions = FrameDimensions {
    width: 4,
    height: 2,
};
const SIDE_DIMS: FrameDimensions = FrameDimensions {
    width: 2,
    height: 2,
};

/// Pipe fed through a channel; reads return EOF once every sender is gone.
struct ChannelPipe {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for ChannelPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct FakeProcess {
    sender: Option<Sender<Vec<u8>>>,
    pipe: Option<ChannelPipe>,
    exited: bool,
    diagnostic: Option<String>,
    terminations: Arc<AtomicUsize>,
}

impl DecoderProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.pipe.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    }

    fn close_pipes(&mut self) {}

    fn terminate(&mut self) -> io::Result<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.sender = None;
        self.exited = true;
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.sender = None;
        self.exited = true;
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.exited.then_some(ProcessExit { code: Some(255) }))
    }

    fn last_diagnostic(&self) -> Option<String> {
        self.diagnostic.clone()
    }
}

struct InstantProbe {
    code: i32,
}

impl ProbeProcess for InstantProbe {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(Some(ProcessExit {
            code: Some(self.code),
        }))
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn take_diagnostics(&mut self) -> String {
        if self.code == 0 {
            String::new()
        } else {
            "Connection refused".to_string()
        }
    }
}

/// Backend that queues numbered frames for every stream it starts.
#[derive(Default)]
struct FakeBackend {
    frames_per_stream: usize,
    /// Close the pipe after the queued frames, as a decoder that dies would.
    end_after_frames: bool,
    fail_for: Option<SourceId>,
    probe_exit_code: i32,
    requests: Mutex<Vec<StreamRequest>>,
    probe_spawns: AtomicUsize,
    terminations: Arc<AtomicUsize>,
}

impl FakeBackend {
    fn streaming(frames: usize) -> Self {
        Self {
            frames_per_stream: frames,
            ..Self::default()
        }
    }

    fn stream_spawns(&self) -> usize {
        self.requests.lock().len()
    }
}

impl DecoderBackend for FakeBackend {
    fn spawn_stream(&self, request: &StreamRequest) -> io::Result<Box<dyn DecoderProcess>> {
        if self.fail_for == Some(request.source_id) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        self.requests.lock().push(request.clone());

        let (tx, rx) = unbounded();
        for i in 0..self.frames_per_stream {
            let _ = tx.send(vec![i as u8; request.dimensions.frame_len()]);
        }
        let sender = if self.end_after_frames { None } else { Some(tx) };

        Ok(Box::new(FakeProcess {
            sender,
            pipe: Some(ChannelPipe {
                rx,
                pending: Vec::new(),
                pos: 0,
            }),
            exited: false,
            diagnostic: Some("Connection reset by peer".to_string()),
            terminations: Arc::clone(&self.terminations),
        }))
    }

    fn spawn_probe(&self, _request: &ProbeRequest) -> io::Result<Box<dyn ProbeProcess>> {
        self.probe_spawns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstantProbe {
            code: self.probe_exit_code,
        }))
    }
}

#[derive(Default)]
struct RecordingSurface {
    frames: Mutex<Vec<(SourceId, u8, FrameDimensions)>>,
    fps: Mutex<Vec<(SourceId, f64)>>,
    statuses: Mutex<Vec<StatusMessage>>,
}

impl RecordingSurface {
    fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    fn status_texts(&self) -> Vec<String> {
        self.statuses.lock().iter().map(|s| s.text.clone()).collect()
    }
}

impl DisplaySurface for RecordingSurface {
    fn render_frame(&self, source: SourceId, frame: &FrameBuffer) {
        self.frames
            .lock()
            .push((source, frame.as_bytes()[0], frame.dimensions()));
    }

    fn update_fps(&self, source: SourceId, fps: f64) {
        self.fps.lock().push((source, fps));
    }

    fn show_status(&self, status: &StatusMessage) {
        self.statuses.lock().push(status.clone());
    }
}

/// Surface that stops its own session from inside `render_frame`.
struct StopOnFrameSurface {
    session: OnceLock<Weak<StreamSession>>,
    stop_at: usize,
    frames: AtomicUsize,
    statuses: Mutex<Vec<StatusMessage>>,
}

impl StopOnFrameSurface {
    fn new(stop_at: usize) -> Self {
        Self {
            session: OnceLock::new(),
            stop_at,
            frames: AtomicUsize::new(0),
            statuses: Mutex::new(Vec::new()),
        }
    }
}

impl DisplaySurface for StopOnFrameSurface {
    fn render_frame(&self, _source: SourceId, _frame: &FrameBuffer) {
        let seen = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.stop_at {
            if let Some(session) = self.session.get().and_then(Weak::upgrade) {
                session.stop();
            }
        }
    }

    fn update_fps(&self, _source: SourceId, _fps: f64) {}

    fn show_status(&self, status: &StatusMessage) {
        self.statuses.lock().push(status.clone());
    }
}

struct ScriptedConsole(Option<&'static str>);

impl OperatorConsole for ScriptedConsole {
    fn request_address(&self, _source: SourceId, _current: &str) -> Option<String> {
        self.0.map(String::from)
    }
}

fn settings() -> CameraSettings {
    let mut settings = CameraSettings::default();
    settings.primary_dimensions = PRIMARY_DIMS;
    settings.secondary_dimensions = SIDE_DIMS;
    settings.stop_grace = Duration::from_millis(200);
    settings
}

fn session_with(
    mode: SessionMode,
    backend: FakeBackend,
) -> (StreamSession, Arc<FakeBackend>, Arc<RecordingSurface>) {
    let backend = Arc::new(backend);
    let surface = Arc::new(RecordingSurface::default());
    let session = StreamSession::new(mode, settings(), backend.clone(), surface.clone());
    (session, backend, surface)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn thirty_frames_arrive_in_order_then_stop_releases() {
    let (session, backend, surface) = session_with(SessionMode::Single, FakeBackend::streaming(30));
    session.set_address(SourceId::PRIMARY, "rtsp://10.0.0.2/live").unwrap();

    session.start().unwrap();
    assert!(session.is_running());
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.sources()[0].has_live_handle);

    assert!(wait_until(|| surface.frame_count() == 30));
    let order: Vec<u8> = surface.frames.lock().iter().map(|f| f.1).collect();
    assert_eq!(order, (0..30).collect::<Vec<u8>>());
    assert!(surface.frames.lock().iter().all(|f| f.2 == PRIMARY_DIMS));
    assert_eq!(surface.fps.lock().len(), 30);

    session.stop();
    let snapshot = &session.sources()[0];
    assert!(!session.is_running());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert!(!snapshot.has_live_handle);
    assert_eq!(snapshot.total_frames, 30);
    assert_eq!(backend.stream_spawns(), 1);
    assert_eq!(surface.status_texts().last().map(String::as_str), Some("Stream stopped"));
}

#[test]
fn stop_from_a_surface_callback_settles_idle() {
    let backend = Arc::new(FakeBackend::streaming(30));
    let surface = Arc::new(StopOnFrameSurface::new(3));
    let session = Arc::new(StreamSession::new(
        SessionMode::Single,
        settings(),
        backend.clone(),
        surface.clone(),
    ));
    let _ = surface.session.set(Arc::downgrade(&session));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();

    session.start().unwrap();
    assert!(wait_until(|| !session.is_running()));
    assert!(wait_until(|| session.state() == SessionState::Idle));
    assert_eq!(session.sources()[0].connection_state, ConnectionState::Idle);
    assert!(!session.sources()[0].has_live_handle);
    assert_eq!(backend.terminations.load(Ordering::SeqCst), 1);

    let stopped = |s: &StopOnFrameSurface| {
        s.statuses
            .lock()
            .iter()
            .filter(|m| m.text == "Stream stopped")
            .count()
    };
    assert_eq!(stopped(&surface), 1);

    // Reaps the finished worker without a second announcement.
    session.stop();
    assert_eq!(stopped(&surface), 1);

    session.start().unwrap();
    assert!(session.is_running());
    assert_eq!(session.state(), SessionState::Running);
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn stop_twice_equals_once() {
    let (session, backend, surface) = session_with(SessionMode::Single, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.start().unwrap();

    session.stop();
    session.stop();

    assert_eq!(backend.terminations.load(Ordering::SeqCst), 1);
    let stopped = surface
        .status_texts()
        .iter()
        .filter(|t| t.as_str() == "Stream stopped")
        .count();
    assert_eq!(stopped, 1);
}

#[test]
fn start_while_running_is_noop() {
    let (session, backend, _surface) = session_with(SessionMode::Single, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.start().unwrap();
    session.start().unwrap();
    assert_eq!(backend.stream_spawns(), 1);
    session.stop();
}

#[test]
fn missing_address_is_config_error_without_side_effects() {
    let (session, backend, _surface) =
        session_with(SessionMode::Synchronized, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();

    let err = session.start().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Config(ConfigError::MissingAddress {
            source_id: SourceId::SECONDARY
        })
    ));
    assert!(!session.is_running());
    assert_eq!(backend.stream_spawns(), 0);
    assert!(session.sources().iter().all(|s| !s.has_live_handle));
}

#[test]
fn secondary_failure_rolls_back_primary() {
    let backend = FakeBackend {
        fail_for: Some(SourceId::SECONDARY),
        ..FakeBackend::default()
    };
    let (session, backend, surface) = session_with(SessionMode::Synchronized, backend);
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.set_address(SourceId::SECONDARY, "rtsp://cam/2").unwrap();

    let err = session.start().unwrap_err();
    match err {
        SessionError::Start(StartError::PartialStart {
            started, failed, ..
        }) => {
            assert_eq!(started, vec![SourceId::PRIMARY]);
            assert_eq!(failed, SourceId::SECONDARY);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!session.is_running());
    assert_eq!(session.state(), SessionState::Idle);
    let primary = &session.sources()[0];
    assert!(!primary.has_live_handle);
    assert_eq!(primary.connection_state, ConnectionState::Idle);
    assert_eq!(backend.terminations.load(Ordering::SeqCst), 1);

    let last = surface.statuses.lock().last().cloned().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(last.text.contains("Camera 2"));
}

#[test]
fn stream_end_mid_run_stops_session_with_error() {
    let backend = FakeBackend {
        frames_per_stream: 5,
        end_after_frames: true,
        ..FakeBackend::default()
    };
    let (session, _backend, surface) = session_with(SessionMode::Single, backend);
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.start().unwrap();

    assert!(wait_until(|| !session.is_running()));
    assert!(wait_until(|| surface
        .statuses
        .lock()
        .last()
        .is_some_and(StatusMessage::is_error)));

    let snapshot = &session.sources()[0];
    assert_eq!(snapshot.connection_state, ConnectionState::Failed);
    assert!(!snapshot.has_live_handle);
    assert_eq!(surface.frame_count(), 5);

    let text = surface.status_texts().last().cloned().unwrap();
    assert!(text.contains("Camera 1"));
    assert!(text.contains("stream ended"));
    assert!(text.contains("Connection reset by peer"));

    // A failed source can be started again.
    session.stop();
    session.start().unwrap();
    assert!(session.is_running() || surface.frame_count() > 5);
    session.stop();
}

#[test]
fn synchronized_mode_alternates_sources() {
    let (session, _backend, surface) =
        session_with(SessionMode::Synchronized, FakeBackend::streaming(10));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.set_address(SourceId::SECONDARY, "rtsp://cam/2").unwrap();
    session.start().unwrap();

    assert!(wait_until(|| surface.frame_count() == 20));
    session.stop();

    let frames = surface.frames.lock();
    for (i, pair) in frames.chunks(2).enumerate() {
        assert_eq!(pair[0].0, SourceId::PRIMARY);
        assert_eq!(pair[1].0, SourceId::SECONDARY);
        assert_eq!(pair[0].1, i as u8);
        assert_eq!(pair[1].2, PRIMARY_DIMS);
    }
}

#[test]
fn tabbed_dual_view_adds_side_feed() {
    let (session, backend, _surface) = session_with(SessionMode::Tabbed, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.set_address(SourceId::SECONDARY, "rtsp://cam/2").unwrap();
    session.set_dual_view(true).unwrap();

    session.start().unwrap();
    {
        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].source_id, SourceId::PRIMARY);
        assert_eq!(requests[0].dimensions, PRIMARY_DIMS);
        assert_eq!(requests[1].source_id, SourceId::SECONDARY);
        assert_eq!(requests[1].dimensions, SIDE_DIMS);
    }
    session.stop();
}

#[test]
fn switching_tabs_restarts_the_run() {
    let (session, backend, _surface) = session_with(SessionMode::Tabbed, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.set_address(SourceId::SECONDARY, "rtsp://cam/2").unwrap();
    session.start().unwrap();

    session.switch_active(SourceId::SECONDARY).unwrap();
    assert!(session.is_running());
    assert_eq!(session.active(), SourceId::SECONDARY);

    let requests = backend.requests.lock().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].source_id, SourceId::SECONDARY);
    assert_eq!(requests[1].dimensions, PRIMARY_DIMS);

    let sources = session.sources();
    assert!(!sources[0].has_live_handle);
    assert!(sources[1].has_live_handle);
    session.stop();
}

#[test]
fn test_on_unconfigured_source_is_skipped() {
    let (session, backend, _surface) = session_with(SessionMode::Tabbed, FakeBackend::default());
    let result = session.test(SourceId::SECONDARY).unwrap();
    assert!(matches!(result.outcome, TestOutcome::Skipped(_)));
    assert_eq!(backend.probe_spawns.load(Ordering::SeqCst), 0);
}

#[test]
fn probe_leaves_live_stream_untouched() {
    let (session, backend, _surface) = session_with(SessionMode::Single, FakeBackend::streaming(0));
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
    session.start().unwrap();

    let result = session.test(SourceId::PRIMARY).unwrap();
    assert!(result.outcome.is_success());
    assert_eq!(backend.probe_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(backend.stream_spawns(), 1);

    let snapshot = &session.sources()[0];
    assert_eq!(snapshot.connection_state, ConnectionState::Streaming);
    assert!(snapshot.has_live_handle);
    session.stop();
}

#[test]
fn background_test_reports_status() {
    let backend = FakeBackend {
        probe_exit_code: 1,
        ..FakeBackend::default()
    };
    let (session, _backend, surface) = session_with(SessionMode::Single, backend);
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();

    let result = session.spawn_test(SourceId::PRIMARY).unwrap().join().unwrap();
    assert_eq!(result.outcome, TestOutcome::Failure("Connection refused".to_string()));
    assert_eq!(session.sources()[0].connection_state, ConnectionState::Idle);

    let last = surface.statuses.lock().last().cloned().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert_eq!(last.text, "Camera 1: error - Connection refused");
}

#[test]
fn test_all_joins_summaries() {
    let (session, _backend, _surface) =
        session_with(SessionMode::Synchronized, FakeBackend::default());
    session.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();

    let (results, status) = session.test_all();
    assert_eq!(results.len(), 2);
    assert_eq!(
        status.text,
        "Camera 1: connection successful | Camera 2: no address configured"
    );
    assert_eq!(status.severity, Severity::Info);
}

#[test]
fn console_input_replaces_address() {
    let (session, _backend, surface) = session_with(SessionMode::Single, FakeBackend::default());

    assert!(!session
        .change_address(SourceId::PRIMARY, &ScriptedConsole(None))
        .unwrap());
    assert!(!session
        .change_address(SourceId::PRIMARY, &ScriptedConsole(Some("   ")))
        .unwrap());
    assert!(session
        .change_address(SourceId::PRIMARY, &ScriptedConsole(Some(" rtsp://cam/9 ")))
        .unwrap());

    assert_eq!(session.sources()[0].address, "rtsp://cam/9");
    assert_eq!(
        surface.status_texts(),
        vec!["Camera 1 address updated".to_string()]
    );
}

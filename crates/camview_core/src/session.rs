//! Session coordination: one run control over one or two sources.
//!
//! A session owns its camera slots, starts the ones its mode requires,
//! and drives a single read loop thread that forwards frames and FPS
//! values to the [`DisplaySurface`]. At most one run is in flight.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use camview_core::session::StreamSession;
//!
//! let session = StreamSession::new(SessionMode::Single, settings, backend, surface);
//! session.set_address(SourceId::PRIMARY, "rtsp://192.168.1.10/live")?;
//! session.start()?;
//! // ... frames flow to the surface ...
//! session.stop();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::config::CameraSettings;
use crate::decoder::DecoderBackend;
use crate::errors::{ConfigError, ReadError, SessionError, SessionResult, StartError};
use crate::models::{
    CameraSource, ConnectionTestResult, FrameDimensions, SessionMode, SessionState, SourceId,
    TestOutcome,
};
use crate::source::{StreamHandle, StreamOptions, StreamSource};
use crate::surface::{normalize_address, DisplaySurface, OperatorConsole, StatusMessage};
use crate::tester::ConnectionTester;

/// Flag the read loop checks between frames.
#[derive(Clone, Default)]
struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop. The loop exits at its next frame boundary or as soon
    /// as its pipes close.
    fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// State shared between the command side and the read loop.
struct SessionCore {
    settings: CameraSettings,
    backend: Arc<dyn DecoderBackend>,
    surface: Arc<dyn DisplaySurface>,
    tester: ConnectionTester,
    sources: Vec<StreamSource>,
    stop: StopHandle,
    running: AtomicBool,
    state: Mutex<SessionState>,
    loop_thread: Mutex<Option<ThreadId>>,
}

/// Command-side state, serialized by one lock.
struct Control {
    worker: Option<JoinHandle<()>>,
    active: SourceId,
    dual_view: bool,
}

/// Coordinates the sources of one viewer.
pub struct StreamSession {
    mode: SessionMode,
    core: Arc<SessionCore>,
    control: Mutex<Control>,
}

impl StreamSession {
    pub fn new(
        mode: SessionMode,
        settings: CameraSettings,
        backend: Arc<dyn DecoderBackend>,
        surface: Arc<dyn DisplaySurface>,
    ) -> Self {
        let sources = SourceId::all()
            .into_iter()
            .take(mode.source_count())
            .map(|id| StreamSource::new(id, settings.fps_window))
            .collect();
        let tester = ConnectionTester::new(Arc::clone(&backend), &settings);

        Self {
            mode,
            core: Arc::new(SessionCore {
                settings,
                backend,
                surface,
                tester,
                sources,
                stop: StopHandle::default(),
                running: AtomicBool::new(false),
                state: Mutex::new(SessionState::Idle),
                loop_thread: Mutex::new(None),
            }),
            control: Mutex::new(Control {
                worker: None,
                active: SourceId::PRIMARY,
                dual_view: false,
            }),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.core.state.lock()
    }

    /// Source shown at full size in tabbed mode; always camera 1 otherwise.
    pub fn active(&self) -> SourceId {
        self.control.lock().active
    }

    pub fn dual_view(&self) -> bool {
        self.control.lock().dual_view
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.core.settings
    }

    /// Snapshots of every camera slot, in slot order.
    pub fn sources(&self) -> Vec<CameraSource> {
        self.core.sources.iter().map(StreamSource::snapshot).collect()
    }

    pub fn source(&self, id: SourceId) -> SessionResult<CameraSource> {
        Ok(self.core.source(id)?.snapshot())
    }

    /// Sources a start would run, with the frame size each gets.
    fn plan(&self, control: &Control) -> Vec<(SourceId, FrameDimensions)> {
        let settings = &self.core.settings;
        match self.mode {
            SessionMode::Single => vec![(SourceId::PRIMARY, settings.primary_dimensions)],
            SessionMode::Synchronized => SourceId::all()
                .into_iter()
                .map(|id| (id, settings.primary_dimensions))
                .collect(),
            SessionMode::Tabbed => {
                let mut plan = vec![(control.active, settings.primary_dimensions)];
                let other = control.active.other();
                let other_configured = self
                    .core
                    .source(other)
                    .map(|s| !s.address().is_empty())
                    .unwrap_or(false);
                if control.dual_view && other_configured {
                    plan.push((other, settings.secondary_dimensions));
                }
                plan
            }
        }
    }

    /// Start every required source and the read loop.
    ///
    /// No-op while running. Nothing stays allocated on error.
    pub fn start(&self) -> SessionResult<()> {
        let mut control = self.control.lock();
        if self.is_running() {
            tracing::debug!("[Session] start ignored, already running");
            return Ok(());
        }
        self.reap_worker(&mut control);

        let plan = self.plan(&control);
        for (id, dimensions) in &plan {
            let source = self.core.source(*id)?;
            if source.address().is_empty() {
                let err = ConfigError::MissingAddress { source_id: *id };
                tracing::warn!("[Session] {}", err);
                return Err(err.into());
            }
            if !dimensions.is_valid() {
                return Err(ConfigError::InvalidDimensions {
                    source_id: *id,
                    dimensions: *dimensions,
                }
                .into());
            }
        }

        self.core.set_state(SessionState::Starting);
        self.core.stop.reset();
        tracing::info!("[Session] starting {} mode with {} source(s)", self.mode, plan.len());

        let mut handles: Vec<StreamHandle> = Vec::with_capacity(plan.len());
        let mut started: Vec<SourceId> = Vec::with_capacity(plan.len());
        for (id, dimensions) in plan {
            let options = StreamOptions {
                dimensions,
                tuning: self.core.settings.tuning.clone(),
                stop_grace: self.core.settings.stop_grace,
            };
            match self.core.source(id)?.start(self.core.backend.as_ref(), &options) {
                Ok(handle) => {
                    handles.push(handle);
                    started.push(id);
                }
                Err(err) => {
                    let err = err.after_partial_start(started.clone());
                    self.abort_start(&started, &err);
                    return Err(err.into());
                }
            }
        }

        // Marked running before the loop exists so a loop that fails at
        // once still finds the flag set and clears it.
        self.core.running.store(true, Ordering::SeqCst);
        self.core.set_state(SessionState::Running);

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name("camview-read-loop".into())
            .spawn(move || core.read_loop(handles));

        match spawned {
            Ok(worker) => control.worker = Some(worker),
            Err(e) => {
                self.core.running.store(false, Ordering::SeqCst);
                let failed = started.last().copied().unwrap_or(SourceId::PRIMARY);
                let err = StartError::spawn_failed(failed, format!("read loop: {}", e));
                self.abort_start(&started, &err);
                return Err(err.into());
            }
        }

        self.core
            .surface
            .show_status(&StatusMessage::success("Stream started"));
        Ok(())
    }

    fn abort_start(&self, started: &[SourceId], err: &StartError) {
        tracing::error!("[Session] start failed: {}", err);
        for id in started {
            if let Ok(source) = self.core.source(*id) {
                source.stop();
            }
        }
        self.core.set_state(SessionState::Idle);
        self.core
            .surface
            .show_status(&StatusMessage::error(err.to_string()));
    }

    /// Join a read loop that already ended on its own.
    fn reap_worker(&self, control: &mut Control) {
        if let Some(worker) = control.worker.take() {
            if worker.join().is_err() {
                tracing::error!("[Session] read loop panicked");
            }
        }
    }

    /// Stop the run. Safe to call repeatedly and from any thread.
    pub fn stop(&self) {
        if self.core.is_loop_thread() {
            // Joining from here would wait on ourselves. The next start or
            // stop reaps the worker.
            let was_running = self.is_running();
            self.core.set_state(SessionState::Stopping);
            self.core.shutdown_sources();
            self.core.set_state(SessionState::Idle);
            if was_running {
                self.core.announce_stopped();
            }
            return;
        }

        let mut control = self.control.lock();
        let was_running = self.is_running();
        if !was_running && control.worker.is_none() {
            return;
        }

        self.core.set_state(SessionState::Stopping);
        self.core.shutdown_sources();
        self.reap_worker(&mut control);
        self.core.set_state(SessionState::Idle);

        if was_running {
            self.core.announce_stopped();
        }
    }

    /// Select the full-size camera in tabbed mode, restarting a live run.
    pub fn switch_active(&self, id: SourceId) -> SessionResult<()> {
        self.require_mode(SessionMode::Tabbed, "switch")?;
        self.core.source(id)?;

        {
            let mut control = self.control.lock();
            if control.active == id {
                return Ok(());
            }
            control.active = id;
        }
        tracing::info!("[Session] active camera is now {}", id);
        self.core
            .surface
            .show_status(&StatusMessage::info(format!("Active camera: {}", id)));

        if self.is_running() {
            self.stop();
            self.start()?;
        }
        Ok(())
    }

    /// Toggle the side feed in tabbed mode. Applies from the next start.
    pub fn set_dual_view(&self, enabled: bool) -> SessionResult<()> {
        self.require_mode(SessionMode::Tabbed, "dual view")?;
        self.control.lock().dual_view = enabled;
        tracing::debug!("[Session] dual view {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    fn require_mode(&self, mode: SessionMode, command: &str) -> SessionResult<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(SessionError::UnsupportedInMode {
                command: command.to_string(),
                mode: self.mode.to_string(),
            })
        }
    }

    /// Replace an address. Blank input leaves it unchanged and returns false.
    pub fn set_address(&self, id: SourceId, address: &str) -> SessionResult<bool> {
        let source = self.core.source(id)?;
        let Some(address) = normalize_address(Some(address.to_string())) else {
            return Ok(false);
        };

        source.set_address(&address);
        self.core
            .surface
            .show_status(&StatusMessage::info(format!("{} address updated", id)));
        Ok(true)
    }

    /// Ask the operator for a new address and apply it.
    pub fn change_address(&self, id: SourceId, console: &dyn OperatorConsole) -> SessionResult<bool> {
        let current = self.core.source(id)?.address();
        match normalize_address(console.request_address(id, &current)) {
            Some(address) => self.set_address(id, &address),
            None => Ok(false),
        }
    }

    /// Probe one source, blocking until the probe finishes.
    pub fn test(&self, id: SourceId) -> SessionResult<ConnectionTestResult> {
        self.core.run_test(id)
    }

    /// Probe one source on a background thread; the result is also sent
    /// to the surface as a status message.
    pub fn spawn_test(&self, id: SourceId) -> SessionResult<JoinHandle<ConnectionTestResult>> {
        self.core.source(id)?;
        let core = Arc::clone(&self.core);
        thread::Builder::new()
            .name(format!("camview-test-{}", id.display_number()))
            .spawn(move || {
                let result = core
                    .run_test(id)
                    .unwrap_or_else(|e| ConnectionTestResult::skipped(id, e.to_string()));
                core.surface.show_status(&status_for(&[result.clone()]));
                result
            })
            .map_err(|e| StartError::spawn_failed(id, format!("test thread: {}", e)).into())
    }

    /// Probe every slot in parallel and report the joined summaries.
    pub fn test_all(&self) -> (Vec<ConnectionTestResult>, StatusMessage) {
        let core = &self.core;
        let results: Vec<ConnectionTestResult> = thread::scope(|scope| {
            let probes: Vec<_> = core
                .sources
                .iter()
                .map(|source| {
                    let id = source.id();
                    (id, scope.spawn(move || core.run_test(id)))
                })
                .collect();
            probes
                .into_iter()
                .map(|(id, probe)| match probe.join() {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => ConnectionTestResult::skipped(id, e.to_string()),
                    Err(_) => ConnectionTestResult::failure(
                        id,
                        "probe thread panicked",
                        "",
                        core.settings.diagnostic_max_chars,
                    ),
                })
                .collect()
        });

        let status = status_for(&results);
        core.surface.show_status(&status);
        (results, status)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Summaries joined with " | ", as an error if any probe failed.
fn status_for(results: &[ConnectionTestResult]) -> StatusMessage {
    let text = results
        .iter()
        .map(ConnectionTestResult::summary)
        .collect::<Vec<_>>()
        .join(" | ");

    if results.iter().any(|r| matches!(r.outcome, TestOutcome::Failure(_))) {
        StatusMessage::error(text)
    } else if results.iter().all(|r| r.outcome.is_success()) {
        StatusMessage::success(text)
    } else {
        StatusMessage::info(text)
    }
}

impl SessionCore {
    fn source(&self, id: SourceId) -> SessionResult<&StreamSource> {
        self.sources
            .get(id.index())
            .ok_or(SessionError::UnknownSource(id))
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!("[Session] {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn is_loop_thread(&self) -> bool {
        *self.loop_thread.lock() == Some(thread::current().id())
    }

    /// Raise the stop flag, release every source, then clear `running`.
    fn shutdown_sources(&self) {
        self.stop.request();
        for source in &self.sources {
            source.stop();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn announce_stopped(&self) {
        tracing::info!("[Session] stopped");
        self.surface.show_status(&StatusMessage::info("Stream stopped"));
    }

    fn run_test(&self, id: SourceId) -> SessionResult<ConnectionTestResult> {
        let source = self.source(id)?;
        let address = source.address();
        let marked = !address.is_empty() && source.begin_testing();
        let result = self.tester.test(id, &address);
        if marked {
            source.end_testing();
        }
        Ok(result)
    }

    /// Pull one frame per source per iteration until stopped or a read fails.
    fn read_loop(self: Arc<Self>, mut handles: Vec<StreamHandle>) {
        *self.loop_thread.lock() = Some(thread::current().id());
        let pacing = if handles.len() > 1 { self.settings.pacing } else { None };
        tracing::debug!("[Session] read loop running over {} source(s)", handles.len());

        let outcome = 'frames: loop {
            for handle in handles.iter_mut() {
                if self.stop.is_requested() {
                    break 'frames None;
                }
                let id = handle.source_id();
                let Ok(source) = self.source(id) else {
                    break 'frames None;
                };
                match source.read_frame(handle) {
                    Ok(frame) => {
                        self.surface.render_frame(id, &frame);
                        self.surface.update_fps(id, source.current_fps());
                    }
                    Err(err) => break 'frames Some((id, err)),
                }
            }
            if let Some(delay) = pacing {
                thread::sleep(delay);
            }
        };

        match outcome {
            Some((id, err)) if !self.stop.is_requested() => self.fail_from_loop(id, err),
            _ => tracing::debug!("[Session] read loop exiting on stop request"),
        }
        *self.loop_thread.lock() = None;
    }

    /// End the whole session after `id` stopped delivering frames.
    fn fail_from_loop(&self, id: SourceId, err: ReadError) {
        let diagnostic = self.source(id).ok().and_then(StreamSource::last_diagnostic);
        tracing::error!(
            "[Session] {} read failed: {} (decoder: {})",
            id,
            err,
            diagnostic.as_deref().unwrap_or("no diagnostics")
        );

        self.set_state(SessionState::Stopping);
        self.stop.request();
        for source in &self.sources {
            if source.id() == id {
                source.fail();
            } else {
                source.stop();
            }
        }
        self.running.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Idle);

        let text = match diagnostic {
            Some(line) => format!("{}: {} ({})", id, err, line),
            None => format!("{}: {}", id, err),
        };
        self.surface.show_status(&StatusMessage::error(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecoderProcess, ProbeProcess, ProbeRequest, StreamRequest};
    use crate::surface::NullSurface;
    use std::io;

    struct NoBackend;

    impl DecoderBackend for NoBackend {
        fn spawn_stream(&self, _request: &StreamRequest) -> io::Result<Box<dyn DecoderProcess>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no decoder"))
        }

        fn spawn_probe(&self, _request: &ProbeRequest) -> io::Result<Box<dyn ProbeProcess>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no decoder"))
        }
    }

    fn session(mode: SessionMode) -> StreamSession {
        StreamSession::new(
            mode,
            CameraSettings::default(),
            Arc::new(NoBackend),
            Arc::new(NullSurface),
        )
    }

    #[test]
    fn mode_fixes_slot_count() {
        assert_eq!(session(SessionMode::Single).sources().len(), 1);
        assert_eq!(session(SessionMode::Tabbed).sources().len(), 2);
        assert_eq!(session(SessionMode::Synchronized).sources().len(), 2);
    }

    #[test]
    fn single_mode_has_no_second_camera() {
        let s = session(SessionMode::Single);
        assert!(matches!(
            s.set_address(SourceId::SECONDARY, "rtsp://cam/2"),
            Err(SessionError::UnknownSource(_))
        ));
        assert!(matches!(
            s.switch_active(SourceId::SECONDARY),
            Err(SessionError::UnsupportedInMode { .. })
        ));
    }

    #[test]
    fn tabbed_plan_follows_active_and_dual_view() {
        let s = session(SessionMode::Tabbed);
        s.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
        s.set_address(SourceId::SECONDARY, "rtsp://cam/2").unwrap();

        let plan = s.plan(&s.control.lock());
        assert_eq!(plan, vec![(SourceId::PRIMARY, FrameDimensions::PRIMARY)]);

        s.set_dual_view(true).unwrap();
        s.switch_active(SourceId::SECONDARY).unwrap();
        let plan = s.plan(&s.control.lock());
        assert_eq!(
            plan,
            vec![
                (SourceId::SECONDARY, FrameDimensions::PRIMARY),
                (SourceId::PRIMARY, FrameDimensions::SECONDARY),
            ]
        );
    }

    #[test]
    fn dual_view_skips_unconfigured_side_feed() {
        let s = session(SessionMode::Tabbed);
        s.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
        s.set_dual_view(true).unwrap();
        let plan = s.plan(&s.control.lock());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn spawn_failure_leaves_session_idle() {
        let s = session(SessionMode::Single);
        s.set_address(SourceId::PRIMARY, "rtsp://cam/1").unwrap();
        let err = s.start().unwrap_err();
        assert!(matches!(err, SessionError::Start(StartError::SpawnFailed { .. })));
        assert!(!s.is_running());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.sources()[0].has_live_handle);
    }

    #[test]
    fn blank_address_is_no_change() {
        let s = session(SessionMode::Single);
        assert!(!s.set_address(SourceId::PRIMARY, "   ").unwrap());
        assert!(s.set_address(SourceId::PRIMARY, " rtsp://cam/1 ").unwrap());
        assert_eq!(s.sources()[0].address, "rtsp://cam/1");
    }

    #[test]
    fn stop_on_idle_session_is_noop() {
        let s = session(SessionMode::Synchronized);
        s.stop();
        s.stop();
        assert_eq!(s.state(), SessionState::Idle);
    }
}

//! ffmpeg subprocess backend.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use super::args::DecoderArgs;
use super::{DecoderBackend, DecoderProcess, ProbeProcess, ProbeRequest, ProcessExit, StreamRequest};
use crate::logging::DiagnosticTail;

/// Upper bound on probe diagnostics kept in memory.
const PROBE_DIAGNOSTIC_LIMIT: u64 = 64 * 1024;

/// Spawns `ffmpeg` (or a compatible program) as the decoding process.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    program: PathBuf,
}

impl FfmpegBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check if the decoder program can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl DecoderBackend for FfmpegBackend {
    fn spawn_stream(&self, request: &StreamRequest) -> io::Result<Box<dyn DecoderProcess>> {
        let args = DecoderArgs::stream(&request.address, request.dimensions, &request.tuning);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("[Decoder] Running: {:?}", cmd);
        let label = request.source_id.display_name();
        FfmpegStream::spawn(cmd, &label).map(|p| Box::new(p) as Box<dyn DecoderProcess>)
    }

    fn spawn_probe(&self, request: &ProbeRequest) -> io::Result<Box<dyn ProbeProcess>> {
        let args = DecoderArgs::probe(&request.address, &request.tuning, request.probe_duration);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!("[Decoder] Running probe: {:?}", cmd);
        FfmpegProbe::spawn(cmd).map(|p| Box::new(p) as Box<dyn ProbeProcess>)
    }
}

/// Streaming decoder backed by a child process.
///
/// stderr is drained on a helper thread into a [`DiagnosticTail`] so the
/// child never stalls on a full diagnostic pipe.
pub struct FfmpegStream {
    child: Child,
    stdout: Option<ChildStdout>,
    tail: DiagnosticTail,
    stderr_thread: Option<JoinHandle<()>>,
    exited: bool,
}

impl FfmpegStream {
    /// Spawn `cmd`, which must have piped stdout and stderr.
    pub fn spawn(mut cmd: Command, label: &str) -> io::Result<Self> {
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();
        let tail = DiagnosticTail::default();

        let stderr_thread = match child.stderr.take() {
            Some(stderr) => {
                let tail = tail.clone();
                let label = label.to_string();
                let handle = thread::Builder::new()
                    .name(format!("{}-stderr", label.replace(' ', "-").to_lowercase()))
                    .spawn(move || tail.drain_from(stderr, &label));
                match handle {
                    Ok(h) => Some(h),
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        tracing::debug!("[Decoder] {} spawned pid {}", label, child.id());
        Ok(Self {
            child,
            stdout,
            tail,
            stderr_thread,
            exited: false,
        })
    }

    /// Wait for a killed child so it does not linger as a zombie.
    fn reap(&mut self) {
        if let Err(e) = self.child.wait() {
            tracing::warn!("[Decoder] wait for pid {} failed: {}", self.child.id(), e);
        }
        self.exited = true;
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

impl DecoderProcess for FfmpegStream {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn close_pipes(&mut self) {
        drop(self.child.stdin.take());
        drop(self.stdout.take());
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.exited {
            return Ok(());
        }
        request_termination(&mut self.child)
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exited {
            return Ok(());
        }
        self.child.kill()?;
        self.reap();
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.exited = true;
            if let Some(handle) = self.stderr_thread.take() {
                let _ = handle.join();
            }
        }
        Ok(status.map(ProcessExit::from))
    }

    fn last_diagnostic(&self) -> Option<String> {
        self.tail.last()
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.exited {
            let _ = self.child.kill();
            self.reap();
        }
    }
}

/// Probe decoder backed by a child process.
pub struct FfmpegProbe {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
    exited: bool,
}

impl FfmpegProbe {
    /// Spawn `cmd`, which must have piped stderr.
    pub fn spawn(mut cmd: Command) -> io::Result<Self> {
        let mut child = cmd.spawn()?;
        let stderr_thread = match child.stderr.take() {
            Some(stderr) => {
                let handle = thread::Builder::new()
                    .name("probe-stderr".into())
                    .spawn(move || collect_diagnostics(stderr));
                match handle {
                    Ok(h) => Some(h),
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            child,
            stderr_thread,
            exited: false,
        })
    }
}

impl ProbeProcess for FfmpegProbe {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.exited = true;
        }
        Ok(status.map(ProcessExit::from))
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exited {
            return Ok(());
        }
        self.child.kill()?;
        let _ = self.child.wait();
        self.exited = true;
        Ok(())
    }

    fn take_diagnostics(&mut self) -> String {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegProbe {
    fn drop(&mut self) {
        if !self.exited {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Keep the head of a diagnostic stream and discard the rest.
fn collect_diagnostics<R: Read>(reader: R) -> String {
    let mut head = Vec::new();
    let mut reader = reader;
    let _ = (&mut reader).take(PROBE_DIAGNOSTIC_LIMIT).read_to_end(&mut head);
    let _ = io::copy(&mut reader, &mut io::sink());
    String::from_utf8_lossy(&head).into_owned()
}

/// Ask a child to exit: SIGTERM on Unix, a hard kill elsewhere.
#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to
    // a child we have not yet reaped.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.kill()
}

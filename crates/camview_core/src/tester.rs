//! Bounded connectivity probes.
//!
//! A probe runs the decoder against an address with a null output sink for
//! a short, fixed duration and classifies how it ended. Probes always use a
//! process of their own and never touch a running stream.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CameraSettings;
use crate::decoder::{DecoderBackend, DecoderTuning, ProbeProcess, ProbeRequest, ProcessExit, POLL_INTERVAL};
use crate::errors::TestError;
use crate::models::{ConnectionTestResult, SourceId};

/// Reason reported for a slot without an address.
pub const NO_ADDRESS_REASON: &str = "no address configured";

/// Runs probes through a [`DecoderBackend`].
#[derive(Clone)]
pub struct ConnectionTester {
    backend: Arc<dyn DecoderBackend>,
    tuning: DecoderTuning,
    probe_duration: Duration,
    grace: Duration,
    max_chars: usize,
}

impl ConnectionTester {
    pub fn new(backend: Arc<dyn DecoderBackend>, settings: &CameraSettings) -> Self {
        Self {
            backend,
            tuning: settings.tuning.clone(),
            probe_duration: settings.probe_duration,
            grace: settings.stop_grace,
            max_chars: settings.diagnostic_max_chars,
        }
    }

    /// Longest a single probe may run before it is killed.
    pub fn deadline(&self) -> Duration {
        self.tuning.connect_timeout + self.probe_duration + self.grace
    }

    /// Probe `address` and classify the result. Blocks for up to
    /// [`ConnectionTester::deadline`].
    pub fn test(&self, source_id: SourceId, address: &str) -> ConnectionTestResult {
        let address = address.trim();
        if address.is_empty() {
            tracing::debug!("[Probe] {} skipped: {}", source_id, NO_ADDRESS_REASON);
            return ConnectionTestResult::skipped(source_id, NO_ADDRESS_REASON);
        }

        let request = ProbeRequest {
            source_id,
            address: address.to_string(),
            tuning: self.tuning.clone(),
            probe_duration: self.probe_duration,
        };

        tracing::info!("[Probe] {} testing {}", source_id, address);
        let started = Instant::now();

        let result = match self.run(&request) {
            Ok((exit, _)) if exit.success() => ConnectionTestResult::success(source_id),
            Ok((exit, diagnostics)) => {
                let message = first_meaningful_line(&diagnostics).unwrap_or_else(|| match exit.code {
                    Some(code) => format!("decoder exited with code {}", code),
                    None => "decoder was terminated by a signal".to_string(),
                });
                ConnectionTestResult::failure(source_id, &message, &diagnostics, self.max_chars)
            }
            Err((err, diagnostics)) => {
                ConnectionTestResult::failure(source_id, &err.to_string(), &diagnostics, self.max_chars)
            }
        };

        tracing::info!(
            "[Probe] {} finished in {:.2}s: {}",
            source_id,
            started.elapsed().as_secs_f64(),
            result.summary()
        );
        result
    }

    /// Spawn the probe and wait for it, killing it at the deadline.
    fn run(&self, request: &ProbeRequest) -> Result<(ProcessExit, String), (TestError, String)> {
        let mut probe = self
            .backend
            .spawn_probe(request)
            .map_err(|e| (TestError::Spawn(e.to_string()), String::new()))?;

        let deadline = Instant::now() + self.deadline();
        loop {
            match probe.try_wait() {
                Ok(Some(exit)) => return Ok((exit, probe.take_diagnostics())),
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => {
                    tracing::warn!(
                        "[Probe] {} still running after {:.1}s, killing",
                        request.source_id,
                        self.deadline().as_secs_f64()
                    );
                    let diagnostics = Self::kill_and_collect(probe.as_mut());
                    let err = TestError::TimedOut {
                        secs: self.deadline().as_secs_f64(),
                    };
                    return Err((err, diagnostics));
                }
                Err(e) => {
                    let diagnostics = Self::kill_and_collect(probe.as_mut());
                    return Err((TestError::Communication(e.to_string()), diagnostics));
                }
            }
        }
    }

    fn kill_and_collect(probe: &mut dyn ProbeProcess) -> String {
        if let Err(e) = probe.kill() {
            tracing::warn!("[Probe] kill failed: {}", e);
        }
        probe.take_diagnostics()
    }
}

fn first_meaningful_line(diagnostics: &str) -> Option<String> {
    diagnostics
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

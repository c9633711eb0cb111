//! Settings struct with TOML-based sections.
//!
//! Each section maps to one TOML table and can be rewritten on its own.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decoder::{DecoderTuning, DEFAULT_STOP_GRACE};
use crate::logging::LogLevel;
use crate::models::{FrameDimensions, SessionMode, SourceId, DEFAULT_FPS_WINDOW};
use crate::surface::DEFAULT_STATUS_MAX_CHARS;

/// Longest accepted connect timeout or probe duration, in seconds.
const MAX_DURATION_SECS: f64 = 3600.0;

/// Seconds as a `Duration`. Non-finite, negative or oversized values give `None`.
fn duration_from_secs(secs: f64) -> Option<Duration> {
    if !(0.0..=MAX_DURATION_SECS).contains(&secs) {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Camera addresses and the default session mode.
    #[serde(default)]
    pub cameras: CameraSection,

    /// Frame sizes, decoder tuning and read loop timing.
    #[serde(default)]
    pub stream: StreamSection,

    /// Connection probe settings.
    #[serde(default)]
    pub probe: ProbeSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Decoder program.
    #[serde(default)]
    pub decoder: DecoderSection,
}

impl Settings {
    /// Runtime settings for sessions and probes.
    pub fn camera_settings(&self) -> CameraSettings {
        let stream = &self.stream;
        CameraSettings {
            primary_dimensions: FrameDimensions::new(stream.primary_width, stream.primary_height),
            secondary_dimensions: FrameDimensions::new(
                stream.secondary_width,
                stream.secondary_height,
            ),
            tuning: DecoderTuning {
                connect_timeout: duration_from_secs(stream.connect_timeout_secs)
                    .unwrap_or_else(|| Duration::from_secs_f64(default_connect_timeout_secs())),
                low_latency: stream.low_latency,
                frame_rate: (stream.frame_rate > 0).then_some(stream.frame_rate),
                threads: (stream.threads > 0).then_some(stream.threads),
            },
            fps_window: Duration::from_millis(stream.fps_window_ms.max(1)),
            pacing: (stream.pacing_ms > 0).then(|| Duration::from_millis(stream.pacing_ms)),
            stop_grace: Duration::from_millis(stream.stop_grace_ms),
            probe_duration: duration_from_secs(self.probe.probe_duration_secs)
                .unwrap_or_else(|| Duration::from_secs_f64(default_probe_duration_secs())),
            diagnostic_max_chars: self.probe.diagnostic_max_chars,
        }
    }

    /// Reset durations outside `0..=MAX_DURATION_SECS` (including `inf` and
    /// `nan`) to their defaults. Returns true when anything was reset.
    pub fn repair(&mut self) -> bool {
        let mut repaired = false;

        if duration_from_secs(self.stream.connect_timeout_secs).is_none() {
            tracing::warn!(
                "[Config] stream.connect_timeout_secs = {} is out of range, using {}",
                self.stream.connect_timeout_secs,
                default_connect_timeout_secs()
            );
            self.stream.connect_timeout_secs = default_connect_timeout_secs();
            repaired = true;
        }

        if duration_from_secs(self.probe.probe_duration_secs).is_none() {
            tracing::warn!(
                "[Config] probe.probe_duration_secs = {} is out of range, using {}",
                self.probe.probe_duration_secs,
                default_probe_duration_secs()
            );
            self.probe.probe_duration_secs = default_probe_duration_secs();
            repaired = true;
        }

        repaired
    }

    /// Configured address for a camera slot.
    pub fn address(&self, source: SourceId) -> &str {
        if source == SourceId::PRIMARY {
            &self.cameras.primary_address
        } else {
            &self.cameras.secondary_address
        }
    }

    /// Store a trimmed address for a camera slot.
    pub fn set_address(&mut self, source: SourceId, address: &str) {
        let address = address.trim().to_string();
        if source == SourceId::PRIMARY {
            self.cameras.primary_address = address;
        } else {
            self.cameras.secondary_address = address;
        }
    }
}

/// Camera addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraSection {
    /// RTSP address of camera 1.
    #[serde(default)]
    pub primary_address: String,

    /// RTSP address of camera 2.
    #[serde(default)]
    pub secondary_address: String,

    /// Session mode used when none is given on the command line.
    #[serde(default)]
    pub mode: SessionMode,
}

/// Frame sizes and decoder tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_primary_width")]
    pub primary_width: u32,

    #[serde(default = "default_primary_height")]
    pub primary_height: u32,

    /// Size of the side feed in tabbed dual view.
    #[serde(default = "default_secondary_width")]
    pub secondary_width: u32,

    #[serde(default = "default_secondary_height")]
    pub secondary_height: u32,

    /// RTSP socket timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: f64,

    /// Disable input buffering and request low-delay decoding.
    #[serde(default)]
    pub low_latency: bool,

    /// Output frame rate, 0 keeps the camera's rate.
    #[serde(default)]
    pub frame_rate: u32,

    /// Decoder threads, 0 lets the decoder decide.
    #[serde(default)]
    pub threads: u32,

    /// FPS measurement window.
    #[serde(default = "default_fps_window_ms")]
    pub fps_window_ms: u64,

    /// Delay between read loop iterations with two cameras, 0 disables it.
    #[serde(default)]
    pub pacing_ms: u64,

    /// Time a stopping decoder gets before it is killed.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_primary_width() -> u32 {
    FrameDimensions::PRIMARY.width
}

fn default_primary_height() -> u32 {
    FrameDimensions::PRIMARY.height
}

fn default_secondary_width() -> u32 {
    FrameDimensions::SECONDARY.width
}

fn default_secondary_height() -> u32 {
    FrameDimensions::SECONDARY.height
}

fn default_connect_timeout_secs() -> f64 {
    5.0
}

fn default_fps_window_ms() -> u64 {
    DEFAULT_FPS_WINDOW.as_millis() as u64
}

fn default_stop_grace_ms() -> u64 {
    DEFAULT_STOP_GRACE.as_millis() as u64
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            primary_width: default_primary_width(),
            primary_height: default_primary_height(),
            secondary_width: default_secondary_width(),
            secondary_height: default_secondary_height(),
            connect_timeout_secs: default_connect_timeout_secs(),
            low_latency: false,
            frame_rate: 0,
            threads: 0,
            fps_window_ms: default_fps_window_ms(),
            pacing_ms: 0,
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

/// Connection probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSection {
    /// How long the probe decodes before exiting on its own.
    #[serde(default = "default_probe_duration_secs")]
    pub probe_duration_secs: f64,

    /// Longest diagnostic text shown in a result.
    #[serde(default = "default_diagnostic_max_chars")]
    pub diagnostic_max_chars: usize,
}

fn default_probe_duration_secs() -> f64 {
    2.0
}

fn default_diagnostic_max_chars() -> usize {
    DEFAULT_STATUS_MAX_CHARS
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            probe_duration_secs: default_probe_duration_secs(),
            diagnostic_max_chars: default_diagnostic_max_chars(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is unset.
    #[serde(default)]
    pub level: LogLevel,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Also write a daily rolling log file.
    #[serde(default = "default_true")]
    pub file_logging: bool,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            logs_folder: default_logs_folder(),
            file_logging: true,
        }
    }
}

/// Decoder program settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderSection {
    /// Program name or path of the ffmpeg binary.
    #[serde(default = "default_program")]
    pub program: String,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

impl Default for DecoderSection {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

impl DecoderSection {
    pub fn program_path(&self) -> PathBuf {
        PathBuf::from(&self.program)
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Cameras,
    Stream,
    Probe,
    Logging,
    Decoder,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Cameras,
        ConfigSection::Stream,
        ConfigSection::Probe,
        ConfigSection::Logging,
        ConfigSection::Decoder,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Cameras => "cameras",
            ConfigSection::Stream => "stream",
            ConfigSection::Probe => "probe",
            ConfigSection::Logging => "logging",
            ConfigSection::Decoder => "decoder",
        }
    }

    /// Comment written above the table in a generated file.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Cameras => "# Camera addresses and default session mode",
            ConfigSection::Stream => "# Frame sizes, decoder tuning and read loop timing",
            ConfigSection::Probe => "# Connection test settings",
            ConfigSection::Logging => "# Logging configuration",
            ConfigSection::Decoder => "# External decoder",
        }
    }
}

/// Runtime view of the settings used by sessions and probes.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    /// Frame size for full-size feeds.
    pub primary_dimensions: FrameDimensions,
    /// Frame size for the tabbed side feed.
    pub secondary_dimensions: FrameDimensions,
    pub tuning: DecoderTuning,
    pub fps_window: Duration,
    /// Sleep between read loop iterations when two cameras run.
    pub pacing: Option<Duration>,
    pub stop_grace: Duration,
    pub probe_duration: Duration,
    pub diagnostic_max_chars: usize,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Settings::default().camera_settings()
    }
}

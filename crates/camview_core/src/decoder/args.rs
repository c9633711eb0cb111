//! Argument vectors for the ffmpeg decoding process.

use std::time::Duration;

use crate::models::FrameDimensions;

/// Default connection timeout handed to the decoder.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport and decode tuning shared by stream and probe invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderTuning {
    /// Socket timeout for the RTSP connection.
    pub connect_timeout: Duration,
    /// Minimal buffering and low-delay decoding.
    pub low_latency: bool,
    /// Explicit output frame rate.
    pub frame_rate: Option<u32>,
    /// Explicit decode thread count.
    pub threads: Option<u32>,
}

impl Default for DecoderTuning {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            low_latency: false,
            frame_rate: None,
            threads: None,
        }
    }
}

impl DecoderTuning {
    /// The profile the stability-oriented viewer used: no buffering,
    /// low-delay flags, 25 fps output and two decode threads.
    pub fn stable() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            low_latency: true,
            frame_rate: Some(25),
            threads: Some(2),
        }
    }

    /// Timeout in microseconds, the unit ffmpeg's `-timeout` expects.
    pub fn timeout_micros(&self) -> u128 {
        self.connect_timeout.as_micros()
    }
}

/// Builds ffmpeg argument lists.
pub struct DecoderArgs;

impl DecoderArgs {
    /// Input options plus `-i address`, common to both modes.
    fn input(address: &str, tuning: &DecoderTuning) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            "error".into(),
            "-rtsp_transport".into(),
            "tcp".into(),
            "-timeout".into(),
            tuning.timeout_micros().to_string(),
        ];

        if tuning.low_latency {
            args.extend(["-fflags", "nobuffer", "-flags", "low_delay"].map(String::from));
        }

        args.push("-i".into());
        args.push(address.to_string());
        args
    }

    /// Stream mode: raw rgb24 frames of `dimensions` on stdout.
    pub fn stream(address: &str, dimensions: FrameDimensions, tuning: &DecoderTuning) -> Vec<String> {
        let mut args = Self::input(address, tuning);
        args.extend(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"].map(String::from));
        args.push(dimensions.size_arg());

        if let Some(fps) = tuning.frame_rate {
            args.push("-r".into());
            args.push(fps.to_string());
        }
        if let Some(threads) = tuning.threads {
            args.push("-threads".into());
            args.push(threads.to_string());
        }

        args.push("pipe:1".into());
        args
    }

    /// Probe mode: decode for `probe_duration` into the null muxer.
    pub fn probe(address: &str, tuning: &DecoderTuning, probe_duration: Duration) -> Vec<String> {
        let mut args = Self::input(address, tuning);
        args.push("-t".into());
        args.push(format!("{:.3}", probe_duration.as_secs_f64()));
        args.extend(["-f", "null", "-"].map(String::from));
        args
    }
}

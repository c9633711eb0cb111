//! Terminal implementations of the display and console interfaces.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use image::RgbImage;
use parking_lot::Mutex;

use camview_core::models::{FrameBuffer, Severity, SourceId, MAX_SOURCES};
use camview_core::surface::{fps_label, DisplaySurface, OperatorConsole, StatusMessage};

/// How often an FPS line is printed per camera.
const FPS_PRINT_INTERVAL: Duration = Duration::from_secs(2);

/// Prints status lines and periodic FPS labels instead of drawing frames.
pub struct TerminalSurface {
    last_fps_print: Mutex<[Option<Instant>; MAX_SOURCES]>,
    last_frame: Mutex<[Option<RgbImage>; MAX_SOURCES]>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            last_fps_print: Mutex::new([None; MAX_SOURCES]),
            last_frame: Mutex::new(Default::default()),
        }
    }

    /// Size of the last frame drawn for `source`.
    pub fn last_frame_size(&self, source: SourceId) -> Option<(u32, u32)> {
        self.last_frame.lock()[source.index()]
            .as_ref()
            .map(RgbImage::dimensions)
    }

    /// Average color of the last frame drawn for `source`.
    pub fn last_frame_mean(&self, source: SourceId) -> Option<[u8; 3]> {
        let frames = self.last_frame.lock();
        let image = frames[source.index()].as_ref()?;
        let count = u64::from(image.width()) * u64::from(image.height());
        if count == 0 {
            return None;
        }

        let mut sums = [0u64; 3];
        for pixel in image.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += u64::from(channel);
            }
        }
        Some(sums.map(|sum| (sum / count) as u8))
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

impl DisplaySurface for TerminalSurface {
    fn render_frame(&self, source: SourceId, frame: &FrameBuffer) {
        match frame.to_rgb_image() {
            Some(image) => self.last_frame.lock()[source.index()] = Some(image),
            None => tracing::warn!("{}: frame does not match its dimensions", source),
        }
    }

    fn update_fps(&self, source: SourceId, fps: f64) {
        let now = Instant::now();
        {
            let mut printed = self.last_fps_print.lock();
            let slot = &mut printed[source.index()];
            if slot.is_some_and(|t| now.duration_since(t) < FPS_PRINT_INTERVAL) {
                return;
            }
            *slot = Some(now);
        }
        println!("{} {}", timestamp(), fps_label(&source.display_name(), fps));
    }

    fn show_status(&self, status: &StatusMessage) {
        match status.severity {
            Severity::Error => eprintln!("{} {}", timestamp(), status),
            Severity::Info | Severity::Success => println!("{} {}", timestamp(), status),
        }
    }
}

/// Reads operator input line by line on a background thread.
pub struct LineReader {
    lines: Receiver<String>,
}

impl LineReader {
    pub fn spawn_stdin() -> io::Result<Self> {
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("stdin read failed: {}", e);
                            break;
                        }
                    }
                }
            })?;
        Ok(Self { lines: rx })
    }

    #[cfg(test)]
    pub fn from_receiver(lines: Receiver<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &Receiver<String> {
        &self.lines
    }
}

impl OperatorConsole for LineReader {
    fn request_address(&self, source: SourceId, current: &str) -> Option<String> {
        if current.is_empty() {
            print!("{} address: ", source);
        } else {
            print!("{} address [{}]: ", source, current);
        }
        let _ = io::stdout().flush();
        self.lines.recv().ok()
    }
}

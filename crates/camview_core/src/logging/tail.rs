//! Bounded buffer of recent decoder diagnostic lines.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of lines kept per decoder.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Keeps the last `capacity` lines written by a decoder's stderr.
///
/// Cloning shares the same buffer, so the drain thread and the owning
/// process handle see the same lines.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, dropping the oldest when full. Blank lines are ignored.
    pub fn push(&self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let mut lines = self.lines.lock();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Most recent line, if any.
    pub fn last(&self) -> Option<String> {
        self.lines.lock().back().cloned()
    }

    /// All buffered lines, oldest first, joined with newlines.
    pub fn joined(&self) -> String {
        self.lines
            .lock()
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Read `reader` line by line into the tail until EOF or an error.
    ///
    /// Lines are also forwarded to `tracing` at debug level under `label`.
    pub fn drain_from<R: Read>(&self, reader: R, label: &str) {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    tracing::debug!("[Decoder] {} stderr: {}", label, line.trim_end());
                    self.push(&line);
                }
                Err(e) => {
                    tracing::trace!("[Decoder] {} stderr closed: {}", label, e);
                    break;
                }
            }
        }
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_lines() {
        let tail = DiagnosticTail::new(2);
        tail.push("one");
        tail.push("two");
        tail.push("three");
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.joined(), "two\nthree");
        assert_eq!(tail.last().as_deref(), Some("three"));
    }

    #[test]
    fn drains_reader_lines() {
        let tail = DiagnosticTail::default();
        let input = b"rtsp://cam: Connection refused\n\nInvalid data\n".as_slice();
        tail.drain_from(input, "Camera 1");
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.last().as_deref(), Some("Invalid data"));
    }

    #[test]
    fn clones_share_the_buffer() {
        let tail = DiagnosticTail::new(4);
        let writer = tail.clone();
        writer.push("shared");
        assert_eq!(tail.last().as_deref(), Some("shared"));
    }
}

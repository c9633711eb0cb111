//! camview core - lifecycle management for live RTSP camera feeds
//!
//! Each feed is decoded by an external `ffmpeg` process into raw rgb24
//! frames. This crate owns those processes, reads frames on a dedicated
//! thread, measures throughput and probes connectivity. It has no UI
//! dependencies; a front end implements [`surface::DisplaySurface`].

pub mod config;
pub mod decoder;
pub mod errors;
pub mod logging;
pub mod models;
pub mod session;
pub mod source;
pub mod surface;
pub mod tester;

pub use errors::{ConfigError, ReadError, SessionError, StartError};
pub use session::StreamSession;
pub use source::{StreamHandle, StreamSource};
pub use tester::ConnectionTester;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}

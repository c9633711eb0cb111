//! Core enums for source, session and status state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single camera source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No address configured.
    #[default]
    Unconfigured,
    /// Address configured, no decoder running.
    Idle,
    /// Decoder is being spawned.
    Connecting,
    /// Decoder is running and frames can be read.
    Streaming,
    /// A connectivity probe is running against the address.
    Testing,
    /// Cleanup of the decoder is in progress.
    Stopping,
    /// The last run ended with a read error.
    Failed,
}

impl ConnectionState {
    /// Whether a decoder process may be owned in this state.
    pub fn may_own_process(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Streaming | ConnectionState::Stopping
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Unconfigured => write!(f, "unconfigured"),
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Streaming => write!(f, "streaming"),
            ConnectionState::Testing => write!(f, "testing"),
            ConnectionState::Stopping => write!(f, "stopping"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// How a session arranges its camera slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One camera.
    #[default]
    Single,
    /// Two cameras; one is shown at full size, the other optionally as a
    /// lower resolution side feed.
    Tabbed,
    /// Two cameras pulled side by side at full size.
    Synchronized,
}

impl SessionMode {
    /// Number of camera slots owned by a session in this mode.
    pub fn source_count(&self) -> usize {
        match self {
            SessionMode::Single => 1,
            SessionMode::Tabbed | SessionMode::Synchronized => 2,
        }
    }

    /// Parse a mode name as used on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "single" => Some(SessionMode::Single),
            "tabbed" | "tabs" => Some(SessionMode::Tabbed),
            "sync" | "synchronized" | "dual" => Some(SessionMode::Synchronized),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Single => write!(f, "single"),
            SessionMode::Tabbed => write!(f, "tabbed"),
            SessionMode::Synchronized => write!(f, "synchronized"),
        }
    }
}

/// Session-level run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Severity class of a status message, used by the display for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Error,
}

impl Severity {
    /// Short tag for plain-text surfaces.
    pub fn tag(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "OK",
            Severity::Error => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_and_unconfigured_never_own_a_process() {
        assert!(!ConnectionState::Idle.may_own_process());
        assert!(!ConnectionState::Unconfigured.may_own_process());
        assert!(!ConnectionState::Failed.may_own_process());
        assert!(ConnectionState::Streaming.may_own_process());
    }

    #[test]
    fn mode_parse_accepts_aliases() {
        assert_eq!(SessionMode::parse("sync"), Some(SessionMode::Synchronized));
        assert_eq!(SessionMode::parse("Tabbed"), Some(SessionMode::Tabbed));
        assert_eq!(SessionMode::parse("quad"), None);
        assert_eq!(SessionMode::Single.source_count(), 1);
        assert_eq!(SessionMode::Tabbed.source_count(), 2);
    }
}

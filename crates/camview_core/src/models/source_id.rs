//! Source identifier newtype for the one or two camera slots.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum number of camera slots a session can own.
pub const MAX_SOURCES: usize = 2;

/// Identifies a camera slot (0-based internally, displayed as 1-based).
///
/// Serializes as "Camera 1" / "Camera 2" so status output and config files
/// read the same way the operator sees them.
///
/// # Examples
///
/// ```
/// use camview_core::models::SourceId;
///
/// let cam = SourceId::PRIMARY;
/// assert_eq!(cam.display_name(), "Camera 1");
/// assert_eq!(cam.other(), SourceId::SECONDARY);
///
/// let parsed = SourceId::from_display_name("Camera 2").unwrap();
/// assert_eq!(parsed.index(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(usize);

impl SourceId {
    /// Camera 1.
    pub const PRIMARY: SourceId = SourceId(0);
    /// Camera 2.
    pub const SECONDARY: SourceId = SourceId(1);

    /// Create a source id from a 0-based index.
    ///
    /// Returns None for indices outside the supported slots.
    pub fn new(index: usize) -> Option<Self> {
        (index < MAX_SOURCES).then_some(Self(index))
    }

    /// Parse a 1-based camera number as typed by an operator ("1" or "2").
    pub fn from_number(number: &str) -> Option<Self> {
        number
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n >= 1)
            .and_then(|n| Self::new(n - 1))
    }

    /// Get the underlying 0-based index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Get the 1-based display number.
    pub fn display_number(&self) -> usize {
        self.0 + 1
    }

    /// Display name ("Camera 1", "Camera 2").
    pub fn display_name(&self) -> String {
        format!("Camera {}", self.display_number())
    }

    /// Parse from display name like "Camera 1".
    pub fn from_display_name(s: &str) -> Option<Self> {
        s.strip_prefix("Camera ").and_then(Self::from_number)
    }

    /// The other slot of a dual session.
    pub fn other(&self) -> Self {
        if self.0 == 0 {
            Self::SECONDARY
        } else {
            Self::PRIMARY
        }
    }

    /// Both slots in order.
    pub fn all() -> [SourceId; MAX_SOURCES] {
        [Self::PRIMARY, Self::SECONDARY]
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl Serialize for SourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.display_name())
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_display_name(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid camera '{}', expected 'Camera 1' or 'Camera 2'",
                s
            ))
        })
    }
}

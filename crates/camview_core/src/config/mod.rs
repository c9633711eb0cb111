//! Configuration management for camview.
//!
//! - TOML file with one table per concern
//! - Atomic writes (write to temp, then rename)
//! - Section-level updates
//! - Conversion to the runtime [`CameraSettings`]
//!
//! # Example
//!
//! ```no_run
//! use camview_core::config::{ConfigManager, ConfigSection};
//! use camview_core::models::SourceId;
//!
//! let mut config = ConfigManager::new(".config/camview.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().set_address(SourceId::PRIMARY, "rtsp://192.168.1.10/live");
//! config.update_section(ConfigSection::Cameras).unwrap();
//!
//! let runtime = config.settings().camera_settings();
//! println!("primary size: {}", runtime.primary_dimensions);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigFileError, ConfigManager, ConfigResult};
pub use settings::{
    CameraSection, CameraSettings, ConfigSection, DecoderSection, LoggingSettings, ProbeSection,
    Settings, StreamSection,
};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/camview.toml";

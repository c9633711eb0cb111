//! Config manager for loading, saving, and atomic updates.
//!
//! - Atomic writes (temp file, then rename)
//! - Section-level updates that leave the other tables untouched
//! - Files with missing or unknown keys are rewritten on load

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors from reading or writing the config file.
#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigFileError>;

/// Owns the settings file and its in-memory copy.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for `config_path`. Nothing is read until
    /// [`ConfigManager::load`] or [`ConfigManager::load_or_create`].
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory settings. Persist with `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Errors if the file does not exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigFileError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        self.settings.repair();
        Ok(())
    }

    /// Load config from file, writing defaults first if it is missing.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, needs_rewrite) = Self::parse_and_check(&content)?;
            self.settings = settings;

            if needs_rewrite {
                tracing::info!(
                    "[Config] Rewriting {} with defaults for missing or invalid keys",
                    self.config_path.display()
                );
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("[Config] Created {}", self.config_path.display());
        }
        Ok(())
    }

    /// Logs folder from the logging section.
    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.logging.logs_folder)
    }

    /// Parse settings and report whether the file differs from what a
    /// rewrite would produce (unknown tables, missing keys or repaired values).
    fn parse_and_check(content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;
        let mut settings: Settings = toml::from_str(content)?;
        let repaired = settings.repair();

        let known: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
        let has_unknown = doc.iter().any(|(key, _)| !known.contains(&key));

        let mut has_missing = false;
        for section in ConfigSection::ALL {
            let expected: DocumentMut = Self::section_toml(&settings, section)?.parse()?;
            let present = doc.get(section.table_name()).and_then(Item::as_table);
            has_missing |= match present {
                Some(table) => expected.iter().any(|(key, _)| !table.contains_key(key)),
                None => true,
            };
        }

        Ok((settings, has_unknown || has_missing || repaired))
    }

    fn section_toml(settings: &Settings, section: ConfigSection) -> ConfigResult<String> {
        let text = match section {
            ConfigSection::Cameras => toml::to_string_pretty(&settings.cameras)?,
            ConfigSection::Stream => toml::to_string_pretty(&settings.stream)?,
            ConfigSection::Probe => toml::to_string_pretty(&settings.probe)?,
            ConfigSection::Logging => toml::to_string_pretty(&settings.logging)?,
            ConfigSection::Decoder => toml::to_string_pretty(&settings.decoder)?,
        };
        Ok(text)
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Rewrite one section on disk.
    ///
    /// The file is re-read first so only the target table changes; the
    /// in-memory copies of the other sections are not written.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = Self::section_toml(&self.settings, section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        tracing::debug!("[Config] Updated [{}]", section.table_name());
        Ok(())
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# camview configuration\n");
        output.push_str("# Section updates preserve comments elsewhere in this file.\n\n");

        for (i, section) in ConfigSection::ALL.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(section.comment());
            output.push('\n');
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in Self::section_toml(&self.settings, *section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)
    }
}

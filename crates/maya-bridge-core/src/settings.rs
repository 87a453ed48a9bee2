//! Bridge configuration and where it comes from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Endpoint, Language};

/// User-facing bridge settings.
///
/// Field names match the keys of the editor settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Host running Maya. `None` until settings have been synchronized.
    pub maya_hostname: Option<String>,
    /// Maya command port serving Python.
    pub python_command_port: u16,
    /// Maya command port serving MEL.
    pub mel_command_port: u16,
    /// Drop whole-line comments from selections before sending.
    pub strip_sending_comments: bool,
    /// Run Python in a private namespace instead of `__main__`.
    pub no_collisions: bool,
    /// Stream the Maya script editor output back to the editor.
    pub receive_maya_output: bool,
    /// Wrap each Python send in a single undo chunk.
    pub create_undo: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            maya_hostname: Some("127.0.0.1".to_string()),
            python_command_port: 7002,
            mel_command_port: 7001,
            strip_sending_comments: true,
            no_collisions: true,
            receive_maya_output: false,
            create_undo: false,
        }
    }
}

impl BridgeSettings {
    /// Command port for a language.
    #[must_use]
    pub const fn port_for(&self, language: Language) -> u16 {
        match language {
            Language::Python => self.python_command_port,
            Language::Mel => self.mel_command_port,
        }
    }

    /// Whether a non-blank host is set.
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.host().is_some()
    }

    /// Endpoint for a language, if a host is known.
    #[must_use]
    pub fn endpoint_for(&self, language: Language) -> Option<Endpoint> {
        self.host()
            .map(|host| Endpoint::new(host, self.port_for(language)))
    }

    fn host(&self) -> Option<&str> {
        self.maya_hostname
            .as_deref()
            .filter(|host| !host.trim().is_empty())
    }
}

/// Settings error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of bridge settings.
///
/// Implemented by the editor integration; reloaded on every resync.
pub trait SettingsSource: Send + Sync {
    /// Load the current settings.
    ///
    /// # Errors
    /// Returns error if the settings cannot be read or parsed.
    fn load(&self) -> Result<BridgeSettings, ConfigError>;
}

/// Settings held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub BridgeSettings);

impl SettingsSource for StaticSettings {
    fn load(&self) -> Result<BridgeSettings, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Settings read from a JSON file.
///
/// A missing file yields the defaults; unknown keys are ignored.
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    /// File name used under the user configuration directory.
    pub const FILE_NAME: &'static str = "MayaBridge.json";

    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Source at the platform configuration directory, if one exists.
    #[must_use]
    pub fn user_default() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("maya-bridge").join(Self::FILE_NAME)))
    }

    /// Path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for JsonSettingsFile {
    fn load(&self) -> Result<BridgeSettings, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Settings file missing, using defaults");
                return Ok(BridgeSettings::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use thiserror::Error;

pub const DEFAULT_PRESETS: [&str; 3] = [
    "Idle (1000 RPM)",
    "Half Throttle (5000 RPM)",
    "Max Throttle (10000 RPM)",
];

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Cannot access preset file '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Preset file '{path}' is not a JSON list of names")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Preset '{0}' does not contain an RPM value")]
    NoRpm(String),

    #[error("Unknown preset '{0}'")]
    Unknown(String),
}

/// Named RPM set points, persisted as a JSON array of names
#[derive(Debug, Clone, PartialEq)]
pub struct PresetStore {
    names: Vec<String>,
}

impl Default for PresetStore {
    fn default() -> Self {
        Self {
            names: DEFAULT_PRESETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PresetStore {
    /// Loads the presets in `path`, or the defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No preset file at '{}', using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(PresetError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let names = serde_json::from_str(&json).map_err(|source| PresetError::Format {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { names })
    }

    pub fn save(&self, path: &Path) -> Result<(), PresetError> {
        let io_err = |source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_string(&self.names).map_err(|source| PresetError::Format {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)?;

        info!("Saved {} presets to '{}'", self.names.len(), path.display());

        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Adds "Custom (N RPM)". Returns false if it already exists.
    pub fn add_custom(&mut self, rpm: u32) -> bool {
        let name = format!("Custom ({rpm} RPM)");

        if self.names.contains(&name) {
            return false;
        }

        self.names.push(name);
        true
    }

    /// RPM of the preset called `name`
    pub fn rpm_of(&self, name: &str) -> Result<u32, PresetError> {
        let name = self
            .names
            .iter()
            .find(|n| n.as_str() == name)
            .ok_or_else(|| PresetError::Unknown(name.to_string()))?;

        parse_rpm(name)
    }
}

/// Extracts N from a name of the form "Label (N RPM)"
pub fn parse_rpm(name: &str) -> Result<u32, PresetError> {
    let no_rpm = || PresetError::NoRpm(name.to_string());

    let (_, inner) = name.split_once('(').ok_or_else(no_rpm)?;
    let (value, _) = inner.split_once("RPM").ok_or_else(no_rpm)?;

    value.trim().parse().map_err(|_| no_rpm())
}

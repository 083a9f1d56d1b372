//! Rebuild configuration
//!
//! Loaded from a TOML file before anything is extracted:
//!
//! ```toml
//! [protected.sub_archive]
//! "Secret.7z" = "password"
//!
//! [reports]
//! filenames = ["./Summary.txt", "General.7z/Config.xml"]
//! target_directory = "reports"
//! ```
//!
//! Report file names are `"{archive name}/{entry name}"`, the top-level
//! archive being named `.`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebuildConfig {
    #[serde(default)]
    pub protected: ProtectedConfig,

    #[serde(default)]
    pub reports: Option<ReportsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtectedConfig {
    /// Nested archive name to password
    #[serde(default)]
    pub sub_archive: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportsConfig {
    /// Archive-relative paths of files to copy verbatim
    pub filenames: Vec<String>,

    /// Sub-directory of the destination receiving the reports
    pub target_directory: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl RebuildConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RebuildConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    /// Check the constraints serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.protected.sub_archive.keys().any(|name| name.is_empty()) {
            return Err("protected.sub_archive contains an empty archive name".to_string());
        }

        if let Some(reports) = &self.reports {
            if reports.filenames.iter().any(|name| name.trim().is_empty()) {
                return Err("reports.filenames contains an empty entry".to_string());
            }

            let target = &reports.target_directory;
            if target.as_os_str().is_empty() {
                return Err("reports.target_directory is empty".to_string());
            }
            let confined = target
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
            if !confined {
                return Err(format!(
                    "reports.target_directory '{}' must be a relative path inside the destination",
                    target.display()
                ));
            }
        }

        Ok(())
    }

    pub fn passwords(&self) -> HashMap<String, String> {
        self.protected.sub_archive.clone()
    }

    pub fn report_files(&self) -> HashSet<String> {
        self.reports
            .as_ref()
            .map(|reports| reports.filenames.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Report directory under `destination`, if reports are configured
    pub fn report_directory(&self, destination: &Path) -> Option<PathBuf> {
        self.reports
            .as_ref()
            .map(|reports| destination.join(&reports.target_directory))
    }
}

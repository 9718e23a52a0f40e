use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ArchiveResult;

/// Archive policy and file locations.
///
/// Passed to every [`Archiver`](crate::Archiver); two archivers with
/// different settings can work on the same tree concurrently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directories searched in order when loading.
    pub search_paths: Vec<PathBuf>,
    /// Directory new archives are written under.
    pub save_path: PathBuf,
    /// Rename the previous archive to `<path>.bak` instead of deleting it.
    pub backup: bool,
    /// Skip archived children whose class is not registered.
    pub ignore_unknown_classes: bool,
    /// Treat a failed dataset as "no data" instead of failing the load.
    pub ignore_data_errors: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".")],
            save_path: PathBuf::from("."),
            backup: false,
            ignore_unknown_classes: false,
            ignore_data_errors: false,
        }
    }
}

impl ArchiveConfig {
    /// Config whose save path and only search path are both `dir`.
    pub fn rooted(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            search_paths: vec![dir.clone()],
            save_path: dir,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> ArchiveResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

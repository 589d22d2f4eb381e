use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A TOML configuration file in its own temporary directory, removed when
/// dropped.
pub struct TempConfig {
    pub path: PathBuf,
    _temp: TempDir,
}

impl TempConfig {
    pub fn new(contents: &str) -> Self {
        let temp = TempDir::new().expect("failed to create temp directory");
        let path = temp.path().join("switchboard.toml");
        std::fs::write(&path, contents).expect("failed to write config file");
        Self { path, _temp: temp }
    }

    /// A path inside the temporary directory that does not exist.
    pub fn missing_sibling(&self) -> PathBuf {
        self.dir().join("absent.toml")
    }

    pub fn dir(&self) -> &Path {
        self._temp.path()
    }
}

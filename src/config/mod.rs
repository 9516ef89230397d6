//! Configuration and token state storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::auth::{StateStore, TokenState};

/// TOML file holding the persisted [`TokenState`].
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform default location.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(Self::config_dir()?.join("state.toml")))
    }

    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ig-token-manager", "ig-token-manager")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<TokenState> {
        if !self.path.exists() {
            return Ok(TokenState::default());
        }

        let content = fs::read_to_string(&self.path).context("Failed to read state file")?;
        toml::from_str(&content).context("Failed to parse state file")
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).context("Failed to create config directory")?;

        let content = toml::to_string_pretty(state).context("Failed to serialize state")?;

        // Private sibling file, renamed over the old state once complete.
        let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temporary state file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            tmp.as_file()
                .set_permissions(perms)
                .context("Failed to set state permissions")?;
        }
        tmp.write_all(content.as_bytes())
            .context("Failed to write state file")?;
        tmp.as_file().sync_all().context("Failed to flush state file")?;
        tmp.persist(&self.path)
            .context("Failed to replace state file")?;

        Ok(())
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

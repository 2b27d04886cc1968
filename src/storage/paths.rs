//! Application paths for config and data.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the quotawatch application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("io", "quotawatch", "quotawatch") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            // Fallback to home directory
            let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
            Self {
                config: home.join(".config/quotawatch"),
                data: home.join(".local/share/quotawatch"),
            }
        }
    }

    /// Path to the credential/preferences file.
    #[must_use]
    pub fn auth_file(&self) -> PathBuf {
        self.config.join("auth.json")
    }

    /// Path to the history database file.
    #[must_use]
    pub fn history_db_file(&self) -> PathBuf {
        self.data.join("usage-history.sqlite")
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Home directory via the directories crate.
pub(crate) fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

//! Application paths for config, cache, and data.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Cache directory.
    pub cache: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Platform paths for airo.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "airo") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                cache: proj_dirs.cache_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/airo"),
                cache: home.join(".cache/airo"),
                data: home.join(".local/share/airo"),
            }
        }
    }

    /// Default configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Default response cache snapshot.
    #[must_use]
    pub fn cache_snapshot_file(&self) -> PathBuf {
        self.cache.join("responses-v1.json")
    }

    /// Default audit log.
    #[must_use]
    pub fn audit_log_file(&self) -> PathBuf {
        self.data.join("audit.jsonl")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_their_dirs() {
        let paths = AppPaths::new();
        assert!(paths.config_file().starts_with(&paths.config));
        assert!(paths.cache_snapshot_file().starts_with(&paths.cache));
        assert!(paths.audit_log_file().ends_with("audit.jsonl"));
    }
}

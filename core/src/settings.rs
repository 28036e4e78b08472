//! User settings.
//!
//! Loaded from a JSON file with camelCase keys. Every field has a default,
//! so an absent or partial file is valid:
//!
//! ```json
//! {
//!   "projectRootDirectory": "../",
//!   "maxCommandLength": 8000,
//!   "gitAdminUsers": ["alice"],
//!   "lockModeFileFilter": "Content/",
//!   "defaultExpansionDepth": 3,
//!   "customGitLfsExecutable": "",
//!   "defaultMode": "Unlock",
//!   "trackingBranch": "main",
//!   "commandTimeoutSecs": 120
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable pointing at a settings file.
pub const SETTINGS_ENV: &str = "LFS_LOCKS_SETTINGS";

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid lockModeFileFilter: {0}")]
    InvalidFilter(#[from] regex::Error),
    #[error("Project root directory does not exist: {0}")]
    MissingRoot(String),
}

/// Which view the application starts in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Lock,
    #[default]
    Unlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Repository root, relative to the current working directory.
    pub project_root_directory: String,
    /// Longest command line a single lock/unlock invocation may produce.
    pub max_command_length: usize,
    /// Users allowed to force-unlock other users' locks.
    pub git_admin_users: Vec<String>,
    /// Regex applied at the start of each tracked path in lock mode.
    pub lock_mode_file_filter: String,
    pub default_expansion_depth: usize,
    /// Git LFS executable relative to the project root; empty means `git-lfs` on PATH.
    pub custom_git_lfs_executable: String,
    pub default_mode: Mode,
    pub tracking_branch: String,
    pub command_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root_directory: "../".to_owned(),
            max_command_length: 8000,
            git_admin_users: Vec::new(),
            lock_mode_file_filter: String::new(),
            default_expansion_depth: 3,
            custom_git_lfs_executable: String::new(),
            default_mode: Mode::Unlock,
            tracking_branch: "main".to_owned(),
            command_timeout_secs: 120,
        }
    }
}

impl Settings {
    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| SettingsError::Json {
                path: path.display().to_string(),
                source,
            })?;
        // Reject a bad filter at load time rather than on first use
        settings.lock_mode_filter()?;
        Ok(settings)
    }

    /// Load settings using the standard lookup order.
    ///
    /// An explicit path wins, then `$LFS_LOCKS_SETTINGS`, then `settings.json`
    /// in the working directory, then the user config directory. Falls back to
    /// defaults when no file is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::locate() {
            Some(path) => {
                log::info!("[settings] Reading {}", path.display());
                Self::load_from(&path)
            }
            None => {
                log::info!("[settings] No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn locate() -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::locate_in(std::env::var_os(SETTINGS_ENV), &cwd, dirs::config_dir())
    }

    fn locate_in(
        env: Option<std::ffi::OsString>,
        cwd: &Path,
        config_dir: Option<PathBuf>,
    ) -> Option<PathBuf> {
        if let Some(path) = env.filter(|path| !path.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let local = cwd.join(SETTINGS_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        let user = config_dir?.join("lfs-locks").join(SETTINGS_FILE_NAME);
        user.exists().then_some(user)
    }

    /// Resolve the project root against `base` and verify that it exists.
    pub fn resolve_project_root(&self, base: &Path) -> Result<PathBuf, SettingsError> {
        let root = base.join(&self.project_root_directory);
        let root = root.canonicalize().unwrap_or(root);
        if root.is_dir() {
            Ok(root)
        } else {
            Err(SettingsError::MissingRoot(root.display().to_string()))
        }
    }

    /// Compile the lock-mode filter, anchored at the start of the path.
    ///
    /// Returns `None` when no filter is configured.
    pub fn lock_mode_filter(&self) -> Result<Option<Regex>, SettingsError> {
        if self.lock_mode_file_filter.is_empty() {
            return Ok(None);
        }
        let anchored = format!("^(?:{})", self.lock_mode_file_filter);
        Ok(Some(Regex::new(&anchored)?))
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.git_admin_users.iter().any(|admin| admin == user)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

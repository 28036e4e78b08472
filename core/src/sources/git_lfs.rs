use super::runner::{display_command, CommandOutput, CommandRunner, RunError};
use crate::error::LockError;
use crate::locks::coordinator::LockDataSource;
use crate::locks::record::LockTable;
use crate::settings::Settings;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_GIT_LFS: &str = "git-lfs";

/// Files tracked by Git LFS, in listing order plus a set for membership checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedFiles {
    ordered: Vec<String>,
    set: HashSet<String>,
}

impl TrackedFiles {
    pub fn new(paths: Vec<String>) -> Self {
        let set = paths.iter().cloned().collect();
        Self {
            ordered: paths,
            set,
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.ordered
    }

    pub fn set(&self) -> &HashSet<String> {
        &self.set
    }

    pub fn contains(&self, path: &str) -> bool {
        self.set.contains(path)
    }
}

/// Git and Git LFS commands for one repository.
///
/// The current user and the tracked-files listing are computed on first use
/// and cached until [`GitLfs::invalidate_caches`] is called.
pub struct GitLfs {
    repo_path: PathBuf,
    git_lfs: String,
    runner: Arc<dyn CommandRunner>,
    user: Mutex<Option<String>>,
    tracked: Mutex<Option<Arc<TrackedFiles>>>,
}

impl std::fmt::Debug for GitLfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLfs")
            .field("repo_path", &self.repo_path)
            .field("git_lfs", &self.git_lfs)
            .finish_non_exhaustive()
    }
}

impl GitLfs {
    /// Resolve the Git LFS executable and verify it runs.
    pub fn new(
        repo_path: PathBuf,
        settings: &Settings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, LockError> {
        let git_lfs = resolve_git_lfs(&repo_path, &settings.custom_git_lfs_executable)?;
        let source = Self::with_executable(repo_path, git_lfs, runner);
        source
            .run(&[source.git_lfs.as_str(), "--version"])
            .map_err(|e| LockError::dependency_missing(&source.git_lfs, e.to_string()))?;
        Ok(source)
    }

    /// Build without verifying the executable.
    pub fn with_executable(
        repo_path: PathBuf,
        git_lfs: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            repo_path,
            git_lfs: git_lfs.into(),
            runner,
            user: Mutex::new(None),
            tracked: Mutex::new(None),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn executable(&self) -> &str {
        &self.git_lfs
    }

    /// The executable as a user would type it from the repository root.
    pub fn display_executable(&self) -> String {
        let exe = Path::new(&self.git_lfs);
        let shown = exe.strip_prefix(&self.repo_path).unwrap_or(exe);
        shown.to_string_lossy().replace('\\', "/")
    }

    /// Verify that `git` is installed and runnable.
    pub fn check_git_installed(&self) -> Result<(), LockError> {
        self.run(&["git", "--version"])
            .map(|_| ())
            .map_err(|e| LockError::dependency_missing("git", e.to_string()))
    }

    /// Verify that `user.name` and `user.email` are configured.
    pub fn check_git_identity(&self) -> Result<(), LockError> {
        for key in ["user.name", "user.email"] {
            let value = self
                .run(&["git", "config", key])
                .map(|output| output.stdout.trim().to_owned())
                .unwrap_or_default();
            if value.is_empty() {
                return Err(LockError::config(format!("Git config '{key}' is not set")));
            }
        }
        Ok(())
    }

    /// The configured Git user name.
    pub fn current_user(&self) -> Result<String, LockError> {
        let mut cached = self.user.lock().expect("git user mutex poisoned");
        if let Some(user) = cached.as_ref() {
            return Ok(user.clone());
        }
        let output = self.run(&["git", "config", "user.name"])?;
        let user = output.stdout.trim().to_owned();
        if user.is_empty() {
            return Err(LockError::config("Git config 'user.name' is not set"));
        }
        *cached = Some(user.clone());
        Ok(user)
    }

    /// Files tracked by Git LFS (`git-lfs ls-files --name-only`).
    pub fn tracked_files(&self) -> Result<Arc<TrackedFiles>, LockError> {
        let mut cached = self.tracked.lock().expect("tracked files mutex poisoned");
        if let Some(tracked) = cached.as_ref() {
            return Ok(Arc::clone(tracked));
        }
        let output = self.run(&[self.git_lfs.as_str(), "ls-files", "--name-only"])?;
        let tracked = Arc::new(TrackedFiles::new(output.lines()));
        log::info!("[git-lfs] Cached {} LFS tracked files", tracked.paths().len());
        *cached = Some(Arc::clone(&tracked));
        Ok(tracked)
    }

    /// Drop the cached user and tracked-files listing.
    pub fn invalidate_caches(&self) {
        *self.user.lock().expect("git user mutex poisoned") = None;
        *self.tracked.lock().expect("tracked files mutex poisoned") = None;
        log::debug!("[git-lfs] Caches invalidated");
    }

    /// The checked-out branch (empty when detached).
    pub fn current_branch(&self) -> Result<String, LockError> {
        let output = self.run(&["git", "branch", "--show-current"])?;
        Ok(output.stdout.trim().to_owned())
    }

    /// Raw `git-lfs locks` output lines.
    pub fn lock_lines(&self) -> Result<Vec<String>, LockError> {
        Ok(self.run(&[self.git_lfs.as_str(), "locks"])?.lines())
    }

    /// Run a full argument list in the repository root.
    pub fn run_argv(&self, argv: &[String]) -> Result<CommandOutput, LockError> {
        Ok(self.runner.run(argv, &self.repo_path)?)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, RunError> {
        let argv: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        log::debug!("[git-lfs] {}", display_command(&argv));
        self.runner.run(&argv, &self.repo_path)
    }
}

impl LockDataSource for GitLfs {
    fn fetch_lock_table(&self) -> Result<LockTable, LockError> {
        self.check_git_installed()?;
        log::info!("[git-lfs] Parsing locks");
        let lines = self.lock_lines()?;
        let tracked = self.tracked_files()?;
        Ok(LockTable::parse(&lines, &self.repo_path, tracked.set()))
    }
}

/// Pick the Git LFS executable: a custom path inside the repository, or `git-lfs` on PATH.
fn resolve_git_lfs(repo_path: &Path, custom: &str) -> Result<String, LockError> {
    if custom.is_empty() {
        return Ok(DEFAULT_GIT_LFS.to_owned());
    }
    let mut path = repo_path.join(custom);
    if cfg!(target_os = "windows") {
        path.as_mut_os_string().push(".exe");
    }
    if path.is_file() {
        Ok(path.to_string_lossy().into_owned())
    } else {
        Err(LockError::dependency_missing(
            "git-lfs",
            format!("custom executable not found at {}", path.display()),
        ))
    }
}

//! `LockManager` is constructed once at startup and handed to every consumer.
//! It owns the settings, the Git LFS source and the refresh coordinator.

use crate::error::LockError;
use crate::locks::coordinator::{
    LockDataSource, LockDataSubscriber, RefreshCoordinator, RefreshTicket, Subscription,
};
use crate::locks::record::LockTable;
use crate::planner::{render_command_line, Invocation, LockOperation, LockPlanner, LockRequest};
use crate::selection::TreeView;
use crate::settings::Settings;
use crate::sources::git_lfs::{GitLfs, TrackedFiles};
use crate::sources::runner::{CommandRunner, ProcessRunner};
use crate::tree::{FileTree, TreeFilter, TreeMode};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct LockManager {
    settings: Settings,
    git_lfs: Arc<GitLfs>,
    path_filter: Option<Regex>,
    coordinator: RefreshCoordinator,
    runtime: Handle,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("git_lfs", &self.git_lfs)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Validate the repository and tools, then build a manager that runs real
    /// processes. `base` is the directory the project root is resolved against.
    pub fn new(settings: Settings, base: &Path, runtime: Handle) -> Result<Self, LockError> {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(ProcessRunner::new(settings.command_timeout()));
        Self::with_runner(settings, base, runner, runtime)
    }

    pub fn with_runner(
        settings: Settings,
        base: &Path,
        runner: Arc<dyn CommandRunner>,
        runtime: Handle,
    ) -> Result<Self, LockError> {
        let root = settings.resolve_project_root(base)?;
        let path_filter = settings.lock_mode_filter()?;
        let git_lfs = GitLfs::new(root, &settings, runner)?;
        git_lfs.check_git_installed()?;
        git_lfs.check_git_identity()?;
        log::info!(
            "[locks] Managing {} with {}",
            git_lfs.repo_path().display(),
            git_lfs.executable()
        );

        let git_lfs = Arc::new(git_lfs);
        let source = Arc::clone(&git_lfs) as Arc<dyn LockDataSource>;
        Ok(Self {
            coordinator: RefreshCoordinator::new(source, runtime.clone()),
            settings,
            git_lfs,
            path_filter,
            runtime,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn git_lfs(&self) -> &GitLfs {
        &self.git_lfs
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn current_user(&self) -> Result<String, LockError> {
        self.git_lfs.current_user()
    }

    pub fn is_admin(&self) -> Result<bool, LockError> {
        Ok(self.settings.is_admin(&self.current_user()?))
    }

    /// Snapshot of the published lock table.
    pub fn table(&self) -> Arc<LockTable> {
        self.coordinator.table()
    }

    pub fn has_parsed_once(&self) -> bool {
        self.coordinator.has_parsed_once()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn LockDataSubscriber>) -> Subscription {
        self.coordinator.subscribe(subscriber)
    }

    pub fn refresh_async(&self) -> RefreshTicket {
        self.coordinator.refresh_async()
    }

    pub fn tracked_files(&self) -> Result<Arc<TrackedFiles>, LockError> {
        self.git_lfs.tracked_files()
    }

    /// Forget the cached user and tracked files; the next refresh re-reads them.
    pub fn invalidate_caches(&self) {
        self.git_lfs.invalidate_caches();
    }

    /// Filters for a tree build, using the configured path filter and depth.
    pub fn tree_filter<'a>(&'a self, text: &'a str, owner: &'a str) -> TreeFilter<'a> {
        TreeFilter {
            text,
            owner,
            path_filter: self.path_filter.as_ref(),
            expansion_depth: self.settings.default_expansion_depth,
        }
    }

    /// Build a tree from the published table.
    pub fn build_tree(&self, mode: TreeMode, filter: &TreeFilter<'_>) -> Result<FileTree, LockError> {
        let table = self.table();
        Ok(match mode {
            TreeMode::Lock => FileTree::for_locking(self.tracked_files()?.paths(), &table, filter),
            TreeMode::Unlock => FileTree::for_unlocking(&table, filter),
        })
    }

    /// Rebuild a view from the published table, keeping its selection.
    pub fn populate(
        &self,
        view: &mut TreeView,
        mode: TreeMode,
        filter: &TreeFilter<'_>,
    ) -> Result<(), LockError> {
        view.repopulate(self.build_tree(mode, filter)?);
        Ok(())
    }

    /// Plan the invocations for `files` against the published table.
    pub fn plan(&self, files: &[String], operation: LockOperation) -> Result<Vec<Invocation>, LockError> {
        let user = self.current_user()?;
        let table = self.table();
        let request = LockRequest {
            files,
            operation,
            current_user: &user,
            is_admin: self.settings.is_admin(&user),
        };
        Ok(
            LockPlanner::new(self.git_lfs.executable(), self.settings.max_command_length, &table)
                .plan(&request),
        )
    }

    /// The command a user could paste to run `invocation` from the project root.
    pub fn render_command_line(&self, invocation: &Invocation) -> String {
        render_command_line(invocation, &self.git_lfs.display_executable())
    }

    /// Plan and run a batch lock or unlock in the background.
    ///
    /// Every invocation is attempted even after a failure. Once the batch is
    /// done a refresh runs if anything succeeded, and the handle resolves
    /// after that refresh settles. If a cycle is already running, the handle
    /// waits for the re-run that picks up this batch.
    pub fn exec_locking_operation(
        &self,
        files: Vec<String>,
        operation: LockOperation,
    ) -> JoinHandle<Result<(), LockError>> {
        let git_lfs = Arc::clone(&self.git_lfs);
        let coordinator = self.coordinator.clone();
        let settings = self.settings.clone();
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let table = coordinator.table();
            let batch = runtime
                .spawn_blocking(move || run_batch(&git_lfs, &settings, &table, &files, operation))
                .await
                .map_err(|e| LockError::io(format!("lock task failed: {e}")))?;

            if batch.succeeded > 0 {
                if let Err(e) = coordinator.refresh_async().wait().await {
                    log::warn!("[locks] Refresh after {} failed: {e}", operation.subcommand());
                }
            }
            batch.result
        })
    }
}

struct BatchOutcome {
    succeeded: usize,
    result: Result<(), LockError>,
}

fn run_batch(
    git_lfs: &GitLfs,
    settings: &Settings,
    table: &LockTable,
    files: &[String],
    operation: LockOperation,
) -> BatchOutcome {
    let user = match git_lfs.current_user() {
        Ok(user) => user,
        Err(e) => {
            return BatchOutcome {
                succeeded: 0,
                result: Err(e),
            }
        }
    };
    let is_admin = settings.is_admin(&user);
    let request = LockRequest {
        files,
        operation,
        current_user: &user,
        is_admin,
    };
    let invocations =
        LockPlanner::new(git_lfs.executable(), settings.max_command_length, table).plan(&request);
    log::info!(
        "[locks] {} {} files in {} invocations",
        operation.subcommand(),
        files.len(),
        invocations.len()
    );

    let mut errors = Vec::new();
    for invocation in &invocations {
        if let Err(e) = git_lfs.run_argv(&invocation.argv) {
            log::warn!("[locks] {e}");
            errors.push(e);
        }
    }
    let succeeded = invocations.len() - errors.len();

    let Some(first) = errors.first() else {
        return BatchOutcome {
            succeeded,
            result: Ok(()),
        };
    };

    let foreign: Vec<String> = if operation == LockOperation::Unlock && !is_admin {
        files
            .iter()
            .filter(|file| {
                let owner = table.owner_of(file);
                !owner.is_empty() && owner != user
            })
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let result = if foreign.is_empty() {
        Err(LockError::BatchFailed {
            failed: errors.len(),
            total: invocations.len(),
            first_error: first.to_string(),
        })
    } else {
        Err(LockError::AuthorizationRejected { paths: foreign })
    };
    BatchOutcome { succeeded, result }
}

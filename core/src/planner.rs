//! Turns a batch lock/unlock request into concrete `git-lfs` invocations.
//!
//! Admins unlocking files owned by someone else get a separate `--force`
//! group, issued before the normal group. Each group is chunked so that no
//! invocation's command line exceeds the configured maximum, without ever
//! splitting a path or emitting an invocation with no files.

use crate::locks::record::LockTable;
use crate::sources::runner::display_command;
use serde::{Deserialize, Serialize};

const FORCE_FLAG: &str = "--force";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOperation {
    Lock,
    Unlock,
}

impl LockOperation {
    pub fn from_should_lock(should_lock: bool) -> Self {
        if should_lock {
            Self::Lock
        } else {
            Self::Unlock
        }
    }

    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

/// One executable command: `<git-lfs> <lock|unlock> [--force] <files...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub operation: LockOperation,
    pub forced: bool,
    pub argv: Vec<String>,
}

impl Invocation {
    fn prefix_len(&self) -> usize {
        if self.forced {
            3
        } else {
            2
        }
    }

    /// The file arguments of this invocation.
    pub fn files(&self) -> &[String] {
        &self.argv[self.prefix_len()..]
    }

    /// Length of the command line when rendered with single spaces.
    pub fn command_length(&self) -> usize {
        display_command(&self.argv).len()
    }
}

/// Who is asking and what they want done.
#[derive(Debug, Clone, Copy)]
pub struct LockRequest<'a> {
    pub files: &'a [String],
    pub operation: LockOperation,
    pub current_user: &'a str,
    pub is_admin: bool,
}

/// Plans invocations against the current lock table.
#[derive(Debug, Clone, Copy)]
pub struct LockPlanner<'a> {
    git_lfs: &'a str,
    max_command_length: usize,
    table: &'a LockTable,
}

impl<'a> LockPlanner<'a> {
    pub fn new(git_lfs: &'a str, max_command_length: usize, table: &'a LockTable) -> Self {
        Self {
            git_lfs,
            max_command_length,
            table,
        }
    }

    /// Plan the invocations for a request, in execution order.
    ///
    /// Ownership is only consulted for admin unlocks; a non-admin unlock of
    /// someone else's file is left for Git LFS to reject.
    pub fn plan(&self, request: &LockRequest<'_>) -> Vec<Invocation> {
        if request.files.is_empty() {
            return Vec::new();
        }

        if request.operation == LockOperation::Lock || !request.is_admin {
            return self.chunk(request.operation, false, request.files);
        }

        let (owned, non_owned): (Vec<String>, Vec<String>) = request
            .files
            .iter()
            .cloned()
            .partition(|file| self.table.owner_of(file) == request.current_user);
        log::debug!(
            "[planner] Admin unlock: {} owned, {} forced",
            owned.len(),
            non_owned.len()
        );

        let mut invocations = self.chunk(LockOperation::Unlock, true, &non_owned);
        invocations.extend(self.chunk(LockOperation::Unlock, false, &owned));
        invocations
    }

    fn chunk(&self, operation: LockOperation, forced: bool, files: &[String]) -> Vec<Invocation> {
        let mut prefix = vec![self.git_lfs.to_owned(), operation.subcommand().to_owned()];
        if forced {
            prefix.push(FORCE_FLAG.to_owned());
        }
        let prefix_length = display_command(&prefix).len();

        let mut invocations = Vec::new();
        let mut current = prefix.clone();
        let mut length = prefix_length;
        for file in files {
            let added = 1 + file.len();
            // Close the chunk only if it already holds a file; a single oversized
            // path still gets an invocation of its own
            if current.len() > prefix.len() && length + added > self.max_command_length {
                invocations.push(Invocation {
                    operation,
                    forced,
                    argv: std::mem::replace(&mut current, prefix.clone()),
                });
                length = prefix_length;
            }
            current.push(file.clone());
            length += added;
        }
        if current.len() > prefix.len() {
            invocations.push(Invocation {
                operation,
                forced,
                argv: current,
            });
        }
        invocations
    }
}

/// Render an invocation as a command a user can paste into a shell.
pub fn render_command_line(invocation: &Invocation, display_executable: &str) -> String {
    let mut argv = invocation.argv.clone();
    if let Some(program) = argv.first_mut() {
        display_executable.clone_into(program);
    }
    display_command(&argv)
}

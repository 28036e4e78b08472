use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {code:?}: {stderr}")]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty, trimmed output lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(std::borrow::ToOwned::to_owned)
            .collect()
    }
}

/// Executes an argument list in a working directory.
///
/// A non-zero exit is reported as `RunError::Exit`, so `Ok` always means success.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunError>;
}

/// Render an argument list the way a user would type it.
pub fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Runs commands as child processes with a bounded wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `argv` in `cwd`, killing the child if it outlives the timeout.
    pub async fn run_async(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RunError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            )));
        };
        let command = display_command(argv);
        log::debug!("[runner] {command} (cwd: {})", cwd.display());

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: program.clone(),
                source,
            })?;

        let Ok(output) = timeout(self.timeout, child.wait_with_output()).await else {
            log::warn!("[runner] Timed out: {command}");
            return Err(RunError::Timeout {
                command,
                seconds: self.timeout.as_secs(),
            });
        };
        let output = output?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            log::warn!(
                "[runner] {command} failed with {}: {}",
                output.status,
                stderr.trim()
            );
            Err(RunError::Exit {
                command,
                code: output.status.code(),
                stderr,
            })
        }
    }
}

impl CommandRunner for ProcessRunner {
    /// Blocking entry point for callers on the blocking pool or outside any
    /// runtime. Each call drives its child on a private current-thread runtime.
    fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run_async(argv, cwd))
    }
}

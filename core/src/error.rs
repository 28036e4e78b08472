use serde::Serialize;
use thiserror::Error;

/// Unified error type for lock management.
///
/// Serializable so a presentation layer can discriminate on `type`
/// and render each kind appropriately.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum LockError {
    #[error("Missing dependency: {dependency} ({message})")]
    DependencyMissing { dependency: String, message: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Command failed ({command}): {message}")]
    CommandFailed { command: String, message: String },

    #[error("Command timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("Not authorized to unlock files owned by other users: {}", paths.join(", "))]
    AuthorizationRejected { paths: Vec<String> },

    #[error("{failed} of {total} lock commands failed: {first_error}")]
    BatchFailed {
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl LockError {
    /// Create a missing dependency error
    pub fn dependency_missing(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DependencyMissing {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Create a Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a command failure with the rendered command for context
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can retry without fixing their setup)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::CommandFailed { .. }
            | Self::Timeout { .. }
            | Self::BatchFailed { .. }
            | Self::Io { .. } => true,
            // Setup problems block every operation until the user fixes them
            Self::DependencyMissing { .. }
            | Self::ConfigInvalid { .. }
            | Self::Parse { .. }
            | Self::AuthorizationRejected { .. } => false,
        }
    }
}

impl From<crate::sources::runner::RunError> for LockError {
    fn from(err: crate::sources::runner::RunError) -> Self {
        use crate::sources::runner::RunError;
        match err {
            RunError::Spawn { program, source } => {
                LockError::dependency_missing(program, source.to_string())
            }
            RunError::Exit {
                command,
                code,
                stderr,
            } => {
                let code = code.map_or_else(|| "signal".to_owned(), |c| c.to_string());
                LockError::command(command, format!("exit {code}: {}", stderr.trim()))
            }
            RunError::Timeout { command, seconds } => LockError::Timeout { command, seconds },
            RunError::Io(e) => LockError::io(e.to_string()),
        }
    }
}

impl From<crate::settings::SettingsError> for LockError {
    fn from(err: crate::settings::SettingsError) -> Self {
        LockError::config(err.to_string())
    }
}

impl From<std::io::Error> for LockError {
    fn from(err: std::io::Error) -> Self {
        LockError::io(err.to_string())
    }
}

impl From<LockError> for String {
    fn from(err: LockError) -> Self {
        err.to_string()
    }
}

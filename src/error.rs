//! Error taxonomy for the shell.
//!
//! Every variant is reported on the diagnostic stream and aborts only the
//! command that raised it. [`ShellError::is_user_error`] separates malformed
//! invocations from operating-system failures.

use thiserror::Error;

/// Errors raised while resolving, dispatching or running a command.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Malformed builtin invocation; carries the usage text.
    #[error("{0}")]
    Usage(String),

    /// A `$name` reference to a variable that was never set.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// The variable store is at capacity and the name is new.
    #[error("variable limit reached ({capacity} variables)")]
    VariableStoreFull { capacity: usize },

    /// A `>` token with nothing after it.
    #[error("no target file specified after '>'")]
    MissingRedirectTarget,

    /// An inline `$` with no variable name after it.
    #[error("expected a variable name after '$'")]
    MissingVariableName,

    /// Alias values kept expanding into further aliases.
    #[error("alias expansion exceeded {0} levels")]
    AliasDepthExceeded(usize),

    /// The configured interface has no row in the traffic table.
    #[error("network interface not found: {0}")]
    InterfaceNotFound(String),

    /// No executable with that name on the search path.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// The operating system refused to create a child.
    #[error("cannot spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: nix::Error,
    },

    /// A kernel-exposed table could not be read or parsed.
    #[error("{path}: {reason}")]
    Proc { path: String, reason: String },

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// True for malformed invocations, false for resource failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ShellError::Usage(_)
                | ShellError::VariableNotFound(_)
                | ShellError::VariableStoreFull { .. }
                | ShellError::MissingRedirectTarget
                | ShellError::MissingVariableName
                | ShellError::AliasDepthExceeded(_)
                | ShellError::InterfaceNotFound(_)
        )
    }
}

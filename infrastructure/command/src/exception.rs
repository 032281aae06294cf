use std::io;

pub type CommandResult<T> = Result<T, CommandException>;

#[derive(Debug, thiserror::Error)]
pub enum CommandException {
    #[error("Unable to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with code {exit_code:?}, stderr: {stderr}")]
    ProcessExecution {
        command: String,
        /// `None` when killed by a signal.
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Pipeline io error: {0}")]
    Io(#[from] io::Error),
}

impl CommandException {
    /// Captured stderr of a failed process.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandException::ProcessExecution { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandException::ProcessExecution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::ffi::NulError;
use thiserror::Error;

/// Errors produced while parsing a submitted line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsingError {
    /// A `<` or `>` was the last word on the line.
    #[error("missing path after `{0}`")]
    MissingRedirectTarget(&'static str),

    /// Every word was consumed by redirections, nothing left to run.
    #[error("missing program name")]
    MissingProgram,
}

/// Errors the shell core reports back to the interpreter loop.
///
/// None of these end the session: the loop prints them and shows the next prompt.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The background table is full; the command was not started.
    #[error("too many background processes (limit is {capacity})")]
    CapacityExceeded { capacity: usize },

    /// The child process could not be created.
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    /// Waiting on a foreground child failed.
    #[error("waiting for process {pid} failed: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },

    /// A signal disposition could not be installed.
    #[error("cannot install handler for {signal}: {source}")]
    SignalSetup {
        signal: Signal,
        #[source]
        source: Errno,
    },

    /// An argument or path contained an interior NUL byte.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] NulError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParsingError),
}

//! An interactive command launcher with background jobs.
//!
//! Each submitted line is either handled by a built-in (`cd`, `status`, `exit`)
//! or forked and executed as an external program, with optional `<`/`>`
//! redirection and a trailing `&` for background execution.
//!
//! The pieces that deal with process lifecycle are split out:
//! - [`jobs`]: the table of live background processes and the last foreground result.
//! - [`signals`]: interrupt and terminal-stop handling for the shell and its children.
//! - [`launcher`]: fork, redirect, exec, and wait.
//! - [`reaper`]: non-blocking collection of finished background processes.
//! - [`teardown`]: force-killing what is left when the shell exits.
//!
//! The main entry point is [`Interpreter`].

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod interpreter;
pub mod jobs;
pub mod launcher;
pub mod parser;
pub mod reaper;
pub mod signals;
pub mod teardown;

pub use config::ShellConfig;
pub use error::{ParsingError, ShellError};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use jobs::{DEFAULT_CAPACITY, ForegroundStatus, JobTable};

/// Serializes tests that touch process-wide state: the working directory and
/// the interrupt disposition.
#[cfg(test)]
pub(crate) fn lock_process_state() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

use crate::env::Environment;
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// A parsed command line, ready to be dispatched.
///
/// Built once by the parser and only read afterwards: redirection operators
/// and the trailing `&` have already been removed from `args`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    /// Program name or path, as typed.
    pub program: String,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// File to bind to standard input (`< path`).
    pub stdin: Option<PathBuf>,
    /// File to create or truncate and bind to standard output (`> path`).
    pub stdout: Option<PathBuf>,
    /// Whether a trailing `&` asked for background execution.
    pub background: bool,
}

impl CommandLine {
    /// The full argument vector, program name first.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command. Shell messages go to `stdout`; external programs
    /// write to the shell's inherited descriptors unless redirected.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment)
    -> Result<ExitCode>;
}

/// Factory that tries to create a command from a parsed command line.
///
/// Returns `None` when the factory doesn't recognize the program name.
pub trait CommandFactory {
    fn try_create(
        &self,
        env: &Environment,
        command: &CommandLine,
    ) -> Option<Box<dyn ExecutableCommand>>;
}

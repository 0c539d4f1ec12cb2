use crate::jobs::JobTable;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable state of one shell session.
///
/// - `vars`: environment variables, the complete environment of every launched program.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: set by `exit`; the loop stops once it sees it.
/// - `jobs`: background processes and the last foreground result.
#[derive(Debug)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub jobs: JobTable,
}

impl Environment {
    /// Capture the current process state, tracking at most `capacity`
    /// background processes.
    pub fn new(capacity: usize) -> Self {
        Self::with_jobs(JobTable::new(capacity))
    }

    pub fn with_jobs(jobs: JobTable) -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
            jobs,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

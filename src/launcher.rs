use crate::command::{CommandFactory, CommandLine, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use crate::jobs::{ForegroundStatus, JobTable};
use crate::signals::{self, InterruptNotice};
use anyhow::Result;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self as nix_signal, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{CStr, CString, NulError, OsStr};
use std::io::Write;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NULL_DEVICE: &CStr = c"/dev/null";

/// Result of starting a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launched {
    /// The child ran to completion in the foreground.
    Foreground(ForegroundStatus),
    /// The child is running in the background at `index` in the job table.
    Background { index: usize, pid: Pid },
}

/// Command that is not a builtin.
pub struct ExternalCommand {
    command: CommandLine,
    executable: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(command: CommandLine, executable: Option<PathBuf>) -> Self {
        Self {
            command,
            executable,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    /// Accepts every command. An unresolvable program is still forked so the
    /// child can report it and exit non-zero like any other failed program.
    fn try_create(
        &self,
        env: &Environment,
        command: &CommandLine,
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let executable = find_command_path(OsStr::new(&search_paths), Path::new(&command.program))
            .map(Cow::into_owned);
        Some(Box::new(ExternalCommand::new(command.clone(), executable)))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let launched = launch(
            &self.command,
            self.executable.as_deref(),
            &env.vars,
            &mut env.jobs,
        )?;
        Ok(report_launch(launched, stdout)?)
    }
}

/// Print the shell's line for a launch and turn it into an exit code.
pub fn report_launch(launched: Launched, stdout: &mut dyn Write) -> Result<ExitCode, ShellError> {
    match launched {
        Launched::Foreground(status) => {
            if let ForegroundStatus::Signaled(signal) = status {
                writeln!(stdout, "terminated by signal {signal}")?;
            }
            Ok(exit_code(status))
        }
        Launched::Background { index, pid } => {
            writeln!(stdout, "[{index}] {pid}")?;
            stdout.flush()?;
            Ok(0)
        }
    }
}

/// Fork and exec `command` with `vars` as its environment.
///
/// A foreground child is waited for and its outcome recorded in `jobs`. A
/// background child is added to `jobs` and left running. Background launches
/// are refused before forking when the table is full.
pub fn launch(
    command: &CommandLine,
    executable: Option<&Path>,
    vars: &HashMap<String, String>,
    jobs: &mut JobTable,
) -> Result<Launched, ShellError> {
    if command.background && jobs.is_full() {
        return Err(ShellError::CapacityExceeded {
            capacity: jobs.capacity(),
        });
    }

    let plan = ChildPlan::new(command, executable, vars)?;

    // SAFETY: the child only runs `ChildPlan::exec`. It reads strings and
    // pointer arrays built before the fork and calls sigaction, open, dup2,
    // close, execve, write and _exit, all async-signal-safe.
    match unsafe { unistd::fork() }.map_err(ShellError::Fork)? {
        ForkResult::Child => plan.exec(),
        ForkResult::Parent { child } => {
            debug!(pid = %child, program = %command.program, background = command.background, "spawned");
            if command.background {
                track_background(child, jobs)
            } else {
                wait_foreground(child, jobs).map(Launched::Foreground)
            }
        }
    }
}

fn track_background(child: Pid, jobs: &mut JobTable) -> Result<Launched, ShellError> {
    match jobs.add(child) {
        Ok(index) => Ok(Launched::Background { index, pid: child }),
        Err(e) => {
            // Never leave a running child that nothing will reap.
            let _ = nix_signal::kill(child, Signal::SIGKILL);
            let _ = waitpid(child, None);
            Err(e)
        }
    }
}

fn wait_foreground(child: Pid, jobs: &mut JobTable) -> Result<ForegroundStatus, ShellError> {
    let notice = InterruptNotice::arm()
        .inspect_err(|e| warn!("foreground interrupt notice unavailable: {e}"))
        .ok();

    let status = loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => break ForegroundStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => break ForegroundStatus::Signaled(signal as i32),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(source) => return Err(ShellError::Wait { pid: child, source }),
        }
    };

    if let Some(signal) = notice.as_ref().and_then(InterruptNotice::interrupted) {
        debug!(pid = %child, signal, "interrupt delivered during foreground wait");
    }
    drop(notice);

    match status {
        ForegroundStatus::Exited(code) => jobs.record_foreground_result(code, false),
        ForegroundStatus::Signaled(signal) => jobs.record_foreground_result(signal, true),
    }
    debug!(pid = %child, %status, "foreground child finished");
    Ok(status)
}

/// Exit code reported for a finished foreground command.
pub fn exit_code(status: ForegroundStatus) -> ExitCode {
    match status {
        ForegroundStatus::Exited(code) => code,
        ForegroundStatus::Signaled(signal) => 128 + signal,
    }
}

struct Redirect {
    path: CString,
    failure: Vec<u8>,
}

impl Redirect {
    fn new(path: &Path, direction: &str) -> Result<Self, NulError> {
        Ok(Self {
            path: CString::new(path.as_os_str().as_bytes())?,
            failure: format!("cannot open {} for {direction}\n", path.display()).into_bytes(),
        })
    }
}

/// Everything the child needs, converted before the fork so the child does
/// not have to allocate.
///
/// `argv_ptrs` and `envp_ptrs` point into `_argv` and `_envp`, which only
/// own the strings, and end with a null pointer. The `CString` buffers live on the heap, so the pointers stay
/// valid when the plan moves.
struct ChildPlan {
    executable: Option<CString>,
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp_ptrs: Vec<*const libc::c_char>,
    stdin: Option<Redirect>,
    stdout: Option<Redirect>,
    background: bool,
    not_found: Vec<u8>,
}

impl ChildPlan {
    fn new(
        command: &CommandLine,
        executable: Option<&Path>,
        vars: &HashMap<String, String>,
    ) -> Result<Self, NulError> {
        let argv = command
            .argv()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()?;
        let envp = vars
            .iter()
            .map(|(key, value)| CString::new(format!("{key}={value}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            executable: executable
                .map(|p| CString::new(p.as_os_str().as_bytes()))
                .transpose()?,
            argv_ptrs: null_terminated(&argv),
            envp_ptrs: null_terminated(&envp),
            _argv: argv,
            _envp: envp,
            stdin: command
                .stdin
                .as_deref()
                .map(|p| Redirect::new(p, "input"))
                .transpose()?,
            stdout: command
                .stdout
                .as_deref()
                .map(|p| Redirect::new(p, "output"))
                .transpose()?,
            background: command.background,
            not_found: format!("{}: program not found\n", command.program).into_bytes(),
        })
    }

    fn exec(self) -> ! {
        signals::prepare_child(self.background);

        let write_flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        match &self.stdin {
            Some(redirect) => bind_or_exit(redirect, OFlag::O_RDONLY, libc::STDIN_FILENO),
            None if self.background => bind_null(OFlag::O_RDONLY, libc::STDIN_FILENO),
            None => {}
        }
        match &self.stdout {
            Some(redirect) => bind_or_exit(redirect, write_flags, libc::STDOUT_FILENO),
            None if self.background => bind_null(OFlag::O_WRONLY, libc::STDOUT_FILENO),
            None => {}
        }

        if let Some(executable) = &self.executable {
            // SAFETY: both arrays are null-terminated and point into strings
            // owned by `self`, which outlives the call.
            unsafe {
                libc::execve(
                    executable.as_ptr(),
                    self.argv_ptrs.as_ptr(),
                    self.envp_ptrs.as_ptr(),
                );
            }
        }
        child_exit(&self.not_found)
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn bind(path: &CStr, flags: OFlag, target: RawFd) -> Result<(), Errno> {
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644))?;
    if fd != target {
        unistd::dup2(fd, target)?;
        unistd::close(fd)?;
    }
    Ok(())
}

fn bind_or_exit(redirect: &Redirect, flags: OFlag, target: RawFd) {
    if bind(&redirect.path, flags, target).is_err() {
        child_exit(&redirect.failure);
    }
}

fn bind_null(flags: OFlag, target: RawFd) {
    if bind(NULL_DEVICE, flags, target).is_err() {
        child_exit(b"cannot open /dev/null\n");
    }
}

fn child_exit(message: &[u8]) -> ! {
    signals::write_raw(libc::STDERR_FILENO, message);
    // SAFETY: _exit(2) skips atexit handlers and stdio flushing, which belong
    // to the parent's copy of the process.
    unsafe { libc::_exit(1) }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

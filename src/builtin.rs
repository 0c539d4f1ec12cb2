use crate::command::{CommandFactory, CommandLine, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::teardown::teardown;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands handled by the shell itself.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. Redirections and a trailing `&`
/// have no effect on them.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "status" or "cd".
    fn name() -> &'static str;

    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{e:#}")?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        command: &CommandLine,
    ) -> Option<Box<dyn ExecutableCommand>> {
        if command.program != T::name() {
            return None;
        }
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        Some(match T::from_args(&[T::name()], &args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => {
                if let Some(home) = env.get_var("HOME") {
                    PathBuf::from(home)
                } else {
                    return Err(anyhow::anyhow!("cd: no target and HOME not set"));
                }
            }
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print how the last foreground command ended.
pub struct Status {}

impl BuiltinCommand for Status {
    fn name() -> &'static str {
        "status"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.jobs.last_status())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Kill every background process and leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        teardown(&mut env.jobs, stdout);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobTable;
    use std::env as stdenv;
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_env() -> Environment {
        let flag: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(true)));
        Environment::with_jobs(JobTable::with_flag(4, flag))
    }

    fn make_unique_temp_dir() -> io::Result<PathBuf> {
        let mut p = stdenv::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("jobshell_test_cd_{}_{}", std::process::id(), nanos));
        fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn line(program: &str, args: &[&str]) -> CommandLine {
        CommandLine {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..CommandLine::default()
        }
    }

    #[test]
    fn test_status_reports_exit_code_then_signal() {
        let mut env = test_env();
        let mut out = Vec::new();
        Status {}.execute(&mut out, &mut env).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "exited with status 0\n");

        env.jobs.record_foreground_result(9, true);
        let mut out = Vec::new();
        Status {}.execute(&mut out, &mut env).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "died by signal 9\n");
    }

    #[test]
    fn test_exit_with_no_jobs_sets_flag_quietly() {
        let mut env = test_env();
        let mut out = Vec::new();
        let code = Exit { _args: vec![] }.execute(&mut out, &mut env).unwrap();
        assert_eq!(code, 0);
        assert!(env.should_exit);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_finishes_even_when_output_is_closed() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
        }

        let mut env = test_env();
        let child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn");
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        env.jobs.add(pid).unwrap();

        let code = Exit { _args: vec![] }.execute(&mut Closed, &mut env).unwrap();

        assert_eq!(code, 0);
        assert!(env.should_exit);
        assert!(env.jobs.is_empty());
        assert!(matches!(
            nix::sys::wait::waitpid(pid, None),
            Ok(nix::sys::wait::WaitStatus::Signaled(
                _,
                nix::sys::signal::Signal::SIGKILL,
                _
            ))
        ));
    }

    #[test]
    fn test_factory_matches_only_its_name() {
        let env = test_env();
        let factory = Factory::<Status>::default();
        assert!(factory.try_create(&env, &line("status", &[])).is_some());
        assert!(factory.try_create(&env, &line("statusx", &[])).is_none());
    }

    #[test]
    fn test_factory_reports_bad_arguments() {
        let mut env = test_env();
        let cmd = Factory::<Cd>::default()
            .try_create(&env, &line("cd", &["a", "b"]))
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(cmd.execute(&mut out, &mut env).unwrap(), 1);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = crate::lock_process_state();
        let temp = make_unique_temp_dir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let target = Some(canonical_temp.to_string_lossy().to_string());
        let res = Cd { target }.execute(&mut Vec::new(), &mut env);
        assert!(res.is_ok());

        let new_canonical = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        assert_eq!(new_canonical, canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = crate::lock_process_state();
        let temp = make_unique_temp_dir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let res = Cd { target: None }.execute(&mut Vec::new(), &mut env);
        assert!(res.is_ok());

        let new_canonical = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        assert_eq!(new_canonical, canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = crate::lock_process_state();
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let name = format!("nonexistent_dir_for_jobshell_test_{}", std::process::id());
        let res = Cd { target: Some(name) }.execute(&mut Vec::new(), &mut env);

        assert!(res.is_err());
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }
}

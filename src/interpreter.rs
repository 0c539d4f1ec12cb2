use crate::command::{CommandFactory, CommandLine, ExitCode};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::ShellError;
use crate::parser::{ParsedLine, parse_line};
use crate::{reaper, signals};
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyEvent,
    RepeatCount,
};
use std::io::{self, Write};
use tracing::warn;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Interactive loop: reap finished background work, read a line, dispatch it.
///
/// The interpreter owns the session [`Environment`] and a list of
/// [`CommandFactory`] objects queried in order; the first one that recognizes
/// the program name runs it. See [`Default`] for the built-in set.
///
/// Example
/// ```
/// use jobshell::Interpreter;
/// let mut sh = Interpreter::default();
/// let mut out = Vec::new();
/// let code = sh.execute_line_with_output("true", &mut out).unwrap();
/// assert_eq!(code, 0);
/// sh.execute_line_with_output("status", &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "exited with status 0\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    config: ShellConfig,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(config: ShellConfig, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        let env = Environment::new(config.capacity);
        Self::with_environment(config, env, commands)
    }

    pub fn with_environment(
        config: ShellConfig,
        env: Environment,
        commands: Vec<Box<dyn CommandFactory>>,
    ) -> Self {
        Self {
            env,
            commands,
            config,
        }
    }

    /// Interpreter with the default commands and the given settings.
    pub fn with_config(config: ShellConfig) -> Self {
        Self::new(config, default_commands())
    }

    /// Whether `exit` has run and the session is over.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parse and run one line, writing shell messages to `out`.
    ///
    /// Blank and comment lines do nothing. A background request while
    /// background mode is off runs the command in the foreground instead.
    pub fn execute_line_with_output(
        &mut self,
        line: &str,
        out: &mut dyn Write,
    ) -> anyhow::Result<ExitCode> {
        let parsed = parse_line(line, std::process::id()).map_err(ShellError::from)?;
        let mut command = match parsed {
            ParsedLine::Empty | ParsedLine::Comment => return Ok(0),
            ParsedLine::Command(command) => command,
        };

        if command.background && !self.env.jobs.background_allowed() {
            writeln!(out, "background launching is disabled; running in foreground")?;
            command.background = false;
        }

        self.run(&command, out)
    }

    /// Run an already parsed command.
    ///
    /// Returns the command's exit code or an error if it could not be started.
    pub fn run(&mut self, command: &CommandLine, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, command) {
                return cmd.execute(out, &mut self.env);
            }
        }
        Err(anyhow::anyhow!("command not found: {}", command.program))
    }

    /// Report and forget background processes that have finished.
    pub fn reap(&mut self, out: &mut dyn Write) -> io::Result<usize> {
        reaper::reap(&mut self.env.jobs, out)
    }

    /// Line-editing loop over standard input. Returns once `exit` has run or
    /// input ends.
    ///
    /// Installs the shell's signal handlers before the first prompt.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        signals::install()?;
        let mut rl = DefaultEditor::new()?;
        rl.bind_sequence(
            KeyEvent::ctrl('Z'),
            EventHandler::Conditional(Box::new(StopToggleKey)),
        );
        let mut stdout = io::stdout();

        while !self.env.should_exit {
            if let Err(e) = self.reap(&mut stdout) {
                warn!("reporting finished background processes: {e}");
            }

            match rl.readline(&self.config.prompt) {
                Ok(line) => {
                    if self.config.history && !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(e) = self.execute_line_with_output(&line, &mut stdout) {
                        eprintln!("jobshell: {e:#}");
                    }
                }
                // The shell itself is immune to interrupts at its prompt.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    self.execute_line_with_output("exit", &mut stdout)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `cd`, `status`, `exit`
    /// - external command launcher
    fn default() -> Self {
        Self::with_config(ShellConfig::default())
    }
}

fn default_commands() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    use crate::launcher::ExternalCommand;
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Status>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<ExternalCommand>::default()),
    ]
}

/// Ctrl-Z while editing: the terminal is in raw mode and generates no signal,
/// so raise it at ourselves and let the stop handler do the toggling.
struct StopToggleKey;

impl ConditionalEventHandler for StopToggleKey {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        _ctx: &EventContext,
    ) -> Option<Cmd> {
        if let Err(e) = signals::request_stop_toggle() {
            warn!("raising stop toggle: {e}");
        }
        Some(Cmd::Noop)
    }
}

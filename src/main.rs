use argh::FromArgs;
use jobshell::{DEFAULT_CAPACITY, Interpreter, ShellConfig};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter; overrides `--log-level`.
const LOG_ENV: &str = "JOBSHELL_LOG";

#[derive(FromArgs)]
/// Interactive command launcher with background jobs.
/// Ctrl-Z toggles whether a trailing `&` is honored.
struct Options {
    #[argh(option, default = "String::from(\": \")")]
    /// text shown before each line.
    prompt: String,

    #[argh(option, default = "DEFAULT_CAPACITY")]
    /// most background processes tracked at once.
    capacity: usize,

    #[argh(switch)]
    /// do not keep a line-editing history.
    no_history: bool,

    #[argh(option, default = "String::from(\"warn\")")]
    /// log filter used when JOBSHELL_LOG is unset, e.g. "debug".
    log_level: String,
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();
    init_logging(&options.log_level);

    let config = ShellConfig {
        prompt: options.prompt,
        capacity: options.capacity,
        history: !options.no_history,
    };
    tracing::debug!(?config, "starting");

    Interpreter::with_config(config).repl()
}

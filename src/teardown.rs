use crate::jobs::JobTable;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io::{self, Write};
use tracing::{info, warn};

/// What happened to the processes still tracked at exit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub killed: usize,
    pub already_gone: usize,
    pub failed: usize,
}

/// How one tracked process fared when it was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Killed,
    AlreadyGone,
    Failed(Errno),
}

/// Force-kill every tracked background process and empty the table.
///
/// Every process is signalled before anything is written, so a broken `out`
/// cannot leave a process running untracked. Entries are removed without
/// waiting for the kill to be observed. A process that no longer exists is not
/// an error.
pub fn teardown(jobs: &mut JobTable, out: &mut dyn Write) -> TeardownReport {
    let mut report = TeardownReport::default();
    if jobs.is_empty() {
        return report;
    }

    let outcomes: Vec<(Pid, Outcome)> = jobs
        .take_all()
        .into_iter()
        .map(|pid| {
            let outcome = match kill(pid, Signal::SIGKILL) {
                Ok(()) => Outcome::Killed,
                Err(Errno::ESRCH) => Outcome::AlreadyGone,
                Err(e) => {
                    warn!(%pid, "kill failed: {e}");
                    Outcome::Failed(e)
                }
            };
            (pid, outcome)
        })
        .collect();

    for (_, outcome) in &outcomes {
        match outcome {
            Outcome::Killed => report.killed += 1,
            Outcome::AlreadyGone => report.already_gone += 1,
            Outcome::Failed(_) => report.failed += 1,
        }
    }
    info!(?report, "background processes torn down");

    if let Err(e) = write_report(&outcomes, out) {
        warn!("reporting teardown: {e}");
    }
    report
}

fn write_report(outcomes: &[(Pid, Outcome)], out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "warning: killing {} background process(es)", outcomes.len())?;
    for (index, (pid, outcome)) in outcomes.iter().enumerate() {
        match outcome {
            Outcome::Killed => writeln!(out, "killed [{index}] {pid}")?,
            Outcome::AlreadyGone => writeln!(out, "[{index}] {pid} already gone")?,
            Outcome::Failed(e) => writeln!(out, "failed to kill [{index}] {pid}: {e}")?,
        }
    }
    out.flush()
}

use crate::jobs::JobTable;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use std::io::{self, Write};
use tracing::{debug, warn};

/// Collect every background process that has finished, without blocking.
///
/// Each finished process is reported on `out` and swap-removed from `jobs`;
/// processes still running are left for the next sweep. Returns how many
/// entries were removed.
pub fn reap(jobs: &mut JobTable, out: &mut dyn Write) -> io::Result<usize> {
    let mut reaped = 0;
    let mut index = 0;
    while let Some(pid) = jobs.get(index) {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, 0)) => {
                writeln!(out, "[{index}] {pid} finished")?;
            }
            Ok(WaitStatus::Exited(_, code)) => {
                writeln!(out, "[{index}] {pid} finished with exit status {code}")?;
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                writeln!(
                    out,
                    "[{index}] {pid} finished, terminated by signal {}",
                    signal as i32
                )?;
            }
            Ok(_) | Err(Errno::EINTR) => {
                index += 1;
                continue;
            }
            Err(Errno::ECHILD) => {
                warn!(%pid, "background entry is no longer a child of this shell; dropping it");
            }
            Err(e) => {
                warn!(%pid, "checking background process failed: {e}");
                index += 1;
                continue;
            }
        }
        debug!(%pid, slot = index, "reaped background process");
        jobs.swap_remove(index);
        reaped += 1;
    }
    if reaped > 0 {
        out.flush()?;
    }
    Ok(reaped)
}

//! Process-wide signal dispositions for the shell and its children.
//!
//! Handlers installed here run asynchronously with respect to the main loop.
//! They only store into atomics and call `write(2)`: no allocation, no locks,
//! no buffered I/O.

use crate::error::ShellError;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, warn};

static BACKGROUND_ALLOWED: AtomicBool = AtomicBool::new(true);
static INTERRUPTED: AtomicI32 = AtomicI32::new(0);

const DISABLED_NOTICE: &[u8] = b"\nbackground launching disabled\n";
const ENABLED_NOTICE: &[u8] = b"\nbackground launching enabled\n";

/// The toggle flipped by the terminal-stop handler.
pub fn background_flag() -> &'static AtomicBool {
    &BACKGROUND_ALLOWED
}

extern "C" fn toggle_background(_signal: libc::c_int) {
    let was_allowed = BACKGROUND_ALLOWED.fetch_xor(true, Ordering::SeqCst);
    let notice = if was_allowed {
        DISABLED_NOTICE
    } else {
        ENABLED_NOTICE
    };
    write_raw(libc::STDOUT_FILENO, notice);
}

extern "C" fn note_interrupt(signal: libc::c_int) {
    INTERRUPTED.store(signal, Ordering::SeqCst);
}

/// Unbuffered write usable from handler and post-fork context.
pub(crate) fn write_raw(fd: libc::c_int, bytes: &[u8]) {
    // SAFETY: write(2) is async-signal-safe and `bytes` is valid for its length.
    unsafe {
        libc::write(fd, bytes.as_ptr().cast(), bytes.len());
    }
}

fn set_disposition(signal: Signal, handler: SigHandler) -> Result<(), ShellError> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: the only handlers passed in are the atomic-only functions above.
    unsafe { signal::sigaction(signal, &action) }
        .map(drop)
        .map_err(|source| ShellError::SignalSetup { signal, source })
}

/// Install the shell's own dispositions: interrupts are ignored at the prompt
/// and the terminal-stop signal flips background mode.
pub fn install() -> Result<(), ShellError> {
    set_disposition(Signal::SIGINT, SigHandler::SigIgn)?;
    set_disposition(Signal::SIGTSTP, SigHandler::Handler(toggle_background))?;
    debug!("shell signal handlers installed");
    Ok(())
}

/// Deliver the terminal-stop signal to the shell itself.
///
/// Used by the line editor, which reads Ctrl-Z as a key rather than letting
/// the terminal generate the signal.
pub fn request_stop_toggle() -> Result<(), Errno> {
    signal::raise(Signal::SIGTSTP)
}

/// Interrupt handling for the duration of a foreground wait.
///
/// While armed, an interrupt is recorded instead of ignored. Dropping the
/// guard puts back the prompt disposition.
#[derive(Debug)]
pub struct InterruptNotice {
    _armed: (),
}

impl InterruptNotice {
    pub fn arm() -> Result<Self, ShellError> {
        INTERRUPTED.store(0, Ordering::SeqCst);
        set_disposition(Signal::SIGINT, SigHandler::Handler(note_interrupt))?;
        Ok(Self { _armed: () })
    }

    /// Signal number received while armed, if any.
    pub fn interrupted(&self) -> Option<i32> {
        match INTERRUPTED.load(Ordering::SeqCst) {
            0 => None,
            signal => Some(signal),
        }
    }
}

impl Drop for InterruptNotice {
    fn drop(&mut self) {
        if let Err(e) = set_disposition(Signal::SIGINT, SigHandler::SigIgn) {
            warn!("restoring prompt interrupt disposition: {e}");
        }
    }
}

/// Dispositions for a freshly forked child, before exec.
///
/// The stop toggle never reaches children. Background children ignore
/// interrupts; foreground children die on them.
pub(crate) fn prepare_child(background: bool) {
    let _ = set_disposition(Signal::SIGTSTP, SigHandler::SigIgn);
    let interrupt = if background {
        SigHandler::SigIgn
    } else {
        SigHandler::SigDfl
    };
    let _ = set_disposition(Signal::SIGINT, interrupt);
}

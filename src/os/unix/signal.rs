//! Process-wide interrupt flag for the message-queue backend.
//!
//! A receiver parked in `msgrcv` can only be unwound by a signal, so the
//! first receiver constructed in a process installs handlers for the usual
//! termination signals. The handler body stores into one atomic and
//! nothing else — that is the entire async-signal-safe budget. The receive
//! loop inspects the flag on `EINTR` wakeups to tell a deliberate shutdown
//! apart from a stray signal.

use crate::OrErrno;
use std::{
    io,
    mem::zeroed,
    sync::{
        atomic::{AtomicBool, Ordering},
        Once,
    },
};
use tracing::debug;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

extern "C" fn flag_handler(_signum: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Whether one of the handled signals has been delivered to this process.
pub(crate) fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Installs the handlers exactly once per process. Subsequent calls are
/// no-ops, including from other channels.
pub(crate) fn install_hook() {
    INSTALL.call_once(|| {
        // SIGKILL cannot be caught; the OS refuses the registration and we
        // move on.
        for signum in [libc::SIGINT, libc::SIGQUIT, libc::SIGTERM, libc::SIGKILL] {
            if let Err(e) = install(signum) {
                debug!("signal {signum} not hooked: {e}");
            }
        }
    });
}

fn install(signum: libc::c_int) -> io::Result<()> {
    let mut action: libc::sigaction = unsafe { zeroed() };
    let handler: extern "C" fn(libc::c_int) = flag_handler;
    action.sa_sigaction = handler as usize;
    // No SA_RESTART: the blocking receive must observe EINTR.
    action.sa_flags = 0;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        (libc::sigaction(signum, &action, std::ptr::null_mut()) != -1).true_val_or_errno(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_mechanics() {
        install_hook();
        install_hook(); // second call must be a no-op
        flag_handler(libc::SIGINT);
        assert!(interrupted(), "the handler must raise the process-wide flag");
        INTERRUPTED.store(false, Ordering::Relaxed);
    }
}

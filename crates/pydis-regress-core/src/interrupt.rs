//! Process-wide interrupt flag.
//!
//! Once [`install`] has run, SIGINT no longer kills the process; it raises a flag that the
//! orchestrator and pipeline poll so the run can end with a clean diagnostic. Child
//! processes in the foreground group still receive the signal themselves.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub fn install() -> anyhow::Result<()> {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    let prev = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if prev == libc::SIG_ERR {
        anyhow::bail!(
            "install SIGINT handler: {}",
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> anyhow::Result<()> {
    Ok(())
}

pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raises the flag as if SIGINT had arrived.
pub fn raise() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn clear() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

//! The sending half of a named-pipe channel.

use super::super::c_wrappers;
use crate::{antidote, os::windows::winprelude::*};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};
use tracing::{error, info};
use widestring::{U16CStr, U16CString};
use windows_sys::Win32::Foundation::{
    ERROR_BROKEN_PIPE, ERROR_NO_DATA, ERROR_PIPE_BUSY, ERROR_PIPE_NOT_CONNECTED,
};

const CONNECT_ATTEMPTS: u32 = 30;
const CONNECT_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) struct PipeSender {
    name: String,
    path: U16CString,
    /// `None` until the first send connects, and again after a broken
    /// connection is dropped pending reconnect.
    handle: Mutex<Option<OwnedHandle>>,
    removed: AtomicBool,
}

impl PipeSender {
    pub(super) fn new(name: &str, path: U16CString) -> Self {
        // Deliberately no OS interaction here: the receiver may well not
        // exist yet, and the first send will wait for it.
        Self {
            name: name.to_owned(),
            path,
            handle: Mutex::new(None),
            removed: AtomicBool::new(false),
        }
    }

    pub(super) fn send(&self, payload: &[u8]) -> bool {
        if self.removed.load(Ordering::SeqCst) {
            error!("send on removed channel {:?}", self.name);
            return false;
        }
        let mut slot = self.handle.lock().unwrap_or_else(antidote);
        if slot.is_none() {
            match connect(&self.path) {
                Ok(handle) => *slot = Some(handle),
                Err(e) => {
                    error!("cannot connect to {:?}: {e}", self.name);
                    return false;
                }
            }
        }
        let Some(handle) = slot.as_ref() else { return false };
        match write_all(handle.as_handle(), payload) {
            Ok(()) => true,
            Err(e) if is_disconnect(&e) => {
                // The receiver went away, possibly to be restarted. One
                // reconnect, one resend.
                info!("receiver for {:?} is gone, reconnecting", self.name);
                *slot = None;
                match connect(&self.path) {
                    Ok(handle) => {
                        let sent = match write_all(handle.as_handle(), payload) {
                            Ok(()) => true,
                            Err(e) => {
                                error!("resend to {:?} failed: {e}", self.name);
                                false
                            }
                        };
                        *slot = Some(handle);
                        sent
                    }
                    Err(e) => {
                        error!("cannot reconnect to {:?}: {e}", self.name);
                        false
                    }
                }
            }
            Err(e) => {
                error!("failed to send {} bytes to {:?}: {e}", payload.len(), self.name);
                false
            }
        }
    }

    pub(super) fn remove(&self) -> bool {
        if self.removed.swap(true, Ordering::SeqCst) {
            return true;
        }
        // Dropping the handle disconnects the client end; the server's
        // reader observes a broken pipe and retires itself.
        self.handle.lock().unwrap_or_else(antidote).take();
        true
    }
}

/// Waits for a server instance to come up and opens the client handle,
/// retrying on a 100 ms cadence for about three seconds in total.
fn connect(path: &U16CStr) -> io::Result<OwnedHandle> {
    let interval_ms = CONNECT_INTERVAL.as_millis() as u32;
    let mut last_err = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match c_wrappers::wait_pipe(path, interval_ms) {
            Ok(()) => match c_wrappers::open_sender(path) {
                Ok(handle) => return Ok(handle),
                // Lost the race for the posted instance; wait for the next one.
                Err(e) if c_wrappers::error_code(&e) == Some(ERROR_PIPE_BUSY) => last_err = Some(e),
                Err(e) => return Err(e),
            },
            // No server instance exists at all yet; the wait call fails
            // without pausing, so pace the loop ourselves.
            Err(e) => {
                last_err = Some(e);
                thread::sleep(CONNECT_INTERVAL);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::TimedOut)))
}

fn write_all(handle: BorrowedHandle<'_>, payload: &[u8]) -> io::Result<()> {
    let written = c_wrappers::write(handle, payload)?;
    if written != payload.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short pipe write: {written} of {} bytes", payload.len()),
        ));
    }
    Ok(())
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        c_wrappers::error_code(e),
        Some(ERROR_PIPE_NOT_CONNECTED) | Some(ERROR_NO_DATA) | Some(ERROR_BROKEN_PIPE),
    )
}

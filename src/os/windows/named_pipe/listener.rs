//! The receiving half of a named-pipe channel: acceptor, per-connection
//! readers, and the shared receive queue.

use super::{super::c_wrappers, IO_BUFFER_SIZE};
use crate::{
    antidote,
    buffer::Buffer,
    error::SetupError,
    os::windows::winprelude::*,
};
use std::{
    collections::VecDeque,
    io, mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, error, info, warn};
use widestring::U16CString;
use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_BROKEN_PIPE, ERROR_MORE_DATA};

/// Backoff between retries when instance creation hits a transient error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// State shared between the owning channel, the acceptor and the readers.
struct Shared {
    name: String,
    path: U16CString,
    /// Monotonic: set once by `remove`, never cleared.
    stop: AtomicBool,
    /// Manual-reset event paired with `stop`; unblocks every overlapped
    /// wait in one shot.
    stop_event: OwnedHandle,
    queue: Mutex<VecDeque<Buffer>>,
    queue_cv: Condvar,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

pub(crate) struct PipeListener {
    shared: Arc<Shared>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    removed: AtomicBool,
}

impl PipeListener {
    pub(super) fn open(name: &str, path: U16CString) -> Result<Self, SetupError> {
        // The first instance is created synchronously, with the
        // first-instance flag, so that a second receiver on the same name
        // is caught right here instead of in the acceptor thread.
        let first_instance =
            c_wrappers::create_instance(&path, true, IO_BUFFER_SIZE).map_err(|e| {
                if c_wrappers::error_code(&e) == Some(ERROR_ACCESS_DENIED) {
                    SetupError::PipeInUse { name: name.to_owned(), source: e }
                } else {
                    SetupError::CreatePipe { name: name.to_owned(), source: e }
                }
            })?;
        let stop_event = c_wrappers::create_event()
            .map_err(|e| SetupError::CreateStopEvent { name: name.to_owned(), source: e })?;
        let shared = Arc::new(Shared {
            name: name.to_owned(),
            path,
            stop: AtomicBool::new(false),
            stop_event,
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            readers: Mutex::new(Vec::new()),
        });
        let acceptor = thread::Builder::new()
            .name(format!("pipe-accept {name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                move || accept_loop(&shared, first_instance)
            })
            .map_err(|e| SetupError::SpawnAcceptor { name: name.to_owned(), source: e })?;
        Ok(Self {
            shared,
            acceptor: Mutex::new(Some(acceptor)),
            removed: AtomicBool::new(false),
        })
    }

    pub(super) fn receive(&self) -> Option<Buffer> {
        let mut queue = self.shared.queue.lock().unwrap_or_else(antidote);
        loop {
            if let Some(message) = queue.pop_front() {
                return Some(message);
            }
            if self.shared.stop.load(Ordering::Acquire) {
                return None;
            }
            queue = self.shared.queue_cv.wait(queue).unwrap_or_else(antidote);
        }
    }

    /// Tears the server down: stop flag, stop event, condvar wakeup, then
    /// the join barrier — acceptor first so no new readers appear, then
    /// every reader. The queue mutex is never held across a join.
    pub(super) fn remove(&self) -> bool {
        if self.removed.swap(true, Ordering::SeqCst) {
            return true;
        }
        let shared = &self.shared;
        shared.stop.store(true, Ordering::Release);
        if let Err(e) = c_wrappers::set_event(shared.stop_event.as_handle()) {
            error!("failed to signal the stop event for {:?}: {e}", shared.name);
        }
        shared.queue_cv.notify_all();
        if let Some(acceptor) = self.acceptor.lock().unwrap_or_else(antidote).take() {
            if acceptor.join().is_err() {
                error!("acceptor thread for {:?} panicked", shared.name);
            }
        }
        let readers = mem::take(&mut *shared.readers.lock().unwrap_or_else(antidote));
        for reader in readers {
            if reader.join().is_err() {
                error!("reader thread for {:?} panicked", shared.name);
            }
        }
        let mut queue = shared.queue.lock().unwrap_or_else(antidote);
        if !queue.is_empty() {
            warn!("discarding {} unconsumed messages on {:?}", queue.len(), shared.name);
            queue.clear();
        }
        true
    }
}

fn accept_loop(shared: &Arc<Shared>, first_instance: OwnedHandle) {
    debug!("pipe server for {:?} listening", shared.name);
    let mut posted = Some(first_instance);
    while !shared.stop.load(Ordering::Acquire) {
        let instance = match posted.take() {
            Some(instance) => instance,
            None => match c_wrappers::create_instance(&shared.path, false, IO_BUFFER_SIZE) {
                Ok(instance) => instance,
                Err(e) => {
                    if shared.stop.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("could not post a pipe instance for {:?}: {e}", shared.name);
                    thread::sleep(ACCEPT_BACKOFF);
                    continue;
                }
            },
        };
        match accept_one(shared, instance.as_handle()) {
            // Stop event won the wait.
            Ok(false) => break,
            Ok(true) => spawn_reader(shared, instance),
            Err(e) => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                warn!("accept on {:?} failed: {e}", shared.name);
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    debug!("pipe server for {:?} exiting", shared.name);
}

/// Posts an asynchronous accept on `instance` and waits it out against
/// the stop event. `Ok(true)` is a connected client.
fn accept_one(shared: &Shared, instance: BorrowedHandle<'_>) -> io::Result<bool> {
    let connect_event = c_wrappers::create_event()?;
    let mut overlapped = c_wrappers::overlapped_with_event(connect_event.as_handle());
    if c_wrappers::connect_start(instance, &mut overlapped)? {
        return Ok(true);
    }
    // From here the kernel owns `overlapped`; every exit path below must
    // go through completion or cancellation first.
    match c_wrappers::wait_two(shared.stop_event.as_handle(), connect_event.as_handle()) {
        Ok(0) => {
            c_wrappers::cancel_io(instance, &mut overlapped);
            Ok(false)
        }
        Ok(_) => {
            c_wrappers::overlapped_result(instance, &mut overlapped)?;
            Ok(true)
        }
        Err(e) => {
            c_wrappers::cancel_io(instance, &mut overlapped);
            Err(e)
        }
    }
}

fn spawn_reader(shared: &Arc<Shared>, instance: OwnedHandle) {
    let spawned = thread::Builder::new().name(format!("pipe-read {}", shared.name)).spawn({
        let shared = Arc::clone(shared);
        move || read_loop(&shared, instance)
    });
    match spawned {
        Ok(handle) => shared.readers.lock().unwrap_or_else(antidote).push(handle),
        Err(e) => error!("could not spawn a reader thread for {:?}: {e}", shared.name),
    }
}

/// Drains one connection into the shared queue until the sender goes
/// away, the read fails, or the channel shuts down.
fn read_loop(shared: &Shared, instance: OwnedHandle) {
    let read_event = match c_wrappers::create_event() {
        Ok(event) => event,
        Err(e) => {
            error!("could not create a read event for {:?}: {e}", shared.name);
            return;
        }
    };
    debug!("sender connected to {:?}", shared.name);
    let mut buf = [0_u8; IO_BUFFER_SIZE as usize];
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let mut overlapped = c_wrappers::overlapped_with_event(read_event.as_handle());
        let started = match c_wrappers::read_start(instance.as_handle(), &mut buf, &mut overlapped) {
            Ok(done) => done,
            Err(e) => {
                report_read_end(shared, &e);
                break;
            }
        };
        if !started {
            match c_wrappers::wait_two(shared.stop_event.as_handle(), read_event.as_handle()) {
                Ok(0) => {
                    c_wrappers::cancel_io(instance.as_handle(), &mut overlapped);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    c_wrappers::cancel_io(instance.as_handle(), &mut overlapped);
                    error!("wait on {:?} failed: {e}", shared.name);
                    break;
                }
            }
        }
        let message = match c_wrappers::overlapped_result(instance.as_handle(), &mut overlapped) {
            Ok(0) => None, // zero-length message-mode write; nothing to enqueue
            Ok(n) => Some(buf[..n].to_vec()),
            Err(e) if c_wrappers::error_code(&e) == Some(ERROR_MORE_DATA) => {
                match read_remainder(shared, instance.as_handle(), read_event.as_handle(), &buf) {
                    Ok(message) => message,
                    Err(e) => {
                        report_read_end(shared, &e);
                        break;
                    }
                }
            }
            Err(e) => {
                report_read_end(shared, &e);
                break;
            }
        };
        if let Some(bytes) = message {
            let mut queue = shared.queue.lock().unwrap_or_else(antidote);
            queue.push_back(Buffer::new(bytes));
            drop(queue);
            shared.queue_cv.notify_one();
        }
    }
    let _ = c_wrappers::flush(instance.as_handle());
    let _ = c_wrappers::disconnect(instance.as_handle());
    debug!("reader for {:?} retired", shared.name);
}

/// Reassembles a message that outgrew the read buffer: the first chunk
/// filled `head` to the brim, the rest is still queued in the pipe.
/// `Ok(None)` means the shutdown event cut the read short.
fn read_remainder(
    shared: &Shared,
    instance: BorrowedHandle<'_>,
    read_event: BorrowedHandle<'_>,
    head: &[u8],
) -> io::Result<Option<Vec<u8>>> {
    let left = c_wrappers::peek_remaining(instance)?;
    let mut message = Vec::with_capacity(head.len() + left);
    message.extend_from_slice(head);
    let split = message.len();
    message.resize(split + left, 0);
    let mut overlapped = c_wrappers::overlapped_with_event(read_event);
    let started = c_wrappers::read_start(instance, &mut message[split..], &mut overlapped)?;
    if !started {
        match c_wrappers::wait_two(shared.stop_event.as_handle(), read_event) {
            Ok(0) => {
                c_wrappers::cancel_io(instance, &mut overlapped);
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) => {
                c_wrappers::cancel_io(instance, &mut overlapped);
                return Err(e);
            }
        }
    }
    let n = c_wrappers::overlapped_result(instance, &mut overlapped)?;
    message.truncate(split + n);
    Ok(Some(message))
}

fn report_read_end(shared: &Shared, e: &io::Error) {
    if c_wrappers::error_code(e) == Some(ERROR_BROKEN_PIPE) {
        info!("sender disconnected from {:?}", shared.name);
    } else {
        error!("read on {:?} failed: {e}", shared.name);
    }
}

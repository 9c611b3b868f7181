//! The System V message-queue channel.
//!
//! The receiver creates the queue exclusively and removes it when done;
//! senders attach lazily on their first send. Payloads travel inside a
//! fixed frame — the mandatory `mtype` word, a length field, then the
//! bytes — and the length field is cross-checked against the byte count
//! the kernel reports on the way out.

use super::{c_wrappers, signal};
use crate::{
    buffer::Buffer,
    error::SetupError,
    key::{self, RESERVED_KEY},
    node::Direction,
};
use libc::{c_long, key_t, EEXIST, EIDRM, EINTR, EINVAL};
use std::{
    io,
    mem::size_of,
    process,
    sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
};
use tracing::{debug, error, info};

/// Fixed System V message type tag; receive filters with 0 (any type).
const MTYPE: c_long = 1;
const MTYPE_LEN: usize = size_of::<c_long>();
const SIZE_LEN: usize = size_of::<usize>();

pub(crate) struct MsgQueue {
    name: String,
    direction: Direction,
    key: key_t,
    /// −1 until the queue is attached, then the queue id; reset to −1 by
    /// removal.
    msgid: AtomicI32,
    /// `msg_qbytes` of the attached queue; meaningless while unattached.
    max_msg_size: AtomicUsize,
    removed: AtomicBool,
}

impl MsgQueue {
    pub(crate) fn open(name: &str, direction: Direction) -> Result<Self, SetupError> {
        let key_bits = key::derive(name);
        if key_bits == RESERVED_KEY {
            return Err(SetupError::ReservedKey { name: name.to_owned() });
        }
        let chan = Self {
            name: name.to_owned(),
            direction,
            key: key_bits as key_t,
            msgid: AtomicI32::new(-1),
            max_msg_size: AtomicUsize::new(0),
            removed: AtomicBool::new(false),
        };
        if direction == Direction::Receiver {
            chan.create()?;
        }
        // A sender touches nothing at construction; a queue that does not
        // exist yet fails the first send instead.
        Ok(chan)
    }

    fn create(&self) -> Result<(), SetupError> {
        signal::install_hook();
        let key_bits = self.key as u32;
        let id = c_wrappers::create_queue_exclusive(self.key).map_err(|e| {
            if e.raw_os_error() == Some(EEXIST) {
                SetupError::ReceiverExists { name: self.name.clone(), key: key_bits, source: e }
            } else {
                SetupError::CreateQueue { name: self.name.clone(), key: key_bits, source: e }
            }
        })?;
        let max = match c_wrappers::queue_max_bytes(id) {
            Ok(max) => max,
            Err(e) => {
                // Don't leave an orphaned queue behind on a failed stat.
                let _ = c_wrappers::remove_queue(id);
                return Err(SetupError::QueueMetadata { name: self.name.clone(), source: e });
            }
        };
        self.max_msg_size.store(max, Ordering::Relaxed);
        self.msgid.store(id, Ordering::Release);
        debug!("created message queue {:?} (key {key_bits:#010x}, id {id}, max {max} bytes)", self.name);
        Ok(())
    }

    /// Resolves the queue id, attaching on the sending side if this is the
    /// first send. Receivers are always attached by construction.
    fn attach(&self) -> io::Result<(i32, usize)> {
        let id = self.msgid.load(Ordering::Acquire);
        if id != -1 {
            return Ok((id, self.max_msg_size.load(Ordering::Relaxed)));
        }
        let id = c_wrappers::open_queue(self.key)?;
        let max = c_wrappers::queue_max_bytes(id)?;
        self.max_msg_size.store(max, Ordering::Relaxed);
        self.msgid.store(id, Ordering::Release);
        debug!("attached to message queue {:?} (id {id}, max {max} bytes)", self.name);
        Ok((id, max))
    }

    pub(crate) fn send(&self, payload: &[u8]) -> bool {
        let (id, max) = match self.attach() {
            Ok(attached) => attached,
            Err(e) => {
                error!("no receiver queue for {:?}: {e}", self.name);
                return false;
            }
        };
        let text_len = SIZE_LEN + payload.len();
        if text_len > max {
            error!(
                "message of {} bytes exceeds the {} byte limit of queue {:?}",
                payload.len(),
                max.saturating_sub(SIZE_LEN),
                self.name,
            );
            return false;
        }
        let mut frame = vec![0_u8; MTYPE_LEN + text_len];
        let base = frame.as_mut_ptr();
        unsafe {
            // The allocation is byte-aligned, hence the unaligned stores.
            base.cast::<c_long>().write_unaligned(MTYPE);
            base.add(MTYPE_LEN).cast::<usize>().write_unaligned(payload.len());
        }
        frame[MTYPE_LEN + SIZE_LEN..].copy_from_slice(payload);
        match unsafe { c_wrappers::send_msg(id, frame.as_ptr(), text_len) } {
            Ok(()) => true,
            Err(e) => {
                error!("failed to send {} bytes on {:?}: {e}", payload.len(), self.name);
                false
            }
        }
    }

    pub(crate) fn receive(&self) -> Option<Buffer> {
        let id = self.msgid.load(Ordering::Acquire);
        if id == -1 {
            return None;
        }
        let max = self.max_msg_size.load(Ordering::Relaxed);
        let mut frame = vec![0_u8; MTYPE_LEN + max];
        let text_len = match unsafe { c_wrappers::recv_msg(id, frame.as_mut_ptr(), max) } {
            Ok(n) => n,
            Err(e) if e.raw_os_error() == Some(EINTR) => {
                if signal::interrupted() {
                    info!("receive on {:?} interrupted by signal, shutting down", self.name);
                    self.remove();
                    process::exit(0);
                }
                return None;
            }
            Err(e) if matches!(e.raw_os_error(), Some(EIDRM) | Some(EINVAL)) => {
                debug!("queue {:?} removed while receiving", self.name);
                return None;
            }
            Err(e) => {
                error!("failed to receive on {:?}: {e}", self.name);
                return None;
            }
        };
        if text_len < SIZE_LEN {
            error!("runt frame of {text_len} bytes on {:?}", self.name);
            return None;
        }
        let claimed = unsafe { frame.as_ptr().add(MTYPE_LEN).cast::<usize>().read_unaligned() };
        if claimed != text_len - SIZE_LEN {
            error!(
                "frame on {:?} claims {claimed} payload bytes but carries {}",
                self.name,
                text_len - SIZE_LEN,
            );
            return None;
        }
        let payload = &frame[MTYPE_LEN + SIZE_LEN..MTYPE_LEN + SIZE_LEN + claimed];
        Some(Buffer::new(payload.to_vec()))
    }

    pub(crate) fn remove(&self) -> bool {
        if self.direction != Direction::Receiver {
            // Senders never own the queue; nothing to release.
            return true;
        }
        if self.removed.swap(true, Ordering::SeqCst) {
            return true;
        }
        let id = self.msgid.swap(-1, Ordering::SeqCst);
        if id == -1 {
            return true;
        }
        match c_wrappers::remove_queue(id) {
            Ok(()) => {
                debug!("removed message queue {:?}", self.name);
                true
            }
            // Somebody beat us to it; the queue is gone either way.
            Err(e) if matches!(e.raw_os_error(), Some(EINVAL) | Some(EIDRM)) => true,
            Err(e) => {
                error!("failed to remove message queue {:?}: {e}", self.name);
                false
            }
        }
    }
}

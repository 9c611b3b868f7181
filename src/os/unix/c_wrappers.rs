//! Thin wrappers around the System V message-queue syscalls, converting
//! the C error convention into `io::Result`.

use crate::OrErrno;
use libc::{c_int, key_t, msqid_ds};
use std::{io, mem::zeroed, ptr};

pub(super) fn create_queue_exclusive(key: key_t) -> io::Result<c_int> {
    let id = unsafe { libc::msgget(key, libc::IPC_CREAT | libc::IPC_EXCL | 0o666) };
    (id != -1).true_val_or_errno(id)
}

pub(super) fn open_queue(key: key_t) -> io::Result<c_int> {
    let id = unsafe { libc::msgget(key, 0) };
    (id != -1).true_val_or_errno(id)
}

/// Reads the queue's configured capacity in bytes, which doubles as the
/// largest message the queue will accept.
pub(super) fn queue_max_bytes(id: c_int) -> io::Result<usize> {
    let mut ds: msqid_ds = unsafe { zeroed() };
    unsafe { libc::msgctl(id, libc::IPC_STAT, &mut ds) != -1 }
        .true_or_errno(|| ds.msg_qbytes as usize)
}

pub(super) fn remove_queue(id: c_int) -> io::Result<()> {
    unsafe { libc::msgctl(id, libc::IPC_RMID, ptr::null_mut()) != -1 }.true_val_or_errno(())
}

/// Submits one message without blocking; a full queue fails with `EAGAIN`
/// instead of parking the sender. `frame` must point to a System V message
/// buffer — an `mtype` word followed by `msgsz` bytes of message text.
///
/// # Safety
/// `frame` must be valid for reads of `size_of::<c_long>() + msgsz` bytes.
pub(super) unsafe fn send_msg(id: c_int, frame: *const u8, msgsz: usize) -> io::Result<()> {
    unsafe { libc::msgsnd(id, frame.cast(), msgsz, libc::IPC_NOWAIT) != -1 }.true_val_or_errno(())
}

/// Blocks until a message of any type arrives and returns the length of
/// its message text.
///
/// # Safety
/// `buf` must be valid for writes of `size_of::<c_long>() + maxsz` bytes.
pub(super) unsafe fn recv_msg(id: c_int, buf: *mut u8, maxsz: usize) -> io::Result<usize> {
    let n = unsafe { libc::msgrcv(id, buf.cast(), maxsz, 0, 0) };
    (n != -1).true_or_errno(|| n as usize)
}

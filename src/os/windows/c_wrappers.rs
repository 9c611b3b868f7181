//! Thin wrappers around the named-pipe and synchronization Win32 calls,
//! converting the C error convention into `io::Result`.

use super::winprelude::*;
use crate::{HandleOrErrno, OrErrno};
use std::{io, mem::zeroed, ptr};
use widestring::U16CStr;
use windows_sys::Win32::{
    Foundation::{
        ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_PIPE_CONNECTED, GENERIC_WRITE, WAIT_OBJECT_0,
    },
    Storage::FileSystem::{
        CreateFileW, FlushFileBuffers, ReadFile, WriteFile, FILE_FLAG_FIRST_PIPE_INSTANCE,
        FILE_FLAG_OVERLAPPED, OPEN_EXISTING,
    },
    System::{
        Pipes::{
            ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PeekNamedPipe,
            WaitNamedPipeW, PIPE_ACCESS_INBOUND, PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE,
            PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
        },
        Threading::{CreateEventW, SetEvent, WaitForMultipleObjects, INFINITE},
        IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED},
    },
};

pub(super) fn error_code(e: &io::Error) -> Option<u32> {
    e.raw_os_error().map(|code| code as u32)
}

/// Creates one overlapped, inbound, message-mode server instance of the
/// pipe. Every accepted connection gets its own instance, so the instance
/// limit is left unbounded. The `first` flag makes creation fail with
/// access-denied if another process already serves this pipe name, which
/// is how a duplicate receiver is caught at construction.
pub(super) fn create_instance(path: &U16CStr, first: bool, buffer_size: u32) -> io::Result<OwnedHandle> {
    let mut open_mode = PIPE_ACCESS_INBOUND | FILE_FLAG_OVERLAPPED;
    if first {
        open_mode |= FILE_FLAG_FIRST_PIPE_INSTANCE;
    }
    unsafe {
        CreateNamedPipeW(
            path.as_ptr(),
            open_mode,
            PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
            PIPE_UNLIMITED_INSTANCES,
            buffer_size,
            buffer_size,
            0, // default wait timeout
            ptr::null(),
        )
        .handle_or_errno()
        .map(|h| OwnedHandle::from_raw_handle(h))
    }
}

/// Creates an unnamed manual-reset event, initially unsignaled.
/// Manual-reset matters for the stop event: once set it stays set, so
/// every thread that waits on it afterwards falls through immediately.
pub(super) fn create_event() -> io::Result<OwnedHandle> {
    let handle = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
    // Event creation reports failure as a null handle, not INVALID_HANDLE_VALUE.
    (!handle.is_null()).true_or_errno(|| unsafe { OwnedHandle::from_raw_handle(handle) })
}

pub(super) fn set_event(event: BorrowedHandle<'_>) -> io::Result<()> {
    unsafe { SetEvent(event.as_raw_handle()) != 0 }.true_val_or_errno(())
}

/// Blocks until one of the two handles signals and returns its index.
pub(super) fn wait_two(first: BorrowedHandle<'_>, second: BorrowedHandle<'_>) -> io::Result<usize> {
    let handles: [HANDLE; 2] = [first.as_raw_handle(), second.as_raw_handle()];
    let status = unsafe { WaitForMultipleObjects(2, handles.as_ptr(), 0, INFINITE) };
    match status.wrapping_sub(WAIT_OBJECT_0) {
        index @ 0..=1 => Ok(index as usize),
        _ => Err(io::Error::last_os_error()),
    }
}

pub(super) fn overlapped_with_event(event: BorrowedHandle<'_>) -> OVERLAPPED {
    let mut overlapped: OVERLAPPED = unsafe { zeroed() };
    overlapped.hEvent = event.as_raw_handle();
    overlapped
}

/// Begins an asynchronous accept on a server instance. `Ok(true)` means a
/// client was already connected; `Ok(false)` means the accept is pending
/// and will signal the overlapped event.
pub(super) fn connect_start(pipe: BorrowedHandle<'_>, overlapped: &mut OVERLAPPED) -> io::Result<bool> {
    if unsafe { ConnectNamedPipe(pipe.as_raw_handle(), overlapped) } != 0 {
        return Ok(true);
    }
    let e = io::Error::last_os_error();
    match error_code(&e) {
        Some(ERROR_IO_PENDING) => Ok(false),
        Some(ERROR_PIPE_CONNECTED) => Ok(true),
        _ => Err(e),
    }
}

/// Begins an asynchronous read. `Ok(true)` means the operation already
/// completed (the event is signaled and `overlapped_result` will not
/// block); `Ok(false)` means it is pending.
pub(super) fn read_start(
    pipe: BorrowedHandle<'_>,
    buf: &mut [u8],
    overlapped: &mut OVERLAPPED,
) -> io::Result<bool> {
    let len = u32::try_from(buf.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read buffer too large for ReadFile"))?;
    let ok = unsafe {
        ReadFile(pipe.as_raw_handle(), buf.as_mut_ptr().cast(), len, ptr::null_mut(), overlapped) != 0
    };
    if ok {
        return Ok(true);
    }
    let e = io::Error::last_os_error();
    match error_code(&e) {
        Some(ERROR_IO_PENDING) => Ok(false),
        // A synchronous completion that only filled the buffer partway
        // through the message; `overlapped_result` reports it again with
        // the transfer count.
        Some(ERROR_MORE_DATA) => Ok(true),
        _ => Err(e),
    }
}

/// Harvests a completed overlapped operation's transfer count. Must only
/// be called once the operation's event has signaled.
pub(super) fn overlapped_result(pipe: BorrowedHandle<'_>, overlapped: &mut OVERLAPPED) -> io::Result<usize> {
    let mut transferred: u32 = 0;
    unsafe { GetOverlappedResult(pipe.as_raw_handle(), overlapped, &mut transferred, 0) != 0 }
        .true_or_errno(|| transferred as usize)
}

/// Cancels an in-flight overlapped operation and waits out its
/// completion, so the kernel is finished with `overlapped` before the
/// caller's stack frame goes away.
pub(super) fn cancel_io(pipe: BorrowedHandle<'_>, overlapped: &mut OVERLAPPED) {
    unsafe {
        CancelIoEx(pipe.as_raw_handle(), overlapped);
        let mut transferred: u32 = 0;
        GetOverlappedResult(pipe.as_raw_handle(), overlapped, &mut transferred, 1);
    }
}

/// Bytes of the current message still sitting in the pipe past what has
/// already been read out.
pub(super) fn peek_remaining(pipe: BorrowedHandle<'_>) -> io::Result<usize> {
    let mut left: u32 = 0;
    unsafe {
        PeekNamedPipe(pipe.as_raw_handle(), ptr::null_mut(), 0, ptr::null_mut(), ptr::null_mut(), &mut left) != 0
    }
    .true_or_errno(|| left as usize)
}

pub(super) fn flush(pipe: BorrowedHandle<'_>) -> io::Result<()> {
    unsafe { FlushFileBuffers(pipe.as_raw_handle()) != 0 }.true_val_or_errno(())
}

pub(super) fn disconnect(pipe: BorrowedHandle<'_>) -> io::Result<()> {
    unsafe { DisconnectNamedPipe(pipe.as_raw_handle()) != 0 }.true_val_or_errno(())
}

/// Waits for a server instance of the pipe to become available for
/// connection, up to `timeout_ms`.
pub(super) fn wait_pipe(path: &U16CStr, timeout_ms: u32) -> io::Result<()> {
    unsafe { WaitNamedPipeW(path.as_ptr(), timeout_ms) != 0 }.true_val_or_errno(())
}

/// Opens the client (sending) end of the pipe.
pub(super) fn open_sender(path: &U16CStr) -> io::Result<OwnedHandle> {
    unsafe {
        CreateFileW(
            path.as_ptr(),
            GENERIC_WRITE,
            0,
            ptr::null(),
            OPEN_EXISTING,
            0,
            ptr::null_mut(),
        )
        .handle_or_errno()
        .map(|h| OwnedHandle::from_raw_handle(h))
    }
}

/// Synchronous write of one message; returns the byte count the OS
/// reports as written.
pub(super) fn write(pipe: BorrowedHandle<'_>, buf: &[u8]) -> io::Result<usize> {
    let len = u32::try_from(buf.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large for WriteFile"))?;
    let mut written: u32 = 0;
    unsafe {
        WriteFile(pipe.as_raw_handle(), buf.as_ptr().cast(), len, &mut written, ptr::null_mut()) != 0
    }
    .true_or_errno(|| written as usize)
}

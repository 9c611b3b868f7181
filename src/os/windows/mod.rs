//! Windows-specific plumbing: the overlapped-I/O named-pipe channel.

mod c_wrappers;

pub(crate) mod named_pipe;

pub(crate) mod winprelude {
    pub(crate) use std::os::windows::prelude::*;
    pub(crate) use windows_sys::Win32::Foundation::HANDLE;
}

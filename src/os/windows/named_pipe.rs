//! The named-pipe channel.
//!
//! The receiving side is a small pipe server: an acceptor thread keeps a
//! fresh overlapped server instance posted at `\\.\pipe\<name>` and hands
//! every accepted connection to a dedicated reader thread, which funnels
//! whole messages into one in-process queue that `receive` drains. The
//! sending side is a lazily connected client handle that reconnects once
//! if the receiver is restarted underneath it.

mod listener;
mod sender;

use self::{listener::PipeListener, sender::PipeSender};
use crate::{buffer::Buffer, error::SetupError, node::Direction};
use widestring::U16CString;

const PIPE_PREFIX: &str = r"\\.\pipe\";
/// Size of each instance's in/out kernel buffers and of the readers'
/// stack buffers. Messages longer than this are reassembled from
/// multiple reads.
const IO_BUFFER_SIZE: u32 = 4096;

pub(crate) enum NamedPipe {
    Listener(PipeListener),
    Sender(PipeSender),
}

impl NamedPipe {
    pub(crate) fn open(name: &str, direction: Direction) -> Result<Self, SetupError> {
        let path = pipe_path(name)?;
        match direction {
            Direction::Receiver => PipeListener::open(name, path).map(Self::Listener),
            Direction::Sender => Ok(Self::Sender(PipeSender::new(name, path))),
        }
    }

    pub(crate) fn send(&self, bytes: &[u8]) -> bool {
        match self {
            Self::Sender(tx) => tx.send(bytes),
            Self::Listener(_) => false,
        }
    }

    pub(crate) fn receive(&self) -> Option<Buffer> {
        match self {
            Self::Listener(rx) => rx.receive(),
            Self::Sender(_) => None,
        }
    }

    pub(crate) fn remove(&self) -> bool {
        match self {
            Self::Listener(rx) => rx.remove(),
            Self::Sender(tx) => tx.remove(),
        }
    }
}

/// Builds the `\\.\pipe\` path for a channel name. Pipe names are limited
/// to 255 bytes and cannot contain backslashes or interior nuls.
fn pipe_path(name: &str) -> Result<U16CString, SetupError> {
    if name.len() >= 256 || name.contains('\\') {
        return Err(SetupError::InvalidPipeName { name: name.to_owned() });
    }
    U16CString::from_str(format!("{PIPE_PREFIX}{name}"))
        .map_err(|_| SetupError::InvalidPipeName { name: name.to_owned() })
}

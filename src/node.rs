use crate::{buffer::Buffer, error::SetupError, xlog};
use tracing::error;

#[cfg(unix)]
use crate::os::unix::msg_queue::MsgQueue;
#[cfg(windows)]
use crate::os::windows::named_pipe::NamedPipe;

/// The role a [`Node`] plays on its channel, fixed at construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The node hands messages to the channel. Only [`Node::send`] is
    /// permitted.
    Sender,
    /// The node owns the channel's OS resource and consumes messages from
    /// it. Only [`Node::receive`] is permitted.
    Receiver,
}

/// Selects the OS primitive backing a channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// A System V message queue. Unix only.
    MessageQueue,
    /// A named pipe served over overlapped I/O. Windows only.
    NamedPipe,
    /// Whatever is native to the platform the library was built for.
    #[default]
    Unspecified,
}
impl Backend {
    fn resolve(self) -> Self {
        match self {
            Self::Unspecified if cfg!(windows) => Self::NamedPipe,
            Self::Unspecified => Self::MessageQueue,
            other => other,
        }
    }
}

enum Channel {
    #[cfg(unix)]
    MsgQueue(MsgQueue),
    #[cfg(windows)]
    NamedPipe(NamedPipe),
}
impl Channel {
    fn open(name: &str, direction: Direction, backend: Backend) -> Result<Self, SetupError> {
        match backend.resolve() {
            Backend::MessageQueue => {
                #[cfg(unix)]
                {
                    MsgQueue::open(name, direction).map(Self::MsgQueue)
                }
                #[cfg(not(unix))]
                {
                    let _ = (name, direction);
                    Err(SetupError::UnsupportedBackend { backend: Backend::MessageQueue })
                }
            }
            Backend::NamedPipe => {
                #[cfg(windows)]
                {
                    NamedPipe::open(name, direction).map(Self::NamedPipe)
                }
                #[cfg(not(windows))]
                {
                    let _ = (name, direction);
                    Err(SetupError::UnsupportedBackend { backend: Backend::NamedPipe })
                }
            }
            // `resolve` never leaves the selector unspecified.
            Backend::Unspecified => unreachable!(),
        }
    }
    fn send(&self, bytes: &[u8]) -> bool {
        match self {
            #[cfg(unix)]
            Self::MsgQueue(mq) => mq.send(bytes),
            #[cfg(windows)]
            Self::NamedPipe(np) => np.send(bytes),
        }
    }
    fn receive(&self) -> Option<Buffer> {
        match self {
            #[cfg(unix)]
            Self::MsgQueue(mq) => mq.receive(),
            #[cfg(windows)]
            Self::NamedPipe(np) => np.receive(),
        }
    }
    fn remove(&self) -> bool {
        match self {
            #[cfg(unix)]
            Self::MsgQueue(mq) => mq.remove(),
            #[cfg(windows)]
            Self::NamedPipe(np) => np.remove(),
        }
    }
}

/// One endpoint of a named channel.
///
/// A `Node` binds a channel name, a [`Direction`] and a [`Backend`], and
/// owns the underlying OS resource for its lifetime. Dropping the node
/// releases the channel; on the receiving side that tears down the OS
/// object and unblocks any thread still parked in [`receive`](Self::receive).
///
/// `Node` is `Sync`: [`remove`](Self::remove) may be called from another
/// thread while a `receive` is in flight, which is the supported way to
/// cancel a blocking receive.
pub struct Node {
    name: String,
    direction: Direction,
    channel: Channel,
}
impl Node {
    /// Opens the channel `name` in the given direction on the platform's
    /// native backend.
    ///
    /// # Panics
    /// Panics with a [`SetupError`] diagnostic if the channel cannot be
    /// constructed — an empty name, a name hashing to the reserved queue
    /// key, a second live receiver, or an OS-level resource failure. Use
    /// [`try_new`](Self::try_new) to handle these conditions manually.
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self::with_backend(name, direction, Backend::Unspecified)
    }

    /// Like [`new`](Self::new), with an explicit backend selector.
    ///
    /// # Panics
    /// Panics under the same conditions as [`new`](Self::new), and
    /// additionally if the requested backend does not exist on this
    /// platform.
    pub fn with_backend(name: impl Into<String>, direction: Direction, backend: Backend) -> Self {
        match Self::try_new(name, direction, backend) {
            Ok(node) => node,
            Err(e) => {
                error!("cannot open IPC channel: {e}");
                panic!("cannot open IPC channel: {e}");
            }
        }
    }

    /// The non-panicking form of construction.
    pub fn try_new(
        name: impl Into<String>,
        direction: Direction,
        backend: Backend,
    ) -> Result<Self, SetupError> {
        xlog::init();
        let name = name.into();
        if name.is_empty() {
            return Err(SetupError::EmptyName);
        }
        let channel = Channel::open(&name, direction, backend)?;
        Ok(Self { name, direction, channel })
    }

    /// The channel name this node was constructed with.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The direction this node was constructed with.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Hands one message to the channel. Returns `true` once the payload
    /// has been accepted by the OS.
    ///
    /// Only valid on a [`Sender`](Direction::Sender) node; a receiver
    /// calling this gets `false` without the backend being touched.
    /// Zero-length payloads are legal. A `false` return means the message
    /// was not delivered — the cause has already been logged.
    pub fn send(&self, bytes: &[u8]) -> bool {
        if self.direction != Direction::Sender {
            error!("send called on the receiving end of {:?}", self.name);
            return false;
        }
        self.channel.send(bytes)
    }

    /// Blocks until a message arrives and returns it.
    ///
    /// Only valid on a [`Receiver`](Direction::Receiver) node; a sender
    /// calling this gets `None` without the backend being touched.
    /// Returns `None` when the channel is removed out from under the wait
    /// or (on Unix) when a handled process signal interrupts it.
    pub fn receive(&self) -> Option<Buffer> {
        if self.direction != Direction::Receiver {
            error!("receive called on the sending end of {:?}", self.name);
            return None;
        }
        self.channel.receive()
    }

    /// Releases the channel.
    ///
    /// On a receiver this tears down the OS resource and unblocks any
    /// in-flight [`receive`](Self::receive); on a sender it just drops the
    /// local attachment. Idempotent — repeated calls return `true`.
    pub fn remove(&self) -> bool {
        self.channel.remove()
    }
}
impl Drop for Node {
    fn drop(&mut self) {
        self.remove();
    }
}
impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        let node = Node::try_new("", Direction::Sender, Backend::Unspecified);
        assert!(matches!(node, Err(SetupError::EmptyName)), "empty names must not construct");
    }

    #[test]
    fn foreign_backend_is_rejected() {
        #[cfg(unix)]
        let foreign = Backend::NamedPipe;
        #[cfg(windows)]
        let foreign = Backend::MessageQueue;
        let node = Node::try_new("any", Direction::Sender, foreign);
        assert!(
            matches!(node, Err(SetupError::UnsupportedBackend { .. })),
            "the non-native backend must not construct",
        );
    }

    #[test]
    fn unspecified_resolves_to_the_platform_default() {
        let resolved = Backend::Unspecified.resolve();
        if cfg!(windows) {
            assert_eq!(resolved, Backend::NamedPipe, "Windows defaults to named pipes");
        } else {
            assert_eq!(resolved, Backend::MessageQueue, "Unix defaults to message queues");
        }
    }

    #[test]
    fn sender_construction_touches_no_os_resource() {
        // A sender on a channel nobody serves must construct fine; only
        // its sends fail.
        let node = Node::try_new("nobody-serves-this", Direction::Sender, Backend::Unspecified);
        assert!(node.is_ok(), "sender construction must be lazy");
    }
}

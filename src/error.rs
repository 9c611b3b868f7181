use crate::node::Backend;
use std::io;
use thiserror::Error;

/// A fatal channel-construction failure.
///
/// Everything in this enum is a misconfiguration or an unrecoverable
/// resource-acquisition problem: there is nothing a caller can do at the
/// call site except pick a different name or fix the environment.
/// [`Node::new`](crate::Node::new) panics with the rendered diagnostic;
/// [`Node::try_new`](crate::Node::try_new) returns it instead.
///
/// Runtime failures (send and receive errors) never appear here — they
/// surface as `false`/`None` from the corresponding operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// The channel name was empty.
    #[error("channel name must not be empty")]
    EmptyName,
    /// The requested backend does not exist on this platform.
    #[error("backend {backend:?} is not available on this platform")]
    UnsupportedBackend {
        /// The backend that was asked for.
        backend: Backend,
    },
    /// The name hashed to the reserved `IPC_PRIVATE` queue key.
    #[error("channel name {name:?} derives the reserved private queue key; pick a different name")]
    ReservedKey {
        /// The offending channel name.
        name: String,
    },
    /// The name cannot be turned into a local pipe path.
    #[error("channel name {name:?} is not usable as a pipe name")]
    InvalidPipeName {
        /// The offending channel name.
        name: String,
    },
    /// Another live receiver already owns the queue for this name.
    #[error("a receiver already owns the message queue for {name:?} (key {key:#010x}): {source}")]
    ReceiverExists {
        /// The channel name.
        name: String,
        /// The queue key derived from the name.
        key: u32,
        /// The underlying OS error.
        source: io::Error,
    },
    /// The message queue could not be created.
    #[error("failed to create the message queue for {name:?} (key {key:#010x}): {source}")]
    CreateQueue {
        /// The channel name.
        name: String,
        /// The queue key derived from the name.
        key: u32,
        /// The underlying OS error.
        source: io::Error,
    },
    /// The freshly attached queue's metadata could not be read.
    #[error("failed to read message queue metadata for {name:?}: {source}")]
    QueueMetadata {
        /// The channel name.
        name: String,
        /// The underlying OS error.
        source: io::Error,
    },
    /// Another live receiver already serves the pipe for this name.
    #[error("a receiver already serves the pipe for {name:?}: {source}")]
    PipeInUse {
        /// The channel name.
        name: String,
        /// The underlying OS error.
        source: io::Error,
    },
    /// The first server instance of the pipe could not be created.
    #[error("failed to create the pipe for {name:?}: {source}")]
    CreatePipe {
        /// The channel name.
        name: String,
        /// The underlying OS error.
        source: io::Error,
    },
    /// The shutdown event for the pipe server could not be created.
    #[error("failed to create the stop event for {name:?}: {source}")]
    CreateStopEvent {
        /// The channel name.
        name: String,
        /// The underlying OS error.
        source: io::Error,
    },
    /// The pipe server's acceptor thread could not be spawned.
    #[error("failed to spawn the acceptor thread for {name:?}: {source}")]
    SpawnAcceptor {
        /// The channel name.
        name: String,
        /// The underlying OS error.
        source: io::Error,
    },
}

//! Unix-specific plumbing: the System V message-queue channel and the
//! process-wide signal hook that lets a blocked receive unwind cleanly.

mod c_wrappers;

pub(crate) mod msg_queue;
pub(crate) mod signal;

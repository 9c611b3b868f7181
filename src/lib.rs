#![doc = include_str!("../README.md")]
#![warn(
    missing_docs,
    clippy::panic_in_result_fn,
    clippy::missing_assert_message,
    clippy::arithmetic_side_effects
)]

mod buffer;
mod error;
mod key;
mod misc;
mod node;
mod xlog;

mod os {
    #[cfg(unix)]
    pub(crate) mod unix;
    #[cfg(windows)]
    pub(crate) mod windows;
}

pub(crate) use misc::*;

pub use {
    buffer::Buffer,
    error::SetupError,
    node::{Backend, Direction, Node},
};

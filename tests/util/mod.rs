//! Shared helpers: eyre-based results and collision-free channel names.
#![allow(dead_code, unused_macros)]

use std::{
    process,
    sync::{
        atomic::{AtomicU32, Ordering},
        Once,
    },
    time::{SystemTime, UNIX_EPOCH},
};

pub type TestResult<T = ()> = color_eyre::eyre::Result<T>;

static SETUP: Once = Once::new();
pub fn setup() {
    SETUP.call_once(|| {
        color_eyre::install().ok();
    });
}

static NAME_SEQ: AtomicU32 = AtomicU32::new(0);

/// Produces a channel name no other test will use. The pid and a
/// per-process sequence number keep concurrent tests apart; the wall
/// clock keeps the name away from queues leaked by an earlier crashed
/// run, since System V objects outlive their creator.
pub fn unique_name(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ipc-node-test-{tag}-{}-{seq}-{nanos:08x}", process::id())
}

/// Equality check that reports both sides through eyre instead of
/// panicking mid-test.
macro_rules! ensure_eq {
    ($actual:expr, $expected:expr $(,)?) => {
        ensure_eq!($actual, $expected, "values differ")
    };
    ($actual:expr, $expected:expr, $($why:tt)+) => {{
        let (actual, expected) = (&$actual, &$expected);
        ::color_eyre::eyre::ensure!(
            actual == expected,
            "{}\n   got: {actual:?}\nwanted: {expected:?}",
            ::core::format_args!($($why)+),
        );
    }};
}

//! End-to-end coverage of the named-pipe backend.
#![cfg(windows)]

#[macro_use]
mod util;

use color_eyre::eyre::{ensure, eyre};
use ipc_node::{Direction, Node, SetupError};
use std::{collections::BTreeSet, thread, time::Duration};
use util::*;

#[test]
fn basic_round_trip() -> TestResult {
    setup();
    let name = unique_name("basic");
    let rx = Node::new(&name, Direction::Receiver);

    let sender = thread::spawn({
        let name = name.clone();
        move || {
            let tx = Node::new(&name, Direction::Sender);
            tx.send(b"Hello, IPC!\0")
        }
    });

    let got = rx.receive().ok_or_else(|| eyre!("receive returned early"))?;
    ensure_eq!(got.size(), 12);
    ensure_eq!(got.data(), b"Hello, IPC!\0".as_slice());
    ensure!(sender.join().expect("sender thread panicked"), "send failed");
    Ok(())
}

#[test]
fn twenty_messages_in_order() -> TestResult {
    setup();
    let name = unique_name("loop");
    let rx = Node::new(&name, Direction::Receiver);

    let sender = thread::spawn({
        let name = name.clone();
        move || {
            let tx = Node::new(&name, Direction::Sender);
            (1..=20).all(|i| tx.send(format!("Hello, IPC - Message #{i}\0").as_bytes()))
        }
    });

    for i in 1..=20 {
        let expected = format!("Hello, IPC - Message #{i}\0");
        let got = rx.receive().ok_or_else(|| eyre!("receive returned early"))?;
        ensure_eq!(got.data(), expected.as_bytes(), "message #{i} out of order or corrupted");
    }
    ensure!(sender.join().expect("sender thread panicked"), "a send failed");
    Ok(())
}

#[test]
fn message_longer_than_the_pipe_buffer() -> TestResult {
    setup();
    let name = unique_name("long");
    let rx = Node::new(&name, Direction::Receiver);

    let payload: Vec<u8> = (0..16 * 1024_u32).map(|i| i as u8).collect();
    let sender = thread::spawn({
        let name = name.clone();
        let payload = payload.clone();
        move || {
            let tx = Node::new(&name, Direction::Sender);
            tx.send(&payload)
        }
    });

    let got = rx.receive().ok_or_else(|| eyre!("receive returned early"))?;
    ensure_eq!(got.size(), payload.len());
    ensure_eq!(got.data(), payload.as_slice());
    ensure!(sender.join().expect("sender thread panicked"), "send failed");
    Ok(())
}

#[test]
fn three_senders_fan_in() -> TestResult {
    setup();
    let name = unique_name("fanin");
    let rx = Node::new(&name, Direction::Receiver);

    let mut senders = Vec::new();
    for (k, delay_ms) in [(1_u32, 100_u64), (2, 150), (3, 200)] {
        senders.push(thread::spawn({
            let name = name.clone();
            move || {
                thread::sleep(Duration::from_millis(delay_ms));
                let tx = Node::new(&name, Direction::Sender);
                tx.send(format!("Hello, IPC - Message #{k}\0").as_bytes())
            }
        }));
    }

    let mut received = BTreeSet::new();
    for _ in 0..3 {
        let got = rx.receive().ok_or_else(|| eyre!("receive returned early"))?;
        received.insert(got.into_vec());
    }
    let expected: BTreeSet<Vec<u8>> =
        (1..=3).map(|k| format!("Hello, IPC - Message #{k}\0").into_bytes()).collect();
    ensure_eq!(received, expected);
    for sender in senders {
        ensure!(sender.join().expect("sender thread panicked"), "a send failed");
    }
    Ok(())
}

#[test]
fn sender_reconnects_across_receiver_restart() -> TestResult {
    setup();
    let name = unique_name("restart");
    let rx = Node::new(&name, Direction::Receiver);
    let tx = Node::new(&name, Direction::Sender);

    ensure!(tx.send(b"message A"), "first send failed");
    drop(rx);

    let rx2 = Node::new(&name, Direction::Receiver);
    ensure!(tx.send(b"message B"), "send across receiver restart failed");
    let got = rx2.receive().ok_or_else(|| eyre!("receive returned early"))?;
    ensure_eq!(got.data(), b"message B".as_slice());
    Ok(())
}

#[test]
fn direction_is_enforced() -> TestResult {
    setup();
    let name = unique_name("direction");
    let rx = Node::new(&name, Direction::Receiver);
    let tx = Node::new(&name, Direction::Sender);

    ensure!(!rx.send(b"backwards"), "send on a receiver must fail");
    ensure!(tx.receive().is_none(), "receive on a sender must fail");
    Ok(())
}

#[test]
fn second_receiver_is_rejected() -> TestResult {
    setup();
    let name = unique_name("dup");
    let _rx = Node::new(&name, Direction::Receiver);

    let second = Node::try_new(&name, Direction::Receiver, Default::default());
    ensure!(
        matches!(second, Err(SetupError::PipeInUse { .. })),
        "a second receiver on a live channel must be refused",
    );
    Ok(())
}

#[test]
fn remove_is_idempotent() -> TestResult {
    setup();
    let name = unique_name("remove");
    let rx = Node::new(&name, Direction::Receiver);

    ensure!(rx.remove(), "first remove failed");
    ensure!(rx.remove(), "repeated remove must also report success");

    // The pipe name is free again.
    let rx2 = Node::try_new(&name, Direction::Receiver, Default::default());
    ensure!(rx2.is_ok(), "pipe not released by remove: {:?}", rx2.err());
    Ok(())
}

#[test]
fn remove_unblocks_a_parked_receive() -> TestResult {
    setup();
    let name = unique_name("unblock");
    let rx = Node::new(&name, Direction::Receiver);

    thread::scope(|s| {
        let parked = s.spawn(|| rx.receive());
        thread::sleep(Duration::from_millis(200));
        ensure!(rx.remove(), "remove failed");
        let outcome = parked.join().expect("receiver thread panicked");
        ensure!(outcome.is_none(), "unblocked receive must report shutdown");
        Ok(())
    })
}

//! Integration tests for timed partial delivery, driven through a
//! monitored gate the way an instrumented program would receive.
//!
//! The timing tests assert only lower bounds plus generous upper bounds,
//! so they stay stable on loaded machines.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use std::time::{Duration, Instant};

use common::scripted::ScriptedNet;
use common::test_utils::init_test_tracing;
use netproctor::api::NetworkApi;
use netproctor::test_support::miri_case_count;
use netproctor::{
    CallGate, Chunk, DeliveryMode, DeliveryPlan, Errno, MsgFlags, RecvBuf,
    SocketHandle,
};
use proptest::prelude::*;

const SD: SocketHandle = SocketHandle::new(11);

fn delivery_gate() -> CallGate<ScriptedNet> {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.monitor_mut().set_all(true);
    gate
}

fn immediate_plan(mode: DeliveryMode, payloads: &[&[u8]]) -> DeliveryPlan {
    let chunks = payloads.iter().map(|data| Chunk::immediate(*data)).collect();
    DeliveryPlan::new(mode, chunks)
}

fn recv_into(gate: &mut CallGate<ScriptedNet>, buf: &mut [u8]) -> Result<usize, Errno> {
    gate.recv(SD, RecvBuf::Fill(buf), MsgFlags::default())
}

// ==========================================
// Interception scope
// ==========================================

#[test]
fn test_plan_served_without_touching_backend() {
    let mut gate = delivery_gate();
    gate.set_delivery_plan(SD, immediate_plan(DeliveryMode::Before, &[b"hello"]));

    let mut buf = [0_u8; 8];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(5));
    assert_eq!(&buf[..5], b"hello");
    assert!(gate.inner().calls().is_empty());
    assert_eq!(gate.stats().recv.called, 1);
    assert_eq!(gate.stats().recv.last_return, Some(Ok(5)));
}

#[test]
fn test_only_plain_recv_is_intercepted() {
    let mut gate = delivery_gate();
    gate.set_delivery_plan(SD, immediate_plan(DeliveryMode::Before, &[b"plan"]));
    gate.inner_mut().push_incoming(b"wire".to_vec());

    // The addressed variant bypasses the simulator.
    let mut buf = [0_u8; 8];
    let (count, peer) = gate
        .recv_from(SD, RecvBuf::Fill(&mut buf), MsgFlags::default())
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(&buf[..4], b"wire");
    assert!(peer.is_some());
    assert_eq!(gate.inner().calls(), vec!["recv_from"]);

    // The plain variant is served from the plan.
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"plan");
    assert_eq!(gate.inner().calls(), vec!["recv_from"]);
}

#[test]
fn test_plan_ignored_while_unmonitored() {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.set_delivery_plan(SD, immediate_plan(DeliveryMode::Before, &[b"plan"]));
    gate.inner_mut().push_incoming(b"wire".to_vec());

    let mut buf = [0_u8; 8];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"wire");
    assert_eq!(gate.inner().calls(), vec!["recv"]);
}

#[test]
fn test_other_descriptors_pass_through() {
    let mut gate = delivery_gate();
    gate.set_delivery_plan(SD, immediate_plan(DeliveryMode::Before, &[b"plan"]));
    gate.inner_mut().push_incoming(b"wire".to_vec());

    let other = SocketHandle::new(42);
    let mut buf = [0_u8; 8];
    assert_eq!(
        gate.recv(other, RecvBuf::Fill(&mut buf), MsgFlags::default()),
        Ok(4)
    );
    assert_eq!(&buf[..4], b"wire");
    assert_eq!(gate.inner().calls(), vec!["recv"]);
}

#[test]
fn test_exhausted_plan_yields_eof_until_cleared() {
    let mut gate = delivery_gate();
    gate.set_delivery_plan(SD, immediate_plan(DeliveryMode::Before, &[b"ab"]));

    let mut buf = [0_u8; 8];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(2));
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(0));
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(0));
    assert!(gate.has_delivery_plan(SD));

    let removed = gate.clear_delivery_plan(SD);
    assert!(removed.is_some());
    // Nothing scripted on the backend, so the real path now blocks.
    assert_eq!(recv_into(&mut gate, &mut buf), Err(Errno::WOULDBLOCK));
    assert_eq!(gate.inner().calls(), vec!["recv"]);
}

#[test]
fn test_reregistering_restarts_the_plan() {
    let mut gate = delivery_gate();
    let plan = immediate_plan(DeliveryMode::Before, &[b"abcd"]);
    assert!(gate.set_delivery_plan(SD, plan.clone()).is_none());

    let mut buf = [0_u8; 4];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(4));
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(0));

    let displaced = gate.set_delivery_plan(SD, plan).unwrap();
    assert_eq!(displaced.total_len(), 4);
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(4));
    assert_eq!(&buf, b"abcd");
}

#[test]
fn test_trailing_empty_chunk_models_end_of_stream() {
    let mut gate = delivery_gate();
    let plan = DeliveryPlan::new(
        DeliveryMode::After,
        vec![Chunk::immediate(b"bye".as_slice()), Chunk::end_of_stream()],
    );
    gate.set_delivery_plan(SD, plan);

    let mut buf = [0_u8; 8];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(3));
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(0));
}

// ==========================================
// Timing behavior
// ==========================================

#[test]
#[cfg(not(miri))]
fn test_before_mode_waits_the_full_interval_every_chunk() {
    let interval = Duration::from_millis(25);
    let mut gate = delivery_gate();
    let plan = DeliveryPlan::new(
        DeliveryMode::Before,
        vec![
            Chunk::new(b"aa".as_slice(), interval),
            Chunk::new(b"bb".as_slice(), interval),
        ],
    );
    gate.set_delivery_plan(SD, plan);
    let mut buf = [0_u8; 2];

    let started = Instant::now();
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(2));
    assert!(started.elapsed() >= interval);

    // Time spent between calls buys nothing in this mode.
    std::thread::sleep(Duration::from_millis(40));
    let started = Instant::now();
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(2));
    assert!(started.elapsed() >= interval);
}

#[test]
#[cfg(not(miri))]
fn test_after_mode_credits_time_between_calls() {
    let mut gate = delivery_gate();
    let plan = DeliveryPlan::new(
        DeliveryMode::After,
        vec![
            Chunk::immediate(b"aa".as_slice()),
            Chunk::new(b"bb".as_slice(), Duration::from_millis(40)),
        ],
    );
    gate.set_delivery_plan(SD, plan);
    let mut buf = [0_u8; 2];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(2));

    // The caller was away longer than the interval, so the second chunk
    // is due on arrival.
    std::thread::sleep(Duration::from_millis(55));
    let started = Instant::now();
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(2));
    assert!(started.elapsed() < Duration::from_millis(30));
}

#[test]
#[cfg(not(miri))]
fn test_dont_wait_polls_a_pending_interval() {
    let mut gate = delivery_gate();
    let plan = DeliveryPlan::new(
        DeliveryMode::Realtime,
        vec![Chunk::new(b"data".as_slice(), Duration::from_millis(50))],
    );
    gate.set_delivery_plan(SD, plan);

    let mut buf = [0_u8; 4];
    assert_eq!(
        gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::DONT_WAIT),
        Err(Errno::WOULDBLOCK)
    );

    std::thread::sleep(Duration::from_millis(65));
    assert_eq!(
        gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::DONT_WAIT),
        Ok(4)
    );
    assert_eq!(&buf, b"data");
}

#[test]
#[cfg(not(miri))]
fn test_realtime_returns_every_due_chunk_at_once() {
    let interval = Duration::from_millis(30);
    let mut gate = delivery_gate();
    let plan = DeliveryPlan::new(
        DeliveryMode::Realtime,
        vec![
            Chunk::new(b"ab".as_slice(), interval),
            Chunk::new(b"cd".as_slice(), interval),
        ],
    );
    gate.set_delivery_plan(SD, plan);

    // Sleep past both intervals; one call drains both chunks.
    std::thread::sleep(Duration::from_millis(70));
    let started = Instant::now();
    let mut buf = [0_u8; 8];
    assert_eq!(recv_into(&mut gate, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"abcd");
    assert!(started.elapsed() < Duration::from_millis(25));
}

// ==========================================
// Byte conservation
// ==========================================

proptest! {
    #![proptest_config(ProptestConfig {
        cases: miri_case_count(),
        ..ProptestConfig::default()
    })]

    /// Property: a plan delivers exactly its payload bytes, in order, no
    /// matter how the reads are sized.
    #[test]
    fn prop_plan_bytes_are_conserved(
        payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..24),
            1..6,
        ),
        read_len in 1_usize..16,
        mode in prop_oneof![
            Just(DeliveryMode::Before),
            Just(DeliveryMode::After),
            Just(DeliveryMode::Realtime),
        ],
    ) {
        let chunks =
            payloads.iter().cloned().map(Chunk::immediate).collect();
        let plan = DeliveryPlan::new(mode, chunks);
        let expected: Vec<u8> = payloads.concat();
        prop_assert_eq!(plan.total_len(), expected.len());

        let mut gate = CallGate::new(ScriptedNet::new());
        gate.monitor_mut().set_all(true);
        gate.set_delivery_plan(SD, plan);

        let mut collected = Vec::new();
        let mut zero_reads = 0_u32;
        while zero_reads < payloads.len() as u32 + 1 {
            let mut buf = vec![0_u8; read_len];
            let got = gate
                .recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default())
                .unwrap();
            if got == 0 {
                zero_reads += 1;
            } else {
                zero_reads = 0;
                collected.extend_from_slice(&buf[..got]);
            }
        }
        prop_assert_eq!(collected, expected);
        prop_assert!(gate.inner().calls().is_empty());
    }
}

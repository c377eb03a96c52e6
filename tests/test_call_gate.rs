//! Integration tests for the call gate over a scripted backend.
//!
//! These tests drive the gate exactly the way an instrumented program
//! would, through the public [`NetworkApi`] surface, and assert on the
//! statistics, fault injection, and override behavior a test harness
//! observes from the outside.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use common::scripted::{ScriptedNet, SCRIPTED_PEER};
use common::test_utils::{init_test_tracing, test_addr};
use netproctor::api::NetworkApi;
use netproctor::{
    AddrFamily, AddrList, CallGate, CallKind, Errno, FaultPolicy, MsgFlags,
    NameFlags, PollEntry, RecvBuf, ResolvedAddrs, ShutdownHow, SockType,
    SocketHandle,
};

const SD: SocketHandle = SocketHandle::new(5);

fn monitored_gate() -> CallGate<ScriptedNet> {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.monitor_mut().set_all(true);
    gate
}

fn arm(gate: &mut CallGate<ScriptedNet>, kind: CallKind, policy: FaultPolicy) {
    let slot = gate.faults_mut().slot_mut(kind).expect("kind has a slot");
    *slot = policy;
}

/// A throwaway list for exercising the release operation.
fn scratch_list() -> AddrList {
    AddrList::issue(ResolvedAddrs::default())
}

// ==========================================
// Monitoring matrix: every operation is counted when monitored and
// invisible when not.
// ==========================================

macro_rules! monitoring_matrix {
    ($($name:ident => $invoke:expr, $called:expr;)*) => {
        pastey::paste! {
            $(
                #[test]
                fn [<test_monitored_ $name _is_counted>]() {
                    let mut gate = monitored_gate();
                    ($invoke)(&mut gate);
                    assert_eq!(($called)(&gate), 1);
                }

                #[test]
                fn [<test_unmonitored_ $name _leaves_no_trace>]() {
                    init_test_tracing();
                    let mut gate = CallGate::new(ScriptedNet::new());
                    ($invoke)(&mut gate);
                    assert_eq!(($called)(&gate), 0);
                }
            )*
        }
    };
}

monitoring_matrix! {
    resolve_addrs => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.resolve_addrs(Some("127.0.0.1"), Some("80"), None);
    }, |g: &CallGate<ScriptedNet>| g.stats().resolve_addrs.called;
    release_addrs => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.release_addrs(scratch_list());
    }, |g: &CallGate<ScriptedNet>| g.stats().release_addrs.called;
    resolve_names => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.resolve_names(test_addr(80), NameFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().resolve_names.called;
    error_string => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.error_string(-2);
    }, |g: &CallGate<ScriptedNet>| g.stats().error_string.called;
    socket => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.socket(AddrFamily::V4, SockType::Stream);
    }, |g: &CallGate<ScriptedNet>| g.stats().socket.called;
    bind => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.bind(SD, test_addr(7001));
    }, |g: &CallGate<ScriptedNet>| g.stats().bind.called;
    connect => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.connect(SD, test_addr(7002));
    }, |g: &CallGate<ScriptedNet>| g.stats().connect.called;
    listen => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.listen(SD, 16);
    }, |g: &CallGate<ScriptedNet>| g.stats().listen.called;
    accept => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.accept(SD);
    }, |g: &CallGate<ScriptedNet>| g.stats().accept.called;
    recv => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.recv(SD, RecvBuf::Discard(8), MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().recv.called;
    recv_from => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.recv_from(SD, RecvBuf::Discard(8), MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().recv_from.called;
    recv_msg => |g: &mut CallGate<ScriptedNet>| {
        let mut buf = [0_u8; 8];
        let _ = g.recv_msg(SD, &mut [&mut buf], MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().recv_msg.called;
    send => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.send(SD, b"payload", MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().send.called;
    send_to => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.send_to(SD, b"payload", test_addr(7003), MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().send_to.called;
    send_msg => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.send_msg(SD, &[b"pay", b"load"], None, MsgFlags::default());
    }, |g: &CallGate<ScriptedNet>| g.stats().send_msg.called;
    shutdown => |g: &mut CallGate<ScriptedNet>| {
        let _ = g.shutdown(SD, ShutdownHow::Both);
    }, |g: &CallGate<ScriptedNet>| g.stats().shutdown.called;
    poll => |g: &mut CallGate<ScriptedNet>| {
        let mut entries = [PollEntry::readable(SD)];
        let _ = g.poll(&mut entries, None);
    }, |g: &CallGate<ScriptedNet>| g.stats().poll.called;
}

// ==========================================
// Pass-through and recording detail
// ==========================================

#[test]
fn test_fresh_gate_reaches_backend_unchanged() {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.inner_mut().push_incoming(b"hello".to_vec());

    let sd = gate.socket(AddrFamily::V4, SockType::Dgram).unwrap();
    assert_eq!(gate.send(sd, b"ping", MsgFlags::default()), Ok(4));
    let mut buf = [0_u8; 8];
    assert_eq!(
        gate.recv(sd, RecvBuf::Fill(&mut buf), MsgFlags::default()),
        Ok(5)
    );
    assert_eq!(&buf[..5], b"hello");

    assert_eq!(gate.inner().calls(), vec!["socket", "send", "recv"]);
    assert_eq!(gate.stats(), &netproctor::StatsTable::new());
}

#[test]
fn test_monitored_transfer_records_params_and_outcome() {
    let mut gate = monitored_gate();
    let dest = test_addr(9100);
    assert_eq!(gate.send_to(SD, b"datagram", dest, MsgFlags::default()), Ok(8));

    let record = &gate.stats().send_to;
    assert_eq!(record.called, 1);
    let params = record.last_params.as_ref().unwrap();
    assert_eq!(params.sd, SD);
    assert_eq!(params.len, 8);
    assert_eq!(params.dest, dest);
    assert_eq!(record.last_return, Some(Ok(8)));
    assert_eq!(gate.stats().send_any, 1);
}

#[test]
fn test_accept_records_reported_peer() {
    let mut gate = monitored_gate();
    let (conn, peer) = gate.accept(SD).unwrap();
    assert_eq!(peer, Some(SCRIPTED_PEER));

    let record = &gate.stats().accept;
    assert_eq!(record.last_params, Some(SD));
    assert_eq!(record.last_return, Some(Ok((conn, Some(SCRIPTED_PEER)))));
}

#[test]
fn test_master_switch_overrides_per_kind_flags() {
    let mut gate = monitored_gate();
    gate.monitor_mut().active = false;

    let _ = gate.socket(AddrFamily::V4, SockType::Stream);
    let _ = gate.send(SD, b"x", MsgFlags::default());
    assert_eq!(gate.stats().socket.called, 0);
    assert_eq!(gate.stats().send.called, 0);
    // The backend still served both calls.
    assert_eq!(gate.inner().calls(), vec!["socket", "send"]);
}

#[test]
fn test_receive_family_shares_counter_and_flag() {
    let mut gate = monitored_gate();
    gate.inner_mut().push_incoming(b"a".to_vec());
    gate.inner_mut().push_incoming(b"b".to_vec());

    let _ = gate.recv(SD, RecvBuf::Discard(4), MsgFlags::default());
    let _ = gate.recv_from(SD, RecvBuf::Discard(4), MsgFlags::default());
    assert_eq!(gate.stats().recv_any, 2);

    gate.monitor_mut().set(CallKind::Receive, false);
    let _ = gate.recv(SD, RecvBuf::Discard(4), MsgFlags::default());
    assert_eq!(gate.stats().recv_any, 2);
    assert_eq!(gate.stats().recv.called, 1);
}

// ==========================================
// Fault injection
// ==========================================

#[test]
fn test_nth_call_fault_fails_exactly_that_call() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Connect,
        FaultPolicy::nth_call(3, -1, Errno::CONNREFUSED),
    );

    assert_eq!(gate.connect(SD, test_addr(1234)), Ok(()));
    assert_eq!(gate.connect(SD, test_addr(1234)), Ok(()));
    assert_eq!(gate.connect(SD, test_addr(1234)), Err(Errno::CONNREFUSED));
    assert_eq!(gate.connect(SD, test_addr(1234)), Ok(()));

    // The backend never saw the injected call.
    assert_eq!(gate.inner().calls().len(), 3);
}

#[test]
fn test_first_n_fault_fails_a_prefix() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Send,
        FaultPolicy::first_n(2, -1, Errno::PIPE),
    );

    assert_eq!(gate.send(SD, b"x", MsgFlags::default()), Err(Errno::PIPE));
    assert_eq!(gate.send(SD, b"x", MsgFlags::default()), Err(Errno::PIPE));
    assert_eq!(gate.send(SD, b"x", MsgFlags::default()), Ok(1));
}

#[test]
fn test_alternating_fault_fails_odd_calls() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Send,
        FaultPolicy::alternating(-1, Errno::INTR),
    );

    for round in 0_u32..6 {
        let outcome = gate.send(SD, b"x", MsgFlags::default());
        if round % 2 == 0 {
            assert_eq!(outcome, Err(Errno::INTR), "round {round}");
        } else {
            assert_eq!(outcome, Ok(1), "round {round}");
        }
    }
}

#[test]
fn test_send_family_draws_from_one_schedule() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Send,
        FaultPolicy::nth_call(2, -1, Errno::PIPE),
    );

    assert_eq!(gate.send(SD, b"x", MsgFlags::default()), Ok(1));
    // The second send-family call is the vectored variant.
    assert_eq!(
        gate.send_msg(SD, &[b"x"], None, MsgFlags::default()),
        Err(Errno::PIPE)
    );
}

#[test]
fn test_nonnegative_injection_synthesizes_success() {
    let mut gate = monitored_gate();
    // No incoming payload is scripted, so a real call would block.
    arm(
        &mut gate,
        CallKind::Receive,
        FaultPolicy::always(0, Errno::IO),
    );

    let mut buf = [7_u8; 4];
    assert_eq!(
        gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default()),
        Ok(0)
    );
    assert_eq!(&buf, &[7, 7, 7, 7], "no bytes may move on a synthetic EOF");
    assert!(gate.inner().calls().is_empty());
}

#[test]
fn test_fault_cursor_advances_while_unmonitored() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Socket,
        FaultPolicy::nth_call(3, -1, Errno::IO),
    );

    gate.monitor_mut().set(CallKind::Socket, false);
    let _ = gate.socket(AddrFamily::V4, SockType::Stream);
    let _ = gate.socket(AddrFamily::V4, SockType::Stream);
    gate.monitor_mut().set(CallKind::Socket, true);

    // Two unmonitored calls consumed cursor positions 1 and 2.
    assert_eq!(
        gate.socket(AddrFamily::V4, SockType::Stream),
        Err(Errno::IO)
    );
}

#[test]
fn test_fault_that_fires_unmonitored_is_swallowed() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Socket,
        FaultPolicy::nth_call(1, -1, Errno::IO),
    );

    gate.monitor_mut().set(CallKind::Socket, false);
    // The schedule fires here, but unmonitored calls cannot be injected.
    assert!(gate.socket(AddrFamily::V4, SockType::Stream).is_ok());

    gate.monitor_mut().set(CallKind::Socket, true);
    assert!(gate.socket(AddrFamily::V4, SockType::Stream).is_ok());
}

// ==========================================
// Overrides
// ==========================================

#[test]
fn test_override_replaces_backend_for_its_operation() {
    let mut gate = monitored_gate();
    gate.overrides_mut().send = Some(Box::new(|_, buf, _| Ok(buf.len() / 2)));

    assert_eq!(gate.send(SD, b"12345678", MsgFlags::default()), Ok(4));
    assert!(gate.inner().calls().is_empty());
    assert_eq!(gate.stats().send.last_return, Some(Ok(4)));
}

#[test]
fn test_override_ignored_while_unmonitored() {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.overrides_mut().send = Some(Box::new(|_, _, _| Err(Errno::PIPE)));

    assert_eq!(gate.send(SD, b"abc", MsgFlags::default()), Ok(3));
    assert_eq!(gate.inner().calls(), vec!["send"]);
}

#[test]
fn test_injection_beats_override() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Send,
        FaultPolicy::always(-1, Errno::PIPE),
    );
    gate.overrides_mut().send = Some(Box::new(|_, buf, _| Ok(buf.len())));

    assert_eq!(gate.send(SD, b"abc", MsgFlags::default()), Err(Errno::PIPE));
}

#[test]
fn test_clear_overrides_restores_backend_dispatch() {
    let mut gate = monitored_gate();
    gate.overrides_mut().shutdown = Some(Box::new(|_, _| Err(Errno::NOTCONN)));
    assert_eq!(gate.shutdown(SD, ShutdownHow::Read), Err(Errno::NOTCONN));

    gate.clear_overrides();
    assert_eq!(gate.shutdown(SD, ShutdownHow::Read), Ok(()));
    assert_eq!(gate.inner().calls(), vec!["shutdown"]);
}

// ==========================================
// Poll snapshots
// ==========================================

#[test]
fn test_poll_snapshot_captures_reported_readiness() {
    let mut gate = monitored_gate();
    let mut entries = [PollEntry::readable(SD), PollEntry::writable(SD)];
    assert_eq!(gate.poll(&mut entries, None), Ok(2));

    let snapshot = gate.stats().last_poll_entries.as_ref().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot[0].ready.read);
    assert!(snapshot[1].ready.write);
    assert_eq!(gate.stats().poll.last_params.unwrap().count, 2);
}

// ==========================================
// Composition and lifecycle
// ==========================================

#[test]
fn test_gates_stack() {
    init_test_tracing();
    let mut outer = CallGate::new(CallGate::new(ScriptedNet::new()));
    outer.monitor_mut().set_all(true);
    outer.inner_mut().monitor_mut().set_all(true);

    let _ = outer.send(SD, b"abc", MsgFlags::default());

    assert_eq!(outer.stats().send.called, 1);
    assert_eq!(outer.inner().stats().send.called, 1);
    assert_eq!(outer.inner().inner().calls(), vec!["send"]);
}

#[test]
fn test_reset_restores_transparency() {
    let mut gate = monitored_gate();
    arm(
        &mut gate,
        CallKind::Send,
        FaultPolicy::always(-1, Errno::PIPE),
    );
    gate.overrides_mut().send = Some(Box::new(|_, _, _| Err(Errno::INTR)));
    let _ = gate.send(SD, b"x", MsgFlags::default());

    gate.reset();

    assert_eq!(gate.stats().send.called, 0);
    assert_eq!(gate.send(SD, b"x", MsgFlags::default()), Ok(1));
    assert_eq!(gate.stats().send.called, 0, "monitoring is off after reset");
    assert_eq!(gate.inner().calls(), vec!["send"]);
}

#[test]
fn test_reset_stats_keeps_configuration() {
    let mut gate = monitored_gate();
    let _ = gate.send(SD, b"x", MsgFlags::default());
    assert_eq!(gate.stats().send.called, 1);

    gate.reset_stats();
    assert_eq!(gate.stats().send.called, 0);

    // Monitoring stayed on, so the next call is counted again.
    let _ = gate.send(SD, b"x", MsgFlags::default());
    assert_eq!(gate.stats().send.called, 1);
}

#[cfg(feature = "json")]
#[test]
fn test_stats_snapshot_exports_as_json() {
    let mut gate = monitored_gate();
    let _ = gate.socket(AddrFamily::V4, SockType::Stream);

    let json = gate.stats().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["socket"]["called"], 1);
    assert_eq!(value["send_any"], 0);
}

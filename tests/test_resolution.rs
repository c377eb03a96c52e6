//! Integration tests for the deterministic resolution double and strict
//! release tracking, exercised end to end through a monitored gate.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use std::sync::Arc;

use common::scripted::ScriptedNet;
use common::test_utils::init_test_tracing;
use netproctor::api::NetworkApi;
use netproctor::{
    AddrFamily, AddrFlags, AddrHints, AddrList, CallGate, CallKind,
    CollectingMisuseObserver, Errno, FaultPolicy, MisuseKind, NameFlags,
    ReleaseOutcome, ResolveError, ResolvedAddrs, SockType,
};

/// A gate that answers the resolution family itself, with that family
/// monitored.
fn resolution_gate() -> CallGate<ScriptedNet> {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.monitor_mut().set_resolution_family(true);
    gate.set_simulated_resolution(true);
    gate
}

fn stream_hints(family: AddrFamily) -> AddrHints {
    AddrHints {
        family,
        socktype: Some(SockType::Stream),
        flags: AddrFlags::default(),
    }
}

// ==========================================
// The double's acceptance matrix, observed through the gate
// ==========================================

#[test]
fn test_numeric_v4_resolution_through_gate() {
    let mut gate = resolution_gate();
    let hints = stream_hints(AddrFamily::V4);
    let list = gate
        .resolve_addrs(Some("127.0.0.1"), Some("80"), Some(&hints))
        .unwrap();

    let entry = list.first().unwrap();
    assert_eq!(entry.addr, "127.0.0.1:80".parse().unwrap());
    assert_eq!(entry.family, AddrFamily::V4);
    assert_eq!(entry.socktype, SockType::Stream);

    // The double answered; the backend never saw the call.
    assert!(gate.inner().calls().is_empty());

    let params = gate.stats().resolve_addrs.last_params.as_ref().unwrap();
    assert_eq!(params.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(params.service.as_deref(), Some("80"));
    assert_eq!(params.hints, Some(hints));
}

#[test]
fn test_numeric_v6_resolution_through_gate() {
    let mut gate = resolution_gate();
    let list = gate.resolve_addrs(Some("::1"), Some("443"), None).unwrap();
    assert_eq!(
        list.first().unwrap().addr,
        "[::1]:443".parse().unwrap()
    );
}

#[test]
fn test_passive_wildcard_and_active_loopback() {
    let mut gate = resolution_gate();

    let passive = gate
        .resolve_addrs(None, Some("7000"), Some(&AddrHints::passive()))
        .unwrap();
    assert_eq!(
        passive.first().unwrap().addr,
        "0.0.0.0:7000".parse().unwrap()
    );

    let active = gate.resolve_addrs(None, Some("7000"), None).unwrap();
    assert_eq!(
        active.first().unwrap().addr,
        "127.0.0.1:7000".parse().unwrap()
    );
}

#[test]
fn test_canonical_name_through_gate() {
    let mut gate = resolution_gate();
    let hints = AddrHints {
        family: AddrFamily::Unspec,
        socktype: None,
        flags: AddrFlags {
            canonical: true,
            ..AddrFlags::default()
        },
    };
    let list = gate
        .resolve_addrs(Some("10.0.0.1"), Some("80"), Some(&hints))
        .unwrap();
    assert_eq!(list.addrs().canonical.as_deref(), Some("C10.0.0.1"));
}

#[test]
fn test_hostname_is_rejected_and_recorded() {
    let mut gate = resolution_gate();
    let got = gate.resolve_addrs(Some("localhost"), Some("80"), None);
    assert_eq!(got, Err(ResolveError::NoName));
    assert_eq!(
        gate.stats().resolve_addrs.last_return,
        Some(Err(ResolveError::NoName))
    );
}

#[test]
fn test_family_mismatch_through_gate() {
    let mut gate = resolution_gate();
    let hints = stream_hints(AddrFamily::V6);
    assert_eq!(
        gate.resolve_addrs(Some("127.0.0.1"), Some("80"), Some(&hints)),
        Err(ResolveError::Family)
    );
}

#[test]
fn test_each_resolution_issues_a_distinct_list() {
    let mut gate = resolution_gate();
    let first = gate.resolve_addrs(Some("127.0.0.1"), None, None).unwrap();
    let second = gate.resolve_addrs(Some("127.0.0.1"), None, None).unwrap();
    assert_ne!(first.id(), second.id());
}

#[test]
fn test_reverse_lookup_formats_numerically() {
    let mut gate = resolution_gate();
    let info = gate
        .resolve_names("10.1.2.3:9999".parse().unwrap(), NameFlags::default())
        .unwrap();
    assert_eq!(info.host, "10.1.2.3");
    assert_eq!(info.service, "9999");
    assert!(gate.inner().calls().is_empty());
}

#[test]
fn test_name_required_fails_against_the_double() {
    let mut gate = resolution_gate();
    let flags = NameFlags {
        name_required: true,
        ..NameFlags::default()
    };
    assert_eq!(
        gate.resolve_names("127.0.0.1:80".parse().unwrap(), flags),
        Err(ResolveError::NoName)
    );
}

#[test]
fn test_error_string_reports_resolver_texts() {
    let mut gate = resolution_gate();
    assert_eq!(gate.error_string(-2), "Name or service not known");
    assert_eq!(gate.error_string(-6), "ai_family not supported");
    assert_eq!(gate.error_string(-99), "Unknown error");
    assert!(gate.inner().calls().is_empty());
    assert_eq!(gate.stats().error_string.called, 3);
}

#[test]
fn test_unmonitored_resolution_reaches_backend() {
    init_test_tracing();
    let mut gate = CallGate::new(ScriptedNet::new());
    gate.set_simulated_resolution(true);

    // The family is not monitored, so simulation does not apply.
    let _ = gate.resolve_addrs(Some("127.0.0.1"), Some("80"), None);
    assert_eq!(gate.inner().calls(), vec!["resolve_addrs"]);
    assert_eq!(gate.stats().resolve_addrs.called, 0);
}

// ==========================================
// Injected resolution failures
// ==========================================

#[test]
fn test_injected_resolution_failure_maps_the_code() {
    let mut gate = resolution_gate();
    let slot = gate.faults_mut().slot_mut(CallKind::ResolveAddrs).unwrap();
    *slot = FaultPolicy::always(-4, Errno::IO);

    assert_eq!(
        gate.resolve_addrs(Some("127.0.0.1"), Some("80"), None),
        Err(ResolveError::Fail)
    );
    // Injected failures never issue a list, so nothing became outstanding.
    assert!(gate.release_tracker().outstanding().is_empty());
}

// ==========================================
// Strict release tracking
// ==========================================

#[test]
fn test_reverse_order_releases_are_clean() {
    let collector = Arc::new(CollectingMisuseObserver::new());
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    gate.set_misuse_observer(Some(collector.clone()));

    let a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();
    let b = gate.resolve_addrs(Some("127.0.0.1"), Some("2"), None).unwrap();
    let c = gate.resolve_addrs(Some("127.0.0.1"), Some("3"), None).unwrap();

    assert_eq!(gate.release_addrs(c), ReleaseOutcome::Clean);
    assert_eq!(gate.release_addrs(b), ReleaseOutcome::Clean);
    assert_eq!(gate.release_addrs(a), ReleaseOutcome::Clean);

    assert!(gate.release_tracker().outstanding().is_empty());
    assert!(collector.is_empty());
}

#[test]
fn test_out_of_order_release_is_flagged_but_not_suppressed() {
    let collector = Arc::new(CollectingMisuseObserver::new());
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    gate.set_misuse_observer(Some(collector.clone()));

    let a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();
    let b = gate.resolve_addrs(Some("127.0.0.1"), Some("2"), None).unwrap();
    let a_id = a.id();
    let b_id = b.id();

    assert_eq!(gate.release_addrs(a), ReleaseOutcome::Misused);
    let reports = collector.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, MisuseKind::NotNewest);
    assert_eq!(reports[0].id, a_id);
    assert_eq!(reports[0].newest, Some(b_id));

    // A flagged release leaves the tracked state untouched, so the
    // remaining releases are judged on their own merits.
    assert_eq!(gate.release_tracker().outstanding(), vec![a_id, b_id]);
    assert_eq!(gate.release_addrs(b), ReleaseOutcome::Clean);
    assert_eq!(gate.release_tracker().outstanding(), vec![a_id]);

    assert_eq!(
        gate.stats().release_addrs.last_return,
        Some(ReleaseOutcome::Clean)
    );
}

#[test]
fn test_stray_list_release_is_untracked() {
    let collector = Arc::new(CollectingMisuseObserver::new());
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    gate.set_misuse_observer(Some(collector.clone()));

    // Issued outside the gate, so the tracker has never seen it.
    let stray = AddrList::issue(ResolvedAddrs::default());
    assert_eq!(gate.release_addrs(stray), ReleaseOutcome::Misused);
    assert_eq!(collector.reports()[0].kind, MisuseKind::Untracked);
}

#[test]
fn test_outstanding_lists_surface_a_leak() {
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);

    let _a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();
    let _b = gate.resolve_addrs(Some("127.0.0.1"), Some("2"), None).unwrap();
    let c = gate.resolve_addrs(Some("127.0.0.1"), Some("3"), None).unwrap();
    let _ = gate.release_addrs(c);

    // Two lists were never released. A grader reads this as a leak.
    assert_eq!(gate.release_tracker().outstanding().len(), 2);
}

#[test]
fn test_tracker_capacity_overflow_counts_dropped() {
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    gate.set_tracker_capacity(2);

    let _a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();
    let _b = gate.resolve_addrs(Some("127.0.0.1"), Some("2"), None).unwrap();
    let c = gate.resolve_addrs(Some("127.0.0.1"), Some("3"), None).unwrap();

    assert_eq!(gate.release_tracker().outstanding().len(), 2);
    assert_eq!(gate.release_tracker().dropped(), 1);

    // The overflow list went untracked, so its release is flagged.
    assert_eq!(gate.release_addrs(c), ReleaseOutcome::Misused);
}

#[test]
fn test_tracking_pauses_with_checking_disabled() {
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    let a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();

    gate.set_strict_release_checking(false);
    // Checking off: any release is clean and the state is untouched.
    let b = gate.resolve_addrs(Some("127.0.0.1"), Some("2"), None).unwrap();
    assert_eq!(gate.release_addrs(b), ReleaseOutcome::Clean);

    gate.set_strict_release_checking(true);
    assert_eq!(gate.release_addrs(a), ReleaseOutcome::Clean);
    assert!(gate.release_tracker().outstanding().is_empty());
}

#[test]
fn test_release_override_replaces_disposal_only() {
    let counted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = counted.clone();
    let mut gate = resolution_gate();
    gate.set_strict_release_checking(true);
    gate.overrides_mut().release_addrs = Some(Box::new(move |_list| {
        seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }));

    let a = gate.resolve_addrs(Some("127.0.0.1"), Some("1"), None).unwrap();
    let stray = AddrList::issue(ResolvedAddrs::default());

    // Misuse detection still runs ahead of the substituted disposal.
    assert_eq!(gate.release_addrs(stray), ReleaseOutcome::Misused);
    assert_eq!(gate.release_addrs(a), ReleaseOutcome::Clean);
    assert_eq!(counted.load(std::sync::atomic::Ordering::Relaxed), 2);
}

//! The call gate that wraps a [`NetworkApi`] implementation with
//! monitoring, statistics, fault injection, overrides, and the simulated
//! resolution and delivery layers.
//!
//! [`CallGate`] is the seam a test harness hands to the code under test.
//! Every call first consults the gate's configuration and only then reaches
//! the wrapped implementation, so a test can observe, fail, or replace any
//! operation without the code under test cooperating. The gate itself
//! implements [`NetworkApi`], which lets gates stack and keeps the code
//! under test generic over whether it talks to a gate or to the real thing.
//!
//! # Dispatch
//!
//! A monitored call walks a fixed pipeline:
//!
//! 1. record the call and its parameters in the [`StatsTable`],
//! 2. apply the [`FaultPolicy`](crate::fault::FaultPolicy) for the kind;
//!    a fired pattern short-circuits with the configured synthetic outcome,
//! 3. dispatch to the override for the operation if one is installed, else
//!    to the simulated implementation where one applies, else to the
//!    wrapped implementation,
//! 4. record the outcome.
//!
//! An unmonitored call goes straight to the wrapped implementation and
//! leaves statistics, overrides, tracking, and delivery untouched. Fault
//! cursors are the one exception: they advance on every call of their kind
//! so a schedule keyed to call ordinality survives monitoring toggles
//! between test phases.

use std::net::SocketAddr;
use std::sync::Arc;

use web_time::Duration;

use crate::addr::{
    AddrFamily, AddrHints, AddrList, NameFlags, NameInfo, SockType,
};
use crate::api::{MsgFlags, NetworkApi, PollEntry, RecvBuf, ShutdownHow};
use crate::delivery::{DeliveryPlan, DeliveryTable};
use crate::error::{Errno, ResolveError};
use crate::fault::FaultTable;
use crate::monitor::{CallKind, MonitorFlags};
use crate::overrides::{OverrideTable, ReleaseAddrsFn, ResolveAddrsFn};
use crate::resolver;
use crate::stats::{
    ListenParams, NameQuery, PollParams, ResolveParams, SendToParams,
    ShutdownParams, SocketParams, SocketTarget, StatsTable, TransferParams,
    VectoredParams,
};
use crate::tracker::{MisuseObserver, ReleaseOutcome, ReleaseTracker};
use crate::SocketHandle;

/// Maps an injected raw return onto a unit-result operation.
const fn unit_outcome(raw: i32, errno: Errno) -> Result<(), Errno> {
    if raw < 0 {
        Err(errno)
    } else {
        Ok(())
    }
}

/// Maps an injected raw return onto a byte-count operation. Non-negative
/// injections become synthetic successes, so a zero models end-of-stream.
const fn size_outcome(raw: i32, errno: Errno) -> Result<usize, Errno> {
    if raw < 0 {
        Err(errno)
    } else {
        Ok(raw as usize)
    }
}

/// Instrumentation wrapper around any [`NetworkApi`] implementation.
///
/// A fresh gate is transparent: monitoring starts disabled, every fault
/// policy is never-fire, no overrides or delivery plans are installed, and
/// release tracking is off. Tests switch on exactly the behavior they need
/// through the configuration surface, run the code under test, then read
/// the [`StatsTable`] back.
///
/// # Example
///
/// ```
/// use netproctor::{CallGate, CallKind, FaultPolicy, Errno, SystemNetwork};
/// use netproctor::api::NetworkApi;
///
/// let mut gate = CallGate::new(SystemNetwork::new());
/// gate.monitor_mut().set(CallKind::Socket, true);
/// if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Socket) {
///     *slot = FaultPolicy::always(-1, Errno::IO);
/// }
///
/// let denied = gate.socket(
///     netproctor::AddrFamily::V4,
///     netproctor::SockType::Stream,
/// );
/// assert_eq!(denied, Err(Errno::IO));
/// assert_eq!(gate.stats().socket.called, 1);
/// ```
pub struct CallGate<B> {
    inner: B,
    monitor: MonitorFlags,
    stats: StatsTable,
    faults: FaultTable,
    overrides: OverrideTable,
    tracker: ReleaseTracker,
    delivery: DeliveryTable,
    simulated_resolution: bool,
}

impl<B> CallGate<B> {
    /// Wraps `inner` with a transparent gate.
    pub fn new(inner: B) -> Self {
        CallGate {
            inner,
            monitor: MonitorFlags::none(),
            stats: StatsTable::new(),
            faults: FaultTable::new(),
            overrides: OverrideTable::new(),
            tracker: ReleaseTracker::new(),
            delivery: DeliveryTable::new(),
            simulated_resolution: false,
        }
    }

    /// The wrapped implementation.
    pub const fn inner(&self) -> &B {
        &self.inner
    }

    /// Mutable access to the wrapped implementation. Calls made through
    /// this reference bypass the gate entirely.
    pub const fn inner_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    /// Unwraps the gate, discarding its configuration and statistics.
    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Current monitoring flags.
    pub const fn monitor(&self) -> &MonitorFlags {
        &self.monitor
    }

    /// Mutable monitoring flags, for toggling around the code under test.
    pub const fn monitor_mut(&mut self) -> &mut MonitorFlags {
        &mut self.monitor
    }

    /// Restores monitoring to its constructed state: master switch on,
    /// every per-kind flag off.
    pub const fn reset_monitoring(&mut self) {
        self.monitor.reset();
    }

    /// Recorded statistics.
    pub const fn stats(&self) -> &StatsTable {
        &self.stats
    }

    /// Clears every statistic without touching any other configuration.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Current fault policies.
    pub const fn faults(&self) -> &FaultTable {
        &self.faults
    }

    /// Mutable fault policies. Replacing a slot's policy resets its cursor.
    pub const fn faults_mut(&mut self) -> &mut FaultTable {
        &mut self.faults
    }

    /// Clears every fault policy back to never-fire.
    pub fn reset_faults(&mut self) {
        self.faults.reset();
    }

    /// Mutable override slots.
    pub fn overrides_mut(&mut self) -> &mut OverrideTable {
        &mut self.overrides
    }

    /// Installs the resolve and release overrides together, so a substitute
    /// resolver never feeds lists to the real release.
    pub fn set_resolve_pair_override(
        &mut self,
        resolve: ResolveAddrsFn,
        release: ReleaseAddrsFn,
    ) {
        self.overrides.set_resolve_pair(resolve, release);
    }

    /// Empties every override slot.
    pub fn clear_overrides(&mut self) {
        self.overrides.clear_all();
    }

    /// Enables or disables strict release tracking. While enabled, every
    /// monitored successful resolution is pushed onto the tracker and every
    /// monitored release is checked against newest-first order.
    pub const fn set_strict_release_checking(&mut self, on: bool) {
        self.tracker.set_enabled(on);
    }

    /// Installs or removes the misuse observer notified on each violation.
    pub fn set_misuse_observer(
        &mut self,
        observer: Option<Arc<dyn MisuseObserver>>,
    ) {
        self.tracker.set_observer(observer);
    }

    /// Caps how many outstanding lists the tracker retains.
    pub const fn set_tracker_capacity(&mut self, capacity: usize) {
        self.tracker.set_capacity(capacity);
    }

    /// The release tracker, for inspecting outstanding lists and the
    /// overflow count.
    pub const fn release_tracker(&self) -> &ReleaseTracker {
        &self.tracker
    }

    /// Forgets all tracked lists and the overflow count. Keeps the enabled
    /// flag, capacity, and observer.
    pub fn reset_release_tracking(&mut self) {
        self.tracker.clear();
    }

    /// Routes the resolution family (resolve, release, reverse lookup,
    /// error strings) to the built-in deterministic double instead of the
    /// wrapped implementation. Only monitored calls are rerouted.
    pub const fn set_simulated_resolution(&mut self, on: bool) {
        self.simulated_resolution = on;
    }

    /// Whether the resolution family is routed to the deterministic double.
    pub const fn simulated_resolution(&self) -> bool {
        self.simulated_resolution
    }

    /// Registers a delivery plan for `sd`, restarting from its first chunk.
    /// Returns the previously registered plan, if any. The plan serves
    /// monitored plain receives on `sd` until cleared.
    pub fn set_delivery_plan(
        &mut self,
        sd: SocketHandle,
        plan: impl Into<Arc<DeliveryPlan>>,
    ) -> Option<Arc<DeliveryPlan>> {
        self.delivery.set_plan(sd, plan.into())
    }

    /// Removes the delivery plan for `sd`, returning it if one was set.
    pub fn clear_delivery_plan(
        &mut self,
        sd: SocketHandle,
    ) -> Option<Arc<DeliveryPlan>> {
        self.delivery.clear_plan(sd)
    }

    /// Whether `sd` currently has a delivery plan.
    #[must_use]
    pub fn has_delivery_plan(&self, sd: SocketHandle) -> bool {
        self.delivery.has_plan(sd)
    }

    /// Removes every delivery plan.
    pub fn clear_delivery_plans(&mut self) {
        self.delivery.clear_all();
    }

    /// Restores the gate to its constructed, fully transparent state:
    /// monitoring off, statistics zeroed, fault policies never-fire,
    /// overrides and delivery plans removed, release tracking disabled and
    /// emptied, simulated resolution off.
    pub fn reset(&mut self) {
        self.monitor.reset();
        self.stats.reset();
        self.faults.reset();
        self.overrides.clear_all();
        self.tracker = ReleaseTracker::new();
        self.delivery.clear_all();
        self.simulated_resolution = false;
    }

    /// Advances the fault cursor for `kind` and reports the injection when
    /// the pattern fired.
    ///
    /// The cursor ticks on every call of the kind, monitored or not, so a
    /// schedule stays keyed to call ordinality across monitoring toggles.
    /// Callers honor the returned injection only on monitored calls.
    fn fault_step(&mut self, kind: CallKind) -> Option<(i32, Errno)> {
        let policy = self.faults.slot_mut(kind)?;
        if !policy.evaluate() {
            return None;
        }
        tracing::debug!(
            kind = kind.as_str(),
            cursor = policy.cursor(),
            raw = policy.raw_return,
            errno = %policy.errno,
            "fault pattern fired"
        );
        Some((policy.raw_return, policy.errno))
    }
}

impl<B: NetworkApi> NetworkApi for CallGate<B> {
    fn resolve_addrs(
        &mut self,
        host: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<AddrList, ResolveError> {
        let injected = self.fault_step(CallKind::ResolveAddrs);
        if !self.monitor.effective(CallKind::ResolveAddrs) {
            return self.inner.resolve_addrs(host, service, hints);
        }
        self.stats.resolve_addrs.record_call(ResolveParams {
            host: host.map(str::to_owned),
            service: service.map(str::to_owned),
            hints: hints.copied(),
        });
        if let Some((raw, _)) = injected {
            let err = ResolveError::from_code(raw);
            self.stats.resolve_addrs.record_return(Err(err));
            return Err(err);
        }
        let result = match self.overrides.resolve_addrs.as_mut() {
            Some(f) => f(host, service, hints),
            None if self.simulated_resolution => {
                resolver::numeric_resolve(host, service, hints)
                    .map(AddrList::issue)
            }
            None => self.inner.resolve_addrs(host, service, hints),
        };
        if let Ok(list) = &result {
            self.tracker.track(list.id());
        }
        self.stats.resolve_addrs.record_return(result.clone());
        result
    }

    fn release_addrs(&mut self, list: AddrList) -> ReleaseOutcome {
        if !self.monitor.effective(CallKind::ReleaseAddrs) {
            return self.inner.release_addrs(list);
        }
        let id = list.id();
        self.stats.release_addrs.record_call(id);
        // Misuse is reported but never suppresses the release itself.
        let checked = self.tracker.check_release(id);
        let released = match self.overrides.release_addrs.as_mut() {
            Some(f) => {
                f(list);
                ReleaseOutcome::Clean
            }
            // The double's lists own their memory; dropping is the release.
            None if self.simulated_resolution => ReleaseOutcome::Clean,
            None => self.inner.release_addrs(list),
        };
        let outcome = if checked.is_clean() { released } else { checked };
        self.stats.release_addrs.record_return(outcome);
        outcome
    }

    fn resolve_names(
        &mut self,
        addr: SocketAddr,
        flags: NameFlags,
    ) -> Result<NameInfo, ResolveError> {
        let injected = self.fault_step(CallKind::ResolveNames);
        if !self.monitor.effective(CallKind::ResolveNames) {
            return self.inner.resolve_names(addr, flags);
        }
        self.stats.resolve_names.record_call(NameQuery { addr, flags });
        if let Some((raw, _)) = injected {
            let err = ResolveError::from_code(raw);
            self.stats.resolve_names.record_return(Err(err));
            return Err(err);
        }
        let result = match self.overrides.resolve_names.as_mut() {
            Some(f) => f(addr, flags),
            None if self.simulated_resolution => {
                resolver::numeric_name_info(addr, flags)
            }
            None => self.inner.resolve_names(addr, flags),
        };
        self.stats.resolve_names.record_return(result.clone());
        result
    }

    fn error_string(&mut self, code: i32) -> &'static str {
        if !self.monitor.effective(CallKind::ErrorString) {
            return self.inner.error_string(code);
        }
        self.stats.error_string.record_call(code);
        let text = match self.overrides.error_string.as_mut() {
            Some(f) => f(code),
            None if self.simulated_resolution => resolver::error_message(code),
            None => self.inner.error_string(code),
        };
        self.stats.error_string.record_return(text);
        text
    }

    fn socket(
        &mut self,
        family: AddrFamily,
        ty: SockType,
    ) -> Result<SocketHandle, Errno> {
        let injected = self.fault_step(CallKind::Socket);
        if !self.monitor.effective(CallKind::Socket) {
            return self.inner.socket(family, ty);
        }
        self.stats.socket.record_call(SocketParams {
            family,
            socktype: ty,
        });
        if let Some((raw, errno)) = injected {
            let result = if raw < 0 {
                Err(errno)
            } else {
                Ok(SocketHandle::new(raw))
            };
            self.stats.socket.record_return(result);
            return result;
        }
        let result = match self.overrides.socket.as_mut() {
            Some(f) => f(family, ty),
            None => self.inner.socket(family, ty),
        };
        self.stats.socket.record_return(result);
        result
    }

    fn bind(&mut self, sd: SocketHandle, addr: SocketAddr) -> Result<(), Errno> {
        let injected = self.fault_step(CallKind::Bind);
        if !self.monitor.effective(CallKind::Bind) {
            return self.inner.bind(sd, addr);
        }
        self.stats.bind.record_call(SocketTarget { sd, addr });
        if let Some((raw, errno)) = injected {
            let result = unit_outcome(raw, errno);
            self.stats.bind.record_return(result);
            return result;
        }
        let result = match self.overrides.bind.as_mut() {
            Some(f) => f(sd, addr),
            None => self.inner.bind(sd, addr),
        };
        self.stats.bind.record_return(result);
        result
    }

    fn connect(
        &mut self,
        sd: SocketHandle,
        addr: SocketAddr,
    ) -> Result<(), Errno> {
        let injected = self.fault_step(CallKind::Connect);
        if !self.monitor.effective(CallKind::Connect) {
            return self.inner.connect(sd, addr);
        }
        self.stats.connect.record_call(SocketTarget { sd, addr });
        if let Some((raw, errno)) = injected {
            let result = unit_outcome(raw, errno);
            self.stats.connect.record_return(result);
            return result;
        }
        let result = match self.overrides.connect.as_mut() {
            Some(f) => f(sd, addr),
            None => self.inner.connect(sd, addr),
        };
        self.stats.connect.record_return(result);
        result
    }

    fn listen(&mut self, sd: SocketHandle, backlog: u32) -> Result<(), Errno> {
        let injected = self.fault_step(CallKind::Listen);
        if !self.monitor.effective(CallKind::Listen) {
            return self.inner.listen(sd, backlog);
        }
        self.stats.listen.record_call(ListenParams { sd, backlog });
        if let Some((raw, errno)) = injected {
            let result = unit_outcome(raw, errno);
            self.stats.listen.record_return(result);
            return result;
        }
        let result = match self.overrides.listen.as_mut() {
            Some(f) => f(sd, backlog),
            None => self.inner.listen(sd, backlog),
        };
        self.stats.listen.record_return(result);
        result
    }

    fn accept(
        &mut self,
        sd: SocketHandle,
    ) -> Result<(SocketHandle, Option<SocketAddr>), Errno> {
        let injected = self.fault_step(CallKind::Accept);
        if !self.monitor.effective(CallKind::Accept) {
            return self.inner.accept(sd);
        }
        self.stats.accept.record_call(sd);
        if let Some((raw, errno)) = injected {
            let result = if raw < 0 {
                Err(errno)
            } else {
                Ok((SocketHandle::new(raw), None))
            };
            self.stats.accept.record_return(result.clone());
            return result;
        }
        let result = match self.overrides.accept.as_mut() {
            Some(f) => f(sd),
            None => self.inner.accept(sd),
        };
        self.stats.accept.record_return(result.clone());
        result
    }

    fn recv(
        &mut self,
        sd: SocketHandle,
        buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        let injected = self.fault_step(CallKind::Receive);
        if !self.monitor.effective(CallKind::Receive) {
            return self.inner.recv(sd, buf, flags);
        }
        self.stats.recv_any += 1;
        self.stats.recv.record_call(TransferParams {
            sd,
            len: buf.remaining(),
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = size_outcome(raw, errno);
            self.stats.recv.record_return(result);
            return result;
        }
        let result = match self.overrides.recv.as_mut() {
            Some(f) => f(sd, buf, flags),
            None => {
                let mut buf = buf;
                match self.delivery.receive(sd, &mut buf, flags.dont_wait) {
                    Some(simulated) => simulated,
                    None => self.inner.recv(sd, buf, flags),
                }
            }
        };
        self.stats.recv.record_return(result);
        result
    }

    fn recv_from(
        &mut self,
        sd: SocketHandle,
        buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        let injected = self.fault_step(CallKind::Receive);
        if !self.monitor.effective(CallKind::Receive) {
            return self.inner.recv_from(sd, buf, flags);
        }
        self.stats.recv_any += 1;
        self.stats.recv_from.record_call(TransferParams {
            sd,
            len: buf.remaining(),
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = if raw < 0 {
                Err(errno)
            } else {
                Ok((raw as usize, None))
            };
            self.stats.recv_from.record_return(result);
            return result;
        }
        let result = match self.overrides.recv_from.as_mut() {
            Some(f) => f(sd, buf, flags),
            None => self.inner.recv_from(sd, buf, flags),
        };
        self.stats.recv_from.record_return(result);
        result
    }

    fn recv_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &mut [&mut [u8]],
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        let injected = self.fault_step(CallKind::Receive);
        if !self.monitor.effective(CallKind::Receive) {
            return self.inner.recv_msg(sd, bufs, flags);
        }
        self.stats.recv_any += 1;
        self.stats.recv_msg.record_call(VectoredParams {
            sd,
            segments: bufs.len(),
            total_len: bufs.iter().map(|b| b.len()).sum(),
            dest: None,
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = if raw < 0 {
                Err(errno)
            } else {
                Ok((raw as usize, None))
            };
            self.stats.recv_msg.record_return(result);
            return result;
        }
        let result = match self.overrides.recv_msg.as_mut() {
            Some(f) => f(sd, bufs, flags),
            None => self.inner.recv_msg(sd, bufs, flags),
        };
        self.stats.recv_msg.record_return(result);
        result
    }

    fn send(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        let injected = self.fault_step(CallKind::Send);
        if !self.monitor.effective(CallKind::Send) {
            return self.inner.send(sd, buf, flags);
        }
        self.stats.send_any += 1;
        self.stats.send.record_call(TransferParams {
            sd,
            len: buf.len(),
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = size_outcome(raw, errno);
            self.stats.send.record_return(result);
            return result;
        }
        let result = match self.overrides.send.as_mut() {
            Some(f) => f(sd, buf, flags),
            None => self.inner.send(sd, buf, flags),
        };
        self.stats.send.record_return(result);
        result
    }

    fn send_to(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        dest: SocketAddr,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        let injected = self.fault_step(CallKind::Send);
        if !self.monitor.effective(CallKind::Send) {
            return self.inner.send_to(sd, buf, dest, flags);
        }
        self.stats.send_any += 1;
        self.stats.send_to.record_call(SendToParams {
            sd,
            len: buf.len(),
            dest,
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = size_outcome(raw, errno);
            self.stats.send_to.record_return(result);
            return result;
        }
        let result = match self.overrides.send_to.as_mut() {
            Some(f) => f(sd, buf, dest, flags),
            None => self.inner.send_to(sd, buf, dest, flags),
        };
        self.stats.send_to.record_return(result);
        result
    }

    fn send_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &[&[u8]],
        dest: Option<SocketAddr>,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        let injected = self.fault_step(CallKind::Send);
        if !self.monitor.effective(CallKind::Send) {
            return self.inner.send_msg(sd, bufs, dest, flags);
        }
        self.stats.send_any += 1;
        self.stats.send_msg.record_call(VectoredParams {
            sd,
            segments: bufs.len(),
            total_len: bufs.iter().map(|b| b.len()).sum(),
            dest,
            flags,
        });
        if let Some((raw, errno)) = injected {
            let result = size_outcome(raw, errno);
            self.stats.send_msg.record_return(result);
            return result;
        }
        let result = match self.overrides.send_msg.as_mut() {
            Some(f) => f(sd, bufs, dest, flags),
            None => self.inner.send_msg(sd, bufs, dest, flags),
        };
        self.stats.send_msg.record_return(result);
        result
    }

    fn shutdown(
        &mut self,
        sd: SocketHandle,
        how: ShutdownHow,
    ) -> Result<(), Errno> {
        let injected = self.fault_step(CallKind::Shutdown);
        if !self.monitor.effective(CallKind::Shutdown) {
            return self.inner.shutdown(sd, how);
        }
        self.stats.shutdown.record_call(ShutdownParams { sd, how });
        if let Some((raw, errno)) = injected {
            let result = unit_outcome(raw, errno);
            self.stats.shutdown.record_return(result);
            return result;
        }
        let result = match self.overrides.shutdown.as_mut() {
            Some(f) => f(sd, how),
            None => self.inner.shutdown(sd, how),
        };
        self.stats.shutdown.record_return(result);
        result
    }

    fn poll(
        &mut self,
        entries: &mut [PollEntry],
        timeout: Option<Duration>,
    ) -> Result<usize, Errno> {
        let injected = self.fault_step(CallKind::Poll);
        if !self.monitor.effective(CallKind::Poll) {
            return self.inner.poll(entries, timeout);
        }
        self.stats.poll.record_call(PollParams {
            count: entries.len(),
            timeout,
        });
        if let Some((raw, errno)) = injected {
            let result = size_outcome(raw, errno);
            self.stats.poll.record_return(result);
            return result;
        }
        let result = match self.overrides.poll.as_mut() {
            Some(f) => f(entries, timeout),
            None => self.inner.poll(entries, timeout),
        };
        // Keep the entry set as the call left it, readiness included.
        self.stats.last_poll_entries = Some(entries.to_vec());
        self.stats.poll.record_return(result);
        result
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::addr::AddrListId;
    use crate::api::PollReady;
    use crate::delivery::{Chunk, DeliveryMode};
    use crate::fault::FaultPolicy;
    use crate::tracker::{CollectingMisuseObserver, MisuseKind};
    use std::net::{IpAddr, Ipv4Addr};

    const PEER: SocketAddr =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 4242);

    /// Scripted backend that logs which operations it saw and returns
    /// canned results.
    #[derive(Default)]
    struct StubNet {
        log: Vec<&'static str>,
        next_handle: i32,
        payload: Vec<u8>,
    }

    impl StubNet {
        fn new() -> Self {
            StubNet {
                log: Vec::new(),
                next_handle: 10,
                payload: b"stub-payload".to_vec(),
            }
        }
    }

    impl NetworkApi for StubNet {
        fn resolve_addrs(
            &mut self,
            host: Option<&str>,
            service: Option<&str>,
            hints: Option<&AddrHints>,
        ) -> Result<AddrList, ResolveError> {
            self.log.push("resolve_addrs");
            resolver::numeric_resolve(host, service, hints)
                .map(AddrList::issue)
        }

        fn release_addrs(&mut self, _list: AddrList) -> ReleaseOutcome {
            self.log.push("release_addrs");
            ReleaseOutcome::Clean
        }

        fn resolve_names(
            &mut self,
            addr: SocketAddr,
            flags: NameFlags,
        ) -> Result<NameInfo, ResolveError> {
            self.log.push("resolve_names");
            resolver::numeric_name_info(addr, flags)
        }

        fn error_string(&mut self, code: i32) -> &'static str {
            self.log.push("error_string");
            resolver::error_message(code)
        }

        fn socket(
            &mut self,
            _family: AddrFamily,
            _ty: SockType,
        ) -> Result<SocketHandle, Errno> {
            self.log.push("socket");
            let handle = SocketHandle::new(self.next_handle);
            self.next_handle += 1;
            Ok(handle)
        }

        fn bind(
            &mut self,
            _sd: SocketHandle,
            _addr: SocketAddr,
        ) -> Result<(), Errno> {
            self.log.push("bind");
            Ok(())
        }

        fn connect(
            &mut self,
            _sd: SocketHandle,
            _addr: SocketAddr,
        ) -> Result<(), Errno> {
            self.log.push("connect");
            Ok(())
        }

        fn listen(
            &mut self,
            _sd: SocketHandle,
            _backlog: u32,
        ) -> Result<(), Errno> {
            self.log.push("listen");
            Ok(())
        }

        fn accept(
            &mut self,
            _sd: SocketHandle,
        ) -> Result<(SocketHandle, Option<SocketAddr>), Errno> {
            self.log.push("accept");
            Ok((SocketHandle::new(99), Some(PEER)))
        }

        fn recv(
            &mut self,
            _sd: SocketHandle,
            mut buf: RecvBuf<'_>,
            _flags: MsgFlags,
        ) -> Result<usize, Errno> {
            self.log.push("recv");
            let payload = self.payload.clone();
            Ok(buf.fill_from(&payload))
        }

        fn recv_from(
            &mut self,
            _sd: SocketHandle,
            mut buf: RecvBuf<'_>,
            _flags: MsgFlags,
        ) -> Result<(usize, Option<SocketAddr>), Errno> {
            self.log.push("recv_from");
            let payload = self.payload.clone();
            Ok((buf.fill_from(&payload), Some(PEER)))
        }

        fn recv_msg(
            &mut self,
            _sd: SocketHandle,
            bufs: &mut [&mut [u8]],
            _flags: MsgFlags,
        ) -> Result<(usize, Option<SocketAddr>), Errno> {
            self.log.push("recv_msg");
            let mut copied = 0;
            let mut rest = self.payload.as_slice();
            for buf in bufs.iter_mut() {
                let count = rest.len().min(buf.len());
                buf[..count].copy_from_slice(&rest[..count]);
                rest = &rest[count..];
                copied += count;
            }
            Ok((copied, Some(PEER)))
        }

        fn send(
            &mut self,
            _sd: SocketHandle,
            buf: &[u8],
            _flags: MsgFlags,
        ) -> Result<usize, Errno> {
            self.log.push("send");
            Ok(buf.len())
        }

        fn send_to(
            &mut self,
            _sd: SocketHandle,
            buf: &[u8],
            _dest: SocketAddr,
            _flags: MsgFlags,
        ) -> Result<usize, Errno> {
            self.log.push("send_to");
            Ok(buf.len())
        }

        fn send_msg(
            &mut self,
            _sd: SocketHandle,
            bufs: &[&[u8]],
            _dest: Option<SocketAddr>,
            _flags: MsgFlags,
        ) -> Result<usize, Errno> {
            self.log.push("send_msg");
            Ok(bufs.iter().map(|b| b.len()).sum())
        }

        fn shutdown(
            &mut self,
            _sd: SocketHandle,
            _how: ShutdownHow,
        ) -> Result<(), Errno> {
            self.log.push("shutdown");
            Ok(())
        }

        fn poll(
            &mut self,
            entries: &mut [PollEntry],
            _timeout: Option<Duration>,
        ) -> Result<usize, Errno> {
            self.log.push("poll");
            for entry in entries.iter_mut() {
                entry.ready = PollReady {
                    read: entry.interest.read,
                    write: entry.interest.write,
                    error: false,
                    hangup: false,
                };
            }
            Ok(entries.len())
        }
    }

    fn monitored_gate() -> CallGate<StubNet> {
        let mut gate = CallGate::new(StubNet::new());
        gate.monitor_mut().set_all(true);
        gate
    }

    const SD: SocketHandle = SocketHandle::new(7);

    #[test]
    fn test_fresh_gate_is_transparent() {
        let mut gate = CallGate::new(StubNet::new());
        let mut buf = [0u8; 16];

        let got = gate
            .recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default())
            .unwrap();

        assert_eq!(got, b"stub-payload".len());
        assert_eq!(gate.inner().log, vec!["recv"]);
        assert_eq!(gate.stats().recv.called, 0);
        assert_eq!(gate.stats().recv_any, 0);
    }

    #[test]
    fn test_monitored_call_records_params_and_return() {
        let mut gate = monitored_gate();

        let sent = gate.send(SD, b"hello", MsgFlags::DONT_WAIT).unwrap();

        assert_eq!(sent, 5);
        assert_eq!(gate.stats().send.called, 1);
        assert_eq!(
            gate.stats().send.last_params,
            Some(TransferParams {
                sd: SD,
                len: 5,
                flags: MsgFlags::DONT_WAIT,
            })
        );
        assert_eq!(gate.stats().send.last_return, Some(Ok(5)));
        assert_eq!(gate.stats().send_any, 1);
    }

    #[test]
    fn test_master_switch_disables_all_recording() {
        let mut gate = monitored_gate();
        gate.monitor_mut().active = false;

        gate.send(SD, b"hello", MsgFlags::default()).unwrap();

        assert_eq!(gate.stats().send.called, 0);
        assert_eq!(gate.inner().log, vec!["send"]);
    }

    #[test]
    fn test_fault_injection_short_circuits_backend() {
        let mut gate = monitored_gate();
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Connect) {
            *slot = FaultPolicy::always(-1, Errno::CONNREFUSED);
        }

        let result = gate.connect(SD, PEER);

        assert_eq!(result, Err(Errno::CONNREFUSED));
        assert!(gate.inner().log.is_empty());
        assert_eq!(gate.stats().connect.called, 1);
        assert_eq!(
            gate.stats().connect.last_return,
            Some(Err(Errno::CONNREFUSED))
        );
    }

    #[test]
    fn test_nonnegative_injection_is_synthetic_success() {
        let mut gate = monitored_gate();
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Receive) {
            *slot = FaultPolicy::always(0, Errno::IO);
        }
        let mut buf = [0u8; 8];

        let got = gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default());

        // A zero raw return models end-of-stream without touching the
        // backend.
        assert_eq!(got, Ok(0));
        assert!(gate.inner().log.is_empty());
    }

    #[test]
    fn test_fault_cursor_ticks_on_unmonitored_calls() {
        let mut gate = CallGate::new(StubNet::new());
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Send) {
            *slot = FaultPolicy::nth_call(3, -1, Errno::PIPE);
        }

        // Calls 1 and 2 land while send is unmonitored.
        gate.send(SD, b"a", MsgFlags::default()).unwrap();
        gate.send(SD, b"b", MsgFlags::default()).unwrap();

        gate.monitor_mut().set(CallKind::Send, true);
        let third = gate.send(SD, b"c", MsgFlags::default());
        let fourth = gate.send(SD, b"d", MsgFlags::default());

        assert_eq!(third, Err(Errno::PIPE));
        assert_eq!(fourth, Ok(1));
    }

    #[test]
    fn test_fault_fired_while_unmonitored_is_not_injected() {
        let mut gate = CallGate::new(StubNet::new());
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Send) {
            *slot = FaultPolicy::nth_call(2, -1, Errno::PIPE);
        }
        gate.monitor_mut().set(CallKind::Send, true);

        gate.send(SD, b"a", MsgFlags::default()).unwrap();
        gate.monitor_mut().set(CallKind::Send, false);
        // The schedule's ordinal lands here and is consumed silently.
        let second = gate.send(SD, b"b", MsgFlags::default());
        gate.monitor_mut().set(CallKind::Send, true);
        let third = gate.send(SD, b"c", MsgFlags::default());

        assert_eq!(second, Ok(1));
        assert_eq!(third, Ok(1));
    }

    #[test]
    fn test_receive_family_shares_one_fault_schedule() {
        let mut gate = monitored_gate();
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Receive) {
            *slot = FaultPolicy::nth_call(2, -1, Errno::INTR);
        }
        let mut buf = [0u8; 8];

        let first =
            gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default());
        let second =
            gate.recv_from(SD, RecvBuf::Fill(&mut buf), MsgFlags::default());

        assert!(first.is_ok());
        assert_eq!(second, Err(Errno::INTR));
        assert_eq!(gate.stats().recv_any, 2);
    }

    #[test]
    fn test_override_takes_precedence_over_backend_and_delivery() {
        let mut gate = monitored_gate();
        gate.set_delivery_plan(
            SD,
            DeliveryPlan::new(
                DeliveryMode::Before,
                vec![Chunk::immediate(vec![1, 2, 3])],
            ),
        );
        gate.overrides_mut().recv = Some(Box::new(|_sd, _buf, _flags| Ok(7)));
        let mut buf = [0u8; 8];

        let got = gate.recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default());

        assert_eq!(got, Ok(7));
        assert!(gate.inner().log.is_empty());
    }

    #[test]
    fn test_delivery_plan_serves_monitored_recv() {
        let mut gate = monitored_gate();
        gate.set_delivery_plan(
            SD,
            DeliveryPlan::new(
                DeliveryMode::Before,
                vec![Chunk::immediate(vec![9, 9, 9])],
            ),
        );
        let mut buf = [0u8; 8];

        let got = gate
            .recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default())
            .unwrap();

        assert_eq!(got, 3);
        assert_eq!(&buf[..3], &[9, 9, 9]);
        assert!(gate.inner().log.is_empty());
    }

    #[test]
    fn test_delivery_plan_ignored_while_unmonitored() {
        let mut gate = CallGate::new(StubNet::new());
        gate.set_delivery_plan(
            SD,
            DeliveryPlan::new(
                DeliveryMode::Before,
                vec![Chunk::immediate(vec![9, 9, 9])],
            ),
        );
        let mut buf = [0u8; 16];

        let got = gate
            .recv(SD, RecvBuf::Fill(&mut buf), MsgFlags::default())
            .unwrap();

        assert_eq!(got, b"stub-payload".len());
        assert_eq!(gate.inner().log, vec!["recv"]);
    }

    #[test]
    fn test_simulated_resolution_routes_to_double() {
        let mut gate = monitored_gate();
        gate.set_simulated_resolution(true);

        let list = gate
            .resolve_addrs(Some("127.0.0.1"), Some("80"), None)
            .unwrap();
        let entry = list.first().unwrap();
        assert_eq!(entry.addr.port(), 80);

        let outcome = gate.release_addrs(list);
        assert_eq!(outcome, ReleaseOutcome::Clean);
        assert!(gate.inner().log.is_empty());
    }

    #[test]
    fn test_release_out_of_order_is_misused_and_still_released() {
        let mut gate = monitored_gate();
        gate.set_simulated_resolution(true);
        gate.set_strict_release_checking(true);
        let observer = Arc::new(CollectingMisuseObserver::new());
        gate.set_misuse_observer(Some(observer.clone()));

        let older = gate
            .resolve_addrs(Some("10.0.0.1"), Some("1"), None)
            .unwrap();
        let newer = gate
            .resolve_addrs(Some("10.0.0.2"), Some("2"), None)
            .unwrap();
        let newer_id = newer.id();

        let first = gate.release_addrs(older);
        let second = gate.release_addrs(newer);

        assert_eq!(first, ReleaseOutcome::Misused);
        assert_eq!(second, ReleaseOutcome::Clean);
        let reports = observer.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, MisuseKind::NotNewest);
        assert_eq!(reports[0].newest, Some(newer_id));
        assert_eq!(
            gate.stats().release_addrs.last_return,
            Some(ReleaseOutcome::Clean)
        );
    }

    #[test]
    fn test_untracked_release_is_misused() {
        let mut gate = monitored_gate();
        gate.set_simulated_resolution(true);
        gate.set_strict_release_checking(true);

        let list = AddrList::issue(
            resolver::numeric_resolve(Some("127.0.0.1"), Some("53"), None)
                .unwrap(),
        );
        let outcome = gate.release_addrs(list);

        assert_eq!(outcome, ReleaseOutcome::Misused);
    }

    #[test]
    fn test_release_without_checking_is_clean() {
        let mut gate = monitored_gate();
        gate.set_simulated_resolution(true);

        let list = AddrList::issue(
            resolver::numeric_resolve(Some("127.0.0.1"), Some("53"), None)
                .unwrap(),
        );
        assert_eq!(gate.release_addrs(list), ReleaseOutcome::Clean);
    }

    #[test]
    fn test_poll_snapshot_keeps_post_call_readiness() {
        let mut gate = monitored_gate();
        let mut entries = [PollEntry::readable(SD)];

        let ready = gate.poll(&mut entries, Some(Duration::ZERO)).unwrap();

        assert_eq!(ready, 1);
        let snapshot = gate.stats().last_poll_entries.as_ref().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].ready.read);
        assert_eq!(
            gate.stats().poll.last_params,
            Some(PollParams {
                count: 1,
                timeout: Some(Duration::ZERO),
            })
        );
    }

    #[test]
    fn test_accept_records_peer_address() {
        let mut gate = monitored_gate();

        let (sd, peer) = gate.accept(SD).unwrap();

        assert_eq!(sd, SocketHandle::new(99));
        assert_eq!(peer, Some(PEER));
        assert_eq!(
            gate.stats().accept.last_return,
            Some(Ok((SocketHandle::new(99), Some(PEER))))
        );
    }

    #[test]
    fn test_error_string_has_its_own_flag() {
        let mut gate = CallGate::new(StubNet::new());
        gate.monitor_mut().set(CallKind::ErrorString, true);

        let text = gate.error_string(ResolveError::Fail.code());

        assert_eq!(text, ResolveError::Fail.message());
        assert_eq!(gate.stats().error_string.called, 1);
        assert_eq!(gate.stats().resolve_addrs.called, 0);
    }

    #[test]
    fn test_resolve_pair_override_handles_both_directions() {
        let mut gate = monitored_gate();
        let released: Arc<parking_lot::Mutex<Vec<AddrListId>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = released.clone();
        gate.set_resolve_pair_override(
            Box::new(|host, service, hints| {
                resolver::numeric_resolve(host, service, hints)
                    .map(AddrList::issue)
            }),
            Box::new(move |list| sink.lock().push(list.id())),
        );

        let list = gate
            .resolve_addrs(Some("192.168.1.1"), Some("443"), None)
            .unwrap();
        let id = list.id();
        gate.release_addrs(list);

        assert_eq!(released.lock().as_slice(), &[id]);
        assert!(gate.inner().log.is_empty());
    }

    #[test]
    fn test_stacked_gates_compose() {
        let mut inner_gate = CallGate::new(StubNet::new());
        inner_gate.monitor_mut().set(CallKind::Send, true);
        let mut outer = CallGate::new(inner_gate);

        outer.send(SD, b"xyz", MsgFlags::default()).unwrap();

        // The outer gate is transparent; the inner one records.
        assert_eq!(outer.stats().send.called, 0);
        assert_eq!(outer.inner().stats().send.called, 1);
        assert_eq!(outer.inner().inner().log, vec!["send"]);
    }

    #[test]
    fn test_reset_restores_constructed_state() {
        let mut gate = monitored_gate();
        gate.set_simulated_resolution(true);
        gate.set_strict_release_checking(true);
        gate.overrides_mut().send =
            Some(Box::new(|_sd, buf, _flags| Ok(buf.len())));
        if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Send) {
            *slot = FaultPolicy::always(-1, Errno::PIPE);
        }
        gate.set_delivery_plan(
            SD,
            DeliveryPlan::new(
                DeliveryMode::After,
                vec![Chunk::immediate(vec![1])],
            ),
        );
        let list = gate
            .resolve_addrs(Some("127.0.0.1"), Some("80"), None)
            .unwrap();
        drop(list);

        gate.reset();

        assert!(!gate.monitor().wants(CallKind::Send));
        assert_eq!(gate.stats().resolve_addrs.called, 0);
        assert!(gate.overrides_mut().send.is_none());
        assert!(!gate.simulated_resolution());
        assert!(!gate.release_tracker().is_enabled());
        assert!(gate.release_tracker().is_empty());
        assert!(!gate.has_delivery_plan(SD));
        let policy = gate.faults().slot(CallKind::Send).unwrap();
        assert_eq!(policy.pattern(), crate::fault::FaultPattern::Never);
    }

    #[test]
    fn test_reset_stats_leaves_configuration_alone() {
        let mut gate = monitored_gate();
        gate.send(SD, b"hello", MsgFlags::default()).unwrap();
        assert_eq!(gate.stats().send.called, 1);

        gate.reset_stats();

        assert_eq!(gate.stats().send.called, 0);
        assert!(gate.monitor().wants(CallKind::Send));
    }

    #[test]
    fn test_into_inner_returns_backend() {
        let mut gate = monitored_gate();
        gate.send(SD, b"x", MsgFlags::default()).unwrap();

        let backend = gate.into_inner();
        assert_eq!(backend.log, vec!["send"]);
    }
}

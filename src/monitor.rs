//! The call-kind taxonomy ([`CallKind`]) and the per-kind monitoring
//! switches with their master gate ([`MonitorFlags`]).

use std::fmt;
use std::fmt::Display;

/// One category of networking operation sharing a single monitoring, fault
/// and override configuration slot.
///
/// The three receive variants (plain, with peer address, scatter-gather) are
/// one kind, as are the three send variants; statistics stay per-variant but
/// configuration is per-kind.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CallKind {
    /// Numeric host/service to address-list resolution.
    ResolveAddrs,
    /// Release of a previously issued address list.
    ReleaseAddrs,
    /// Reverse address-to-name lookup.
    ResolveNames,
    /// Resolution error code to message text.
    ErrorString,
    /// Socket creation.
    Socket,
    /// Local address binding.
    Bind,
    /// Outgoing connection establishment.
    Connect,
    /// Listen-state transition.
    Listen,
    /// Accepting an incoming connection.
    Accept,
    /// The receive family.
    Receive,
    /// The send family.
    Send,
    /// Connection shutdown.
    Shutdown,
    /// Readiness multiplexing.
    Poll,
}

impl CallKind {
    /// Every call kind, in dispatch-surface order.
    pub const ALL: [CallKind; 13] = [
        CallKind::ResolveAddrs,
        CallKind::ReleaseAddrs,
        CallKind::ResolveNames,
        CallKind::ErrorString,
        CallKind::Socket,
        CallKind::Bind,
        CallKind::Connect,
        CallKind::Listen,
        CallKind::Accept,
        CallKind::Receive,
        CallKind::Send,
        CallKind::Shutdown,
        CallKind::Poll,
    ];

    /// Stable snake_case name, suitable for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CallKind::ResolveAddrs => "resolve_addrs",
            CallKind::ReleaseAddrs => "release_addrs",
            CallKind::ResolveNames => "resolve_names",
            CallKind::ErrorString => "error_string",
            CallKind::Socket => "socket",
            CallKind::Bind => "bind",
            CallKind::Connect => "connect",
            CallKind::Listen => "listen",
            CallKind::Accept => "accept",
            CallKind::Receive => "receive",
            CallKind::Send => "send",
            CallKind::Shutdown => "shutdown",
            CallKind::Poll => "poll",
        }
    }
}

impl Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which call kinds the gate currently instruments.
///
/// A fresh set of flags monitors nothing: every call passes through to the
/// backing implementation untouched. Tests flip on the kinds they assert on,
/// run the code under test, then read statistics.
///
/// [`active`](MonitorFlags::active) is a master switch over all per-kind
/// flags; lowering it pauses instrumentation without losing the per-kind
/// selection.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MonitorFlags {
    /// Master switch. When false no call kind is instrumented regardless of
    /// the per-kind flags.
    pub active: bool,
    /// Instrument address resolution.
    pub resolve_addrs: bool,
    /// Instrument address-list release.
    pub release_addrs: bool,
    /// Instrument reverse name lookup.
    pub resolve_names: bool,
    /// Instrument error-to-message lookups.
    pub error_string: bool,
    /// Instrument socket creation.
    pub socket: bool,
    /// Instrument bind.
    pub bind: bool,
    /// Instrument connect.
    pub connect: bool,
    /// Instrument listen.
    pub listen: bool,
    /// Instrument accept.
    pub accept: bool,
    /// Instrument the receive family.
    pub receive: bool,
    /// Instrument the send family.
    pub send: bool,
    /// Instrument shutdown.
    pub shutdown: bool,
    /// Instrument readiness polling.
    pub poll: bool,
}

impl MonitorFlags {
    /// Flags monitoring nothing, with the master switch up.
    #[must_use]
    pub const fn none() -> Self {
        MonitorFlags {
            active: true,
            resolve_addrs: false,
            release_addrs: false,
            resolve_names: false,
            error_string: false,
            socket: false,
            bind: false,
            connect: false,
            listen: false,
            accept: false,
            receive: false,
            send: false,
            shutdown: false,
            poll: false,
        }
    }

    /// Flags monitoring every call kind.
    #[must_use]
    pub const fn all() -> Self {
        MonitorFlags {
            active: true,
            resolve_addrs: true,
            release_addrs: true,
            resolve_names: true,
            error_string: true,
            socket: true,
            bind: true,
            connect: true,
            listen: true,
            accept: true,
            receive: true,
            send: true,
            shutdown: true,
            poll: true,
        }
    }

    /// Reads the per-kind flag, ignoring the master switch.
    #[must_use]
    pub const fn wants(&self, kind: CallKind) -> bool {
        match kind {
            CallKind::ResolveAddrs => self.resolve_addrs,
            CallKind::ReleaseAddrs => self.release_addrs,
            CallKind::ResolveNames => self.resolve_names,
            CallKind::ErrorString => self.error_string,
            CallKind::Socket => self.socket,
            CallKind::Bind => self.bind,
            CallKind::Connect => self.connect,
            CallKind::Listen => self.listen,
            CallKind::Accept => self.accept,
            CallKind::Receive => self.receive,
            CallKind::Send => self.send,
            CallKind::Shutdown => self.shutdown,
            CallKind::Poll => self.poll,
        }
    }

    /// Writes the per-kind flag.
    pub const fn set(&mut self, kind: CallKind, on: bool) {
        match kind {
            CallKind::ResolveAddrs => self.resolve_addrs = on,
            CallKind::ReleaseAddrs => self.release_addrs = on,
            CallKind::ResolveNames => self.resolve_names = on,
            CallKind::ErrorString => self.error_string = on,
            CallKind::Socket => self.socket = on,
            CallKind::Bind => self.bind = on,
            CallKind::Connect => self.connect = on,
            CallKind::Listen => self.listen = on,
            CallKind::Accept => self.accept = on,
            CallKind::Receive => self.receive = on,
            CallKind::Send => self.send = on,
            CallKind::Shutdown => self.shutdown = on,
            CallKind::Poll => self.poll = on,
        }
    }

    /// Sets every per-kind flag at once. Leaves the master switch alone.
    pub const fn set_all(&mut self, on: bool) {
        self.resolve_addrs = on;
        self.release_addrs = on;
        self.resolve_names = on;
        self.error_string = on;
        self.socket = on;
        self.bind = on;
        self.connect = on;
        self.listen = on;
        self.accept = on;
        self.receive = on;
        self.send = on;
        self.shutdown = on;
        self.poll = on;
    }

    /// Sets the resolution-related flags (resolve, release, reverse lookup,
    /// error string) together.
    pub const fn set_resolution_family(&mut self, on: bool) {
        self.resolve_addrs = on;
        self.release_addrs = on;
        self.resolve_names = on;
        self.error_string = on;
    }

    /// Returns `true` when the kind is instrumented right now: the master
    /// switch is up and the per-kind flag is set.
    #[must_use]
    pub const fn effective(&self, kind: CallKind) -> bool {
        self.active && self.wants(kind)
    }

    /// Back to the fresh state: nothing monitored, master switch up.
    pub const fn reset(&mut self) {
        *self = MonitorFlags::none();
    }
}

impl Default for MonitorFlags {
    fn default() -> Self {
        MonitorFlags::none()
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

    #[test]
    fn test_fresh_flags_monitor_nothing() {
        let flags = MonitorFlags::default();
        assert!(flags.active);
        for kind in CallKind::ALL {
            assert!(!flags.effective(kind), "{kind} monitored by default");
        }
    }

    #[test]
    fn test_master_switch_overrides_kind_flags() {
        let mut flags = MonitorFlags::all();
        for kind in CallKind::ALL {
            assert!(flags.effective(kind));
        }
        flags.active = false;
        for kind in CallKind::ALL {
            assert!(!flags.effective(kind));
            assert!(flags.wants(kind), "per-kind selection must survive");
        }
    }

    #[test]
    fn test_set_round_trips_every_kind() {
        let mut flags = MonitorFlags::none();
        for kind in CallKind::ALL {
            flags.set(kind, true);
            assert!(flags.wants(kind));
            flags.set(kind, false);
            assert!(!flags.wants(kind));
        }
    }

    #[test]
    fn test_resolution_family_setter() {
        let mut flags = MonitorFlags::none();
        flags.set_resolution_family(true);
        assert!(flags.resolve_addrs);
        assert!(flags.release_addrs);
        assert!(flags.resolve_names);
        assert!(flags.error_string);
        assert!(!flags.socket);
        assert!(!flags.receive);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut flags = MonitorFlags::all();
        flags.active = false;
        flags.reset();
        assert_eq!(flags, MonitorFlags::none());
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(CallKind::ResolveAddrs.as_str(), "resolve_addrs");
        assert_eq!(CallKind::Receive.as_str(), "receive");
        assert_eq!(format!("{}", CallKind::Poll), "poll");
        assert_eq!(CallKind::ALL.len(), 13);
    }
}

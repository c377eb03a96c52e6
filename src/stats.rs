//! Per-call statistics: the generic capture slot ([`CallRecord`]), the
//! per-kind parameter types it stores, and the [`StatsTable`] tests read
//! back.

use std::fmt;
use std::fmt::Display;
use std::net::SocketAddr;

use web_time::Duration;

use crate::addr::{
    AddrFamily, AddrHints, AddrList, AddrListId, NameFlags, NameInfo,
    SockType,
};
use crate::api::{MsgFlags, PollEntry, ShutdownHow};
use crate::error::{Errno, ResolveError};
use crate::tracker::ReleaseOutcome;
use crate::SocketHandle;

/// Counter plus last-seen captures for one operation.
///
/// `P` is the operation's captured parameter shape, `R` its recorded result.
/// Records are purely additive; the gate writes them only while the owning
/// call kind is monitored.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CallRecord<P, R> {
    /// How many times the operation ran while monitored.
    pub called: u64,
    /// Parameters of the most recent monitored call.
    pub last_params: Option<P>,
    /// Result of the most recent monitored call that got far enough to
    /// produce one.
    pub last_return: Option<R>,
}

impl<P, R> CallRecord<P, R> {
    /// An empty record.
    #[must_use]
    pub const fn new() -> Self {
        CallRecord {
            called: 0,
            last_params: None,
            last_return: None,
        }
    }

    /// Counts a call and captures its parameters.
    pub fn record_call(&mut self, params: P) {
        self.called += 1;
        self.last_params = Some(params);
    }

    /// Captures the call's result.
    pub fn record_return(&mut self, ret: R) {
        self.last_return = Some(ret);
    }

    /// Back to the empty state.
    pub fn reset(&mut self) {
        *self = CallRecord::new();
    }
}

impl<P, R> Default for CallRecord<P, R> {
    fn default() -> Self {
        CallRecord::new()
    }
}

/// Captured parameters of an address-resolution call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolveParams {
    /// Host argument, owned copy.
    pub host: Option<String>,
    /// Service argument, owned copy.
    pub service: Option<String>,
    /// Hints, when the caller supplied any.
    pub hints: Option<AddrHints>,
}

/// Captured parameters of a reverse name lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NameQuery {
    /// Address being looked up.
    pub addr: SocketAddr,
    /// Lookup flags.
    pub flags: NameFlags,
}

/// Captured parameters of socket creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SocketParams {
    /// Requested family.
    pub family: AddrFamily,
    /// Requested type.
    pub socktype: SockType,
}

/// Captured parameters of bind and connect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SocketTarget {
    /// The socket.
    pub sd: SocketHandle,
    /// The local or remote address named by the call.
    pub addr: SocketAddr,
}

/// Captured parameters of listen.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ListenParams {
    /// The socket.
    pub sd: SocketHandle,
    /// Requested backlog.
    pub backlog: u32,
}

/// Captured parameters of single-buffer receive and send calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransferParams {
    /// The socket.
    pub sd: SocketHandle,
    /// Caller buffer length.
    pub len: usize,
    /// Transfer flags.
    pub flags: MsgFlags,
}

/// Captured parameters of a send to an explicit destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SendToParams {
    /// The socket.
    pub sd: SocketHandle,
    /// Caller buffer length.
    pub len: usize,
    /// Destination address.
    pub dest: SocketAddr,
    /// Transfer flags.
    pub flags: MsgFlags,
}

/// Captured parameters of the scatter-gather transfer calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VectoredParams {
    /// The socket.
    pub sd: SocketHandle,
    /// Number of buffer segments.
    pub segments: usize,
    /// Summed capacity (receive) or summed payload length (send).
    pub total_len: usize,
    /// Destination, for sends that named one.
    pub dest: Option<SocketAddr>,
    /// Transfer flags.
    pub flags: MsgFlags,
}

/// Captured parameters of shutdown.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ShutdownParams {
    /// The socket.
    pub sd: SocketHandle,
    /// Which half was shut down.
    pub how: ShutdownHow,
}

/// Captured parameters of a readiness poll.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PollParams {
    /// Number of entries in the caller's set.
    pub count: usize,
    /// Timeout, `None` for an indefinite wait.
    pub timeout: Option<Duration>,
}

/// Every statistic the gate records, one record per concrete operation.
///
/// Configuration (monitoring, faults, overrides) is per call kind, but
/// captures differ between the variants of a family, so each variant keeps
/// its own record; [`recv_any`](StatsTable::recv_any) and
/// [`send_any`](StatsTable::send_any) aggregate across a family for tests
/// that only care that bytes moved.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct StatsTable {
    /// Address resolution.
    pub resolve_addrs:
        CallRecord<ResolveParams, Result<AddrList, ResolveError>>,
    /// Address-list release.
    pub release_addrs: CallRecord<AddrListId, ReleaseOutcome>,
    /// Reverse name lookup.
    pub resolve_names: CallRecord<NameQuery, Result<NameInfo, ResolveError>>,
    /// Error-to-message lookup.
    pub error_string: CallRecord<i32, &'static str>,
    /// Socket creation.
    pub socket: CallRecord<SocketParams, Result<SocketHandle, Errno>>,
    /// Bind.
    pub bind: CallRecord<SocketTarget, Result<(), Errno>>,
    /// Connect.
    pub connect: CallRecord<SocketTarget, Result<(), Errno>>,
    /// Listen.
    pub listen: CallRecord<ListenParams, Result<(), Errno>>,
    /// Accept, with the peer address it reported.
    pub accept: CallRecord<
        SocketHandle,
        Result<(SocketHandle, Option<SocketAddr>), Errno>,
    >,
    /// Plain receive.
    pub recv: CallRecord<TransferParams, Result<usize, Errno>>,
    /// Receive with source address.
    pub recv_from:
        CallRecord<TransferParams, Result<(usize, Option<SocketAddr>), Errno>>,
    /// Scatter-gather receive.
    pub recv_msg:
        CallRecord<VectoredParams, Result<(usize, Option<SocketAddr>), Errno>>,
    /// Plain send.
    pub send: CallRecord<TransferParams, Result<usize, Errno>>,
    /// Send to an explicit destination.
    pub send_to: CallRecord<SendToParams, Result<usize, Errno>>,
    /// Scatter-gather send.
    pub send_msg: CallRecord<VectoredParams, Result<usize, Errno>>,
    /// Shutdown.
    pub shutdown: CallRecord<ShutdownParams, Result<(), Errno>>,
    /// Readiness poll.
    pub poll: CallRecord<PollParams, Result<usize, Errno>>,
    /// Monitored calls of any receive variant.
    pub recv_any: u64,
    /// Monitored calls of any send variant.
    pub send_any: u64,
    /// Snapshot of the caller's poll entries as the last monitored poll left
    /// them, readiness included.
    pub last_poll_entries: Option<Vec<PollEntry>>,
}

impl StatsTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        StatsTable::default()
    }

    /// Zeroes every counter and captured field.
    pub fn reset(&mut self) {
        *self = StatsTable::default();
    }

    /// Serializes the table as compact JSON.
    ///
    /// # Errors
    ///
    /// Forwards serialization failures.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the table as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Forwards serialization failures.
    #[cfg(feature = "json")]
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for StatsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            resolve_addrs,
            release_addrs,
            resolve_names,
            error_string,
            socket,
            bind,
            connect,
            listen,
            accept,
            recv,
            recv_from,
            recv_msg,
            send,
            send_to,
            send_msg,
            shutdown,
            poll,
            recv_any,
            send_any,
            last_poll_entries: _,
        } = self;
        writeln!(f, "resolve_addrs: {}", resolve_addrs.called)?;
        writeln!(f, "release_addrs: {}", release_addrs.called)?;
        writeln!(f, "resolve_names: {}", resolve_names.called)?;
        writeln!(f, "error_string: {}", error_string.called)?;
        writeln!(f, "socket: {}", socket.called)?;
        writeln!(f, "bind: {}", bind.called)?;
        writeln!(f, "connect: {}", connect.called)?;
        writeln!(f, "listen: {}", listen.called)?;
        writeln!(f, "accept: {}", accept.called)?;
        writeln!(f, "recv: {}", recv.called)?;
        writeln!(f, "recv_from: {}", recv_from.called)?;
        writeln!(f, "recv_msg: {}", recv_msg.called)?;
        writeln!(f, "send: {}", send.called)?;
        writeln!(f, "send_to: {}", send_to.called)?;
        writeln!(f, "send_msg: {}", send_msg.called)?;
        writeln!(f, "shutdown: {}", shutdown.called)?;
        writeln!(f, "poll: {}", poll.called)?;
        writeln!(f, "recv_any: {recv_any}")?;
        write!(f, "send_any: {send_any}")
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
    fn test_record_counts_and_captures() {
        let mut record: CallRecord<TransferParams, Result<usize, Errno>> =
            CallRecord::new();
        let params = TransferParams {
            sd: SocketHandle::new(5),
            len: 64,
            flags: MsgFlags::default(),
        };
        record.record_call(params);
        record.record_call(params);
        record.record_return(Ok(12));

        assert_eq!(record.called, 2);
        assert_eq!(record.last_params, Some(params));
        assert_eq!(record.last_return, Some(Ok(12)));
    }

    #[test]
    fn test_record_reset() {
        let mut record: CallRecord<i32, &'static str> = CallRecord::new();
        record.record_call(-2);
        record.record_return("Name or service not known");
        record.reset();
        assert_eq!(record, CallRecord::new());
    }

    #[test]
    fn test_table_reset_clears_everything() {
        let mut stats = StatsTable::new();
        stats.socket.record_call(SocketParams {
            family: AddrFamily::V4,
            socktype: SockType::Dgram,
        });
        stats.recv_any = 7;
        stats.last_poll_entries = Some(Vec::new());

        stats.reset();
        assert_eq!(stats, StatsTable::new());
    }

    #[test]
    fn test_display_lists_counts() {
        let mut stats = StatsTable::new();
        stats.connect.called = 3;
        stats.send_any = 9;
        let text = format!("{stats}");
        assert!(text.contains("connect: 3"));
        assert!(text.contains("send_any: 9"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json_round_trips_counts() {
        let mut stats = StatsTable::new();
        stats.poll.called = 2;
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"poll\""));
        assert!(json.contains("\"called\":2"));
        let pretty = stats.to_json_pretty().unwrap();
        assert!(pretty.contains("\"called\": 2"));
    }
}

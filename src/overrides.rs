//! Per-kind override slots ([`OverrideTable`]) holding the closures that
//! replace individual operations, and the boxed function types they store.

use std::fmt;
use std::net::SocketAddr;

use web_time::Duration;

use crate::addr::{AddrFamily, AddrHints, AddrList, NameFlags, NameInfo, SockType};
use crate::api::{MsgFlags, PollEntry, RecvBuf, ShutdownHow};
use crate::error::{Errno, ResolveError};
use crate::SocketHandle;

/// Substitute for address resolution.
pub type ResolveAddrsFn = Box<
    dyn FnMut(
            Option<&str>,
            Option<&str>,
            Option<&AddrHints>,
        ) -> Result<AddrList, ResolveError>
        + Send,
>;
/// Substitute for the underlying release of an address list. Misuse tracking
/// still happens in the gate; the override only replaces the release itself.
pub type ReleaseAddrsFn = Box<dyn FnMut(AddrList) + Send>;
/// Substitute for reverse name lookup.
pub type ResolveNamesFn = Box<
    dyn FnMut(SocketAddr, NameFlags) -> Result<NameInfo, ResolveError> + Send,
>;
/// Substitute for error-to-message lookup.
pub type ErrorStringFn = Box<dyn FnMut(i32) -> &'static str + Send>;
/// Substitute for socket creation.
pub type SocketFn =
    Box<dyn FnMut(AddrFamily, SockType) -> Result<SocketHandle, Errno> + Send>;
/// Substitute for bind.
pub type BindFn =
    Box<dyn FnMut(SocketHandle, SocketAddr) -> Result<(), Errno> + Send>;
/// Substitute for connect.
pub type ConnectFn =
    Box<dyn FnMut(SocketHandle, SocketAddr) -> Result<(), Errno> + Send>;
/// Substitute for listen.
pub type ListenFn =
    Box<dyn FnMut(SocketHandle, u32) -> Result<(), Errno> + Send>;
/// Substitute for accept.
pub type AcceptFn = Box<
    dyn FnMut(
            SocketHandle,
        ) -> Result<(SocketHandle, Option<SocketAddr>), Errno>
        + Send,
>;
/// Substitute for plain receive.
pub type RecvFn = Box<
    dyn FnMut(SocketHandle, RecvBuf<'_>, MsgFlags) -> Result<usize, Errno>
        + Send,
>;
/// Substitute for receive with source address.
pub type RecvFromFn = Box<
    dyn FnMut(
            SocketHandle,
            RecvBuf<'_>,
            MsgFlags,
        ) -> Result<(usize, Option<SocketAddr>), Errno>
        + Send,
>;
/// Substitute for scatter-gather receive.
pub type RecvMsgFn = Box<
    dyn FnMut(
            SocketHandle,
            &mut [&mut [u8]],
            MsgFlags,
        ) -> Result<(usize, Option<SocketAddr>), Errno>
        + Send,
>;
/// Substitute for plain send.
pub type SendFn = Box<
    dyn FnMut(SocketHandle, &[u8], MsgFlags) -> Result<usize, Errno> + Send,
>;
/// Substitute for send to an explicit destination.
pub type SendToFn = Box<
    dyn FnMut(
            SocketHandle,
            &[u8],
            SocketAddr,
            MsgFlags,
        ) -> Result<usize, Errno>
        + Send,
>;
/// Substitute for scatter-gather send.
pub type SendMsgFn = Box<
    dyn FnMut(
            SocketHandle,
            &[&[u8]],
            Option<SocketAddr>,
            MsgFlags,
        ) -> Result<usize, Errno>
        + Send,
>;
/// Substitute for shutdown.
pub type ShutdownFn =
    Box<dyn FnMut(SocketHandle, ShutdownHow) -> Result<(), Errno> + Send>;
/// Substitute for readiness polling.
pub type PollFn = Box<
    dyn FnMut(&mut [PollEntry], Option<Duration>) -> Result<usize, Errno>
        + Send,
>;

/// Optional substitute implementations, one slot per operation.
///
/// An empty slot defers to the simulated or real implementation; a cleared
/// slot behaves exactly as if it had never been set. Slots are plain public
/// options so tests can install and remove them directly.
#[derive(Default)]
pub struct OverrideTable {
    /// Address resolution.
    pub resolve_addrs: Option<ResolveAddrsFn>,
    /// Address-list release.
    pub release_addrs: Option<ReleaseAddrsFn>,
    /// Reverse name lookup.
    pub resolve_names: Option<ResolveNamesFn>,
    /// Error-to-message lookup.
    pub error_string: Option<ErrorStringFn>,
    /// Socket creation.
    pub socket: Option<SocketFn>,
    /// Bind.
    pub bind: Option<BindFn>,
    /// Connect.
    pub connect: Option<ConnectFn>,
    /// Listen.
    pub listen: Option<ListenFn>,
    /// Accept.
    pub accept: Option<AcceptFn>,
    /// Plain receive.
    pub recv: Option<RecvFn>,
    /// Receive with source address.
    pub recv_from: Option<RecvFromFn>,
    /// Scatter-gather receive.
    pub recv_msg: Option<RecvMsgFn>,
    /// Plain send.
    pub send: Option<SendFn>,
    /// Send to an explicit destination.
    pub send_to: Option<SendToFn>,
    /// Scatter-gather send.
    pub send_msg: Option<SendMsgFn>,
    /// Shutdown.
    pub shutdown: Option<ShutdownFn>,
    /// Readiness polling.
    pub poll: Option<PollFn>,
}

impl OverrideTable {
    /// A table with every slot empty.
    #[must_use]
    pub fn new() -> Self {
        OverrideTable::default()
    }

    /// Installs the resolve and release substitutes together. Swapping the
    /// pair atomically keeps a simulated resolver from feeding lists to a
    /// real release.
    pub fn set_resolve_pair(
        &mut self,
        resolve: ResolveAddrsFn,
        release: ReleaseAddrsFn,
    ) {
        self.resolve_addrs = Some(resolve);
        self.release_addrs = Some(release);
    }

    /// Empties every slot.
    pub fn clear_all(&mut self) {
        *self = OverrideTable::default();
    }
}

impl fmt::Debug for OverrideTable {
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
        } = self;
        f.debug_struct("OverrideTable")
            .field("resolve_addrs", &resolve_addrs.is_some())
            .field("release_addrs", &release_addrs.is_some())
            .field("resolve_names", &resolve_names.is_some())
            .field("error_string", &error_string.is_some())
            .field("socket", &socket.is_some())
            .field("bind", &bind.is_some())
            .field("connect", &connect.is_some())
            .field("listen", &listen.is_some())
            .field("accept", &accept.is_some())
            .field("recv", &recv.is_some())
            .field("recv_from", &recv_from.is_some())
            .field("recv_msg", &recv_msg.is_some())
            .field("send", &send.is_some())
            .field("send_to", &send_to.is_some())
            .field("send_msg", &send_msg.is_some())
            .field("shutdown", &shutdown.is_some())
            .field("poll", &poll.is_some())
            .finish()
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
    fn test_slots_start_empty() {
        let table = OverrideTable::new();
        assert!(table.socket.is_none());
        assert!(table.recv.is_none());
        assert!(table.poll.is_none());
    }

    #[test]
    fn test_installed_override_is_callable() {
        let mut table = OverrideTable::new();
        table.send = Some(Box::new(|_, buf, _| Ok(buf.len())));
        let send = table.send.as_mut().unwrap();
        assert_eq!(
            send(SocketHandle::new(3), b"hello", MsgFlags::default()),
            Ok(5)
        );
    }

    #[test]
    fn test_resolve_pair_installs_both() {
        let mut table = OverrideTable::new();
        table.set_resolve_pair(
            Box::new(|_, _, _| Err(ResolveError::Fail)),
            Box::new(|_| ()),
        );
        assert!(table.resolve_addrs.is_some());
        assert!(table.release_addrs.is_some());
    }

    #[test]
    fn test_clear_all_empties_slots() {
        let mut table = OverrideTable::new();
        table.error_string = Some(Box::new(|_| "nope"));
        table.shutdown = Some(Box::new(|_, _| Ok(())));
        table.clear_all();
        assert!(table.error_string.is_none());
        assert!(table.shutdown.is_none());
    }

    #[test]
    fn test_debug_reports_occupancy() {
        let mut table = OverrideTable::new();
        table.listen = Some(Box::new(|_, _| Ok(())));
        let text = format!("{table:?}");
        assert!(text.contains("listen: true"));
        assert!(text.contains("accept: false"));
    }
}

//! A deterministic in-memory [`NetworkApi`] backend for integration tests.
//!
//! `ScriptedNet` answers every call without touching the operating system:
//! handles are minted sequentially, sends are captured, receives are served
//! from a queue of scripted payloads, and resolution delegates to the
//! numeric-only resolver so results are reproducible. Every call appends its
//! name to a log, which lets tests assert not just on outcomes but on
//! whether the backend was reached at all.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use netproctor::api::NetworkApi;
use netproctor::{
    AddrFamily, AddrHints, AddrList, Errno, MsgFlags, NameFlags, NameInfo,
    PollEntry, PollReady, RecvBuf, ReleaseOutcome, ResolveError, ShutdownHow,
    SockType, SocketHandle,
};

/// Peer address the backend reports for accepted connections and datagram
/// sources.
pub const SCRIPTED_PEER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)), 9000);

/// First handle value the backend mints, far from the small integers tests
/// pick for handles of their own.
const FIRST_HANDLE: i32 = 100;

/// Scripted stand-in for the socket layer.
#[derive(Debug)]
pub struct ScriptedNet {
    calls: Vec<&'static str>,
    next_handle: i32,
    incoming: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl Default for ScriptedNet {
    fn default() -> Self {
        ScriptedNet::new()
    }
}

impl ScriptedNet {
    /// A backend with no scripted payloads.
    #[must_use]
    pub fn new() -> Self {
        ScriptedNet {
            calls: Vec::new(),
            next_handle: FIRST_HANDLE,
            incoming: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Queues a payload for the next receive-family call.
    #[allow(dead_code)]
    pub fn push_incoming(&mut self, payload: impl Into<Vec<u8>>) {
        self.incoming.push_back(payload.into());
    }

    /// Names of the calls that reached the backend, in order.
    #[allow(dead_code)]
    #[must_use]
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    /// Payloads captured from the send family, in order.
    #[allow(dead_code)]
    #[must_use]
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    fn log(&mut self, name: &'static str) {
        self.calls.push(name);
    }

    fn mint(&mut self) -> SocketHandle {
        let handle = SocketHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn pop_incoming(
        &mut self,
        buf: &mut RecvBuf<'_>,
    ) -> Result<usize, Errno> {
        match self.incoming.pop_front() {
            Some(payload) => Ok(buf.fill_from(&payload)),
            None => Err(Errno::WOULDBLOCK),
        }
    }
}

impl NetworkApi for ScriptedNet {
    fn resolve_addrs(
        &mut self,
        host: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<AddrList, ResolveError> {
        self.log("resolve_addrs");
        netproctor::resolver::numeric_resolve(host, service, hints)
            .map(AddrList::issue)
    }

    fn release_addrs(&mut self, list: AddrList) -> ReleaseOutcome {
        self.log("release_addrs");
        drop(list);
        ReleaseOutcome::Clean
    }

    fn resolve_names(
        &mut self,
        addr: SocketAddr,
        flags: NameFlags,
    ) -> Result<NameInfo, ResolveError> {
        self.log("resolve_names");
        netproctor::resolver::numeric_name_info(addr, flags)
    }

    fn error_string(&mut self, code: i32) -> &'static str {
        self.log("error_string");
        netproctor::resolver::error_message(code)
    }

    fn socket(
        &mut self,
        _family: AddrFamily,
        _ty: SockType,
    ) -> Result<SocketHandle, Errno> {
        self.log("socket");
        Ok(self.mint())
    }

    fn bind(
        &mut self,
        _sd: SocketHandle,
        _addr: SocketAddr,
    ) -> Result<(), Errno> {
        self.log("bind");
        Ok(())
    }

    fn connect(
        &mut self,
        _sd: SocketHandle,
        _addr: SocketAddr,
    ) -> Result<(), Errno> {
        self.log("connect");
        Ok(())
    }

    fn listen(&mut self, _sd: SocketHandle, _backlog: u32) -> Result<(), Errno> {
        self.log("listen");
        Ok(())
    }

    fn accept(
        &mut self,
        _sd: SocketHandle,
    ) -> Result<(SocketHandle, Option<SocketAddr>), Errno> {
        self.log("accept");
        let conn = self.mint();
        Ok((conn, Some(SCRIPTED_PEER)))
    }

    fn recv(
        &mut self,
        _sd: SocketHandle,
        mut buf: RecvBuf<'_>,
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        self.log("recv");
        self.pop_incoming(&mut buf)
    }

    fn recv_from(
        &mut self,
        _sd: SocketHandle,
        mut buf: RecvBuf<'_>,
        _flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        self.log("recv_from");
        let count = self.pop_incoming(&mut buf)?;
        Ok((count, Some(SCRIPTED_PEER)))
    }

    fn recv_msg(
        &mut self,
        _sd: SocketHandle,
        bufs: &mut [&mut [u8]],
        _flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        self.log("recv_msg");
        let payload = self.incoming.pop_front().ok_or(Errno::WOULDBLOCK)?;
        let mut rest = payload.as_slice();
        let mut total = 0_usize;
        for buf in bufs.iter_mut() {
            if rest.is_empty() {
                break;
            }
            let take = buf.len().min(rest.len());
            let (src, tail) = rest.split_at(take);
            if let Some(dst) = buf.get_mut(..take) {
                dst.copy_from_slice(src);
            }
            total += take;
            rest = tail;
        }
        Ok((total, Some(SCRIPTED_PEER)))
    }

    fn send(
        &mut self,
        _sd: SocketHandle,
        buf: &[u8],
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        self.log("send");
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn send_to(
        &mut self,
        _sd: SocketHandle,
        buf: &[u8],
        _dest: SocketAddr,
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        self.log("send_to");
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn send_msg(
        &mut self,
        _sd: SocketHandle,
        bufs: &[&[u8]],
        _dest: Option<SocketAddr>,
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        self.log("send_msg");
        let payload: Vec<u8> =
            bufs.iter().flat_map(|buf| buf.iter().copied()).collect();
        let count = payload.len();
        self.sent.push(payload);
        Ok(count)
    }

    fn shutdown(
        &mut self,
        _sd: SocketHandle,
        _how: ShutdownHow,
    ) -> Result<(), Errno> {
        self.log("shutdown");
        Ok(())
    }

    fn poll(
        &mut self,
        entries: &mut [PollEntry],
        _timeout: Option<Duration>,
    ) -> Result<usize, Errno> {
        self.log("poll");
        let mut ready = 0_usize;
        for entry in entries.iter_mut() {
            entry.ready = PollReady {
                read: entry.interest.read,
                write: entry.interest.write,
                ..PollReady::default()
            };
            if entry.ready.any() {
                ready += 1;
            }
        }
        Ok(ready)
    }
}

//! The [`NetworkApi`] trait — the seam the gate and every backend
//! implement — plus the argument and result types its operations share.

use std::mem;
use std::net::SocketAddr;

use web_time::Duration;

use crate::addr::{AddrFamily, AddrHints, AddrList, NameFlags, NameInfo, SockType};
use crate::error::{Errno, ResolveError};
use crate::tracker::ReleaseOutcome;
use crate::SocketHandle;

/// Per-call behavior flags for the data-transfer operations.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MsgFlags {
    /// Do not block; report [`Errno::WOULDBLOCK`] instead of waiting.
    pub dont_wait: bool,
}

impl MsgFlags {
    /// Non-blocking transfer.
    pub const DONT_WAIT: MsgFlags = MsgFlags { dont_wait: true };
}

/// Destination of a receive: either a caller buffer to fill or a byte count
/// to accept and discard.
///
/// Discarding models a caller that wants data consumed without keeping it,
/// the way native code passes a null buffer to drain a socket. The enum keeps
/// that pattern expressible without handing out invalid memory.
#[derive(Debug)]
pub enum RecvBuf<'a> {
    /// Copy received bytes into this buffer.
    Fill(&'a mut [u8]),
    /// Accept up to this many bytes and drop them.
    Discard(usize),
}

impl RecvBuf<'_> {
    /// Remaining capacity of this destination.
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self {
            RecvBuf::Fill(buf) => buf.len(),
            RecvBuf::Discard(len) => *len,
        }
    }

    /// Moves up to `src.len()` bytes into the destination and consumes the
    /// corresponding capacity. Returns how many bytes were accepted.
    ///
    /// Repeated calls append after previously accepted bytes.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        match self {
            RecvBuf::Fill(buf) => {
                let count = src.len().min(buf.len());
                let taken = mem::take(buf);
                let (head, tail) = taken.split_at_mut(count);
                head.copy_from_slice(&src[..count]);
                *buf = tail;
                count
            }
            RecvBuf::Discard(len) => {
                let count = src.len().min(*len);
                *len -= count;
                count
            }
        }
    }
}

/// Which half of a connection [`NetworkApi::shutdown`] closes.
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
pub enum ShutdownHow {
    /// Stop receiving.
    Read,
    /// Stop sending.
    Write,
    /// Stop both directions.
    Both,
}

/// Readiness a caller waits for on one descriptor.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PollInterest {
    /// Wake when the descriptor is readable.
    pub read: bool,
    /// Wake when the descriptor is writable.
    pub write: bool,
}

/// Readiness reported for one descriptor after a poll.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PollReady {
    /// Readable without blocking.
    pub read: bool,
    /// Writable without blocking.
    pub write: bool,
    /// An error condition is pending.
    pub error: bool,
    /// The peer hung up.
    pub hangup: bool,
}

impl PollReady {
    /// Returns `true` when any condition is set.
    #[inline]
    #[must_use]
    pub const fn any(self) -> bool {
        self.read || self.write || self.error || self.hangup
    }
}

/// One descriptor entry in a readiness poll.
///
/// [`interest`](PollEntry::interest) is what the caller asked for and
/// [`ready`](PollEntry::ready) is what the poll reported; the reported side
/// is cleared on entry to [`NetworkApi::poll`] and filled before it returns.
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
pub struct PollEntry {
    /// The descriptor to watch.
    pub handle: SocketHandle,
    /// Conditions the caller waits for.
    pub interest: PollInterest,
    /// Conditions observed by the poll.
    pub ready: PollReady,
}

impl PollEntry {
    /// An entry waiting for readability.
    #[must_use]
    pub const fn readable(handle: SocketHandle) -> Self {
        PollEntry {
            handle,
            interest: PollInterest {
                read: true,
                write: false,
            },
            ready: PollReady {
                read: false,
                write: false,
                error: false,
                hangup: false,
            },
        }
    }

    /// An entry waiting for writability.
    #[must_use]
    pub const fn writable(handle: SocketHandle) -> Self {
        PollEntry {
            handle,
            interest: PollInterest {
                read: false,
                write: true,
            },
            ready: PollReady {
                read: false,
                write: false,
                error: false,
                hangup: false,
            },
        }
    }
}

/// The virtualizable networking surface.
///
/// Every operation a graded program can perform goes through this trait.
/// [`SystemNetwork`](crate::SystemNetwork) implements it against the real
/// operating system; [`CallGate`](crate::CallGate) wraps any implementation
/// and layers monitoring, fault injection, overrides, release tracking and
/// timed delivery on top while remaining an implementation itself, so gates
/// can stack.
///
/// Failures carry the raw [`Errno`] (or [`ResolveError`] for the resolution
/// family) rather than an [`std::io::Error`], because injected faults need to
/// surface exact codes for assertions.
pub trait NetworkApi {
    /// Resolves a numeric host and service to socket addresses.
    ///
    /// `host` and `service` must be numeric literals; at least one must be
    /// present.
    fn resolve_addrs(
        &mut self,
        host: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<AddrList, ResolveError>;

    /// Releases a resolution result previously returned by
    /// [`resolve_addrs`](NetworkApi::resolve_addrs).
    fn release_addrs(&mut self, list: AddrList) -> ReleaseOutcome;

    /// Reverse lookup: formats the host and service of an address.
    fn resolve_names(
        &mut self,
        addr: SocketAddr,
        flags: NameFlags,
    ) -> Result<NameInfo, ResolveError>;

    /// Returns the human-readable message for a resolution error code.
    fn error_string(&mut self, code: i32) -> &'static str {
        ResolveError::from_code(code).message()
    }

    /// Creates a socket.
    fn socket(
        &mut self,
        family: AddrFamily,
        ty: SockType,
    ) -> Result<SocketHandle, Errno>;

    /// Binds a socket to a local address.
    fn bind(&mut self, sd: SocketHandle, addr: SocketAddr) -> Result<(), Errno>;

    /// Connects a socket to a remote address.
    fn connect(
        &mut self,
        sd: SocketHandle,
        addr: SocketAddr,
    ) -> Result<(), Errno>;

    /// Marks a bound stream socket as accepting connections.
    fn listen(&mut self, sd: SocketHandle, backlog: u32) -> Result<(), Errno>;

    /// Accepts one pending connection, reporting the peer address when it is
    /// known.
    fn accept(
        &mut self,
        sd: SocketHandle,
    ) -> Result<(SocketHandle, Option<SocketAddr>), Errno>;

    /// Receives bytes on a connected socket.
    fn recv(
        &mut self,
        sd: SocketHandle,
        buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<usize, Errno>;

    /// Receives one datagram, reporting its source address when it is known.
    fn recv_from(
        &mut self,
        sd: SocketHandle,
        buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno>;

    /// Scatter-gather receive across several buffers.
    fn recv_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &mut [&mut [u8]],
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno>;

    /// Sends bytes on a connected socket.
    fn send(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        flags: MsgFlags,
    ) -> Result<usize, Errno>;

    /// Sends one datagram to an explicit destination.
    fn send_to(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        dest: SocketAddr,
        flags: MsgFlags,
    ) -> Result<usize, Errno>;

    /// Scatter-gather send, optionally to an explicit destination.
    fn send_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &[&[u8]],
        dest: Option<SocketAddr>,
        flags: MsgFlags,
    ) -> Result<usize, Errno>;

    /// Shuts down one or both directions of a connection.
    fn shutdown(
        &mut self,
        sd: SocketHandle,
        how: ShutdownHow,
    ) -> Result<(), Errno>;

    /// Waits until at least one entry is ready or the timeout elapses.
    ///
    /// Returns how many entries report readiness; `0` means the wait timed
    /// out. `None` waits indefinitely.
    fn poll(
        &mut self,
        entries: &mut [PollEntry],
        timeout: Option<Duration>,
    ) -> Result<usize, Errno>;
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
    fn test_msg_flags_default_blocks() {
        assert!(!MsgFlags::default().dont_wait);
        assert!(MsgFlags::DONT_WAIT.dont_wait);
    }

    #[test]
    fn test_recv_buf_fill_tracks_capacity() {
        let mut storage = [0_u8; 8];
        let mut buf = RecvBuf::Fill(&mut storage);
        assert_eq!(buf.remaining(), 8);
        assert_eq!(buf.fill_from(b"abc"), 3);
        assert_eq!(buf.remaining(), 5);
        assert_eq!(buf.fill_from(b"defghij"), 5);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.fill_from(b"x"), 0);
        assert_eq!(&storage, b"abcdefgh");
    }

    #[test]
    fn test_recv_buf_discard_tracks_capacity() {
        let mut buf = RecvBuf::Discard(4);
        assert_eq!(buf.remaining(), 4);
        assert_eq!(buf.fill_from(b"abc"), 3);
        assert_eq!(buf.fill_from(b"abc"), 1);
        assert_eq!(buf.fill_from(b"abc"), 0);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_poll_entry_constructors() {
        let read = PollEntry::readable(SocketHandle::new(3));
        assert!(read.interest.read);
        assert!(!read.interest.write);
        assert!(!read.ready.any());

        let write = PollEntry::writable(SocketHandle::new(4));
        assert!(write.interest.write);
        assert!(!write.interest.read);
    }

    #[test]
    fn test_poll_ready_any() {
        let mut ready = PollReady::default();
        assert!(!ready.any());
        ready.hangup = true;
        assert!(ready.any());
    }
}

//! The OS-backed backend: [`SystemNetwork`] implements the network API
//! over `std::net` sockets.

use std::collections::HashMap;
use std::io;
use std::io::{Read, Write};
use std::net::{
    SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket,
};
use std::thread;

use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::addr::{
    AddrFamily, AddrFlags, AddrHints, AddrInfo, AddrList, NameFlags,
    NameInfo, ResolvedAddrs, SockType,
};
use crate::api::{
    MsgFlags, NetworkApi, PollEntry, PollReady, RecvBuf, ShutdownHow,
};
use crate::error::{Errno, ResolveError};
use crate::resolver;
use crate::tracker::ReleaseOutcome;
use crate::SocketHandle;

/// How long poll sleeps between readiness probes.
const POLL_PROBE_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on the scratch buffer a discarding receive allocates.
const DISCARD_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
enum SysSock {
    /// Created but neither bound nor connected; the OS socket is deferred
    /// until an address is known, because the standard library creates
    /// sockets already bound or connected.
    Pending { family: AddrFamily, ty: SockType },
    /// A stream socket bound but not yet listening or connected.
    BoundStream { addr: SocketAddr },
    /// A datagram socket.
    Udp(UdpSocket),
    /// A listening stream socket. `pending` stashes a connection consumed by
    /// a readiness probe until the next accept claims it.
    Listener {
        listener: TcpListener,
        pending: Option<(TcpStream, SocketAddr)>,
    },
    /// A connected stream socket.
    Stream(TcpStream),
}

/// The operating-system-backed implementation of [`NetworkApi`].
///
/// Socket handles are small integers private to this instance; the handle
/// space is flat like a descriptor table, so a handle accepted from one
/// instance means nothing to another.
///
/// Resolution behaves like the platform resolver for concrete hosts (real
/// lookups included) but only accepts numeric services, and reverse lookup
/// reports numeric texts because the standard library offers no name query.
#[derive(Debug, Default)]
pub struct SystemNetwork {
    sockets: HashMap<SocketHandle, SysSock>,
    next_handle: i32,
}

impl SystemNetwork {
    /// A backend with no sockets.
    #[must_use]
    pub fn new() -> Self {
        SystemNetwork {
            sockets: HashMap::new(),
            // Leave room below for the conventional standard descriptors.
            next_handle: 3,
        }
    }

    /// Closes a socket, releasing the OS resource. Unknown handles report
    /// [`Errno::BADF`].
    ///
    /// # Errors
    ///
    /// Returns the raw error code on failure.
    pub fn close(&mut self, sd: SocketHandle) -> Result<(), Errno> {
        match self.sockets.remove(&sd) {
            Some(_) => Ok(()),
            None => Err(Errno::BADF),
        }
    }

    /// The local address a bound socket ended up with, useful after binding
    /// to port 0.
    ///
    /// # Errors
    ///
    /// Returns the raw error code on failure.
    pub fn local_addr(&self, sd: SocketHandle) -> Result<SocketAddr, Errno> {
        match self.sockets.get(&sd) {
            Some(SysSock::Udp(sock)) => {
                sock.local_addr().map_err(|e| Errno::from_io(&e))
            }
            Some(SysSock::Listener { listener, .. }) => {
                listener.local_addr().map_err(|e| Errno::from_io(&e))
            }
            Some(SysSock::Stream(stream)) => {
                stream.local_addr().map_err(|e| Errno::from_io(&e))
            }
            Some(SysSock::BoundStream { addr }) => Ok(*addr),
            Some(SysSock::Pending { .. }) => Err(Errno::INVAL),
            None => Err(Errno::BADF),
        }
    }

    fn allocate(&mut self, sock: SysSock) -> SocketHandle {
        let handle = SocketHandle::new(self.next_handle);
        self.next_handle += 1;
        self.sockets.insert(handle, sock);
        handle
    }

    fn entry(&mut self, sd: SocketHandle) -> Result<&mut SysSock, Errno> {
        self.sockets.get_mut(&sd).ok_or(Errno::BADF)
    }

    /// Binds a still-pending datagram socket to the wildcard address so a
    /// destination-addressed send can proceed.
    fn ensure_dgram_bound(
        &mut self,
        sd: SocketHandle,
        dest: SocketAddr,
    ) -> Result<(), Errno> {
        let Some(SysSock::Pending {
            family,
            ty: SockType::Dgram,
        }) = self.sockets.get(&sd)
        else {
            return Ok(());
        };
        let family = *family;
        if !family.accepts(AddrFamily::of(&dest)) {
            return Err(Errno::INVAL);
        }
        let local = SocketAddr::new(
            resolver::unhosted_ip(
                family,
                AddrFlags {
                    passive: true,
                    ..AddrFlags::default()
                },
            ),
            0,
        );
        let sock = UdpSocket::bind(local).map_err(|e| io_errno(&e))?;
        if let Some(slot) = self.sockets.get_mut(&sd) {
            *slot = SysSock::Udp(sock);
        }
        Ok(())
    }
}

fn io_errno(err: &io::Error) -> Errno {
    Errno::from_io(err)
}

/// Runs one socket operation with the non-blocking flag applied for the
/// duration of the call.
fn with_dont_wait<T>(
    set_nonblocking: impl Fn(bool) -> io::Result<()>,
    dont_wait: bool,
    op: impl FnOnce() -> io::Result<T>,
) -> Result<T, Errno> {
    if dont_wait {
        set_nonblocking(true).map_err(|e| io_errno(&e))?;
    }
    let result = op();
    if dont_wait {
        // Restore a blocking socket even if the operation failed.
        let _ = set_nonblocking(false);
    }
    result.map_err(|e| io_errno(&e))
}

/// Receives once into a scratch buffer and forwards the bytes into the
/// caller's destination, honoring discard semantics.
fn recv_via_scratch(
    buf: &mut RecvBuf<'_>,
    read: impl FnOnce(&mut [u8]) -> io::Result<usize>,
) -> io::Result<usize> {
    match buf {
        RecvBuf::Fill(dest) => read(dest),
        RecvBuf::Discard(len) => {
            let mut scratch = vec![0_u8; (*len).min(DISCARD_CHUNK)];
            let count = read(&mut scratch)?;
            *len = len.saturating_sub(count);
            Ok(count)
        }
    }
}

/// Copies gathered bytes out into scatter buffers, in order.
fn scatter(bufs: &mut [&mut [u8]], data: &[u8]) {
    let mut rest = data;
    for buf in bufs.iter_mut() {
        if rest.is_empty() {
            break;
        }
        let take = buf.len().min(rest.len());
        let (src, tail) = rest.split_at(take);
        let (dst, _) = buf.split_at_mut(take);
        dst.copy_from_slice(src);
        rest = tail;
    }
}

fn probe_ready(sock: &mut SysSock, entry: &PollEntry) -> PollReady {
    let mut ready = PollReady::default();
    match sock {
        SysSock::Pending { .. } | SysSock::BoundStream { .. } => {}
        SysSock::Udp(udp) => {
            if entry.interest.read {
                let mut peek = [0_u8; 1];
                match udp.set_nonblocking(true).and_then(|()| {
                    let r = udp.peek(&mut peek);
                    let _ = udp.set_nonblocking(false);
                    r
                }) {
                    Ok(_) => ready.read = true,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(_) => ready.error = true,
                }
            }
            if entry.interest.write {
                ready.write = true;
            }
        }
        SysSock::Listener { listener, pending } => {
            if entry.interest.read {
                if pending.is_some() {
                    ready.read = true;
                } else {
                    match listener.set_nonblocking(true).and_then(|()| {
                        let r = listener.accept();
                        let _ = listener.set_nonblocking(false);
                        r
                    }) {
                        Ok(conn) => {
                            *pending = Some(conn);
                            ready.read = true;
                        }
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(_) => ready.error = true,
                    }
                }
            }
        }
        SysSock::Stream(stream) => {
            if entry.interest.read {
                let mut peek = [0_u8; 1];
                match stream.set_nonblocking(true).and_then(|()| {
                    let r = stream.peek(&mut peek);
                    let _ = stream.set_nonblocking(false);
                    r
                }) {
                    Ok(0) => {
                        ready.read = true;
                        ready.hangup = true;
                    }
                    Ok(_) => ready.read = true,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(_) => ready.error = true,
                }
            }
            if entry.interest.write {
                ready.write = true;
            }
        }
    }
    ready
}

impl NetworkApi for SystemNetwork {
    fn resolve_addrs(
        &mut self,
        host: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<AddrList, ResolveError> {
        let hints = hints.copied().unwrap_or_default();
        if hints.flags.canonical && host.is_none() {
            return Err(ResolveError::BadFlags);
        }
        if host.is_none() && service.is_none() {
            return Err(ResolveError::NoName);
        }
        let port = match service {
            Some(text) => {
                text.parse::<u16>().map_err(|_| ResolveError::NoName)?
            }
            None => 0,
        };
        let socktype = hints.socktype.unwrap_or_default();

        let Some(host) = host else {
            let ip = resolver::unhosted_ip(hints.family, hints.flags);
            let addr = SocketAddr::new(ip, port);
            let info = AddrInfo {
                family: AddrFamily::of(&addr),
                socktype,
                addr,
            };
            return Ok(AddrList::issue(ResolvedAddrs::single(info, None)));
        };

        let resolved = (host, port)
            .to_socket_addrs()
            .map_err(|_| ResolveError::NoName)?;
        let mut entries: SmallVec<[AddrInfo; 2]> = SmallVec::new();
        let mut saw_any = false;
        for addr in resolved {
            saw_any = true;
            let family = AddrFamily::of(&addr);
            if hints.family.accepts(family) {
                entries.push(AddrInfo {
                    family,
                    socktype,
                    addr,
                });
            }
        }
        if entries.is_empty() {
            return Err(if saw_any {
                ResolveError::Family
            } else {
                ResolveError::NoName
            });
        }
        // The standard library does not surface canonical names; the
        // host as given is the closest available answer.
        let canonical =
            hints.flags.canonical.then(|| host.to_owned());
        Ok(AddrList::issue(ResolvedAddrs { entries, canonical }))
    }

    fn release_addrs(&mut self, list: AddrList) -> ReleaseOutcome {
        drop(list);
        ReleaseOutcome::Clean
    }

    fn resolve_names(
        &mut self,
        addr: SocketAddr,
        flags: NameFlags,
    ) -> Result<NameInfo, ResolveError> {
        resolver::numeric_name_info(addr, flags)
    }

    fn socket(
        &mut self,
        family: AddrFamily,
        ty: SockType,
    ) -> Result<SocketHandle, Errno> {
        if matches!(family, AddrFamily::Unspec) {
            return Err(Errno::INVAL);
        }
        Ok(self.allocate(SysSock::Pending { family, ty }))
    }

    fn bind(&mut self, sd: SocketHandle, addr: SocketAddr) -> Result<(), Errno> {
        let slot = self.entry(sd)?;
        match slot {
            SysSock::Pending { family, ty } => {
                if !family.accepts(AddrFamily::of(&addr)) {
                    return Err(Errno::INVAL);
                }
                match ty {
                    SockType::Dgram => {
                        let sock = UdpSocket::bind(addr)
                            .map_err(|e| io_errno(&e))?;
                        *slot = SysSock::Udp(sock);
                    }
                    SockType::Stream => {
                        // The OS listener is created at listen time.
                        *slot = SysSock::BoundStream { addr };
                    }
                }
                Ok(())
            }
            _ => Err(Errno::INVAL),
        }
    }

    fn connect(
        &mut self,
        sd: SocketHandle,
        addr: SocketAddr,
    ) -> Result<(), Errno> {
        let slot = self.entry(sd)?;
        match slot {
            SysSock::Pending { family, ty } => {
                if !family.accepts(AddrFamily::of(&addr)) {
                    return Err(Errno::INVAL);
                }
                match ty {
                    SockType::Dgram => {
                        let local = SocketAddr::new(
                            resolver::unhosted_ip(
                                AddrFamily::of(&addr),
                                AddrFlags {
                                    passive: true,
                                    ..AddrFlags::default()
                                },
                            ),
                            0,
                        );
                        let sock = UdpSocket::bind(local)
                            .map_err(|e| io_errno(&e))?;
                        sock.connect(addr).map_err(|e| io_errno(&e))?;
                        *slot = SysSock::Udp(sock);
                    }
                    SockType::Stream => {
                        let stream = TcpStream::connect(addr)
                            .map_err(|e| io_errno(&e))?;
                        *slot = SysSock::Stream(stream);
                    }
                }
                Ok(())
            }
            SysSock::Udp(sock) => {
                sock.connect(addr).map_err(|e| io_errno(&e))
            }
            _ => Err(Errno::INVAL),
        }
    }

    fn listen(&mut self, sd: SocketHandle, _backlog: u32) -> Result<(), Errno> {
        let slot = self.entry(sd)?;
        match slot {
            SysSock::BoundStream { addr } => {
                let listener =
                    TcpListener::bind(*addr).map_err(|e| io_errno(&e))?;
                *slot = SysSock::Listener {
                    listener,
                    pending: None,
                };
                Ok(())
            }
            _ => Err(Errno::INVAL),
        }
    }

    fn accept(
        &mut self,
        sd: SocketHandle,
    ) -> Result<(SocketHandle, Option<SocketAddr>), Errno> {
        let (stream, peer) = match self.entry(sd)? {
            SysSock::Listener { listener, pending } => match pending.take() {
                Some(conn) => conn,
                None => listener.accept().map_err(|e| io_errno(&e))?,
            },
            _ => return Err(Errno::INVAL),
        };
        Ok((self.allocate(SysSock::Stream(stream)), Some(peer)))
    }

    fn recv(
        &mut self,
        sd: SocketHandle,
        mut buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        match self.entry(sd)? {
            SysSock::Udp(sock) => {
                let sock = &*sock;
                with_dont_wait(
                    |on| sock.set_nonblocking(on),
                    flags.dont_wait,
                    || recv_via_scratch(&mut buf, |dest| sock.recv(dest)),
                )
            }
            SysSock::Stream(stream) => {
                let stream = &*stream;
                with_dont_wait(
                    |on| stream.set_nonblocking(on),
                    flags.dont_wait,
                    || {
                        recv_via_scratch(&mut buf, |dest| {
                            let mut reader = stream;
                            reader.read(dest)
                        })
                    },
                )
            }
            _ => Err(Errno::NOTCONN),
        }
    }

    fn recv_from(
        &mut self,
        sd: SocketHandle,
        mut buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        match self.entry(sd)? {
            SysSock::Udp(sock) => {
                let sock = &*sock;
                let mut source = None;
                let count = with_dont_wait(
                    |on| sock.set_nonblocking(on),
                    flags.dont_wait,
                    || {
                        recv_via_scratch(&mut buf, |dest| {
                            let (count, addr) = sock.recv_from(dest)?;
                            source = Some(addr);
                            Ok(count)
                        })
                    },
                )?;
                Ok((count, source))
            }
            SysSock::Stream(stream) => {
                let stream = &*stream;
                let peer = stream.peer_addr().ok();
                let count = with_dont_wait(
                    |on| stream.set_nonblocking(on),
                    flags.dont_wait,
                    || {
                        recv_via_scratch(&mut buf, |dest| {
                            let mut reader = stream;
                            reader.read(dest)
                        })
                    },
                )?;
                Ok((count, peer))
            }
            _ => Err(Errno::NOTCONN),
        }
    }

    fn recv_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &mut [&mut [u8]],
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        let capacity: usize = bufs.iter().map(|buf| buf.len()).sum();
        let mut gathered = vec![0_u8; capacity];
        let (count, source) =
            self.recv_from(sd, RecvBuf::Fill(&mut gathered), flags)?;
        gathered.truncate(count);
        scatter(bufs, &gathered);
        Ok((count, source))
    }

    fn send(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        match self.entry(sd)? {
            SysSock::Udp(sock) => {
                let sock = &*sock;
                with_dont_wait(
                    |on| sock.set_nonblocking(on),
                    flags.dont_wait,
                    || sock.send(buf),
                )
            }
            SysSock::Stream(stream) => {
                let stream = &*stream;
                with_dont_wait(
                    |on| stream.set_nonblocking(on),
                    flags.dont_wait,
                    || {
                        let mut writer = stream;
                        writer.write(buf)
                    },
                )
            }
            _ => Err(Errno::NOTCONN),
        }
    }

    fn send_to(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        dest: SocketAddr,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        // An unbound datagram socket binds implicitly on its first send.
        self.ensure_dgram_bound(sd, dest)?;
        match self.entry(sd)? {
            SysSock::Udp(sock) => {
                let sock = &*sock;
                with_dont_wait(
                    |on| sock.set_nonblocking(on),
                    flags.dont_wait,
                    || sock.send_to(buf, dest),
                )
            }
            SysSock::Stream(stream) => {
                let stream = &*stream;
                with_dont_wait(
                    |on| stream.set_nonblocking(on),
                    flags.dont_wait,
                    || {
                        let mut writer = stream;
                        writer.write(buf)
                    },
                )
            }
            _ => Err(Errno::NOTCONN),
        }
    }

    fn send_msg(
        &mut self,
        sd: SocketHandle,
        bufs: &[&[u8]],
        dest: Option<SocketAddr>,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        let payload: Vec<u8> =
            bufs.iter().flat_map(|buf| buf.iter().copied()).collect();
        match dest {
            Some(dest) => self.send_to(sd, &payload, dest, flags),
            None => self.send(sd, &payload, flags),
        }
    }

    fn shutdown(
        &mut self,
        sd: SocketHandle,
        how: ShutdownHow,
    ) -> Result<(), Errno> {
        match self.entry(sd)? {
            SysSock::Stream(stream) => {
                let how = match how {
                    ShutdownHow::Read => std::net::Shutdown::Read,
                    ShutdownHow::Write => std::net::Shutdown::Write,
                    ShutdownHow::Both => std::net::Shutdown::Both,
                };
                stream.shutdown(how).map_err(|e| io_errno(&e))
            }
            SysSock::Udp(_)
            | SysSock::Pending { .. }
            | SysSock::BoundStream { .. }
            | SysSock::Listener { .. } => Err(Errno::NOTCONN),
        }
    }

    fn poll(
        &mut self,
        entries: &mut [PollEntry],
        timeout: Option<Duration>,
    ) -> Result<usize, Errno> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut ready_count = 0_usize;
            for entry in entries.iter_mut() {
                entry.ready = match self.sockets.get_mut(&entry.handle) {
                    Some(sock) => probe_ready(sock, entry),
                    None => PollReady {
                        error: true,
                        ..PollReady::default()
                    },
                };
                if entry.ready.any() {
                    ready_count += 1;
                }
            }
            if ready_count > 0 {
                return Ok(ready_count);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(0);
                }
            }
            thread::sleep(POLL_PROBE_INTERVAL);
        }
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

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn udp_pair(net: &mut SystemNetwork) -> (SocketHandle, SocketHandle) {
        let a = net.socket(AddrFamily::V4, SockType::Dgram).unwrap();
        let b = net.socket(AddrFamily::V4, SockType::Dgram).unwrap();
        net.bind(a, loopback()).unwrap();
        net.bind(b, loopback()).unwrap();
        (a, b)
    }

    #[test]
    fn test_unknown_handle_is_bad_descriptor() {
        let mut net = SystemNetwork::new();
        let stray = SocketHandle::new(99);
        assert_eq!(
            net.send(stray, b"x", MsgFlags::default()),
            Err(Errno::BADF)
        );
        assert_eq!(net.close(stray), Err(Errno::BADF));
    }

    #[test]
    fn test_unspec_family_socket_rejected() {
        let mut net = SystemNetwork::new();
        assert_eq!(
            net.socket(AddrFamily::Unspec, SockType::Dgram),
            Err(Errno::INVAL)
        );
    }

    #[test]
    #[cfg(not(miri))]
    fn test_udp_round_trip() {
        let mut net = SystemNetwork::new();
        let (a, b) = udp_pair(&mut net);
        let b_addr = net.local_addr(b).unwrap();

        let sent = net
            .send_to(a, b"ping", b_addr, MsgFlags::default())
            .unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0_u8; 16];
        let (count, source) = net
            .recv_from(b, RecvBuf::Fill(&mut buf), MsgFlags::default())
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(source.unwrap(), net.local_addr(a).unwrap());
    }

    #[test]
    #[cfg(not(miri))]
    fn test_udp_dont_wait_on_empty_socket() {
        let mut net = SystemNetwork::new();
        let (a, _) = udp_pair(&mut net);

        let mut buf = [0_u8; 4];
        let err = net
            .recv(a, RecvBuf::Fill(&mut buf), MsgFlags::DONT_WAIT)
            .unwrap_err();
        assert!(err.is_would_block(), "got {err}");
    }

    #[test]
    #[cfg(not(miri))]
    fn test_tcp_connect_accept_and_transfer() {
        let mut net = SystemNetwork::new();
        let server = net.socket(AddrFamily::V4, SockType::Stream).unwrap();
        net.bind(server, loopback()).unwrap();
        net.listen(server, 4).unwrap();
        let server_addr = net.local_addr(server).unwrap();

        let client = net.socket(AddrFamily::V4, SockType::Stream).unwrap();
        net.connect(client, server_addr).unwrap();

        let (conn, peer) = net.accept(server).unwrap();
        assert!(peer.is_some());

        assert_eq!(net.send(client, b"hello", MsgFlags::default()), Ok(5));
        let mut buf = [0_u8; 8];
        let count = net
            .recv(conn, RecvBuf::Fill(&mut buf), MsgFlags::default())
            .unwrap();
        assert_eq!(&buf[..count], b"hello");

        net.shutdown(client, ShutdownHow::Both).unwrap();
    }

    #[test]
    #[cfg(not(miri))]
    fn test_scatter_gather_round_trip() {
        let mut net = SystemNetwork::new();
        let (a, b) = udp_pair(&mut net);
        let b_addr = net.local_addr(b).unwrap();

        let sent = net
            .send_msg(
                a,
                &[b"ab", b"cd", b"ef"],
                Some(b_addr),
                MsgFlags::default(),
            )
            .unwrap();
        assert_eq!(sent, 6);

        let mut first = [0_u8; 4];
        let mut second = [0_u8; 4];
        let (count, source) = net
            .recv_msg(
                b,
                &mut [&mut first, &mut second],
                MsgFlags::default(),
            )
            .unwrap();
        assert_eq!(count, 6);
        assert_eq!(&first, b"abcd");
        assert_eq!(&second[..2], b"ef");
        assert!(source.is_some());
    }

    #[test]
    #[cfg(not(miri))]
    fn test_discarding_receive_consumes_datagram() {
        let mut net = SystemNetwork::new();
        let (a, b) = udp_pair(&mut net);
        let b_addr = net.local_addr(b).unwrap();
        net.send_to(a, b"payload", b_addr, MsgFlags::default()).unwrap();

        let count = net
            .recv(b, RecvBuf::Discard(64), MsgFlags::default())
            .unwrap();
        assert_eq!(count, 7);

        let err = net
            .recv(b, RecvBuf::Discard(64), MsgFlags::DONT_WAIT)
            .unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    #[cfg(not(miri))]
    fn test_poll_times_out_then_reports_readiness() {
        let mut net = SystemNetwork::new();
        let (a, b) = udp_pair(&mut net);
        let b_addr = net.local_addr(b).unwrap();

        let mut entries = [PollEntry::readable(b)];
        let count = net
            .poll(&mut entries, Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(count, 0);
        assert!(!entries[0].ready.any());

        net.send_to(a, b"x", b_addr, MsgFlags::default()).unwrap();
        let count = net
            .poll(&mut entries, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(count, 1);
        assert!(entries[0].ready.read);
    }

    #[test]
    #[cfg(not(miri))]
    fn test_poll_listener_stashes_connection_for_accept() {
        let mut net = SystemNetwork::new();
        let server = net.socket(AddrFamily::V4, SockType::Stream).unwrap();
        net.bind(server, loopback()).unwrap();
        net.listen(server, 4).unwrap();
        let server_addr = net.local_addr(server).unwrap();

        let client = net.socket(AddrFamily::V4, SockType::Stream).unwrap();
        net.connect(client, server_addr).unwrap();

        let mut entries = [PollEntry::readable(server)];
        let count = net
            .poll(&mut entries, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(count, 1);
        assert!(entries[0].ready.read);

        // The probed connection must still be deliverable.
        let (conn, peer) = net.accept(server).unwrap();
        assert!(peer.is_some());
        assert_eq!(net.send(client, b"hi", MsgFlags::default()), Ok(2));
        let mut buf = [0_u8; 2];
        assert_eq!(
            net.recv(conn, RecvBuf::Fill(&mut buf), MsgFlags::default()),
            Ok(2)
        );
    }

    #[test]
    #[cfg(not(miri))]
    fn test_resolve_numeric_literal() {
        let mut net = SystemNetwork::new();
        let list = net
            .resolve_addrs(Some("127.0.0.1"), Some("80"), None)
            .unwrap();
        assert!(list
            .addrs()
            .iter()
            .any(|info| info.addr == "127.0.0.1:80".parse().unwrap()));
        assert_eq!(net.release_addrs(list), ReleaseOutcome::Clean);
    }

    #[test]
    fn test_resolve_input_errors() {
        let mut net = SystemNetwork::new();
        assert_eq!(
            net.resolve_addrs(None, None, None),
            Err(ResolveError::NoName)
        );
        assert_eq!(
            net.resolve_addrs(Some("127.0.0.1"), Some("not-a-port"), None),
            Err(ResolveError::NoName)
        );
    }

    #[test]
    fn test_reverse_lookup_is_numeric() {
        let mut net = SystemNetwork::new();
        let info = net
            .resolve_names(
                "127.0.0.1:9999".parse().unwrap(),
                NameFlags::default(),
            )
            .unwrap();
        assert_eq!(info.host, "127.0.0.1");
        assert_eq!(info.service, "9999");
    }
}

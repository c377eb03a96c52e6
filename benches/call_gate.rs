//! Benchmarks for gate dispatch overhead
//!
//! Run with: cargo bench --bench call_gate
//!
//! Measures what the gate adds to a call against a backend that does no
//! real work: the transparent fast path, full monitoring with statistics
//! capture, and an armed fault schedule.

use std::hint::black_box;
use std::net::SocketAddr;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use netproctor::api::NetworkApi;
use netproctor::{
    AddrFamily, AddrHints, AddrList, CallGate, CallKind, Errno, FaultPolicy,
    MsgFlags, NameFlags, NameInfo, PollEntry, RecvBuf, ReleaseOutcome,
    ResolveError, ResolvedAddrs, ShutdownHow, SockType, SocketHandle,
};
use web_time::Duration;

const SD: SocketHandle = SocketHandle::new(3);

/// A backend that answers instantly, so the gate's own cost dominates.
struct NullNet;

impl NetworkApi for NullNet {
    fn resolve_addrs(
        &mut self,
        _host: Option<&str>,
        _service: Option<&str>,
        _hints: Option<&AddrHints>,
    ) -> Result<AddrList, ResolveError> {
        Ok(AddrList::issue(ResolvedAddrs::default()))
    }

    fn release_addrs(&mut self, _list: AddrList) -> ReleaseOutcome {
        ReleaseOutcome::Clean
    }

    fn resolve_names(
        &mut self,
        addr: SocketAddr,
        _flags: NameFlags,
    ) -> Result<NameInfo, ResolveError> {
        Ok(NameInfo {
            host: addr.ip().to_string(),
            service: addr.port().to_string(),
        })
    }

    fn socket(
        &mut self,
        _family: AddrFamily,
        _ty: SockType,
    ) -> Result<SocketHandle, Errno> {
        Ok(SD)
    }

    fn bind(&mut self, _sd: SocketHandle, _addr: SocketAddr) -> Result<(), Errno> {
        Ok(())
    }

    fn connect(
        &mut self,
        _sd: SocketHandle,
        _addr: SocketAddr,
    ) -> Result<(), Errno> {
        Ok(())
    }

    fn listen(&mut self, _sd: SocketHandle, _backlog: u32) -> Result<(), Errno> {
        Ok(())
    }

    fn accept(
        &mut self,
        _sd: SocketHandle,
    ) -> Result<(SocketHandle, Option<SocketAddr>), Errno> {
        Ok((SD, None))
    }

    fn recv(
        &mut self,
        _sd: SocketHandle,
        mut buf: RecvBuf<'_>,
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        Ok(buf.fill_from(&[0_u8; 64]))
    }

    fn recv_from(
        &mut self,
        sd: SocketHandle,
        buf: RecvBuf<'_>,
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        self.recv(sd, buf, flags).map(|count| (count, None))
    }

    fn recv_msg(
        &mut self,
        _sd: SocketHandle,
        _bufs: &mut [&mut [u8]],
        _flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>), Errno> {
        Ok((0, None))
    }

    fn send(
        &mut self,
        _sd: SocketHandle,
        buf: &[u8],
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        Ok(buf.len())
    }

    fn send_to(
        &mut self,
        sd: SocketHandle,
        buf: &[u8],
        _dest: SocketAddr,
        flags: MsgFlags,
    ) -> Result<usize, Errno> {
        self.send(sd, buf, flags)
    }

    fn send_msg(
        &mut self,
        _sd: SocketHandle,
        bufs: &[&[u8]],
        _dest: Option<SocketAddr>,
        _flags: MsgFlags,
    ) -> Result<usize, Errno> {
        Ok(bufs.iter().map(|buf| buf.len()).sum())
    }

    fn shutdown(
        &mut self,
        _sd: SocketHandle,
        _how: ShutdownHow,
    ) -> Result<(), Errno> {
        Ok(())
    }

    fn poll(
        &mut self,
        entries: &mut [PollEntry],
        _timeout: Option<Duration>,
    ) -> Result<usize, Errno> {
        for entry in entries.iter_mut() {
            entry.ready.read = entry.interest.read;
            entry.ready.write = entry.interest.write;
        }
        Ok(entries.len())
    }
}

fn bench_send_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Send dispatch");

    for size in [16, 256, 4096] {
        let payload = vec![0_u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        let mut bare = NullNet;
        group.bench_with_input(
            BenchmarkId::new("bare backend", size),
            &payload,
            |b, payload| {
                b.iter(|| bare.send(SD, black_box(payload), MsgFlags::default()));
            },
        );

        let mut transparent = CallGate::new(NullNet);
        group.bench_with_input(
            BenchmarkId::new("transparent gate", size),
            &payload,
            |b, payload| {
                b.iter(|| {
                    transparent.send(SD, black_box(payload), MsgFlags::default())
                });
            },
        );

        let mut monitored = CallGate::new(NullNet);
        monitored.monitor_mut().set_all(true);
        group.bench_with_input(
            BenchmarkId::new("monitored gate", size),
            &payload,
            |b, payload| {
                b.iter(|| {
                    monitored.send(SD, black_box(payload), MsgFlags::default())
                });
            },
        );
    }

    group.finish();
}

fn bench_fault_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("Fault schedule");

    let mut gate = CallGate::new(NullNet);
    gate.monitor_mut().set_all(true);
    if let Some(slot) = gate.faults_mut().slot_mut(CallKind::Send) {
        *slot = FaultPolicy::alternating(-1, Errno::IO);
    }
    let payload = [0_u8; 64];

    group.bench_function("alternating send", |b| {
        b.iter(|| {
            let _ = gate.send(SD, black_box(&payload), MsgFlags::default());
        });
    });

    group.finish();
}

fn bench_receive_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Receive dispatch");

    let mut gate = CallGate::new(NullNet);
    gate.monitor_mut().set_all(true);
    let mut buf = [0_u8; 64];
    group.throughput(Throughput::Bytes(64));

    group.bench_function("monitored recv", |b| {
        b.iter(|| {
            gate.recv(
                SD,
                RecvBuf::Fill(black_box(&mut buf)),
                MsgFlags::default(),
            )
        });
    });

    group.finish();
}

fn bench_poll_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("Poll snapshot");

    for count in [4, 16, 64] {
        let mut gate = CallGate::new(NullNet);
        gate.monitor_mut().set_all(true);
        let mut entries: Vec<PollEntry> = (0..count)
            .map(|i| PollEntry::readable(SocketHandle::new(i)))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("entries", count),
            &count,
            |b, _| {
                b.iter(|| gate.poll(black_box(&mut entries), None));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_send_dispatch,
    bench_fault_schedule,
    bench_receive_dispatch,
    bench_poll_snapshot
);
criterion_main!(benches);

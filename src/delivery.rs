//! Timed delivery plans that parcel received bytes out in chunks with
//! controlled waits: [`Chunk`], [`DeliveryMode`], [`DeliveryPlan`], and
//! the per-descriptor [`DeliveryTable`].

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use std::thread;

use web_time::{Duration, Instant};

use crate::api::RecvBuf;
use crate::error::Errno;
use crate::SocketHandle;

/// When a chunk's declared interval is honored relative to its delivery.
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
pub enum DeliveryMode {
    /// The full interval is waited before the first byte of each chunk, no
    /// matter how much time passed between calls. Non-blocking callers can
    /// never satisfy the wait by polling: each attempt demands the full
    /// interval again.
    Before,
    /// The interval counts from the end of the previous receive call; time
    /// the caller spent elsewhere is credited and only the remainder is
    /// waited before the chunk's first byte.
    After,
    /// Pacing against real elapsed time. Each drained chunk schedules the
    /// following chunk's interval into a wait deficit; elapsed time between
    /// calls pays the deficit down (banking credit when calls are slow), and
    /// a single call may return data spanning several chunks that are
    /// already due.
    Realtime,
}

impl DeliveryMode {
    /// Stable snake_case name, suitable for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Before => "before",
            DeliveryMode::After => "after",
            DeliveryMode::Realtime => "realtime",
        }
    }
}

impl Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a delivery plan: a byte payload plus the interval governing
/// when it becomes deliverable.
///
/// An empty payload yields a zero-byte receive without any waiting; placed
/// last it models end-of-stream.
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct Chunk {
    /// The bytes this chunk delivers.
    pub data: Vec<u8>,
    /// The pacing interval, interpreted per [`DeliveryMode`].
    pub interval: Duration,
}

impl Chunk {
    /// A chunk with an explicit interval.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, interval: Duration) -> Self {
        Chunk {
            data: data.into(),
            interval,
        }
    }

    /// A chunk deliverable without delay.
    #[must_use]
    pub fn immediate(data: impl Into<Vec<u8>>) -> Self {
        Chunk::new(data, Duration::ZERO)
    }

    /// The end-of-stream marker: no bytes, no delay.
    #[must_use]
    pub fn end_of_stream() -> Self {
        Chunk::immediate(Vec::new())
    }
}

/// A test-author-provided description of how data becomes available to a
/// descriptor over time.
///
/// Plans are immutable once built and are shared by reference; all mutable
/// per-descriptor progress lives in the table that schedules them.
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct DeliveryPlan {
    mode: DeliveryMode,
    chunks: Vec<Chunk>,
}

impl DeliveryPlan {
    /// A plan delivering `chunks` in order under `mode`.
    #[must_use]
    pub fn new(mode: DeliveryMode, chunks: Vec<Chunk>) -> Self {
        DeliveryPlan { mode, chunks }
    }

    /// The plan's delivery mode.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// The chunks, in delivery order.
    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Total payload bytes across all chunks.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.data.len()).sum()
    }
}

/// Per-descriptor progress through a plan.
#[derive(Debug, Clone)]
struct DescriptorSchedule {
    plan: Arc<DeliveryPlan>,
    chunk_index: usize,
    consumed: usize,
    last_call: Instant,
    deficit_ns: i64,
}

impl DescriptorSchedule {
    fn new(plan: Arc<DeliveryPlan>) -> Self {
        let deficit_ns = match (plan.mode(), plan.chunks().first()) {
            (DeliveryMode::Realtime, Some(first)) => {
                interval_ns(first.interval)
            }
            _ => 0,
        };
        DescriptorSchedule {
            plan,
            chunk_index: 0,
            consumed: 0,
            last_call: Instant::now(),
            deficit_ns,
        }
    }

    fn exhausted(&self) -> bool {
        self.chunk_index >= self.plan.chunks().len()
    }
}

fn interval_ns(interval: Duration) -> i64 {
    i64::try_from(interval.as_nanos()).unwrap_or(i64::MAX)
}

fn sleep_ns(ns: i64) {
    let ns = u64::try_from(ns).unwrap_or(0);
    if ns > 0 {
        thread::sleep(Duration::from_nanos(ns));
    }
}

/// The per-descriptor scheduling table driving simulated receives.
///
/// Registering a plan for a descriptor routes that descriptor's plain
/// receives through the simulator until the plan is cleared; an unregistered
/// descriptor is not intercepted. A fully consumed plan keeps yielding
/// zero-byte receives until cleared.
#[derive(Debug, Default)]
pub struct DeliveryTable {
    entries: HashMap<SocketHandle, DescriptorSchedule>,
}

impl DeliveryTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        DeliveryTable::default()
    }

    /// Registers `plan` for `sd`, restarting from the first chunk. Returns
    /// the plan previously registered, if any.
    pub fn set_plan(
        &mut self,
        sd: SocketHandle,
        plan: Arc<DeliveryPlan>,
    ) -> Option<Arc<DeliveryPlan>> {
        tracing::debug!(
            sd = %sd,
            mode = %plan.mode(),
            chunks = plan.chunks().len(),
            "registering delivery plan"
        );
        self.entries
            .insert(sd, DescriptorSchedule::new(plan))
            .map(|previous| previous.plan)
    }

    /// Removes the plan for `sd`, returning it if one was registered.
    pub fn clear_plan(
        &mut self,
        sd: SocketHandle,
    ) -> Option<Arc<DeliveryPlan>> {
        self.entries.remove(&sd).map(|schedule| schedule.plan)
    }

    /// Whether `sd` currently has a plan.
    #[must_use]
    pub fn has_plan(&self, sd: SocketHandle) -> bool {
        self.entries.contains_key(&sd)
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no descriptor has a plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every registered plan.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Runs one simulated receive against `sd`'s schedule.
    ///
    /// Returns `None` when `sd` has no plan, in which case the caller should
    /// fall through to the real operation. `Err` carries
    /// [`Errno::WOULDBLOCK`] when `dont_wait` hit a pending wait.
    pub fn receive(
        &mut self,
        sd: SocketHandle,
        buf: &mut RecvBuf<'_>,
        dont_wait: bool,
    ) -> Option<Result<usize, Errno>> {
        let schedule = self.entries.get_mut(&sd)?;
        tracing::trace!(sd = %sd, "serving receive from the delivery plan");
        let now = Instant::now();
        let since_last = now.saturating_duration_since(schedule.last_call);
        schedule.last_call = now;

        if schedule.exhausted() {
            return Some(Ok(0));
        }
        let result = match schedule.plan.mode() {
            DeliveryMode::Before | DeliveryMode::After => {
                step_interval(schedule, buf, dont_wait, since_last)
            }
            DeliveryMode::Realtime => {
                step_realtime(schedule, buf, dont_wait, since_last)
            }
        };
        Some(result)
    }
}

/// BEFORE/AFTER delivery: wait at the entry to each chunk, then transfer up
/// to the chunk boundary. A single call never crosses into the next chunk.
fn step_interval(
    schedule: &mut DescriptorSchedule,
    buf: &mut RecvBuf<'_>,
    dont_wait: bool,
    since_last: Duration,
) -> Result<usize, Errno> {
    let plan = Arc::clone(&schedule.plan);
    let Some(chunk) = plan.chunks().get(schedule.chunk_index) else {
        return Ok(0);
    };

    // Empty chunks deliver their zero-byte read with no wait at all.
    if chunk.data.is_empty() {
        schedule.chunk_index += 1;
        schedule.consumed = 0;
        return Ok(0);
    }

    if schedule.consumed == 0 {
        let owed_ns = match plan.mode() {
            DeliveryMode::Before => interval_ns(chunk.interval),
            _ => interval_ns(chunk.interval)
                .saturating_sub(interval_ns(since_last)),
        };
        if owed_ns > 0 {
            if dont_wait {
                return Err(Errno::WOULDBLOCK);
            }
            sleep_ns(owed_ns);
            schedule.last_call = Instant::now();
        }
    }

    let pending = chunk.data.get(schedule.consumed..).unwrap_or_default();
    let transferred = buf.fill_from(pending);
    schedule.consumed += transferred;
    if schedule.consumed >= chunk.data.len() {
        schedule.chunk_index += 1;
        schedule.consumed = 0;
    }
    Ok(transferred)
}

/// REALTIME delivery: elapsed time between calls pays down an accumulated
/// wait deficit; once the deficit is settled, one call greedily concatenates
/// every chunk that is already due.
fn step_realtime(
    schedule: &mut DescriptorSchedule,
    buf: &mut RecvBuf<'_>,
    dont_wait: bool,
    since_last: Duration,
) -> Result<usize, Errno> {
    let plan = Arc::clone(&schedule.plan);
    schedule.deficit_ns =
        schedule.deficit_ns.saturating_sub(interval_ns(since_last));

    let at_empty_chunk = plan
        .chunks()
        .get(schedule.chunk_index)
        .is_some_and(|chunk| chunk.data.is_empty());
    if schedule.deficit_ns > 0 && !at_empty_chunk {
        if dont_wait {
            return Err(Errno::WOULDBLOCK);
        }
        sleep_ns(schedule.deficit_ns);
        schedule.deficit_ns = 0;
        schedule.last_call = Instant::now();
    }

    let mut total = 0_usize;
    while let Some(chunk) = plan.chunks().get(schedule.chunk_index) {
        if buf.remaining() == 0 && !chunk.data.is_empty() {
            break;
        }
        let pending = chunk.data.get(schedule.consumed..).unwrap_or_default();
        let transferred = buf.fill_from(pending);
        schedule.consumed += transferred;
        total += transferred;
        if schedule.consumed < chunk.data.len() {
            // Caller buffer filled mid-chunk.
            break;
        }
        schedule.chunk_index += 1;
        schedule.consumed = 0;
        if let Some(next) = plan.chunks().get(schedule.chunk_index) {
            schedule.deficit_ns =
                schedule.deficit_ns.saturating_add(interval_ns(next.interval));
            if schedule.deficit_ns > 0 {
                break;
            }
        }
    }
    Ok(total)
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

    const SD: SocketHandle = SocketHandle::new(7);

    fn immediate_plan(mode: DeliveryMode, payloads: &[&[u8]]) -> DeliveryPlan {
        let chunks =
            payloads.iter().map(|data| Chunk::immediate(*data)).collect();
        DeliveryPlan::new(mode, chunks)
    }

    fn recv_into(
        table: &mut DeliveryTable,
        sd: SocketHandle,
        buf: &mut [u8],
    ) -> Result<usize, Errno> {
        let mut dest = RecvBuf::Fill(buf);
        table.receive(sd, &mut dest, false).expect("plan registered")
    }

    #[test]
    #[cfg(not(miri))]
    fn test_unregistered_descriptor_not_intercepted() {
        let mut table = DeliveryTable::new();
        let mut buf = RecvBuf::Discard(16);
        assert!(table.receive(SD, &mut buf, false).is_none());
    }

    #[test]
    #[cfg(not(miri))]
    fn test_register_query_clear() {
        let mut table = DeliveryTable::new();
        let plan = Arc::new(immediate_plan(DeliveryMode::Before, &[b"ab"]));
        assert!(table.set_plan(SD, Arc::clone(&plan)).is_none());
        assert!(table.has_plan(SD));
        assert_eq!(table.len(), 1);

        let replacement =
            Arc::new(immediate_plan(DeliveryMode::After, &[b"cd"]));
        let displaced = table.set_plan(SD, replacement).unwrap();
        assert_eq!(*displaced, *plan);

        assert!(table.clear_plan(SD).is_some());
        assert!(!table.has_plan(SD));
        assert!(table.clear_plan(SD).is_none());
    }

    #[test]
    #[cfg(not(miri))]
    fn test_before_mode_chunked_reads() {
        let mut table = DeliveryTable::new();
        table.set_plan(
            SD,
            Arc::new(immediate_plan(DeliveryMode::Before, &[b"abcd", b"efgh"])),
        );

        let mut buf = [0_u8; 4];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4));
        assert_eq!(&buf, b"efgh");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
        // Exhausted plans stay registered and keep yielding zero.
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
        assert!(table.has_plan(SD));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_interval_modes_never_cross_chunk_boundary() {
        for mode in [DeliveryMode::Before, DeliveryMode::After] {
            let mut table = DeliveryTable::new();
            table.set_plan(
                SD,
                Arc::new(immediate_plan(mode, &[b"abcd", b"efgh"])),
            );

            let mut buf = [0_u8; 16];
            assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4), "{mode}");
            assert_eq!(&buf[..4], b"abcd");
            assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4), "{mode}");
            assert_eq!(&buf[..4], b"efgh");
        }
    }

    #[test]
    #[cfg(not(miri))]
    fn test_partial_reads_within_chunk() {
        let mut table = DeliveryTable::new();
        table.set_plan(
            SD,
            Arc::new(immediate_plan(DeliveryMode::Before, &[b"abcde"])),
        );

        let mut buf = [0_u8; 3];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(3));
        assert_eq!(&buf, b"abc");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"de");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_realtime_concatenates_due_chunks() {
        let mut table = DeliveryTable::new();
        table.set_plan(
            SD,
            Arc::new(immediate_plan(
                DeliveryMode::Realtime,
                &[b"ab", b"cd", b"ef"],
            )),
        );

        let mut buf = [0_u8; 5];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(5));
        assert_eq!(&buf, b"abcde");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(1));
        assert_eq!(&buf[..1], b"f");
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_discard_destination_consumes_logically() {
        let mut table = DeliveryTable::new();
        table.set_plan(
            SD,
            Arc::new(immediate_plan(DeliveryMode::Before, &[b"abcd", b"ef"])),
        );

        let mut sink = RecvBuf::Discard(16);
        assert_eq!(table.receive(SD, &mut sink, false), Some(Ok(4)));
        let mut buf = [0_u8; 4];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    #[cfg(not(miri))]
    fn test_trailing_empty_chunk_ends_stream_without_wait() {
        let mut table = DeliveryTable::new();
        let plan = DeliveryPlan::new(
            DeliveryMode::Before,
            vec![Chunk::immediate(b"hi".as_slice()), Chunk::end_of_stream()],
        );
        table.set_plan(SD, Arc::new(plan));

        let mut buf = [0_u8; 8];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(2));
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_empty_chunk_never_waits_even_with_interval() {
        let mut table = DeliveryTable::new();
        let plan = DeliveryPlan::new(
            DeliveryMode::Before,
            vec![Chunk::new(Vec::new(), Duration::from_secs(3600))],
        );
        table.set_plan(SD, Arc::new(plan));

        let started = Instant::now();
        let mut buf = [0_u8; 4];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_dont_wait_reports_would_block_without_transfer() {
        let mut table = DeliveryTable::new();
        let plan = DeliveryPlan::new(
            DeliveryMode::Before,
            vec![Chunk::new(b"abcd".as_slice(), Duration::from_secs(3600))],
        );
        table.set_plan(SD, Arc::new(plan));

        let mut buf = [0_u8; 4];
        let mut dest = RecvBuf::Fill(&mut buf);
        assert_eq!(
            table.receive(SD, &mut dest, true),
            Some(Err(Errno::WOULDBLOCK))
        );
        assert_eq!(dest.remaining(), 4, "no bytes may move on would-block");
    }

    #[test]
    #[cfg(not(miri))]
    fn test_realtime_dont_wait_with_pending_deficit() {
        let mut table = DeliveryTable::new();
        let plan = DeliveryPlan::new(
            DeliveryMode::Realtime,
            vec![Chunk::new(b"abcd".as_slice(), Duration::from_secs(3600))],
        );
        table.set_plan(SD, Arc::new(plan));

        let mut dest = RecvBuf::Discard(4);
        assert_eq!(
            table.receive(SD, &mut dest, true),
            Some(Err(Errno::WOULDBLOCK))
        );
    }

    #[test]
    #[cfg(not(miri))]
    fn test_reregistering_restarts_plan() {
        let mut table = DeliveryTable::new();
        let plan =
            Arc::new(immediate_plan(DeliveryMode::Before, &[b"abcd"]));
        table.set_plan(SD, Arc::clone(&plan));

        let mut buf = [0_u8; 4];
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4));
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(0));

        table.set_plan(SD, plan);
        assert_eq!(recv_into(&mut table, SD, &mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_plan_total_len() {
        let plan = immediate_plan(
            DeliveryMode::Realtime,
            &[b"ab", b"", b"cdef"],
        );
        assert_eq!(plan.total_len(), 6);
        assert_eq!(plan.chunks().len(), 3);
    }
}

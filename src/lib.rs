//! # netproctor
//!
//! Deterministic instrumentation for socket-layer calls, built for grading
//! and testing networked programs that do not cooperate with their tests.
//!
//! The crate interposes a [`CallGate`] between the code under test and
//! whatever actually performs network operations. The gate implements the
//! same [`NetworkApi`](api::NetworkApi) trait it wraps, so the code under
//! test stays generic and never learns whether it is talking to the real
//! socket layer, a scripted stand-in, or another gate. Through the gate a
//! test can:
//!
//! - monitor any subset of call kinds and read back per-call statistics
//!   (call counts, last parameters, last outcome),
//! - inject faults on a deterministic schedule (always, nth call, first n
//!   calls, alternating calls),
//! - replace individual operations with closures,
//! - route name resolution to a process-local double that tracks release
//!   ordering and reports leaks and misuse,
//! - feed receives from a timed delivery plan that parcels bytes out in
//!   chunks with controlled waits.
//!
//! A fresh gate is transparent. Each behavior is opt-in, so the layers
//! compose: the same run can count calls, fail the third `connect`, and
//! serve `recv` from a scripted plan.
//!
//! # Quick start
//!
//! ```
//! use netproctor::api::NetworkApi;
//! use netproctor::{
//!     AddrFamily, CallGate, CallKind, Errno, FaultPolicy, SockType,
//!     SystemNetwork,
//! };
//!
//! let mut net = CallGate::new(SystemNetwork::new());
//! net.monitor_mut().set(CallKind::Socket, true);
//! if let Some(slot) = net.faults_mut().slot_mut(CallKind::Socket) {
//!     *slot = FaultPolicy::always(-1, Errno::IO);
//! }
//!
//! // The injected fault short-circuits before the real socket layer.
//! let denied = net.socket(AddrFamily::V4, SockType::Stream);
//! assert_eq!(denied, Err(Errno::IO));
//! assert_eq!(net.stats().socket.called, 1);
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use addr::{
    AddrFamily, AddrFlags, AddrHints, AddrInfo, AddrList, AddrListId,
    NameFlags, NameInfo, ResolvedAddrs, SockType,
};
pub use api::{
    MsgFlags, NetworkApi, PollEntry, PollInterest, PollReady, RecvBuf,
    ShutdownHow,
};
pub use delivery::{Chunk, DeliveryMode, DeliveryPlan, DeliveryTable};
pub use error::{Errno, ResolveError};
pub use fault::{FaultPattern, FaultPolicy, FaultTable};
pub use gate::CallGate;
pub use monitor::{CallKind, MonitorFlags};
pub use overrides::OverrideTable;
pub use stats::StatsTable;
pub use system::SystemNetwork;
pub use tracker::{
    CollectingMisuseObserver, MisuseKind, MisuseObserver, MisuseReport,
    ReleaseOutcome, ReleaseTracker, DEFAULT_TRACKER_CAPACITY,
};

pub mod addr;
pub mod api;
pub mod delivery;
pub mod error;
pub mod fault;
pub mod gate;
pub mod monitor;
pub mod overrides;
pub mod prelude;
pub mod resolver;
pub mod stats;
pub mod system;
#[doc(hidden)]
pub mod test_support;
pub mod tracker;

// #############
// # CONSTANTS #
// #############

/// The raw value a native descriptor API hands back on failure.
///
/// The gate reports failures through `Result` instead, but code migrating
/// structures that store raw descriptors still needs the sentinel.
pub const INVALID_SOCKET: i32 = -1;

/// A socket descriptor as the instrumented program sees it.
///
/// Handles are opaque tickets minted by [`socket`](api::NetworkApi::socket)
/// and [`accept`](api::NetworkApi::accept) and spent by every later call on
/// that socket. The gate never inspects the value beyond identity, so a
/// handle minted by the real socket layer and one minted by a scripted
/// stand-in flow through the same code.
///
/// The special value [`SocketHandle::INVALID`] (-1) represents "no socket",
/// for structures that reserve a slot before the descriptor exists.
///
/// # Type Safety
///
/// `SocketHandle` is a newtype wrapper around `i32` that provides:
/// - Clear semantic meaning (descriptors vs arbitrary integers)
/// - Helper methods like [`is_valid()`](SocketHandle::is_valid)
/// - Compile-time prevention of accidentally mixing descriptors with other
///   integers
///
/// # Examples
///
/// ```
/// use netproctor::SocketHandle;
///
/// let sd = SocketHandle::new(3);
/// assert!(sd.is_valid());
/// assert_eq!(sd.as_i32(), 3);
///
/// let unset = SocketHandle::INVALID;
/// assert!(!unset.is_valid());
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SocketHandle(i32);

impl SocketHandle {
    /// The invalid descriptor constant, representing "no socket".
    ///
    /// This is equivalent to [`INVALID_SOCKET`] (-1).
    pub const INVALID: SocketHandle = SocketHandle(INVALID_SOCKET);

    /// Creates a new `SocketHandle` from an `i32` value.
    ///
    /// Note: This does not check that any socket backs the descriptor. Use
    /// [`SocketHandle::is_valid()`] to check that the value is in the
    /// descriptor range at all.
    #[inline]
    #[must_use]
    pub const fn new(sd: i32) -> Self {
        SocketHandle(sd)
    }

    /// Returns the underlying `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` if this handle is in the valid descriptor range
    /// (non-negative).
    ///
    /// # Examples
    ///
    /// ```
    /// use netproctor::SocketHandle;
    ///
    /// assert!(SocketHandle::new(0).is_valid());
    /// assert!(!SocketHandle::INVALID.is_valid());
    /// assert!(!SocketHandle::new(-7).is_valid());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns `Some(self)` if the handle is in the descriptor range, or
    /// `None` for the invalid sentinel and other negatives.
    #[inline]
    #[must_use]
    pub const fn to_option(self) -> Option<SocketHandle> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }
}

impl std::fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID_SOCKET")
        }
    }
}

impl From<i32> for SocketHandle {
    #[inline]
    fn from(value: i32) -> Self {
        SocketHandle(value)
    }
}

impl From<SocketHandle> for i32 {
    #[inline]
    fn from(value: SocketHandle) -> Self {
        value.0
    }
}

// Comparison with i32 for convenience

impl PartialEq<i32> for SocketHandle {
    #[inline]
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl PartialEq<SocketHandle> for i32 {
    #[inline]
    fn eq(&self, other: &SocketHandle) -> bool {
        *self == other.0
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
    fn test_new_handle_round_trips() {
        let sd = SocketHandle::new(42);
        assert_eq!(sd.as_i32(), 42);
        assert!(sd.is_valid());
        assert_eq!(sd.to_option(), Some(sd));
    }

    #[test]
    fn test_invalid_handle_is_not_valid() {
        assert!(!SocketHandle::INVALID.is_valid());
        assert_eq!(SocketHandle::INVALID.as_i32(), INVALID_SOCKET);
        assert_eq!(SocketHandle::INVALID.to_option(), None);
        assert_eq!(SocketHandle::new(INVALID_SOCKET), SocketHandle::INVALID);
    }

    #[test]
    fn test_negative_handles_are_invalid() {
        assert!(!SocketHandle::new(-5).is_valid());
        assert_eq!(SocketHandle::new(-5).to_option(), None);
    }

    #[test]
    fn test_display_spells_out_the_sentinel() {
        assert_eq!(SocketHandle::new(7).to_string(), "7");
        assert_eq!(SocketHandle::INVALID.to_string(), "INVALID_SOCKET");
        assert_eq!(SocketHandle::new(-3).to_string(), "INVALID_SOCKET");
    }

    #[test]
    fn test_compares_against_raw_descriptors() {
        let sd = SocketHandle::new(9);
        assert_eq!(sd, 9);
        assert_eq!(9, sd);
        assert_ne!(sd, 10);
    }

    #[test]
    fn test_converts_to_and_from_i32() {
        let sd: SocketHandle = 5.into();
        assert_eq!(sd, SocketHandle::new(5));
        let raw: i32 = sd.into();
        assert_eq!(raw, 5);
    }

    #[test]
    fn test_ordering_follows_the_raw_value() {
        assert!(SocketHandle::new(3) < SocketHandle::new(4));
        assert!(SocketHandle::INVALID < SocketHandle::new(0));
    }
}

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Proof: SocketHandle::new round-trips any value and classifies
    /// validity by sign
    #[kani::proof]
    fn proof_handle_new_round_trip() {
        let value: i32 = kani::any();

        let sd = SocketHandle::new(value);
        kani::assert(
            sd.as_i32() == value,
            "SocketHandle::as_i32 should return original value",
        );
        kani::assert(
            sd.is_valid() == (value >= 0),
            "SocketHandle validity should match non-negativity",
        );
    }

    /// Proof: SocketHandle::INVALID is consistently invalid
    #[kani::proof]
    fn proof_invalid_handle_consistency() {
        let sd = SocketHandle::INVALID;
        kani::assert(!sd.is_valid(), "INVALID handle should not be valid");
        kani::assert(
            sd.as_i32() == INVALID_SOCKET,
            "INVALID handle should equal INVALID_SOCKET constant",
        );
        kani::assert(
            sd.to_option().is_none(),
            "INVALID handle should convert to None",
        );
    }

    /// Proof: a first-n policy admits exactly the first n evaluations
    #[kani::proof]
    fn proof_first_n_fires_exactly_n_times() {
        let n: u64 = kani::any();
        kani::assume(n >= 1 && n <= 3);

        let mut policy = FaultPolicy::first_n(n, -1, Errno::IO);
        let mut fired: u64 = 0;
        if policy.evaluate() {
            fired += 1;
        }
        if policy.evaluate() {
            fired += 1;
        }
        if policy.evaluate() {
            fired += 1;
        }
        if policy.evaluate() {
            fired += 1;
        }

        kani::assert(
            fired == n,
            "first-n should fire on exactly the first n evaluations",
        );
    }

    /// Proof: an alternating policy fires on the odd evaluations only
    #[kani::proof]
    fn proof_alternating_parity() {
        let mut policy = FaultPolicy::alternating(-1, Errno::IO);

        kani::assert(policy.evaluate(), "first evaluation should fire");
        kani::assert(!policy.evaluate(), "second evaluation should not fire");
        kani::assert(policy.evaluate(), "third evaluation should fire");
        kani::assert(!policy.evaluate(), "fourth evaluation should not fire");
    }
}

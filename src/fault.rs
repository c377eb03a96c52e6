//! Deterministic fault injection: the schedule patterns
//! ([`FaultPattern`]), the per-kind policy with its cursor
//! ([`FaultPolicy`]), and the table of slots the gate consults
//! ([`FaultTable`]).

use std::fmt;
use std::fmt::Display;

use crate::error::Errno;
use crate::monitor::CallKind;

/// When a fault policy fires, counted in evaluations of the policy.
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
#[serde(rename_all = "snake_case")]
pub enum FaultPattern {
    /// Never fires.
    #[default]
    Never,
    /// Fires on every evaluation.
    Always,
    /// Fires only on evaluation number `n` (1-based).
    NthCall(u64),
    /// Fires on the first `n` evaluations, then stops.
    FirstN(u64),
    /// Fires on evaluations 1, 3, 5, ...
    Alternating,
}

impl Display for FaultPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPattern::Never => f.write_str("never"),
            FaultPattern::Always => f.write_str("always"),
            FaultPattern::NthCall(n) => write!(f, "nth-call({n})"),
            FaultPattern::FirstN(n) => write!(f, "first-{n}"),
            FaultPattern::Alternating => f.write_str("alternating"),
        }
    }
}

/// Synthetic-failure schedule for one call kind.
///
/// The cursor counts evaluations. It advances on every evaluation whether or
/// not the pattern fired and whether or not the kind was being monitored at
/// the time, so a schedule stays aligned with call ordinality across test
/// phases. Installing a pattern resets the cursor; the pattern is therefore
/// only writable through constructors and [`set_pattern`](FaultPolicy::set_pattern).
///
/// [`raw_return`](FaultPolicy::raw_return) is interpreted in the failing
/// call's own result domain: a negative value for the socket family becomes
/// the errno failure, a resolution code becomes the matching resolution
/// error.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct FaultPolicy {
    pattern: FaultPattern,
    /// Return value substituted when the pattern fires.
    pub raw_return: i32,
    /// Error code substituted when the pattern fires.
    pub errno: Errno,
    cursor: u64,
}

impl FaultPolicy {
    /// A policy that never fires.
    #[must_use]
    pub const fn never() -> Self {
        FaultPolicy {
            pattern: FaultPattern::Never,
            raw_return: -1,
            errno: Errno::IO,
            cursor: 0,
        }
    }

    /// A policy with an explicit pattern, return value and error code.
    #[must_use]
    pub const fn new(
        pattern: FaultPattern,
        raw_return: i32,
        errno: Errno,
    ) -> Self {
        FaultPolicy {
            pattern,
            raw_return,
            errno,
            cursor: 0,
        }
    }

    /// Fails every call.
    #[must_use]
    pub const fn always(raw_return: i32, errno: Errno) -> Self {
        FaultPolicy::new(FaultPattern::Always, raw_return, errno)
    }

    /// Fails only the `n`-th evaluation (1-based).
    #[must_use]
    pub const fn nth_call(n: u64, raw_return: i32, errno: Errno) -> Self {
        FaultPolicy::new(FaultPattern::NthCall(n), raw_return, errno)
    }

    /// Fails the first `n` evaluations.
    #[must_use]
    pub const fn first_n(n: u64, raw_return: i32, errno: Errno) -> Self {
        FaultPolicy::new(FaultPattern::FirstN(n), raw_return, errno)
    }

    /// Fails every other evaluation, starting with the first.
    #[must_use]
    pub const fn alternating(raw_return: i32, errno: Errno) -> Self {
        FaultPolicy::new(FaultPattern::Alternating, raw_return, errno)
    }

    /// The installed pattern.
    #[inline]
    #[must_use]
    pub const fn pattern(&self) -> FaultPattern {
        self.pattern
    }

    /// Installs a new pattern and resets the cursor.
    pub const fn set_pattern(&mut self, pattern: FaultPattern) {
        self.pattern = pattern;
        self.cursor = 0;
    }

    /// How many times this policy has been evaluated since it was installed.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Advances the cursor and reports whether the pattern fires for this
    /// evaluation.
    pub const fn evaluate(&mut self) -> bool {
        self.cursor += 1;
        match self.pattern {
            FaultPattern::Never => false,
            FaultPattern::Always => true,
            FaultPattern::NthCall(n) => self.cursor == n,
            FaultPattern::FirstN(n) => self.cursor <= n,
            FaultPattern::Alternating => self.cursor % 2 == 1,
        }
    }
}

impl Default for FaultPolicy {
    fn default() -> Self {
        FaultPolicy::never()
    }
}

impl Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            pattern,
            raw_return,
            errno,
            cursor,
        } = self;
        write!(f, "{pattern} (ret {raw_return}, {errno}, evaluated {cursor})")
    }
}

/// One fault policy per failable call kind.
///
/// Release and error-string lookups cannot fail in the modeled API, so they
/// carry no slot here.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct FaultTable {
    /// Address resolution.
    pub resolve_addrs: FaultPolicy,
    /// Reverse name lookup.
    pub resolve_names: FaultPolicy,
    /// Socket creation.
    pub socket: FaultPolicy,
    /// Bind.
    pub bind: FaultPolicy,
    /// Connect.
    pub connect: FaultPolicy,
    /// Listen.
    pub listen: FaultPolicy,
    /// Accept.
    pub accept: FaultPolicy,
    /// The receive family. A single schedule covers all three variants.
    pub receive: FaultPolicy,
    /// The send family. A single schedule covers all three variants.
    pub send: FaultPolicy,
    /// Shutdown.
    pub shutdown: FaultPolicy,
    /// Readiness poll.
    pub poll: FaultPolicy,
}

impl FaultTable {
    /// A table where nothing fails.
    #[must_use]
    pub fn new() -> Self {
        FaultTable::default()
    }

    /// The slot for a kind, `None` for the kinds that cannot fail.
    #[must_use]
    pub const fn slot(&self, kind: CallKind) -> Option<&FaultPolicy> {
        match kind {
            CallKind::ResolveAddrs => Some(&self.resolve_addrs),
            CallKind::ResolveNames => Some(&self.resolve_names),
            CallKind::Socket => Some(&self.socket),
            CallKind::Bind => Some(&self.bind),
            CallKind::Connect => Some(&self.connect),
            CallKind::Listen => Some(&self.listen),
            CallKind::Accept => Some(&self.accept),
            CallKind::Receive => Some(&self.receive),
            CallKind::Send => Some(&self.send),
            CallKind::Shutdown => Some(&self.shutdown),
            CallKind::Poll => Some(&self.poll),
            CallKind::ReleaseAddrs | CallKind::ErrorString => None,
        }
    }

    /// Mutable access to the slot for a kind.
    #[must_use]
    pub const fn slot_mut(
        &mut self,
        kind: CallKind,
    ) -> Option<&mut FaultPolicy> {
        match kind {
            CallKind::ResolveAddrs => Some(&mut self.resolve_addrs),
            CallKind::ResolveNames => Some(&mut self.resolve_names),
            CallKind::Socket => Some(&mut self.socket),
            CallKind::Bind => Some(&mut self.bind),
            CallKind::Connect => Some(&mut self.connect),
            CallKind::Listen => Some(&mut self.listen),
            CallKind::Accept => Some(&mut self.accept),
            CallKind::Receive => Some(&mut self.receive),
            CallKind::Send => Some(&mut self.send),
            CallKind::Shutdown => Some(&mut self.shutdown),
            CallKind::Poll => Some(&mut self.poll),
            CallKind::ReleaseAddrs | CallKind::ErrorString => None,
        }
    }

    /// Clears every slot back to never-fire.
    pub fn reset(&mut self) {
        *self = FaultTable::default();
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

    fn firing_sequence(mut policy: FaultPolicy, evals: usize) -> Vec<bool> {
        (0..evals).map(|_| policy.evaluate()).collect()
    }

    #[test]
    fn test_never_declines() {
        let fired = firing_sequence(FaultPolicy::never(), 4);
        assert_eq!(fired, vec![false; 4]);
    }

    #[test]
    fn test_always_fires() {
        let fired = firing_sequence(FaultPolicy::always(-1, Errno::IO), 4);
        assert_eq!(fired, vec![true; 4]);
    }

    #[test]
    fn test_nth_call_fires_exactly_once() {
        let fired =
            firing_sequence(FaultPolicy::nth_call(3, -1, Errno::IO), 5);
        assert_eq!(fired, vec![false, false, true, false, false]);
    }

    #[test]
    fn test_first_n_fires_then_stops() {
        let fired = firing_sequence(FaultPolicy::first_n(2, -1, Errno::IO), 5);
        assert_eq!(fired, vec![true, true, false, false, false]);
    }

    #[test]
    fn test_alternating_fires_odd_evaluations() {
        let fired =
            firing_sequence(FaultPolicy::alternating(-1, Errno::IO), 6);
        assert_eq!(fired, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn test_zero_counts_never_fire() {
        assert_eq!(
            firing_sequence(FaultPolicy::nth_call(0, -1, Errno::IO), 3),
            vec![false; 3]
        );
        assert_eq!(
            firing_sequence(FaultPolicy::first_n(0, -1, Errno::IO), 3),
            vec![false; 3]
        );
    }

    #[test]
    fn test_set_pattern_resets_cursor() {
        let mut policy = FaultPolicy::nth_call(2, -1, Errno::IO);
        assert!(!policy.evaluate());
        assert!(policy.evaluate());
        assert_eq!(policy.cursor(), 2);

        policy.set_pattern(FaultPattern::NthCall(2));
        assert_eq!(policy.cursor(), 0);
        assert!(!policy.evaluate());
        assert!(policy.evaluate());
    }

    #[test]
    fn test_return_fields_adjustable_without_reset() {
        let mut policy = FaultPolicy::always(-1, Errno::IO);
        assert!(policy.evaluate());
        policy.raw_return = -7;
        policy.errno = Errno::CONNREFUSED;
        assert_eq!(policy.cursor(), 1, "tweaking targets must not reset");
        assert!(policy.evaluate());
    }

    #[test]
    fn test_table_slots_cover_failable_kinds() {
        let mut table = FaultTable::new();
        for kind in CallKind::ALL {
            let expect_slot = !matches!(
                kind,
                CallKind::ReleaseAddrs | CallKind::ErrorString
            );
            assert_eq!(table.slot(kind).is_some(), expect_slot, "{kind}");
            assert_eq!(table.slot_mut(kind).is_some(), expect_slot, "{kind}");
        }
    }

    #[test]
    fn test_table_reset_clears_progressions() {
        let mut table = FaultTable::new();
        table.receive = FaultPolicy::first_n(3, -1, Errno::WOULDBLOCK);
        assert!(table.receive.evaluate());
        table.reset();
        assert_eq!(table.receive.pattern(), FaultPattern::Never);
        assert_eq!(table.receive.cursor(), 0);
    }
}

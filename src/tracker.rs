//! Strict LIFO release tracking for resolved address lists
//! ([`ReleaseTracker`]), with misuse classification ([`MisuseKind`]) and
//! pluggable observers ([`MisuseObserver`], [`CollectingMisuseObserver`]).

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::addr::AddrListId;

/// Default number of outstanding address lists the tracker will hold.
pub const DEFAULT_TRACKER_CAPACITY: usize = 64;

/// What a monitored release reported.
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
pub enum ReleaseOutcome {
    /// The release matched the newest outstanding list (or checking was
    /// off).
    Clean,
    /// The release was flagged by strict checking. The list was still
    /// released.
    Misused,
}

impl ReleaseOutcome {
    /// Returns `true` unless strict checking flagged the release.
    #[inline]
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, ReleaseOutcome::Clean)
    }
}

impl Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseOutcome::Clean => "clean",
            ReleaseOutcome::Misused => "misused",
        };
        f.write_str(name)
    }
}

/// Why a release was flagged.
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
pub enum MisuseKind {
    /// The list is outstanding but is not the newest remaining entry.
    NotNewest,
    /// The list was never tracked, or was already released.
    Untracked,
}

impl MisuseKind {
    /// Stable snake_case name, suitable for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MisuseKind::NotNewest => "not_newest",
            MisuseKind::Untracked => "untracked",
        }
    }
}

impl Display for MisuseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flagged release, as handed to a [`MisuseObserver`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MisuseReport {
    /// The list the caller tried to release.
    pub id: AddrListId,
    /// Why the release was flagged.
    pub kind: MisuseKind,
    /// The entry a correct release would have named, if any were
    /// outstanding.
    pub newest: Option<AddrListId>,
    /// Outstanding entries at the moment of detection.
    pub outstanding: usize,
}

impl MisuseReport {
    /// Serializes the report as JSON.
    ///
    /// # Errors
    ///
    /// Forwards serialization failures.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Display for MisuseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            id,
            kind,
            newest,
            outstanding,
        } = self;
        match kind {
            MisuseKind::NotNewest => {
                write!(f, "released {id} out of order")?;
            }
            MisuseKind::Untracked => {
                write!(f, "released untracked {id}")?;
            }
        }
        if let Some(newest) = newest {
            write!(f, " (newest {newest}, {outstanding} outstanding)")
        } else {
            write!(f, " ({outstanding} outstanding)")
        }
    }
}

/// Receives release-misuse reports as they are detected.
pub trait MisuseObserver: Send + Sync {
    /// Called synchronously from the release path for every flagged release.
    fn on_misuse(&self, report: &MisuseReport);
}

/// A [`MisuseObserver`] that stores every report for later inspection.
#[derive(Debug, Default)]
pub struct CollectingMisuseObserver {
    reports: Mutex<Vec<MisuseReport>>,
}

impl CollectingMisuseObserver {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        CollectingMisuseObserver::default()
    }

    /// Snapshot of the collected reports.
    #[must_use]
    pub fn reports(&self) -> Vec<MisuseReport> {
        self.reports.lock().clone()
    }

    /// Removes and returns the collected reports.
    #[must_use]
    pub fn take(&self) -> Vec<MisuseReport> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Number of collected reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Returns `true` when nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl MisuseObserver for CollectingMisuseObserver {
    fn on_misuse(&self, report: &MisuseReport) {
        self.reports.lock().push(report.clone());
    }
}

/// Strict release checking for issued address lists.
///
/// Lists are tracked newest-last; a correct program releases them in reverse
/// order of resolution, so only the newest remaining entry may be released.
/// Any other release is flagged and reported, and the tracked state is left
/// untouched so one mistake does not cascade into misdiagnosing the releases
/// that follow.
///
/// The tracker is bounded: past [`capacity`](ReleaseTracker::capacity) new
/// lists go untracked (counted in [`dropped`](ReleaseTracker::dropped))
/// rather than failing the resolution that produced them.
pub struct ReleaseTracker {
    enabled: bool,
    stack: SmallVec<[AddrListId; 8]>,
    capacity: usize,
    dropped: u64,
    observer: Option<Arc<dyn MisuseObserver>>,
}

impl ReleaseTracker {
    /// A disabled tracker with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        ReleaseTracker {
            enabled: false,
            stack: SmallVec::new(),
            capacity: DEFAULT_TRACKER_CAPACITY,
            dropped: 0,
            observer: None,
        }
    }

    /// Whether strict checking is on.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns strict checking on or off. Tracked state survives a pause;
    /// use [`clear`](ReleaseTracker::clear) between test cases.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Maximum number of outstanding entries tracked at once.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adjusts the capacity. Entries already tracked are kept even if the
    /// new capacity is smaller; only future tracking is affected.
    pub const fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Installs or removes the misuse observer.
    pub fn set_observer(&mut self, observer: Option<Arc<dyn MisuseObserver>>) {
        self.observer = observer;
    }

    /// The outstanding entries, oldest first.
    #[must_use]
    pub fn outstanding(&self) -> &[AddrListId] {
        &self.stack
    }

    /// Returns `true` when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// How many lists went untracked because the tracker was full.
    #[inline]
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Records a freshly issued list. Does nothing while checking is off;
    /// never fails the resolution that produced the list.
    pub fn track(&mut self, id: AddrListId) {
        if !self.enabled {
            return;
        }
        if self.stack.len() >= self.capacity {
            self.dropped += 1;
            tracing::warn!(
                id = %id,
                capacity = self.capacity,
                "release tracker full, list goes untracked"
            );
            return;
        }
        tracing::trace!(id = %id, "tracking address list");
        self.stack.push(id);
    }

    /// Validates a release against the tracked state.
    ///
    /// A clean release pops its entry; a flagged one leaves the state
    /// untouched and notifies the observer. Always returns
    /// [`ReleaseOutcome::Clean`] while checking is off.
    pub fn check_release(&mut self, id: AddrListId) -> ReleaseOutcome {
        if !self.enabled {
            return ReleaseOutcome::Clean;
        }
        if self.stack.last() == Some(&id) {
            self.stack.pop();
            tracing::trace!(id = %id, "clean address list release");
            return ReleaseOutcome::Clean;
        }
        let kind = if self.stack.contains(&id) {
            MisuseKind::NotNewest
        } else {
            MisuseKind::Untracked
        };
        let report = MisuseReport {
            id,
            kind,
            newest: self.stack.last().copied(),
            outstanding: self.stack.len(),
        };
        tracing::warn!(
            id = %report.id,
            kind = %report.kind,
            outstanding = report.outstanding,
            "address list release misuse"
        );
        if let Some(observer) = &self.observer {
            observer.on_misuse(&report);
        }
        ReleaseOutcome::Misused
    }

    /// Forgets all tracked entries and zeroes the dropped counter. The
    /// enabled flag, capacity and observer stay as configured.
    pub fn clear(&mut self) {
        self.stack.clear();
        self.dropped = 0;
    }
}

impl Default for ReleaseTracker {
    fn default() -> Self {
        ReleaseTracker::new()
    }
}

impl fmt::Debug for ReleaseTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            enabled,
            stack,
            capacity,
            dropped,
            observer,
        } = self;
        f.debug_struct("ReleaseTracker")
            .field("enabled", enabled)
            .field("outstanding", &stack.len())
            .field("capacity", capacity)
            .field("dropped", dropped)
            .field("observer", &observer.is_some())
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

    fn enabled_tracker() -> ReleaseTracker {
        let mut tracker = ReleaseTracker::new();
        tracker.set_enabled(true);
        tracker
    }

    fn ids(n: u64) -> Vec<AddrListId> {
        (0..n).map(|_| AddrListId::fresh()).collect()
    }

    #[test]
    fn test_reverse_order_release_is_clean() {
        let mut tracker = enabled_tracker();
        let ids = ids(4);
        for id in &ids {
            tracker.track(*id);
        }
        for id in ids.iter().rev() {
            assert_eq!(tracker.check_release(*id), ReleaseOutcome::Clean);
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_forward_order_release_flags_all_but_newest() {
        let collector = Arc::new(CollectingMisuseObserver::new());
        let mut tracker = enabled_tracker();
        tracker.set_observer(Some(collector.clone()));

        let ids = ids(3);
        for id in &ids {
            tracker.track(*id);
        }

        assert_eq!(tracker.check_release(ids[0]), ReleaseOutcome::Misused);
        assert_eq!(tracker.check_release(ids[1]), ReleaseOutcome::Misused);
        assert_eq!(tracker.check_release(ids[2]), ReleaseOutcome::Clean);

        let reports = collector.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| r.kind == MisuseKind::NotNewest));
        assert_eq!(reports[0].newest, Some(ids[2]));

        // A misuse never mutates the table, so the older entries remain.
        assert_eq!(tracker.outstanding(), &ids[..2]);
    }

    #[test]
    fn test_untracked_release_is_flagged() {
        let mut tracker = enabled_tracker();
        let stray = AddrListId::fresh();
        assert_eq!(tracker.check_release(stray), ReleaseOutcome::Misused);

        tracker.track(AddrListId::fresh());
        let report_kind = {
            let collector = Arc::new(CollectingMisuseObserver::new());
            tracker.set_observer(Some(collector.clone()));
            let _ = tracker.check_release(stray);
            collector.reports()[0].kind
        };
        assert_eq!(report_kind, MisuseKind::Untracked);
    }

    #[test]
    fn test_double_release_is_flagged() {
        let mut tracker = enabled_tracker();
        let id = AddrListId::fresh();
        tracker.track(id);
        assert_eq!(tracker.check_release(id), ReleaseOutcome::Clean);
        assert_eq!(tracker.check_release(id), ReleaseOutcome::Misused);
    }

    #[test]
    fn test_disabled_tracker_checks_nothing() {
        let mut tracker = ReleaseTracker::new();
        let id = AddrListId::fresh();
        tracker.track(id);
        assert!(tracker.is_empty());
        assert_eq!(tracker.check_release(id), ReleaseOutcome::Clean);
    }

    #[test]
    fn test_capacity_overflow_counts_dropped() {
        let mut tracker = enabled_tracker();
        tracker.set_capacity(2);
        let ids = ids(3);
        for id in &ids {
            tracker.track(*id);
        }
        assert_eq!(tracker.outstanding().len(), 2);
        assert_eq!(tracker.dropped(), 1);

        // The untracked overflow entry is indistinguishable from a stray.
        assert_eq!(tracker.check_release(ids[2]), ReleaseOutcome::Misused);
    }

    #[test]
    fn test_clear_keeps_configuration() {
        let mut tracker = enabled_tracker();
        tracker.set_capacity(2);
        let ids = ids(3);
        for id in &ids {
            tracker.track(*id);
        }
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.dropped(), 0);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.capacity(), 2);
    }

    #[test]
    fn test_report_display() {
        let report = MisuseReport {
            id: AddrListId::from_raw(5),
            kind: MisuseKind::NotNewest,
            newest: Some(AddrListId::from_raw(9)),
            outstanding: 3,
        };
        assert_eq!(
            format!("{report}"),
            "released addr-list-5 out of order (newest addr-list-9, 3 outstanding)"
        );

        let report = MisuseReport {
            id: AddrListId::from_raw(5),
            kind: MisuseKind::Untracked,
            newest: None,
            outstanding: 0,
        };
        assert_eq!(
            format!("{report}"),
            "released untracked addr-list-5 (0 outstanding)"
        );
    }
}

//! The address-resolution data model: hints ([`AddrHints`]), result
//! entries ([`AddrInfo`]), the tracked lists resolution hands back
//! ([`AddrList`], [`ResolvedAddrs`]), and reverse-lookup results
//! ([`NameInfo`]).

use std::fmt;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// The address family requested by a resolution hint or carried by a result.
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
pub enum AddrFamily {
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
    /// Either family; resolution picks one from the input.
    #[default]
    Unspec,
}

impl AddrFamily {
    /// Classifies a concrete socket address.
    #[inline]
    #[must_use]
    pub const fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddrFamily::V4,
            SocketAddr::V6(_) => AddrFamily::V6,
        }
    }

    /// Classifies a bare IP address.
    #[inline]
    #[must_use]
    pub const fn of_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddrFamily::V4,
            IpAddr::V6(_) => AddrFamily::V6,
        }
    }

    /// Returns `true` when an address of family `other` satisfies this
    /// requested family. [`AddrFamily::Unspec`] accepts anything.
    #[inline]
    #[must_use]
    pub const fn accepts(self, other: AddrFamily) -> bool {
        match self {
            AddrFamily::Unspec => true,
            AddrFamily::V4 => matches!(other, AddrFamily::V4),
            AddrFamily::V6 => matches!(other, AddrFamily::V6),
        }
    }
}

impl Display for AddrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddrFamily::V4 => "ipv4",
            AddrFamily::V6 => "ipv6",
            AddrFamily::Unspec => "unspec",
        };
        f.write_str(name)
    }
}

/// The transport socket type named in hints and results.
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
pub enum SockType {
    /// Connection-oriented stream transport.
    Stream,
    /// Datagram transport. This is what a result reports when the hints left
    /// the type unconstrained.
    #[default]
    Dgram,
}

impl Display for SockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SockType::Stream => "stream",
            SockType::Dgram => "dgram",
        };
        f.write_str(name)
    }
}

/// Behavior flags accepted by address resolution.
///
/// The simulated resolver is numeric-only regardless of
/// [`numeric_host`](AddrFlags::numeric_host), but the flags are still
/// recorded and [`passive`](AddrFlags::passive) and
/// [`canonical`](AddrFlags::canonical) change the produced result.
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
pub struct AddrFlags {
    /// Require the host to be a numeric literal.
    pub numeric_host: bool,
    /// Require the service to be a numeric port string.
    pub numeric_serv: bool,
    /// Resolve for a listening socket; without a host this yields the
    /// wildcard address instead of loopback.
    pub passive: bool,
    /// Ask for the canonical name of the host.
    pub canonical: bool,
}

/// Hints constraining an address-resolution request.
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
pub struct AddrHints {
    /// Restrict results to one address family.
    pub family: AddrFamily,
    /// Restrict results to one socket type. `None` leaves the type
    /// unconstrained.
    pub socktype: Option<SockType>,
    /// Behavior flags.
    pub flags: AddrFlags,
}

impl AddrHints {
    /// Hints for a passive (listening) resolution with everything else left
    /// open.
    #[must_use]
    pub const fn passive() -> Self {
        AddrHints {
            family: AddrFamily::Unspec,
            socktype: None,
            flags: AddrFlags {
                numeric_host: false,
                numeric_serv: false,
                passive: true,
                canonical: false,
            },
        }
    }
}

/// One resolved address entry.
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
pub struct AddrInfo {
    /// Family of [`addr`](AddrInfo::addr).
    pub family: AddrFamily,
    /// Socket type this entry is usable with.
    pub socktype: SockType,
    /// The concrete address and port.
    pub addr: SocketAddr,
}

impl Display for AddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            family,
            socktype,
            addr,
        } = self;
        write!(f, "{addr} ({family}/{socktype})")
    }
}

/// A resolution result: the resolved entries plus the canonical name when one
/// was requested.
///
/// Most resolutions produce a single entry, so the entries are stored inline.
#[derive(
    Debug,
    Default,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct ResolvedAddrs {
    /// The resolved entries, best first.
    pub entries: SmallVec<[AddrInfo; 2]>,
    /// Canonical name of the host, present only when the request asked for
    /// it.
    pub canonical: Option<String>,
}

impl ResolvedAddrs {
    /// A result holding exactly one entry.
    #[must_use]
    pub fn single(info: AddrInfo, canonical: Option<String>) -> Self {
        let mut entries = SmallVec::new();
        entries.push(info);
        ResolvedAddrs { entries, canonical }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The preferred entry, if any.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&AddrInfo> {
        self.entries.first()
    }

    /// Iterates over the entries in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &AddrInfo> {
        self.entries.iter()
    }
}

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one resolution result, unique for the lifetime of the process.
///
/// Release tracking uses these identities the way native code uses the
/// allocation address of a result list: releasing anything other than the
/// most recently issued, still-live identity is a misuse.
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
pub struct AddrListId(u64);

impl AddrListId {
    /// Mints a fresh identity. Identities are unique process-wide no matter
    /// which component produced the list they belong to.
    #[must_use]
    pub fn fresh() -> Self {
        AddrListId(NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identity value. Useful in tests; production lists should
    /// come from [`AddrListId::fresh`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        AddrListId(raw)
    }

    /// Returns the raw identity value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for AddrListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr-list-{}", self.0)
    }
}

/// An issued resolution result: the addresses plus the identity that release
/// tracking watches.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AddrList {
    id: AddrListId,
    addrs: ResolvedAddrs,
}

impl AddrList {
    /// Wraps a resolution result under a fresh identity.
    #[must_use]
    pub fn issue(addrs: ResolvedAddrs) -> Self {
        AddrList {
            id: AddrListId::fresh(),
            addrs,
        }
    }

    /// The identity release tracking knows this list by.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> AddrListId {
        self.id
    }

    /// The resolved addresses.
    #[inline]
    #[must_use]
    pub const fn addrs(&self) -> &ResolvedAddrs {
        &self.addrs
    }

    /// The preferred entry, if any.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&AddrInfo> {
        self.addrs.first()
    }
}

/// Behavior flags accepted by reverse name lookup.
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
pub struct NameFlags {
    /// Report the host numerically instead of looking up a name.
    pub numeric_host: bool,
    /// Report the service numerically instead of looking up a name.
    pub numeric_service: bool,
    /// Fail instead of falling back to a numeric host.
    pub name_required: bool,
}

/// Result of a reverse name lookup.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NameInfo {
    /// Host name, or the numeric address text.
    pub host: String,
    /// Service name, or the numeric port text.
    pub service: String,
}

impl Display for NameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { host, service } = self;
        write!(f, "{host}:{service}")
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

    fn v4(text: &str) -> SocketAddr {
        text.parse().unwrap()
    }

    #[test]
    fn test_family_classification() {
        assert_eq!(AddrFamily::of(&v4("127.0.0.1:80")), AddrFamily::V4);
        assert_eq!(AddrFamily::of(&v4("[::1]:80")), AddrFamily::V6);
    }

    #[test]
    fn test_family_accepts() {
        assert!(AddrFamily::Unspec.accepts(AddrFamily::V4));
        assert!(AddrFamily::Unspec.accepts(AddrFamily::V6));
        assert!(AddrFamily::V4.accepts(AddrFamily::V4));
        assert!(!AddrFamily::V4.accepts(AddrFamily::V6));
        assert!(!AddrFamily::V6.accepts(AddrFamily::V4));
    }

    #[test]
    fn test_default_socktype_is_dgram() {
        assert_eq!(SockType::default(), SockType::Dgram);
    }

    #[test]
    fn test_passive_hints() {
        let hints = AddrHints::passive();
        assert!(hints.flags.passive);
        assert_eq!(hints.family, AddrFamily::Unspec);
        assert_eq!(hints.socktype, None);
    }

    #[test]
    fn test_single_result_shape() {
        let info = AddrInfo {
            family: AddrFamily::V4,
            socktype: SockType::Dgram,
            addr: v4("127.0.0.1:9000"),
        };
        let addrs = ResolvedAddrs::single(info, Some("C127.0.0.1".to_owned()));
        assert_eq!(addrs.len(), 1);
        assert!(!addrs.is_empty());
        assert_eq!(addrs.first().unwrap().addr.port(), 9000);
        assert_eq!(addrs.canonical.as_deref(), Some("C127.0.0.1"));
    }

    #[test]
    fn test_list_ids_are_unique() {
        let a = AddrListId::fresh();
        let b = AddrListId::fresh();
        let c = AddrListId::fresh();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_issue_mints_distinct_identities() {
        let addrs = ResolvedAddrs::default();
        let first = AddrList::issue(addrs.clone());
        let second = AddrList::issue(addrs);
        assert_ne!(first.id(), second.id());
        assert_eq!(first.addrs(), second.addrs());
    }

    #[test]
    fn test_display_formats() {
        let info = AddrInfo {
            family: AddrFamily::V6,
            socktype: SockType::Stream,
            addr: v4("[::1]:443"),
        };
        assert_eq!(format!("{info}"), "[::1]:443 (ipv6/stream)");
        assert_eq!(format!("{}", AddrListId::from_raw(7)), "addr-list-7");
        let name = NameInfo {
            host: "::1".to_owned(),
            service: "443".to_owned(),
        };
        assert_eq!(format!("{name}"), "::1:443");
    }
}

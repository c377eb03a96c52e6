//! The error taxonomies: [`Errno`] for socket-layer failures and
//! [`ResolveError`] for name-resolution failures.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

/// A raw operating-system error code, as set in `errno` by a failing
/// networking call.
///
/// The virtualized layer treats these codes as opaque integers so that fault
/// injection can target any value a test wants to observe. The named
/// constants follow the common Linux numbering; the OS-backed implementation
/// reports whatever the platform actually produced (via
/// [`Errno::from_io`]).
///
/// # Examples
///
/// ```
/// use netproctor::Errno;
///
/// let e = Errno::WOULDBLOCK;
/// assert!(e.is_would_block());
/// assert_eq!(e.as_i32(), 11);
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
pub struct Errno(i32);

impl Errno {
    /// Interrupted system call (`EINTR`).
    pub const INTR: Errno = Errno(4);
    /// Input/output error (`EIO`). Also the fallback for unmapped failures.
    pub const IO: Errno = Errno(5);
    /// Bad file descriptor (`EBADF`).
    pub const BADF: Errno = Errno(9);
    /// Resource temporarily unavailable (`EAGAIN`).
    pub const AGAIN: Errno = Errno(11);
    /// Operation would block (`EWOULDBLOCK`, identical to [`Errno::AGAIN`]).
    ///
    /// This is the code a non-blocking receive reports when a delivery plan
    /// still has a pending wait.
    pub const WOULDBLOCK: Errno = Errno(11);
    /// Bad address (`EFAULT`).
    pub const FAULT: Errno = Errno(14);
    /// Invalid argument (`EINVAL`).
    pub const INVAL: Errno = Errno(22);
    /// Broken pipe (`EPIPE`).
    pub const PIPE: Errno = Errno(32);
    /// Address already in use (`EADDRINUSE`).
    pub const ADDRINUSE: Errno = Errno(98);
    /// Cannot assign requested address (`EADDRNOTAVAIL`).
    pub const ADDRNOTAVAIL: Errno = Errno(99);
    /// Software caused connection abort (`ECONNABORTED`).
    pub const CONNABORTED: Errno = Errno(103);
    /// Connection reset by peer (`ECONNRESET`).
    pub const CONNRESET: Errno = Errno(104);
    /// Transport endpoint is not connected (`ENOTCONN`).
    pub const NOTCONN: Errno = Errno(107);
    /// Connection timed out (`ETIMEDOUT`).
    pub const TIMEDOUT: Errno = Errno(110);
    /// Connection refused (`ECONNREFUSED`).
    pub const CONNREFUSED: Errno = Errno(111);

    /// Wraps a raw error code.
    #[inline]
    #[must_use]
    pub const fn new(code: i32) -> Self {
        Errno(code)
    }

    /// Returns the raw error code.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` for the would-block code a non-blocking call reports
    /// when it cannot proceed immediately.
    #[inline]
    #[must_use]
    pub const fn is_would_block(self) -> bool {
        self.0 == Errno::AGAIN.0
    }

    /// Maps an [`io::Error`] onto an error code.
    ///
    /// The platform's raw code is preserved when the error carries one;
    /// synthetic errors (for example those produced by `std` itself) fall
    /// back to a fixed mapping from [`io::ErrorKind`], with [`Errno::IO`] as
    /// the catch-all.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Errno(code);
        }
        match err.kind() {
            io::ErrorKind::WouldBlock => Errno::AGAIN,
            io::ErrorKind::Interrupted => Errno::INTR,
            io::ErrorKind::ConnectionRefused => Errno::CONNREFUSED,
            io::ErrorKind::ConnectionReset => Errno::CONNRESET,
            io::ErrorKind::ConnectionAborted => Errno::CONNABORTED,
            io::ErrorKind::NotConnected => Errno::NOTCONN,
            io::ErrorKind::AddrInUse => Errno::ADDRINUSE,
            io::ErrorKind::AddrNotAvailable => Errno::ADDRNOTAVAIL,
            io::ErrorKind::BrokenPipe => Errno::PIPE,
            io::ErrorKind::InvalidInput => Errno::INVAL,
            io::ErrorKind::TimedOut => Errno::TIMEDOUT,
            _ => Errno::IO,
        }
    }

    fn name(self) -> Option<&'static str> {
        match self.0 {
            4 => Some("EINTR"),
            5 => Some("EIO"),
            9 => Some("EBADF"),
            11 => Some("EAGAIN"),
            14 => Some("EFAULT"),
            22 => Some("EINVAL"),
            32 => Some("EPIPE"),
            98 => Some("EADDRINUSE"),
            99 => Some("EADDRNOTAVAIL"),
            103 => Some("ECONNABORTED"),
            104 => Some("ECONNRESET"),
            107 => Some("ENOTCONN"),
            110 => Some("ETIMEDOUT"),
            111 => Some("ECONNREFUSED"),
            _ => None,
        }
    }
}

impl Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}

impl Error for Errno {}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        Errno::from_io(&err)
    }
}

/// The address-resolution error taxonomy.
///
/// Mirrors the classic `EAI_*` error space so that tests can assert on the
/// same errors real resolution produces, and so fault injection can target
/// any of them by code. [`ResolveError::code`] and [`ResolveError::from_code`]
/// round-trip through the conventional numeric values.
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
pub enum ResolveError {
    /// Invalid flag combination (`EAI_BADFLAGS`), e.g. requesting a canonical
    /// name without giving a host.
    BadFlags,
    /// Name or service is unknown or not numeric (`EAI_NONAME`).
    NoName,
    /// Temporary resolution failure (`EAI_AGAIN`).
    Again,
    /// Non-recoverable resolution failure (`EAI_FAIL`).
    Fail,
    /// The requested address family is not supported for this input
    /// (`EAI_FAMILY`), e.g. an IPv4 literal under an IPv6-only hint.
    Family,
    /// The requested socket type is not supported (`EAI_SOCKTYPE`).
    SockType,
    /// The service is not supported for the socket type (`EAI_SERVICE`).
    Service,
    /// Out of memory (`EAI_MEMORY`).
    Memory,
    /// A system error occurred (`EAI_SYSTEM`).
    System,
    /// An argument buffer was too small (`EAI_OVERFLOW`).
    Overflow,
    /// Any other code, preserved verbatim for fault injection.
    Other(i32),
}

impl ResolveError {
    /// Returns the conventional numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            ResolveError::BadFlags => -1,
            ResolveError::NoName => -2,
            ResolveError::Again => -3,
            ResolveError::Fail => -4,
            ResolveError::Family => -6,
            ResolveError::SockType => -7,
            ResolveError::Service => -8,
            ResolveError::Memory => -10,
            ResolveError::System => -11,
            ResolveError::Overflow => -12,
            ResolveError::Other(code) => code,
        }
    }

    /// Builds the error matching a numeric code.
    ///
    /// Codes outside the known taxonomy are preserved in
    /// [`ResolveError::Other`].
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -1 => ResolveError::BadFlags,
            -2 => ResolveError::NoName,
            -3 => ResolveError::Again,
            -4 => ResolveError::Fail,
            -6 => ResolveError::Family,
            -7 => ResolveError::SockType,
            -8 => ResolveError::Service,
            -10 => ResolveError::Memory,
            -11 => ResolveError::System,
            -12 => ResolveError::Overflow,
            other => ResolveError::Other(other),
        }
    }

    /// Returns the deterministic human-readable message for this error.
    ///
    /// The texts match the ones real resolution reports, so assertions
    /// written against real output keep passing against the double.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            ResolveError::BadFlags => "Bad value for ai_flags",
            ResolveError::NoName => "Name or service not known",
            ResolveError::Again => "Temporary failure in name resolution",
            ResolveError::Fail => "Non-recoverable failure in name resolution",
            ResolveError::Family => "ai_family not supported",
            ResolveError::SockType => "ai_socktype not supported",
            ResolveError::Service => "Servname not supported for ai_socktype",
            ResolveError::Memory => "Memory allocation failure",
            ResolveError::System => "System error",
            ResolveError::Overflow => "Argument buffer overflow",
            ResolveError::Other(_) => "Unknown error",
        }
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Error for ResolveError {}

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
    fn test_errno_known_display() {
        assert_eq!(format!("{}", Errno::WOULDBLOCK), "EAGAIN (11)");
        assert_eq!(format!("{}", Errno::CONNREFUSED), "ECONNREFUSED (111)");
    }

    #[test]
    fn test_errno_unknown_display() {
        assert_eq!(format!("{}", Errno::new(9999)), "errno 9999");
    }

    #[test]
    fn test_errno_would_block_aliases() {
        assert_eq!(Errno::AGAIN, Errno::WOULDBLOCK);
        assert!(Errno::AGAIN.is_would_block());
        assert!(!Errno::INTR.is_would_block());
    }

    #[test]
    fn test_errno_from_io_preserves_raw_code() {
        let err = io::Error::from_raw_os_error(111);
        assert_eq!(Errno::from_io(&err), Errno::CONNREFUSED);
    }

    #[test]
    fn test_errno_from_io_kind_fallback() {
        let err = io::Error::new(io::ErrorKind::WouldBlock, "synthetic");
        assert_eq!(Errno::from_io(&err), Errno::WOULDBLOCK);

        let err = io::Error::new(io::ErrorKind::NotConnected, "synthetic");
        assert_eq!(Errno::from_io(&err), Errno::NOTCONN);

        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "synthetic");
        assert_eq!(Errno::from_io(&err), Errno::IO);
    }

    #[test]
    fn test_resolve_error_code_round_trip() {
        let all = [
            ResolveError::BadFlags,
            ResolveError::NoName,
            ResolveError::Again,
            ResolveError::Fail,
            ResolveError::Family,
            ResolveError::SockType,
            ResolveError::Service,
            ResolveError::Memory,
            ResolveError::System,
            ResolveError::Overflow,
            ResolveError::Other(-42),
        ];
        for err in all {
            assert_eq!(ResolveError::from_code(err.code()), err);
        }
    }

    #[test]
    fn test_resolve_error_known_codes() {
        assert_eq!(ResolveError::BadFlags.code(), -1);
        assert_eq!(ResolveError::NoName.code(), -2);
        assert_eq!(ResolveError::Family.code(), -6);
    }

    #[test]
    fn test_resolve_error_unknown_code_is_preserved() {
        assert_eq!(ResolveError::from_code(-99), ResolveError::Other(-99));
        assert_eq!(ResolveError::Other(-99).code(), -99);
    }

    #[test]
    fn test_resolve_error_messages() {
        assert_eq!(ResolveError::NoName.message(), "Name or service not known");
        assert_eq!(ResolveError::Family.message(), "ai_family not supported");
        assert_eq!(ResolveError::BadFlags.message(), "Bad value for ai_flags");
        assert_eq!(
            format!("{}", ResolveError::NoName),
            "Name or service not known"
        );
    }

    #[test]
    fn test_errno_is_error_trait_object_safe() {
        let boxed: Box<dyn Error> = Box::new(Errno::BADF);
        assert!(boxed.to_string().contains("EBADF"));
    }
}

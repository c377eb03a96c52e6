//! The process-local resolution double: numeric-only address resolution
//! ([`numeric_resolve`]), numeric reverse lookup ([`numeric_name_info`]),
//! and resolver error strings ([`error_message`]).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::addr::{
    AddrFamily, AddrFlags, AddrHints, AddrInfo, NameFlags, NameInfo,
    ResolvedAddrs,
};
use crate::error::ResolveError;

/// Deterministic, numeric-only address resolution.
///
/// Accepts only numeric host literals and numeric service strings, never
/// touching real name resolution, while reproducing the real operation's
/// family filtering, canonical-name generation and passive/wildcard behavior
/// so tests can assert on the same results and error taxonomy as real usage.
///
/// Always produces exactly one entry. A missing service resolves to port 0;
/// a missing host resolves to the wildcard address under the passive flag
/// and to loopback otherwise.
///
/// # Errors
///
/// - [`ResolveError::BadFlags`] when a canonical name is requested without a
///   host.
/// - [`ResolveError::NoName`] when both host and service are absent, or
///   either is non-numeric.
/// - [`ResolveError::Family`] when the host literal's family contradicts the
///   hinted family.
pub fn numeric_resolve(
    host: Option<&str>,
    service: Option<&str>,
    hints: Option<&AddrHints>,
) -> Result<ResolvedAddrs, ResolveError> {
    let hints = hints.copied().unwrap_or_default();

    if hints.flags.canonical && host.is_none() {
        return Err(ResolveError::BadFlags);
    }
    if host.is_none() && service.is_none() {
        return Err(ResolveError::NoName);
    }

    let port = match service {
        Some(text) => text.parse::<u16>().map_err(|_| ResolveError::NoName)?,
        None => 0,
    };

    let ip = match host {
        Some(text) => {
            let ip: IpAddr =
                text.parse().map_err(|_| ResolveError::NoName)?;
            if !hints.family.accepts(AddrFamily::of_ip(&ip)) {
                return Err(ResolveError::Family);
            }
            ip
        }
        None => unhosted_ip(hints.family, hints.flags),
    };

    let canonical = match host {
        Some(text) if hints.flags.canonical => Some(format!("C{text}")),
        _ => None,
    };

    let addr = SocketAddr::new(ip, port);
    let info = AddrInfo {
        family: AddrFamily::of(&addr),
        socktype: hints.socktype.unwrap_or_default(),
        addr,
    };
    Ok(ResolvedAddrs::single(info, canonical))
}

/// The address used when no host was given: wildcard for passive requests,
/// loopback otherwise. An unspecified family falls back to IPv4.
pub(crate) fn unhosted_ip(family: AddrFamily, flags: AddrFlags) -> IpAddr {
    match (family, flags.passive) {
        (AddrFamily::V6, true) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        (AddrFamily::V6, false) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        (AddrFamily::V4 | AddrFamily::Unspec, true) => {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
        (AddrFamily::V4 | AddrFamily::Unspec, false) => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Deterministic reverse lookup: formats host and service numerically.
///
/// The double never consults real name resolution, so
/// [`name_required`](NameFlags::name_required) cannot be satisfied and fails
/// with [`ResolveError::NoName`]; every other flag combination reports the
/// numeric texts.
pub fn numeric_name_info(
    addr: SocketAddr,
    flags: NameFlags,
) -> Result<NameInfo, ResolveError> {
    if flags.name_required {
        return Err(ResolveError::NoName);
    }
    Ok(NameInfo {
        host: addr.ip().to_string(),
        service: addr.port().to_string(),
    })
}

/// Message text for a resolution error code, matching what real resolution
/// reports for the known codes.
#[must_use]
pub fn error_message(code: i32) -> &'static str {
    ResolveError::from_code(code).message()
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
    use crate::addr::SockType;

    fn hints(
        family: AddrFamily,
        socktype: Option<SockType>,
        flags: AddrFlags,
    ) -> AddrHints {
        AddrHints {
            family,
            socktype,
            flags,
        }
    }

    fn numeric_flags() -> AddrFlags {
        AddrFlags {
            numeric_host: true,
            numeric_serv: true,
            passive: false,
            canonical: false,
        }
    }

    fn only_entry(addrs: &ResolvedAddrs) -> &AddrInfo {
        assert_eq!(addrs.len(), 1, "the double always yields one entry");
        addrs.first().unwrap()
    }

    #[test]
    fn test_numeric_ipv4_stream_resolution() {
        let h = hints(AddrFamily::V4, Some(SockType::Stream), numeric_flags());
        let addrs =
            numeric_resolve(Some("127.0.0.1"), Some("80"), Some(&h)).unwrap();
        let entry = only_entry(&addrs);
        assert_eq!(entry.addr, "127.0.0.1:80".parse().unwrap());
        assert_eq!(entry.family, AddrFamily::V4);
        assert_eq!(entry.socktype, SockType::Stream);
        assert_eq!(addrs.canonical, None);
    }

    #[test]
    fn test_family_mismatch_rejected_both_directions() {
        let v6 = hints(AddrFamily::V6, None, AddrFlags::default());
        assert_eq!(
            numeric_resolve(Some("127.0.0.1"), Some("80"), Some(&v6)),
            Err(ResolveError::Family)
        );

        let v4 = hints(AddrFamily::V4, None, AddrFlags::default());
        assert_eq!(
            numeric_resolve(Some("::1"), Some("80"), Some(&v4)),
            Err(ResolveError::Family)
        );
    }

    #[test]
    fn test_unspec_family_follows_literal() {
        let addrs = numeric_resolve(Some("::1"), Some("443"), None).unwrap();
        let entry = only_entry(&addrs);
        assert_eq!(entry.family, AddrFamily::V6);
        assert_eq!(entry.addr, "[::1]:443".parse().unwrap());
    }

    #[test]
    fn test_non_numeric_host_rejected_even_without_numeric_flag() {
        assert_eq!(
            numeric_resolve(Some("localhost"), Some("80"), None),
            Err(ResolveError::NoName)
        );
    }

    #[test]
    fn test_non_numeric_service_rejected() {
        assert_eq!(
            numeric_resolve(Some("127.0.0.1"), Some("http"), None),
            Err(ResolveError::NoName)
        );
        assert_eq!(
            numeric_resolve(Some("127.0.0.1"), Some("70000"), None),
            Err(ResolveError::NoName)
        );
    }

    #[test]
    fn test_both_absent_rejected() {
        assert_eq!(numeric_resolve(None, None, None), Err(ResolveError::NoName));
    }

    #[test]
    fn test_canonical_without_host_is_flags_error() {
        let flags = AddrFlags {
            canonical: true,
            ..AddrFlags::default()
        };
        let h = hints(AddrFamily::Unspec, None, flags);
        assert_eq!(
            numeric_resolve(None, Some("80"), Some(&h)),
            Err(ResolveError::BadFlags)
        );
        // The flags check wins over the no-input check.
        assert_eq!(
            numeric_resolve(None, None, Some(&h)),
            Err(ResolveError::BadFlags)
        );
    }

    #[test]
    fn test_canonical_name_prefixes_literal() {
        let flags = AddrFlags {
            canonical: true,
            ..AddrFlags::default()
        };
        let h = hints(AddrFamily::Unspec, None, flags);
        let addrs =
            numeric_resolve(Some("127.0.0.1"), Some("80"), Some(&h)).unwrap();
        assert_eq!(addrs.canonical.as_deref(), Some("C127.0.0.1"));

        let addrs =
            numeric_resolve(Some("::1"), Some("80"), Some(&h)).unwrap();
        assert_eq!(addrs.canonical.as_deref(), Some("C::1"));
    }

    #[test]
    fn test_canonical_absent_unless_requested() {
        let addrs =
            numeric_resolve(Some("127.0.0.1"), Some("80"), None).unwrap();
        assert_eq!(addrs.canonical, None);
    }

    #[test]
    fn test_passive_without_host_yields_wildcard() {
        let addrs =
            numeric_resolve(None, Some("7000"), Some(&AddrHints::passive()))
                .unwrap();
        assert_eq!(
            only_entry(&addrs).addr,
            "0.0.0.0:7000".parse().unwrap()
        );

        let mut h = AddrHints::passive();
        h.family = AddrFamily::V6;
        let addrs = numeric_resolve(None, Some("7000"), Some(&h)).unwrap();
        assert_eq!(only_entry(&addrs).addr, "[::]:7000".parse().unwrap());
    }

    #[test]
    fn test_active_without_host_yields_loopback() {
        let addrs = numeric_resolve(None, Some("53"), None).unwrap();
        assert_eq!(
            only_entry(&addrs).addr,
            "127.0.0.1:53".parse().unwrap()
        );

        let h = hints(AddrFamily::V6, None, AddrFlags::default());
        let addrs = numeric_resolve(None, Some("53"), Some(&h)).unwrap();
        assert_eq!(only_entry(&addrs).addr, "[::1]:53".parse().unwrap());
    }

    #[test]
    fn test_passive_ignored_when_host_given() {
        let h = AddrHints::passive();
        let addrs =
            numeric_resolve(Some("127.0.0.1"), Some("7000"), Some(&h))
                .unwrap();
        assert_eq!(
            only_entry(&addrs).addr,
            "127.0.0.1:7000".parse().unwrap()
        );
    }

    #[test]
    fn test_unconstrained_socktype_reports_dgram() {
        let addrs =
            numeric_resolve(Some("127.0.0.1"), Some("80"), None).unwrap();
        assert_eq!(only_entry(&addrs).socktype, SockType::Dgram);
    }

    #[test]
    fn test_absent_service_means_port_zero() {
        let addrs = numeric_resolve(Some("127.0.0.1"), None, None).unwrap();
        assert_eq!(only_entry(&addrs).addr.port(), 0);
    }

    #[test]
    fn test_name_info_formats_numerically() {
        let info = numeric_name_info(
            "127.0.0.1:8080".parse().unwrap(),
            NameFlags::default(),
        )
        .unwrap();
        assert_eq!(info.host, "127.0.0.1");
        assert_eq!(info.service, "8080");

        let info = numeric_name_info(
            "[::1]:443".parse().unwrap(),
            NameFlags {
                numeric_host: true,
                numeric_service: true,
                name_required: false,
            },
        )
        .unwrap();
        assert_eq!(info.host, "::1");
        assert_eq!(info.service, "443");
    }

    #[test]
    fn test_name_required_cannot_be_satisfied() {
        let flags = NameFlags {
            name_required: true,
            ..NameFlags::default()
        };
        assert_eq!(
            numeric_name_info("127.0.0.1:80".parse().unwrap(), flags),
            Err(ResolveError::NoName)
        );
    }

    #[test]
    fn test_error_messages_match_known_codes() {
        assert_eq!(error_message(-2), "Name or service not known");
        assert_eq!(error_message(-6), "ai_family not supported");
        assert_eq!(error_message(-99), "Unknown error");
    }
}

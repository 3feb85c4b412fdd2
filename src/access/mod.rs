//! CIDR-based access control (§4.8).
//!
//! Grounded on `conf_access.hpp`'s `SanitizedIP`/`Access` pair, generalized
//! onto the `ipnet` crate instead of the original's fixed 16-byte buffer:
//! `ipnet::IpNet` already normalizes IPv4/IPv6 uniformly and does prefix
//! matching, so there's nothing gained from hand-rolling the byte compare.

use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

/// Whether unmatched addresses are allowed or denied by default; spec's own
/// naming (`allow-first` / `deny-first`), not the original's `"deny all"` /
/// `"allow all"` mode strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessMode {
    AllowFirst,
    DenyFirst,
}

impl AccessMode {
    pub(crate) fn parse(mode: &str) -> Option<Self> {
        match mode.trim() {
            "allow-first" => Some(Self::AllowFirst),
            "deny-first" => Some(Self::DenyFirst),
            _ => None,
        }
    }
}

/// An allow/deny list: a default mode plus a set of CIDR exceptions that
/// flip the decision for any address they contain.
#[derive(Debug, Clone)]
pub(crate) struct Access {
    mode: AccessMode,
    exceptions: Vec<IpNet>,
}

impl Access {
    pub(crate) fn new(mode: AccessMode, exceptions: Vec<IpNet>) -> Self {
        Access { mode, exceptions }
    }

    /// Parses a CIDR exception (`"10.0.0.0/8"`, or a bare IP treated as a
    /// single-address `/32` or `/128`).
    pub(crate) fn parse_exception(raw: &str) -> Result<IpNet, ipnet::AddrParseError> {
        let raw = raw.trim();
        if let Ok(net) = IpNet::from_str(raw) {
            return Ok(net);
        }
        let addr = IpAddr::from_str(raw)?;
        Ok(IpNet::from(addr))
    }

    /// Whether `ip` is permitted: the default mode applies unless an
    /// exception's CIDR contains the address, in which case the decision
    /// flips.
    pub(crate) fn is_allowed(&self, ip: IpAddr) -> bool {
        let in_exceptions = self.exceptions.iter().any(|net| net.contains(&ip));
        match self.mode {
            AccessMode::AllowFirst => !in_exceptions,
            AccessMode::DenyFirst => in_exceptions,
        }
    }
}

impl Default for Access {
    /// No `<Access>` node in the config means allow everything.
    fn default() -> Self {
        Access {
            mode: AccessMode::AllowFirst,
            exceptions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_first_denies_only_exceptions() {
        let access = Access::new(
            AccessMode::AllowFirst,
            vec![Access::parse_exception("10.0.0.0/8").unwrap()],
        );
        assert!(access.is_allowed("8.8.8.8".parse().unwrap()));
        assert!(!access.is_allowed("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn deny_first_allows_only_exceptions() {
        let access = Access::new(
            AccessMode::DenyFirst,
            vec![Access::parse_exception("192.168.1.0/24").unwrap()],
        );
        assert!(!access.is_allowed("8.8.8.8".parse().unwrap()));
        assert!(access.is_allowed("192.168.1.42".parse().unwrap()));
    }

    #[test]
    fn bare_address_exception_matches_only_itself() {
        let access = Access::new(
            AccessMode::DenyFirst,
            vec![Access::parse_exception("192.168.1.5").unwrap()],
        );
        assert!(access.is_allowed("192.168.1.5".parse().unwrap()));
        assert!(!access.is_allowed("192.168.1.6".parse().unwrap()));
    }

    #[test]
    fn default_access_allows_everything() {
        let access = Access::default();
        assert!(access.is_allowed("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn mode_parsing_rejects_original_source_spelling() {
        assert_eq!(AccessMode::parse("allow-first"), Some(AccessMode::AllowFirst));
        assert_eq!(AccessMode::parse("deny-first"), Some(AccessMode::DenyFirst));
        assert_eq!(AccessMode::parse("deny all"), None);
    }
}

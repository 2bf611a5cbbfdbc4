//! Client identity value object.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a connected client.
///
/// Wraps the remote endpoint (address + port) of the TCP connection.
/// The transport guarantees that no two open connections share the same
/// endpoint tuple, so this is unique among live connections. It is stable
/// for the lifetime of one connection; a reconnect from the same port is a
/// new session that starts from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(SocketAddr);

impl ClientIdentity {
    /// Creates an identity from a peer address.
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Returns the underlying socket address.
    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// Returns the remote port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for ClientIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for ClientIdentity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|e| DomainError::InvalidIdentity {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_display_ipv4() {
        let id = ClientIdentity::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000));
        assert_eq!(id.to_string(), "127.0.0.1:5000");
        assert_eq!(id.port(), 5000);
    }

    #[test]
    fn test_display_ipv6_is_bracketed() {
        let id = ClientIdentity::new(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 41000));
        assert_eq!(id.to_string(), "[::1]:41000");
    }

    #[test]
    fn test_parse_roundtrip_through_display() {
        let id: ClientIdentity = "10.0.0.7:6123".parse().unwrap();
        assert_eq!(id.addr().port(), 6123);
        assert_eq!(id.to_string().parse::<ClientIdentity>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        let err = "10.0.0.7".parse::<ClientIdentity>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidIdentity { .. }));
        assert!(err.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn test_distinct_ports_are_distinct_identities() {
        let a: ClientIdentity = "127.0.0.1:5000".parse().unwrap();
        let b: ClientIdentity = "127.0.0.1:5001".parse().unwrap();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id: ClientIdentity = "127.0.0.1:5000".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"127.0.0.1:5000\"");
    }
}

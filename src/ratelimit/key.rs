//! Client key derivation.

use std::net::{IpAddr, SocketAddr};

/// Key shared by every request whose origin address is unknown.
pub const FALLBACK_KEY: &str = "unknown";

/// A key that identifies the rate-limited principal.
///
/// Derived from the request's source address with the port stripped, so
/// every connection from the same host shares one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Build a key from a peer socket address.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self::from_ip(addr.ip())
    }

    /// Build a key from a bare IP address.
    ///
    /// IPv4-mapped IPv6 addresses collapse to their IPv4 form.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self(ip.to_canonical().to_string())
    }

    /// The shared key used when no origin address is available.
    pub fn fallback() -> Self {
        Self(FALLBACK_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Option<SocketAddr>> for ClientKey {
    fn from(addr: Option<SocketAddr>) -> Self {
        addr.map_or_else(Self::fallback, |addr| Self::from_addr(&addr))
    }
}

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

/// An address/port pair as seen by the router.
///
/// IPv4-mapped IPv6 addresses are folded to plain IPv4 on construction, so
/// `::ffff:192.0.2.1` and `192.0.2.1` are the same endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetworkEndpoint {
    address: IpAddr,
    port: u16,
}

/// The remote peer of a connection, supplied by the host per event.
pub type ClientIdentity = NetworkEndpoint;

impl NetworkEndpoint {
    #[must_use]
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address: address.to_canonical(),
            port,
        }
    }

    /// Builds an endpoint from a port in network byte order.
    #[must_use]
    pub fn from_wire(address: IpAddr, wire_port: [u8; 2]) -> Self {
        Self::new(address, u16::from_be_bytes(wire_port))
    }

    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Port in host byte order.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Port in network byte order.
    #[must_use]
    pub const fn wire_port(&self) -> [u8; 2] {
        self.port.to_be_bytes()
    }

    /// Same address, different port.
    #[must_use]
    pub const fn with_port(&self, port: u16) -> Self {
        Self {
            address: self.address,
            port,
        }
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for NetworkEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<NetworkEndpoint> for SocketAddr {
    fn from(endpoint: NetworkEndpoint) -> Self {
        endpoint.socket_addr()
    }
}

impl fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn wire_port_is_big_endian() {
        let endpoint = NetworkEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        assert_eq!(endpoint.wire_port(), [0x1f, 0x90]);
        assert_eq!(
            NetworkEndpoint::from_wire(endpoint.address(), endpoint.wire_port()),
            endpoint
        );
    }

    #[test]
    fn folds_ipv4_mapped_addresses() {
        let mapped: IpAddr = "::ffff:192.0.2.1".parse().unwrap();
        let endpoint = NetworkEndpoint::new(mapped, 443);
        assert_eq!(endpoint.address(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(endpoint.to_string(), "192.0.2.1:443");
    }

    #[test]
    fn keeps_native_ipv6() {
        let endpoint = NetworkEndpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        assert_eq!(endpoint.to_string(), "[::1]:443");
    }

    #[test]
    fn with_port_leaves_original_untouched() {
        let original: NetworkEndpoint = "10.0.0.1:8080".parse::<SocketAddr>().unwrap().into();
        let moved = original.with_port(8083);
        assert_eq!(original.port(), 8080);
        assert_eq!(moved.port(), 8083);
        assert_eq!(moved.address(), original.address());
    }
}

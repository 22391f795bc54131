use std::net::IpAddr;
use std::num::NonZeroU16;

use tracing::warn;

use crate::endpoint::NetworkEndpoint;

/// Number of upstream slots used when the configuration does not say otherwise.
pub const DEFAULT_UPSTREAMS: NonZeroU16 = NonZeroU16::new(5).unwrap();

/// The upstreams behind a destination port: `count` consecutive ports
/// starting right above `base_port`.
///
/// Slot `offset` (zero based, `offset < count`) lives at
/// `base_port + 1 + offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpstreamPool {
    address: IpAddr,
    base_port: u16,
    count: NonZeroU16,
}

impl UpstreamPool {
    /// Pool sitting above `base`, sharing its address.
    #[must_use]
    pub const fn above(base: NetworkEndpoint, count: NonZeroU16) -> Self {
        Self {
            address: base.address(),
            base_port: base.port(),
            count,
        }
    }

    /// Endpoint of slot `offset`. Offsets outside the pool are reduced
    /// modulo `count`; ports past 65535 wrap.
    #[must_use]
    pub fn resolve(&self, offset: u16) -> NetworkEndpoint {
        let offset = offset % self.count.get();
        let (port, overflowed) = self.base_port.overflowing_add(1 + offset);
        if overflowed {
            warn!(
                base_port = self.base_port,
                offset, port, "Upstream port wrapped past 65535"
            );
        }
        NetworkEndpoint::new(self.address, port)
    }
}

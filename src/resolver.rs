use std::{net::IpAddr, num::NonZeroU16};

use tracing::debug;

use crate::{
    endpoint::{ClientIdentity, NetworkEndpoint},
    hash::address_hash,
    pool::{DEFAULT_UPSTREAMS, UpstreamPool},
};

/// Maps a client to one of `upstreams` ports above the original destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointResolver {
    upstreams: NonZeroU16,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new(DEFAULT_UPSTREAMS)
    }
}

impl EndpointResolver {
    #[must_use]
    pub const fn new(upstreams: NonZeroU16) -> Self {
        Self { upstreams }
    }

    #[must_use]
    pub const fn upstreams(&self) -> NonZeroU16 {
        self.upstreams
    }

    /// Pool slot for `client`, always below `upstreams`.
    #[must_use]
    pub fn offset(&self, client: IpAddr) -> u16 {
        (address_hash(client) % u64::from(self.upstreams.get())) as u16
    }

    /// Same address as `original_destination`, port moved to the client's slot.
    #[must_use]
    pub fn resolve(
        &self,
        original_destination: NetworkEndpoint,
        client: ClientIdentity,
    ) -> NetworkEndpoint {
        let offset = self.offset(client.address());
        let resolved = UpstreamPool::above(original_destination, self.upstreams).resolve(offset);
        debug!(
            client_addr = %client,
            original_destination = %original_destination,
            offset,
            resolved_destination = %resolved,
            "Upstream selected"
        );
        resolved
    }
}

//! Committing a connection to a raw tunnel.
//!
//! Both entry points are one-shot: they run once per connection handle,
//! during the routable phase, and hand control back to the host through
//! [`RoutableConnection::resume`]. A refusal from the host ends the
//! connection; nothing is retried.

use tracing::{debug, warn};

use crate::{endpoint::NetworkEndpoint, error::DispatchError};

/// Result handed back to the host's event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Error,
}

/// Per-connection lifecycle. The router only moves a connection out of
/// `Accepted`; everything after `Tunneling` belongs to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Accepted,
    EndpointResolved,
    Tunneling,
    Open,
    Closed,
}

impl ConnectionPhase {
    /// Endpoints may be read and rewritten only in these phases.
    #[must_use]
    pub const fn is_routable(self) -> bool {
        matches!(self, Self::Accepted | Self::EndpointResolved)
    }
}

/// What the host lets the router do with a connection under dispatch.
pub trait RoutableConnection {
    /// Address the client originally connected to.
    fn local_endpoint(&self) -> Result<NetworkEndpoint, DispatchError>;

    /// The client.
    fn remote_endpoint(&self) -> Result<NetworkEndpoint, DispatchError>;

    /// Overrides where the host connects on the server side.
    fn set_server_target(&mut self, target: NetworkEndpoint) -> Result<(), DispatchError>;

    /// Switches to raw forwarding. Irreversible.
    fn enter_tunnel_mode(&mut self) -> Result<(), DispatchError>;

    /// Returns control to the host.
    fn resume(&mut self, outcome: Outcome);
}

/// Routes the connection to `target` and tunnels it there.
pub fn tunnel_to(conn: &mut dyn RoutableConnection, target: NetworkEndpoint) -> Outcome {
    let outcome = match override_and_tunnel(conn, target) {
        Ok(()) => {
            debug!(target_addr = %target, "Tunneling to selected upstream");
            Outcome::Continue
        }
        Err(e) => {
            warn!(target_addr = %target, error = %e, "Host refused upstream override");
            Outcome::Error
        }
    };
    conn.resume(outcome);
    outcome
}

fn override_and_tunnel(
    conn: &mut dyn RoutableConnection,
    target: NetworkEndpoint,
) -> Result<(), DispatchError> {
    conn.set_server_target(target)?;
    conn.enter_tunnel_mode()
}

/// Tunnels the connection to whatever destination the host already has.
pub fn blind_tunnel(conn: &mut dyn RoutableConnection) -> Outcome {
    let outcome = match conn.enter_tunnel_mode() {
        Ok(()) => {
            debug!("Blind tunnel");
            Outcome::Continue
        }
        Err(e) => {
            warn!(error = %e, "Host refused blind tunnel");
            Outcome::Error
        }
    };
    conn.resume(outcome);
    outcome
}

//! A minimal TCP forwarding host for the router.
//!
//! Every accepted socket is offered to the registered hooks while it is still
//! routable. If a hook puts it in tunnel mode the host connects to the server
//! target and copies bytes in both directions until either side closes;
//! otherwise the socket is closed. The host does no protocol processing of
//! its own.

use anyhow::{Context, Result, anyhow};
use std::{
    io,
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{
    io::copy_bidirectional,
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    dispatch::{ConnectionPhase, Outcome, RoutableConnection},
    endpoint::NetworkEndpoint,
    error::{ConfigError, DispatchError, RegistrationError},
    plugin::{Callback, HookKind, HookToken, PluginHost, PluginInfo},
};

/// Hook API major version implemented by [`RelayHost`].
pub const HOST_API_MAJOR_VERSION: u32 = 2;

/// Order in which hooks fire on a new connection.
const HOOK_ORDER: [HookKind; 2] = [HookKind::VconnPreAccept, HookKind::TxnStart];

/// Pause after a failed accept, so fd exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Source of inbound connections for [`RelayHost::serve_incoming`].
pub trait Incoming: Send + 'static {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Incoming for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

#[derive(Default)]
struct HookTable {
    next_token: u64,
    hooks: Vec<(HookKind, HookToken, Callback)>,
}

#[derive(Clone)]
pub struct RelayHost {
    hooks: Arc<RwLock<HookTable>>,
    default_target: Option<NetworkEndpoint>,
    connect_timeout: Duration,
    api_major: u32,
}

impl RelayHost {
    #[must_use]
    pub fn new(default_target: Option<NetworkEndpoint>, connect_timeout: Duration) -> Self {
        Self {
            hooks: Arc::default(),
            default_target,
            connect_timeout,
            api_major: HOST_API_MAJOR_VERSION,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.default_target()?,
            config.host.connect_timeout(),
        ))
    }

    /// Reports a different API version to plugins.
    #[must_use]
    pub fn with_api_major(mut self, api_major: u32) -> Self {
        self.api_major = api_major;
        self
    }

    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hooks
            .len()
    }

    fn hooks_for(&self, kind: HookKind) -> Vec<Callback> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hooks
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect()
    }

    /// Offers `conn` to the hooks, stopping once one of them has decided.
    pub fn route(&self, conn: &mut AcceptedConnection) {
        for kind in HOOK_ORDER {
            for callback in self.hooks_for(kind) {
                callback(kind, &mut *conn as &mut dyn RoutableConnection);
                if conn.is_decided() {
                    return;
                }
            }
        }
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .context("Failed to get listener local address")?;
        info!(listen_addr = %local_addr, hooks = self.hook_count(), "TCP router listening");

        self.serve_incoming(listener).await
    }

    /// Accept loop. Accept errors are logged and the loop keeps going; it
    /// never returns on its own.
    pub async fn serve_incoming<I: Incoming>(self, mut incoming: I) -> Result<()> {
        loop {
            match incoming.accept().await {
                Ok((stream, addr)) => {
                    let host = self.clone();

                    tokio::spawn(async move {
                        if let Err(e) = host.handle_connection(stream, addr).await {
                            error!(client_addr = %addr, error = %e, "Connection failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept TCP connection");
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    #[tracing::instrument(skip(self, stream), fields(client_addr = %client_addr))]
    pub async fn handle_connection(
        &self,
        mut stream: TcpStream,
        client_addr: SocketAddr,
    ) -> Result<()> {
        let local_addr = stream
            .local_addr()
            .context("Failed to get connection local address")?;
        let mut conn = AcceptedConnection::new(local_addr.into(), client_addr.into());
        self.route(&mut conn);

        let target = match conn.decision(self.default_target) {
            Decision::Tunnel(target) => target,
            Decision::Close(reason) => {
                debug!(reason, "Closing connection");
                return Ok(());
            }
        };

        debug!(target_addr = %target, "Attempting to connect to target server");
        let mut upstream = timeout(self.connect_timeout, TcpStream::connect(target.socket_addr()))
            .await
            .map_err(|_| anyhow!("Timed out connecting to target {target}"))?
            .with_context(|| format!("Failed to connect to target {target}"))?;
        conn.phase = ConnectionPhase::Open;
        info!(target_addr = %target, "Connected to target server");

        let result = copy_bidirectional(&mut stream, &mut upstream).await;
        conn.phase = ConnectionPhase::Closed;
        match result {
            Ok((to_upstream, to_client)) => {
                info!(
                    target_addr = %target,
                    phase = ?conn.phase(),
                    to_upstream,
                    to_client,
                    "Tunnel closed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(target_addr = %target, error = %e, "Tunnel aborted");
                Err(e).context("Failed to forward tunnel data")
            }
        }
    }
}

impl PluginHost for RelayHost {
    fn register_plugin(&mut self, info: &PluginInfo) -> Result<(), RegistrationError> {
        if info.name.is_empty() {
            return Err(RegistrationError::Rejected("plugin name is empty".to_string()));
        }
        info!(
            plugin = info.name,
            vendor = info.vendor,
            support_email = info.support_email,
            "Plugin registered"
        );
        Ok(())
    }

    fn host_major_version(&self) -> u32 {
        self.api_major
    }

    fn add_hook(
        &mut self,
        kind: HookKind,
        callback: Callback,
    ) -> Result<HookToken, RegistrationError> {
        let mut table = self
            .hooks
            .write()
            .map_err(|_| RegistrationError::HookCreation("hook table poisoned".to_string()))?;
        table.next_token += 1;
        let token = HookToken(table.next_token);
        table.hooks.push((kind, token, callback));
        debug!(?kind, token = token.0, "Hook added");
        Ok(token)
    }
}

/// What the host does with a connection once the hooks have run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Tunnel(NetworkEndpoint),
    Close(&'static str),
}

/// Routing state of one accepted socket.
#[derive(Debug)]
pub struct AcceptedConnection {
    local: NetworkEndpoint,
    remote: NetworkEndpoint,
    phase: ConnectionPhase,
    server_target: Option<NetworkEndpoint>,
    tunnel: bool,
    outcome: Option<Outcome>,
}

impl AcceptedConnection {
    #[must_use]
    pub const fn new(local: NetworkEndpoint, remote: NetworkEndpoint) -> Self {
        Self {
            local,
            remote,
            phase: ConnectionPhase::Accepted,
            server_target: None,
            tunnel: false,
            outcome: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    #[must_use]
    pub const fn server_target(&self) -> Option<NetworkEndpoint> {
        self.server_target
    }

    #[must_use]
    pub const fn is_tunneling(&self) -> bool {
        self.tunnel
    }

    const fn is_decided(&self) -> bool {
        self.tunnel || matches!(self.outcome, Some(Outcome::Error))
    }

    #[must_use]
    pub fn decision(&self, default_target: Option<NetworkEndpoint>) -> Decision {
        if self.outcome == Some(Outcome::Error) {
            return Decision::Close("rejected by routing hook");
        }
        if !self.tunnel {
            return Decision::Close("no routing decision");
        }
        match self.server_target.or(default_target) {
            Some(target) => Decision::Tunnel(target),
            None => Decision::Close("no server target"),
        }
    }

    const fn check_routable(&self) -> Result<(), DispatchError> {
        if self.phase.is_routable() {
            Ok(())
        } else {
            Err(DispatchError::PastRoutablePhase)
        }
    }
}

impl RoutableConnection for AcceptedConnection {
    fn local_endpoint(&self) -> Result<NetworkEndpoint, DispatchError> {
        self.check_routable()?;
        Ok(self.local)
    }

    fn remote_endpoint(&self) -> Result<NetworkEndpoint, DispatchError> {
        self.check_routable()?;
        Ok(self.remote)
    }

    fn set_server_target(&mut self, target: NetworkEndpoint) -> Result<(), DispatchError> {
        self.check_routable()?;
        self.server_target = Some(target);
        self.phase = ConnectionPhase::EndpointResolved;
        Ok(())
    }

    fn enter_tunnel_mode(&mut self) -> Result<(), DispatchError> {
        if self.tunnel {
            return Err(DispatchError::AlreadyTunneling);
        }
        self.check_routable()?;
        self.tunnel = true;
        self.phase = ConnectionPhase::Tunneling;
        Ok(())
    }

    fn resume(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        if outcome == Outcome::Error {
            self.phase = ConnectionPhase::Closed;
        }
    }
}

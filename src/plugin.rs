//! Glue between the routing core and whatever host delivers connection
//! events.
//!
//! A host exposes [`PluginHost`] for registration and hands each event a
//! [`RoutableConnection`]. [`init`] subscribes a [`Router`] to the single hook
//! its routing mode needs.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    config::{RoutingConfig, RoutingMode},
    dispatch::{Outcome, RoutableConnection, blind_tunnel, tunnel_to},
    error::RegistrationError,
    resolver::EndpointResolver,
};

/// Vendor reported to the host at registration.
pub const PLUGIN_VENDOR: &str = "tcp-routing project";

/// Support address reported to the host at registration.
pub const PLUGIN_SUPPORT_EMAIL: &str = "support@tcp-routing.invalid";

/// Oldest host API major version the router runs against.
pub const MIN_HOST_MAJOR_VERSION: u32 = 2;

/// Events a host can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// A connection was accepted; nothing has been read from it yet.
    VconnPreAccept,
    /// A transaction is starting on an accepted connection.
    TxnStart,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: &'static str,
    pub vendor: &'static str,
    pub support_email: &'static str,
}

impl PluginInfo {
    #[must_use]
    pub const fn for_mode(mode: RoutingMode) -> Self {
        let name = match mode {
            RoutingMode::AddressHash => "tcp routing txn",
            RoutingMode::BlindTunnel => "tcp routing",
        };
        Self {
            name,
            vendor: PLUGIN_VENDOR,
            support_email: PLUGIN_SUPPORT_EMAIL,
        }
    }
}

/// Identifies a subscription made through [`PluginHost::add_hook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookToken(pub u64);

/// Host-facing entry point. The captured state is the callback context.
pub type Callback = Arc<dyn Fn(HookKind, &mut dyn RoutableConnection) -> Outcome + Send + Sync>;

/// Registration surface offered by a host.
pub trait PluginHost {
    fn register_plugin(&mut self, info: &PluginInfo) -> Result<(), RegistrationError>;

    fn host_major_version(&self) -> u32;

    fn add_hook(&mut self, kind: HookKind, callback: Callback)
    -> Result<HookToken, RegistrationError>;
}

/// Routing decisions for one routing mode. Immutable once built, so a single
/// instance serves every worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Router {
    mode: RoutingMode,
    resolver: EndpointResolver,
}

impl Router {
    #[must_use]
    pub const fn new(config: &RoutingConfig) -> Self {
        Self {
            mode: config.mode,
            resolver: EndpointResolver::new(config.upstreams),
        }
    }

    /// The hook this router subscribes to.
    #[must_use]
    pub const fn hook(&self) -> HookKind {
        match self.mode {
            RoutingMode::AddressHash => HookKind::TxnStart,
            RoutingMode::BlindTunnel => HookKind::VconnPreAccept,
        }
    }

    /// Callback body with the host's `(context, event, data)` shape.
    pub fn handle(&self, event: HookKind, conn: &mut dyn RoutableConnection) -> Outcome {
        if event != self.hook() {
            warn!(?event, expected = ?self.hook(), "Unexpected event for routing mode");
        }
        match self.mode {
            RoutingMode::AddressHash => self.on_txn_start(conn),
            RoutingMode::BlindTunnel => self.on_vconn_pre_accept(conn),
        }
    }

    /// Hashes the client onto an upstream above the incoming port and
    /// tunnels there.
    pub fn on_txn_start(&self, conn: &mut dyn RoutableConnection) -> Outcome {
        let endpoints = conn
            .local_endpoint()
            .and_then(|target| conn.remote_endpoint().map(|client| (target, client)));
        let (target, client) = match endpoints {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(error = %e, "Connection endpoints unavailable");
                conn.resume(Outcome::Error);
                return Outcome::Error;
            }
        };
        debug!(target_addr = %target, client_addr = %client, "tcp-routing callback");
        let upstream = self.resolver.resolve(target, client);
        tunnel_to(conn, upstream)
    }

    /// Tunnels unconditionally.
    pub fn on_vconn_pre_accept(&self, conn: &mut dyn RoutableConnection) -> Outcome {
        match (conn.local_endpoint(), conn.remote_endpoint()) {
            (Ok(target), Ok(client)) => {
                debug!(target_addr = %target, client_addr = %client, "tcp-routing callback");
            }
            _ => debug!("tcp-routing callback, endpoints unavailable"),
        }
        blind_tunnel(conn)
    }

    #[must_use]
    pub fn into_callback(self) -> Callback {
        Arc::new(move |event, conn: &mut dyn RoutableConnection| self.handle(event, conn))
    }
}

/// Registers the router with `host` and subscribes it to its hook.
///
/// On failure nothing is subscribed and the router stays inactive.
pub fn init<H: PluginHost + ?Sized>(
    host: &mut H,
    routing: &RoutingConfig,
) -> Result<HookToken, RegistrationError> {
    let router = Router::new(routing);
    let info = PluginInfo::for_mode(routing.mode);
    let result = subscribe(host, router, &info);

    if let Err(e) = &result {
        error!(plugin = info.name, error = %e, "Registration error");
        error!(plugin = info.name, "not initialized");
    }
    debug!(
        plugin = info.name,
        mode = routing.mode.as_str(),
        "Plugin {}",
        if result.is_ok() { "online" } else { "offline" }
    );
    result
}

fn subscribe<H: PluginHost + ?Sized>(
    host: &mut H,
    router: Router,
    info: &PluginInfo,
) -> Result<HookToken, RegistrationError> {
    host.register_plugin(info)?;
    let actual = host.host_major_version();
    if actual < MIN_HOST_MAJOR_VERSION {
        return Err(RegistrationError::IncompatibleHost {
            required: MIN_HOST_MAJOR_VERSION,
            actual,
        });
    }
    host.add_hook(router.hook(), router.into_callback())
}

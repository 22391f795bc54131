//! TCP Routing
//!
//! Routing decisions for a transparent TCP forwarder. Each new connection is
//! either moved to an upstream picked by hashing the client address onto a
//! block of ports above its original destination, or blind-tunneled to the
//! destination it already has. Routing logic reaches the host only through
//! the [`dispatch::RoutableConnection`] and [`plugin::PluginHost`] traits;
//! [`host::RelayHost`] is a small tokio host implementing both.

pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod hash;
pub mod host;
pub mod plugin;
pub mod pool;
pub mod resolver;

// Re-export commonly used types and functions
pub use config::{
    Config, HostConfig, ListenConfig, RoutingConfig, RoutingMode, TargetConfig, load_config,
    load_config_from, parse_config,
};
pub use dispatch::{ConnectionPhase, Outcome, RoutableConnection, blind_tunnel, tunnel_to};
pub use endpoint::{ClientIdentity, NetworkEndpoint};
pub use error::{ConfigError, DispatchError, RegistrationError};
pub use hash::address_hash;
pub use host::{AcceptedConnection, Decision, Incoming, RelayHost};
pub use plugin::{Callback, HookKind, HookToken, PluginHost, PluginInfo, Router, init};
pub use pool::{DEFAULT_UPSTREAMS, UpstreamPool};
pub use resolver::EndpointResolver;

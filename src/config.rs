use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    num::NonZeroU16,
    path::Path,
    time::Duration,
};

use crate::{endpoint::NetworkEndpoint, error::ConfigError, pool::DEFAULT_UPSTREAMS};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listen: ListenConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    pub target: Option<TargetConfig>,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Deserialize)]
pub struct ListenConfig {
    pub ip: String,
    pub port: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingMode {
    /// Pick an upstream port from the client address, then tunnel.
    #[default]
    AddressHash,
    /// Tunnel every connection to the configured target untouched.
    BlindTunnel,
}

impl RoutingMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddressHash => "address-hash",
            Self::BlindTunnel => "blind-tunnel",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub mode: RoutingMode,
    #[serde(default = "default_upstreams")]
    pub upstreams: NonZeroU16,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            upstreams: DEFAULT_UPSTREAMS,
        }
    }
}

const fn default_upstreams() -> NonZeroU16 {
    DEFAULT_UPSTREAMS
}

#[derive(Clone, Debug, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
}

impl TargetConfig {
    pub fn endpoint(&self) -> Result<NetworkEndpoint, ConfigError> {
        let address: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidTargetHost {
                host: self.host.clone(),
            })?;
        Ok(NetworkEndpoint::new(address, self.port))
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

impl HostConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .listen
            .ip
            .parse()
            .map_err(|_| ConfigError::InvalidListenIp {
                ip: self.listen.ip.clone(),
            })?;
        Ok(SocketAddr::new(ip, self.listen.port))
    }

    /// Server target used when no hook overrides it.
    pub fn default_target(&self) -> Result<Option<NetworkEndpoint>, ConfigError> {
        self.target.as_ref().map(TargetConfig::endpoint).transpose()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.default_target()?.is_none() && self.routing.mode == RoutingMode::BlindTunnel {
            return Err(ConfigError::MissingTarget(self.routing.mode.as_str()));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).context("Failed to parse configuration as valid TOML")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to load {}", path.display()))
}

pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

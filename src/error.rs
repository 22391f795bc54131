use thiserror::Error;

/// Startup failures. Any of them leaves the router inactive for the life of
/// the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("registration failed: {0}")]
    Rejected(String),

    #[error("requires host API {required}.0 or later, found {actual}")]
    IncompatibleHost { required: u32, actual: u32 },

    #[error("failed to create callback: {0}")]
    HookCreation(String),
}

/// Host refusals while routing a single connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("connection handle is no longer valid")]
    InvalidHandle,

    #[error("connection is past the routable phase")]
    PastRoutablePhase,

    #[error("connection is already tunneling")]
    AlreadyTunneling,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("routing mode {0} requires a [target] section")]
    MissingTarget(&'static str),

    #[error("invalid target host {host}: expected an IP address")]
    InvalidTargetHost { host: String },

    #[error("invalid listen ip {ip}")]
    InvalidListenIp { ip: String },
}

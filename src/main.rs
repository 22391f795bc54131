use anyhow::{Context, Result};
use tcp_routing::{RelayHost, config::DEFAULT_CONFIG_FILE, init, load_config};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    let listen_addr = config.listen_addr()?;
    info!(
        config_file = DEFAULT_CONFIG_FILE,
        listen_addr = %listen_addr,
        mode = config.routing.mode.as_str(),
        upstreams = config.routing.upstreams.get(),
        target = ?config.target,
        "Configuration loaded"
    );

    let mut host = RelayHost::from_config(&config)?;
    if init(&mut host, &config.routing).is_err() {
        warn!("Router inactive; accepted connections will be closed");
    }

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind to address {listen_addr}"))?;

    host.serve(listener).await
}

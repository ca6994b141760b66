//! CLI module for shade-client.

use std::path::PathBuf;

use clap::Parser;
use shade_config::{ClientConfig, Config, init_tracing, load_config, validate_client};
use shade_core::shutdown::shutdown_signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Client CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shade-client",
    version,
    about = "SOCKS5 front end for the shade tunnel"
)]
pub struct ClientArgs {
    /// Config file path (toml/json/jsonc/yaml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the server address (host:port or ss:// URL).
    #[arg(short, long)]
    pub server: Option<String>,

    /// Override the SOCKS5 listen address.
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Override the cipher method.
    #[arg(long)]
    pub cipher: Option<String>,

    /// Override the password.
    #[arg(short, long)]
    pub password: Option<String>,

    /// Override the base64url key.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Add a static tunnel, "local_addr=remote_host:port" (repeatable).
    #[arg(long = "tunnel")]
    pub tunnels: Vec<String>,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Run the client with the given CLI arguments.
pub async fn run(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    let client = config.client.get_or_insert_with(ClientConfig::default);
    if let Some(server) = &args.server {
        client.server = server.clone();
    }
    if let Some(listen) = &args.listen {
        client.socks_listen = listen.clone();
    }
    client.tunnels.extend(args.tunnels.iter().cloned());
    if let Some(cipher) = &args.cipher {
        config.node.cipher = cipher.clone();
    }
    if let Some(password) = &args.password {
        config.node.password = Some(password.clone());
    }
    if let Some(key) = &args.key {
        config.node.key = Some(key.clone());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = Some(level.clone());
    }

    validate_client(&config)?;
    init_tracing(&config.logging);

    // Graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_token = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_token.cancel();
    });

    crate::run(config, shutdown).await?;
    Ok(())
}

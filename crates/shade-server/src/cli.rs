//! CLI module for the server-side roles.
//!
//! Each role has its own argument set and entry point, usable standalone
//! or as a subcommand of the unified `shade` binary.

use std::path::PathBuf;

use clap::Parser;
use shade_config::{
    Config, JumperConfig, ReverseConfig, ServerConfig, init_tracing, load_config, validate_jumper,
    validate_reverse, validate_server,
};
use shade_core::shutdown::shutdown_signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Server CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shade-server",
    version,
    about = "Remote terminator for the shade tunnel"
)]
pub struct ServerArgs {
    /// Config file path (toml/json/jsonc/yaml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the listen address.
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

    /// Override the parked connection TTL in seconds.
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Jumper CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shade-jumper",
    version,
    about = "Cascading hop for the shade tunnel"
)]
pub struct JumperArgs {
    /// Config file path (toml/json/jsonc/yaml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Override the next hop (host:port or ss:// URL).
    #[arg(short, long)]
    pub next_hop: Option<String>,

    /// Override the cipher method for the inbound side.
    #[arg(long)]
    pub cipher: Option<String>,

    /// Override the password.
    #[arg(short, long)]
    pub password: Option<String>,

    /// Override the base64url key.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Reverse claimant CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shade-reverse",
    version,
    about = "Reverse claimant for the shade tunnel"
)]
pub struct ReverseArgs {
    /// Config file path (toml/json/jsonc/yaml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the server address (host:port or ss:// URL).
    #[arg(short, long)]
    pub server: Option<String>,

    /// Override the cipher method.
    #[arg(long)]
    pub cipher: Option<String>,

    /// Override the password.
    #[arg(short, long)]
    pub password: Option<String>,

    /// Override the base64url key.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Run the remote terminator with the given CLI arguments.
pub async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    let server = config.server.get_or_insert_with(ServerConfig::default);
    if let Some(listen) = &args.listen {
        server.listen = listen.clone();
    }
    if let Some(ttl) = args.cache_ttl {
        server.cache_ttl_secs = ttl;
    }
    apply_node_overrides(
        &mut config,
        &args.cipher,
        &args.password,
        &args.key,
        &args.log_level,
    );

    validate_server(&config)?;
    init_tracing(&config.logging);

    let shutdown = spawn_shutdown_handler();
    crate::run(config, shutdown).await?;
    Ok(())
}

/// Run the jumper with the given CLI arguments.
pub async fn run_jumper(args: JumperArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let jumper = config.jumper.get_or_insert_with(JumperConfig::default);
    if let Some(listen) = &args.listen {
        jumper.listen = listen.clone();
    }
    if let Some(next_hop) = &args.next_hop {
        jumper.next_hop = next_hop.clone();
    }
    apply_node_overrides(
        &mut config,
        &args.cipher,
        &args.password,
        &args.key,
        &args.log_level,
    );

    validate_jumper(&config)?;
    init_tracing(&config.logging);

    let shutdown = spawn_shutdown_handler();
    crate::run_jumper(config, shutdown).await?;
    Ok(())
}

/// Run the reverse claimant with the given CLI arguments.
pub async fn run_reverse(args: ReverseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let reverse = config.reverse.get_or_insert_with(ReverseConfig::default);
    if let Some(server) = &args.server {
        reverse.server = server.clone();
    }
    apply_node_overrides(
        &mut config,
        &args.cipher,
        &args.password,
        &args.key,
        &args.log_level,
    );

    validate_reverse(&config)?;
    init_tracing(&config.logging);

    let shutdown = spawn_shutdown_handler();
    crate::run_reverse(config, shutdown).await?;
    Ok(())
}

fn apply_node_overrides(
    config: &mut Config,
    cipher: &Option<String>,
    password: &Option<String>,
    key: &Option<String>,
    log_level: &Option<String>,
) {
    if let Some(cipher) = cipher {
        config.node.cipher = cipher.clone();
    }
    if let Some(password) = password {
        config.node.password = Some(password.clone());
    }
    if let Some(key) = key {
        config.node.key = Some(key.clone());
    }
    if let Some(level) = log_level {
        config.logging.level = Some(level.clone());
    }
}

fn spawn_shutdown_handler() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let shutdown_token = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_token.cancel();
    });

    shutdown
}

//! Local agent for the shade tunnel.
//!
//! This crate provides a local SOCKS5 proxy and static port tunnels that
//! forward connections through the encrypted shade protocol to a remote
//! server.

pub mod cli;
mod connector;
mod error;
mod handler;
pub mod socks5;

pub use cli::ClientArgs;
pub use connector::ClientState;
pub use error::ClientError;

use std::sync::Arc;

use shade_config::{Config, resolve_endpoint, split_tunnel_spec};
use shade_proto::Address;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the client with the given configuration.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ClientError> {
    let client = config
        .client
        .clone()
        .ok_or_else(|| ClientError::Config("missing [client] section".into()))?;

    let endpoint = resolve_endpoint(&client.server, &config.node)?;
    let suite = endpoint.cipher_suite()?;
    let remote: Address = endpoint
        .address
        .parse()
        .map_err(|_| ClientError::Config(format!("bad server address {:?}", endpoint.address)))?;

    let state = Arc::new(ClientState {
        remote,
        suite,
        guard: Arc::new(config.replay.build()),
        tcp: config.tcp.to_options(),
    });

    let mut tasks = Vec::new();

    if !client.socks_listen.trim().is_empty() {
        let listener = TcpListener::bind(&client.socks_listen).await?;
        info!(listen = %client.socks_listen, remote = %state.remote, "socks5 front end started");
        tasks.push(tokio::spawn(serve_socks(
            listener,
            state.clone(),
            shutdown.clone(),
        )));
    }

    for spec in &client.tunnels {
        let (local, remote) = split_tunnel_spec(spec)?;
        let target: Address = remote
            .parse()
            .map_err(|_| ClientError::Config(format!("bad tunnel target {remote:?}")))?;
        let listener = TcpListener::bind(local).await?;
        info!(listen = %local, target = %target, "tunnel started");
        tasks.push(tokio::spawn(serve_tunnel(
            listener,
            target,
            state.clone(),
            shutdown.clone(),
        )));
    }

    if tasks.is_empty() {
        return Err(ClientError::Config(
            "client needs a socks_listen address or at least one tunnel".into(),
        ));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn serve_socks(listener: TcpListener, state: Arc<ClientState>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            handler::handle_socks5_conn(stream, peer, state).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("shutting down socks5 front end");
                break;
            }
        }
    }
}

async fn serve_tunnel(
    listener: TcpListener,
    target: Address,
    state: Arc<ClientState>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        let target = target.clone();
                        tokio::spawn(async move {
                            handler::handle_tunnel_conn(stream, peer, target, state).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!(target = %target, "shutting down tunnel");
                break;
            }
        }
    }
}

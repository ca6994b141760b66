//! Cascading hop: decrypt with the local suite, re-encrypt with the next
//! hop's suite, and forward the greeting unchanged.
//!
//! All greeting kinds pass through, so command channels and claims can
//! cascade across hops the same way plain targets do.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use shade_config::{Config, node_cipher_suite, resolve_endpoint};
use shade_core::defaults::{
    DEFAULT_DRAIN_GRACE_SECS, DEFAULT_RELAY_BUFFER_SIZE, HEADER_FLUSH_DELAY_MS,
};
use shade_core::{
    CipherStream, HeaderStream, PrefixedStream, TcpOptions, apply_tcp_options, dial,
    relay_bidirectional,
};
use shade_crypto::{CipherSuite, ReplayGuard};
use shade_proto::{Address, write_greeting};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::wire::read_greeting;

/// Shared jumper state.
struct JumperState {
    local_suite: CipherSuite,
    next_suite: CipherSuite,
    next_hop: Address,
    guard: Arc<ReplayGuard>,
    tcp: TcpOptions,
}

/// Run a cascading hop with the given configuration.
pub async fn run_jumper(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let jumper = config
        .jumper
        .clone()
        .ok_or_else(|| ServerError::Config("missing [jumper] section".into()))?;

    let local_suite = node_cipher_suite(&config.node)?;
    let next = resolve_endpoint(&jumper.next_hop, &config.node)?;
    let next_suite = next.cipher_suite()?;
    let next_hop: Address = next
        .address
        .parse()
        .map_err(|_| ServerError::Config(format!("bad next hop address {:?}", next.address)))?;

    let state = Arc::new(JumperState {
        local_suite,
        next_suite,
        next_hop,
        guard: Arc::new(config.replay.build()),
        tcp: config.tcp.to_options(),
    });

    let listener = TcpListener::bind(&jumper.listen).await?;
    info!(listen = %jumper.listen, next_hop = %state.next_hop, "jumper started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutting down jumper");
                break;
            }

            result = listener.accept() => {
                let (stream, peer) = result?;
                let state = state.clone();
                tokio::spawn(async move {
                    handle_conn(stream, peer, state).await;
                });
            }
        }
    }
    Ok(())
}

async fn handle_conn(stream: TcpStream, peer: SocketAddr, state: Arc<JumperState>) {
    if let Err(e) = handle_conn_inner(stream, peer, &state).await {
        debug!(peer = %peer, error = %e, "connection error");
    }
}

async fn handle_conn_inner(
    stream: TcpStream,
    peer: SocketAddr,
    state: &JumperState,
) -> Result<(), ServerError> {
    apply_tcp_options(&stream, &state.tcp)?;
    let mut inbound = CipherStream::new(stream, state.local_suite.clone(), state.guard.clone());

    let Some((greeting, leftover)) = read_greeting(&mut inbound).await? else {
        return Ok(());
    };
    let inbound = PrefixedStream::new(leftover, inbound);
    debug!(peer = %peer, greeting = ?greeting, "forwarding to next hop");

    let outbound = dial(&state.next_hop).await?;
    apply_tcp_options(&outbound, &state.tcp)?;
    let outbound = CipherStream::new(outbound, state.next_suite.clone(), state.guard.clone());

    // Re-encode the greeting so it coalesces with the first payload bytes
    // on the next hop's link.
    let mut header = BytesMut::new();
    write_greeting(&mut header, &greeting);
    let outbound = HeaderStream::new(
        outbound,
        header,
        Duration::from_millis(HEADER_FLUSH_DELAY_MS),
    );

    let outcome = relay_bidirectional(
        inbound,
        outbound,
        DEFAULT_RELAY_BUFFER_SIZE,
        Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
    )
    .await;

    match outcome.error {
        Some(e) => {
            debug!(peer = %peer, up = outcome.upstream, down = outcome.downstream, error = %e, "relay finished")
        }
        None => {
            debug!(peer = %peer, up = outcome.upstream, down = outcome.downstream, "relay finished")
        }
    }
    Ok(())
}

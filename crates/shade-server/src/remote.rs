//! Remote terminator: decrypt, read the greeting, serve the target.
//!
//! Besides dialing targets directly, the terminator hosts the reverse
//! cascade: a command channel attached by a far-side claimant, and a
//! cache of client connections parked until the claimant picks them up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use shade_config::{Config, node_cipher_suite};
use shade_core::defaults::{DEFAULT_DRAIN_GRACE_SECS, DEFAULT_RELAY_BUFFER_SIZE};
use shade_core::{
    CipherStream, PrefixedStream, TcpOptions, apply_tcp_options, dial, relay_bidirectional,
};
use shade_crypto::{CipherSuite, ReplayGuard};
use shade_proto::{Address, Greeting, write_address};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::ConnCache;
use crate::error::ServerError;
use crate::wire::read_greeting;

/// A decrypted connection, leftover bytes included.
pub(crate) type Parked = PrefixedStream<CipherStream<TcpStream>>;

/// Shared terminator state.
pub(crate) struct RemoteState {
    pub suite: CipherSuite,
    pub guard: Arc<ReplayGuard>,
    pub tcp: TcpOptions,
    /// Client connections waiting for a claimant, keyed by target address.
    pub cache: ConnCache<Parked>,
    /// The far side's command channel, when a claimant is attached.
    pub command: Mutex<Option<Parked>>,
}

/// Run the remote terminator with the given configuration.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let server = config
        .server
        .clone()
        .ok_or_else(|| ServerError::Config("missing [server] section".into()))?;

    let suite = node_cipher_suite(&config.node)?;
    let state = Arc::new(RemoteState {
        suite,
        guard: Arc::new(config.replay.build()),
        tcp: config.tcp.to_options(),
        cache: ConnCache::new(Duration::from_secs(server.cache_ttl_secs)),
        command: Mutex::new(None),
    });

    let listener = TcpListener::bind(&server.listen).await?;
    info!(listen = %server.listen, cipher = %config.node.cipher, "server started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutting down server");
                break;
            }

            result = listener.accept() => {
                let (stream, peer) = result?;
                state.cache.maybe_sweep();
                let state = state.clone();
                tokio::spawn(async move {
                    handle_conn(stream, peer, state).await;
                });
            }
        }
    }
    Ok(())
}

/// Handle a single inbound encrypted connection.
async fn handle_conn(stream: TcpStream, peer: SocketAddr, state: Arc<RemoteState>) {
    if let Err(e) = handle_conn_inner(stream, peer, &state).await {
        debug!(peer = %peer, error = %e, "connection error");
    }
}

async fn handle_conn_inner(
    stream: TcpStream,
    peer: SocketAddr,
    state: &RemoteState,
) -> Result<(), ServerError> {
    apply_tcp_options(&stream, &state.tcp)?;
    let mut link = CipherStream::new(stream, state.suite.clone(), state.guard.clone());

    let Some((greeting, leftover)) = read_greeting(&mut link).await? else {
        return Ok(());
    };
    let link = PrefixedStream::new(leftover, link);

    match greeting {
        Greeting::Target(target) => serve_target(link, target, peer, state).await,
        Greeting::Claim(target) => splice_claim(link, &target, peer, state).await,
        Greeting::Command => adopt_command_channel(link, peer, state).await,
    }
}

/// Serve a target greeting: hand the connection to the claimant side when
/// a command channel is attached, otherwise dial the target and relay.
async fn serve_target(
    link: Parked,
    target: Address,
    peer: SocketAddr,
    state: &RemoteState,
) -> Result<(), ServerError> {
    let link = match park_for_claimant(link, &target, state).await {
        None => return Ok(()),
        Some(link) => link,
    };

    debug!(peer = %peer, target = %target, "connecting to target");
    let outbound = dial(&target).await?;
    apply_tcp_options(&outbound, &state.tcp)?;

    let outcome = relay_bidirectional(
        link,
        outbound,
        DEFAULT_RELAY_BUFFER_SIZE,
        Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
    )
    .await;

    match outcome.error {
        Some(e) => {
            debug!(peer = %peer, target = %target, up = outcome.upstream, down = outcome.downstream, error = %e, "relay finished")
        }
        None => {
            debug!(peer = %peer, target = %target, up = outcome.upstream, down = outcome.downstream, "relay finished")
        }
    }
    Ok(())
}

/// Park the connection for the attached claimant and announce its target
/// on the command channel.
///
/// Parking happens before the announcement, so a claimant that races it
/// always finds the entry. Returns the connection when no claimant can
/// take it, in which case the caller serves the target itself.
async fn park_for_claimant(link: Parked, target: &Address, state: &RemoteState) -> Option<Parked> {
    let mut slot = state.command.lock().await;
    let Some(command) = slot.as_mut() else {
        return Some(link);
    };

    let key = target.to_string();
    if state.cache.park(key.clone(), link).is_some() {
        debug!(target = %key, "displaced a parked connection with the same target");
    }

    let mut wire = BytesMut::new();
    write_address(&mut wire, target);
    let announced = async {
        command.write_all(&wire).await?;
        command.flush().await
    }
    .await;

    match announced {
        Ok(()) => {
            debug!(target = %key, "parked for claimant");
            None
        }
        Err(e) => {
            debug!(error = %e, "command channel lost, detaching");
            *slot = None;
            // Take the connection back unless a claimant already has it.
            state.cache.claim(&key)
        }
    }
}

/// Serve a claim greeting: splice the claimant onto the parked connection.
async fn splice_claim(
    link: Parked,
    target: &Address,
    peer: SocketAddr,
    state: &RemoteState,
) -> Result<(), ServerError> {
    let key = target.to_string();
    let Some(parked) = state.cache.claim(&key) else {
        debug!(peer = %peer, target = %key, "claim for unknown target");
        return Ok(());
    };

    debug!(peer = %peer, target = %key, "claim matched, splicing");
    let outcome = relay_bidirectional(
        parked,
        link,
        DEFAULT_RELAY_BUFFER_SIZE,
        Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
    )
    .await;

    match outcome.error {
        Some(e) => {
            debug!(target = %key, up = outcome.upstream, down = outcome.downstream, error = %e, "splice finished")
        }
        None => {
            debug!(target = %key, up = outcome.upstream, down = outcome.downstream, "splice finished")
        }
    }
    Ok(())
}

/// Adopt a command greeting: the connection becomes the claimant's
/// command channel, replacing any previous one.
async fn adopt_command_channel(
    link: Parked,
    peer: SocketAddr,
    state: &RemoteState,
) -> Result<(), ServerError> {
    let replaced = {
        let mut slot = state.command.lock().await;
        slot.replace(link)
    };
    if replaced.is_some() {
        debug!(peer = %peer, "replacing previous command channel");
    }
    info!(peer = %peer, "command channel attached");
    Ok(())
}

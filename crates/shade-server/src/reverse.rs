//! Reverse claimant: the node that sits next to the real targets.
//!
//! It dials the server and parks a command channel there. For every
//! target address announced on the channel it dials the server again
//! with a claim greeting, dials the target locally in plaintext, and
//! relays the pair. If the command channel drops it reconnects after a
//! short delay.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use shade_config::{Config, resolve_endpoint};
use shade_core::defaults::{
    DEFAULT_DRAIN_GRACE_SECS, DEFAULT_RELAY_BUFFER_SIZE, REVERSE_RECONNECT_DELAY_SECS,
};
use shade_core::{CipherStream, TcpOptions, apply_tcp_options, dial, relay_bidirectional};
use shade_crypto::{CipherSuite, ReplayGuard};
use shade_proto::{Address, Greeting, MAX_GREETING_LEN, write_greeting};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::wire::next_address;

/// Shared claimant state.
struct ReverseState {
    server: Address,
    suite: CipherSuite,
    guard: Arc<ReplayGuard>,
    tcp: TcpOptions,
}

/// Run the reverse claimant with the given configuration.
pub async fn run_reverse(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let reverse = config
        .reverse
        .clone()
        .ok_or_else(|| ServerError::Config("missing [reverse] section".into()))?;

    let endpoint = resolve_endpoint(&reverse.server, &config.node)?;
    let suite = endpoint.cipher_suite()?;
    let server: Address = endpoint
        .address
        .parse()
        .map_err(|_| ServerError::Config(format!("bad server address {:?}", endpoint.address)))?;

    let state = Arc::new(ReverseState {
        server,
        suite,
        guard: Arc::new(config.replay.build()),
        tcp: config.tcp.to_options(),
    });
    info!(server = %state.server, "reverse claimant started");

    loop {
        tokio::select! {
            result = serve_command_channel(&state) => {
                match result {
                    Ok(()) => info!(server = %state.server, "command channel closed"),
                    Err(e) => warn!(server = %state.server, error = %e, "command channel failed"),
                }
            }
            _ = shutdown.cancelled() => {
                info!("shutting down reverse claimant");
                return Ok(());
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(REVERSE_RECONNECT_DELAY_SECS)) => {}
            _ = shutdown.cancelled() => {
                info!("shutting down reverse claimant");
                return Ok(());
            }
        }
    }
}

/// Dial the server, attach as its command channel, and serve claims
/// until the channel drops.
async fn serve_command_channel(state: &Arc<ReverseState>) -> Result<(), ServerError> {
    let tcp = dial(&state.server).await?;
    apply_tcp_options(&tcp, &state.tcp)?;
    let mut command = CipherStream::new(tcp, state.suite.clone(), state.guard.clone());

    let mut wire = BytesMut::new();
    write_greeting(&mut wire, &Greeting::Command);
    command.write_all(&wire).await?;
    command.flush().await?;
    info!(server = %state.server, "command channel attached");

    let mut buf = BytesMut::with_capacity(MAX_GREETING_LEN);
    while let Some(target) = next_address(&mut command, &mut buf).await? {
        debug!(target = %target, "claim announced");
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_claim(&state, &target).await {
                debug!(target = %target, error = %e, "claim failed");
            }
        });
    }
    Ok(())
}

/// Claim one parked connection off the server and relay it to the local
/// target.
async fn serve_claim(state: &ReverseState, target: &Address) -> Result<(), ServerError> {
    let tcp = dial(&state.server).await?;
    apply_tcp_options(&tcp, &state.tcp)?;
    let mut claim = CipherStream::new(tcp, state.suite.clone(), state.guard.clone());

    let mut wire = BytesMut::new();
    write_greeting(&mut wire, &Greeting::Claim(target.clone()));
    claim.write_all(&wire).await?;
    claim.flush().await?;

    let local = dial(target).await?;
    apply_tcp_options(&local, &state.tcp)?;

    let outcome = relay_bidirectional(
        claim,
        local,
        DEFAULT_RELAY_BUFFER_SIZE,
        Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
    )
    .await;

    match outcome.error {
        Some(e) => {
            debug!(target = %target, up = outcome.upstream, down = outcome.downstream, error = %e, "claim relay finished")
        }
        None => {
            debug!(target = %target, up = outcome.upstream, down = outcome.downstream, "claim relay finished")
        }
    }
    Ok(())
}

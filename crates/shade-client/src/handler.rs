//! Connection handlers for the SOCKS5 front end and static tunnels.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use shade_core::defaults::{
    DEFAULT_DRAIN_GRACE_SECS, DEFAULT_RELAY_BUFFER_SIZE, HEADER_FLUSH_DELAY_MS,
};
use shade_core::{HeaderStream, relay_bidirectional};
use shade_proto::{Address, Greeting, write_greeting};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connector::ClientState;
use crate::error::ClientError;
use crate::socks5::{
    self, REPLY_ADDRESS_TYPE_NOT_SUPPORTED, REPLY_COMMAND_NOT_SUPPORTED,
    REPLY_CONNECTION_NOT_ALLOWED, REPLY_CONNECTION_REFUSED, REPLY_GENERAL_FAILURE,
    REPLY_HOST_UNREACHABLE, REPLY_NETWORK_UNREACHABLE, REPLY_SUCCEEDED, REPLY_TTL_EXPIRED,
};

/// Handle a single SOCKS5 client connection.
pub async fn handle_socks5_conn(mut stream: TcpStream, peer: SocketAddr, state: Arc<ClientState>) {
    if let Err(e) = handle_socks5_conn_inner(&mut stream, &state).await {
        debug!(peer = %peer, error = %e, "connection error");
    }
}

async fn handle_socks5_conn_inner(
    stream: &mut TcpStream,
    state: &ClientState,
) -> Result<(), ClientError> {
    socks5::negotiate_method(stream).await?;

    let request = match socks5::read_request(stream).await {
        Ok(request) => request,
        Err(e @ crate::error::Socks5Error::UnsupportedAddressType(_)) => {
            let _ = socks5::send_reply_unspecified(stream, REPLY_ADDRESS_TYPE_NOT_SUPPORTED).await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    match request.command {
        socks5::CMD_CONNECT => handle_connect(stream, request.address, state).await,
        cmd => {
            let _ = socks5::send_reply_unspecified(stream, REPLY_COMMAND_NOT_SUPPORTED).await;
            Err(crate::error::Socks5Error::UnsupportedCommand(cmd).into())
        }
    }
}

/// Handle TCP CONNECT: open the encrypted link and relay.
async fn handle_connect(
    stream: &mut TcpStream,
    target: Address,
    state: &ClientState,
) -> Result<(), ClientError> {
    debug!(target = %target, "CONNECT");

    let remote = match state.connect().await {
        Ok(remote) => remote,
        Err(e) => {
            let reply = reply_code_for_connect_error(&e);
            let _ = socks5::send_reply_unspecified(stream, reply).await;
            return Err(e.into());
        }
    };

    socks5::send_reply_unspecified(stream, REPLY_SUCCEEDED).await?;

    relay_to_server(stream, remote, Greeting::Target(target)).await;
    Ok(())
}

/// Handle one static tunnel connection: fixed target, no SOCKS handshake.
pub async fn handle_tunnel_conn(
    mut stream: TcpStream,
    peer: SocketAddr,
    target: Address,
    state: Arc<ClientState>,
) {
    debug!(peer = %peer, target = %target, "tunnel connection");
    match state.connect().await {
        Ok(remote) => relay_to_server(&mut stream, remote, Greeting::Target(target)).await,
        Err(e) => debug!(peer = %peer, error = %e, "tunnel connect failed"),
    }
}

/// Wrap the server link so the greeting coalesces with the first payload
/// bytes, then relay until both directions finish.
async fn relay_to_server<S>(local: &mut TcpStream, remote: S, greeting: Greeting)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = BytesMut::new();
    write_greeting(&mut header, &greeting);
    let remote = HeaderStream::new(remote, header, Duration::from_millis(HEADER_FLUSH_DELAY_MS));

    let outcome = relay_bidirectional(
        local,
        remote,
        DEFAULT_RELAY_BUFFER_SIZE,
        Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
    )
    .await;

    match outcome.error {
        Some(e) => {
            debug!(up = outcome.upstream, down = outcome.downstream, error = %e, "relay finished")
        }
        None => debug!(up = outcome.upstream, down = outcome.downstream, "relay finished"),
    }
}

fn reply_code_for_connect_error(error: &std::io::Error) -> u8 {
    match error.kind() {
        ErrorKind::ConnectionRefused => REPLY_CONNECTION_REFUSED,
        ErrorKind::NetworkUnreachable => REPLY_NETWORK_UNREACHABLE,
        ErrorKind::HostUnreachable => REPLY_HOST_UNREACHABLE,
        ErrorKind::PermissionDenied => REPLY_CONNECTION_NOT_ALLOWED,
        ErrorKind::TimedOut => REPLY_TTL_EXPIRED,
        ErrorKind::AddrNotAvailable => REPLY_HOST_UNREACHABLE,
        _ => REPLY_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::reply_code_for_connect_error;
    use crate::socks5::{
        REPLY_CONNECTION_NOT_ALLOWED, REPLY_CONNECTION_REFUSED, REPLY_GENERAL_FAILURE,
        REPLY_HOST_UNREACHABLE, REPLY_TTL_EXPIRED,
    };

    #[test]
    fn reply_code_maps_common_errors() {
        let err = std::io::Error::new(ErrorKind::ConnectionRefused, "refused");
        assert_eq!(reply_code_for_connect_error(&err), REPLY_CONNECTION_REFUSED);

        let err = std::io::Error::new(ErrorKind::HostUnreachable, "unreachable");
        assert_eq!(reply_code_for_connect_error(&err), REPLY_HOST_UNREACHABLE);

        let err = std::io::Error::new(ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            reply_code_for_connect_error(&err),
            REPLY_CONNECTION_NOT_ALLOWED
        );

        let err = std::io::Error::new(ErrorKind::TimedOut, "timeout");
        assert_eq!(reply_code_for_connect_error(&err), REPLY_TTL_EXPIRED);

        let err = std::io::Error::other("other");
        assert_eq!(reply_code_for_connect_error(&err), REPLY_GENERAL_FAILURE);
    }
}

//! Encrypted connection establishment to the remote server.

use std::io;
use std::sync::Arc;

use shade_core::{CipherStream, TcpOptions, apply_tcp_options, dial};
use shade_crypto::{CipherSuite, ReplayGuard};
use shade_proto::Address;
use tokio::net::TcpStream;
use tracing::debug;

/// Shared client state for establishing outbound connections.
#[allow(missing_debug_implementations)]
pub struct ClientState {
    /// Remote server address.
    pub remote: Address,
    /// Cipher suite for the server link.
    pub suite: CipherSuite,
    /// Replay guard for session salts arriving from the server.
    pub guard: Arc<ReplayGuard>,
    /// TCP socket options.
    pub tcp: TcpOptions,
}

impl ClientState {
    /// Establish an encrypted connection to the remote server.
    pub async fn connect(&self) -> io::Result<CipherStream<TcpStream>> {
        debug!(remote = %self.remote, "connecting to server");
        let tcp = dial(&self.remote).await?;
        apply_tcp_options(&tcp, &self.tcp)?;
        Ok(CipherStream::new(
            tcp,
            self.suite.clone(),
            self.guard.clone(),
        ))
    }
}
